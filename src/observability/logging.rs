use fern::colors::{Color, ColoredLevelConfig};
use log::Level;

/// Initialize colored, timestamped logging to stderr at `level`.
///
/// stdout is reserved for snapshot output, so every log line goes to stderr.
pub fn init_logging(level: Level) -> anyhow::Result<()> {
	let colors = ColoredLevelConfig::new()
		.error(Color::Red)
		.warn(Color::Yellow)
		.info(Color::Green)
		.debug(Color::Blue)
		.trace(Color::BrightBlack);

	fern::Dispatch::new()
		.format(move |out, message, record| {
			out.finish(format_args!(
				"{} {} [{}] {}",
				chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
				colors.color(record.level()),
				record.target(),
				message
			))
		})
		.level(level.to_level_filter())
		// Chatty at debug, never useful here
		.level_for("hyper_util", log::LevelFilter::Warn)
		.level_for("reqwest", log::LevelFilter::Warn)
		.chain(std::io::stderr())
		.apply()
		.map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

	Ok(())
}

#[cfg(feature = "unit-tests")]
mod tests {
	#[test]
	fn logging_initialization() {
		// Only the first initialization in a process succeeds
		let _ = super::init_logging(log::Level::Debug);
		assert!(super::init_logging(log::Level::Debug).is_err());
	}
}
