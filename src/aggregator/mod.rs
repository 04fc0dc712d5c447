//! Background polling of a set of sources into merged snapshots.

pub mod pass;
pub mod snapshot;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use log::{debug, error, info, warn};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigError, ValidatedConfig};
use crate::observability::AggregatorMetrics;
use crate::store::ObjectStore;

pub use pass::{PassError, SourceSet};
pub use snapshot::{AggregateSnapshot, SnapshotError, SnapshotMarshaler};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
	#[error("aggregator already started")]
	AlreadyStarted,
	#[error("aggregator is not running")]
	NotRunning,
	#[error("aggregator already stopped")]
	AlreadyStopped,
	#[error("no tokio runtime available to run the poll loop")]
	NoRuntime,
}

enum State {
	Created {
		sources: SourceSet,
	},
	Running {
		cancel: CancellationToken,
		handle: JoinHandle<()>,
	},
	Stopped {
		handle: Option<JoinHandle<()>>,
	},
}

/// Polls its sources on a fixed interval and emits a snapshot whenever any of
/// them changed, or a failure snapshot when a pass could not complete.
pub struct Aggregator {
	name: String,
	poll_interval: Duration,
	state: State,
}

impl Aggregator {
	pub fn new(
		name: impl Into<String>,
		config: ValidatedConfig,
		store: Arc<dyn ObjectStore>,
	) -> Result<Self, ConfigError> {
		let sources = SourceSet::from_config(&config, store)?;
		Ok(Self::from_sources(name, config.poll_interval, sources))
	}

	pub fn from_sources(name: impl Into<String>, poll_interval: Duration, sources: SourceSet) -> Self {
		Self {
			name: name.into(),
			poll_interval,
			state: State::Created { sources },
		}
	}

	/// Record pass counters into `metrics`. Only effective before `start`.
	pub fn with_metrics(mut self, metrics: Arc<AggregatorMetrics>) -> Self {
		self.state = match std::mem::replace(&mut self.state, State::Stopped { handle: None }) {
			State::Created { sources } => State::Created {
				sources: sources.with_metrics(metrics),
			},
			other => other,
		};
		self
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn poll_interval(&self) -> Duration {
		self.poll_interval
	}

	/// Spawn the poll loop on the current tokio runtime and return.
	///
	/// The first pass runs immediately. Snapshots are sent to `sink`; a full
	/// channel delays the loop until the consumer catches up. Outside a tokio
	/// runtime this fails with [`LifecycleError::NoRuntime`] and the
	/// aggregator stays startable.
	pub fn start(&mut self, sink: mpsc::Sender<AggregateSnapshot>) -> Result<(), LifecycleError> {
		let runtime = match &self.state {
			State::Created { .. } => {
				tokio::runtime::Handle::try_current().map_err(|_| LifecycleError::NoRuntime)?
			}
			State::Running { .. } => return Err(LifecycleError::AlreadyStarted),
			State::Stopped { .. } => return Err(LifecycleError::AlreadyStopped),
		};

		let sources = match std::mem::replace(&mut self.state, State::Stopped { handle: None }) {
			State::Created { sources } => sources,
			running @ State::Running { .. } => {
				self.state = running;
				return Err(LifecycleError::AlreadyStarted);
			}
			stopped @ State::Stopped { .. } => {
				self.state = stopped;
				return Err(LifecycleError::AlreadyStopped);
			}
		};

		let cancel = CancellationToken::new();
		let poll = PollLoop {
			name: self.name.clone(),
			interval: self.poll_interval,
			metrics: sources.metrics().cloned(),
			sources,
			sink,
			cancel: cancel.clone(),
		};

		let name = self.name.clone();
		let handle = runtime.spawn(async move {
			if let Err(panic) = AssertUnwindSafe(poll.run()).catch_unwind().await {
				error!(
					"aggregator {}: poll loop panicked: {}",
					name,
					panic_message(panic.as_ref())
				);
			}
		});

		info!(
			"aggregator {} started, polling every {}",
			self.name,
			humantime::format_duration(self.poll_interval)
		);
		self.state = State::Running { cancel, handle };
		Ok(())
	}

	/// Signal the poll loop to stop. Returns once the signal is issued; use
	/// [`Aggregator::join`] to wait for the loop to exit.
	pub fn stop(&mut self) -> Result<(), LifecycleError> {
		match std::mem::replace(&mut self.state, State::Stopped { handle: None }) {
			State::Running { cancel, handle } => {
				cancel.cancel();
				debug!("aggregator {} stop requested", self.name);
				self.state = State::Stopped {
					handle: Some(handle),
				};
				Ok(())
			}
			created @ State::Created { .. } => {
				self.state = created;
				Err(LifecycleError::NotRunning)
			}
			stopped @ State::Stopped { .. } => {
				self.state = stopped;
				Err(LifecycleError::AlreadyStopped)
			}
		}
	}

	/// Wait for the poll loop task to finish. Returns immediately if it was
	/// never started or has already been joined.
	///
	/// While running, this waits until the loop ends on its own (closed sink
	/// or panic) and then leaves the aggregator stopped. If the wait is
	/// abandoned the aggregator stays running and can still be stopped.
	pub async fn join(&mut self) {
		let result = match &mut self.state {
			State::Running { handle, .. } => handle.await,
			State::Stopped {
				handle: Some(handle),
			} => handle.await,
			State::Stopped { handle: None } | State::Created { .. } => return,
		};
		self.state = State::Stopped { handle: None };
		if let Err(e) = result {
			warn!("aggregator {}: poll task ended abnormally: {}", self.name, e);
		}
	}

	/// Whether the poll loop is started and still alive.
	pub fn is_running(&self) -> bool {
		matches!(&self.state, State::Running { handle, .. } if !handle.is_finished())
	}
}

impl Drop for Aggregator {
	fn drop(&mut self) {
		if let State::Running { cancel, .. } = &self.state {
			cancel.cancel();
		}
	}
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
	if let Some(s) = payload.downcast_ref::<&str>() {
		s
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s
	} else {
		"non-string panic payload"
	}
}

struct PollLoop {
	name: String,
	interval: Duration,
	sources: SourceSet,
	sink: mpsc::Sender<AggregateSnapshot>,
	cancel: CancellationToken,
	metrics: Option<Arc<AggregatorMetrics>>,
}

impl PollLoop {
	async fn run(mut self) {
		let mut ticker = tokio::time::interval(self.interval);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

		loop {
			tokio::select! {
				biased;
				_ = self.cancel.cancelled() => break,
				_ = ticker.tick() => {}
			}

			let snapshot = match self.sources.poll_once().await {
				Ok(None) => continue,
				Ok(Some(value)) => AggregateSnapshot::from_value(value),
				Err(e) => {
					warn!("aggregator {}: pass failed: {}", self.name, e);
					AggregateSnapshot::failure(e)
				}
			};

			if !self.emit(snapshot).await {
				break;
			}
		}

		info!("aggregator {} stopped", self.name);
	}

	/// Deliver a snapshot unless cancelled first. Returns false when the loop
	/// should end.
	async fn emit(&self, snapshot: AggregateSnapshot) -> bool {
		if self.cancel.is_cancelled() {
			return false;
		}

		tokio::select! {
			biased;
			_ = self.cancel.cancelled() => false,
			sent = self.sink.send(snapshot) => match sent {
				Ok(()) => {
					if let Some(m) = &self.metrics {
						m.snapshots_emitted_total.inc();
					}
					true
				}
				Err(_) => {
					warn!("aggregator {}: snapshot receiver dropped, stopping", self.name);
					false
				}
			},
		}
	}
}
