use std::time::Duration;
use crate::addr::PortPolicy;

/// Shortest wait an accept loop makes between shutdown checks.
///
/// A zero wait would mean "forever" to `Reactor::wait` and a busy spin to
/// `poll(2)`.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Server tuning knobs.
///
/// # Example
/// ```ignore
/// use wiredispatch::{PortPolicy, Server, ServerConfig};
/// use std::time::Duration;
///
/// let server = Server::with_config(ServerConfig::new()
///     .backlog(1024)
///     .max_workers(64)
///     .poll_interval(Duration::from_millis(50))
///     .port_policy(PortPolicy::AllowEphemeral));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
	pub backlog: i32,
	pub max_workers: usize,
	pub poll_interval: Duration,
	pub port_policy: PortPolicy,
}

impl Default for ServerConfig {
	fn default() -> Self {
		Self {
			backlog: libc::SOMAXCONN,
			max_workers: 512,
			poll_interval: Duration::from_millis(100),
			port_policy: PortPolicy::Strict,
		}
	}
}

impl ServerConfig {
	pub fn new() -> Self {
		Self::default()
	}

	/// Set listen backlog. Default: `SOMAXCONN`.
	pub fn backlog(mut self, backlog: i32) -> Self {
		self.backlog = backlog;
		self
	}

	/// Most handler threads alive at once in the threaded strategies.
	/// Clamped to at least 1. Default: 512.
	pub fn max_workers(mut self, max: usize) -> Self {
		self.max_workers = max.max(1);
		self
	}

	/// How long an accept loop blocks before re-checking for shutdown.
	/// Clamped to at least `MIN_POLL_INTERVAL`. Default: 100ms.
	pub fn poll_interval(mut self, interval: Duration) -> Self {
		self.poll_interval = interval.max(MIN_POLL_INTERVAL);
		self
	}

	/// The wait the accept loops actually use; the field is public, so it
	/// is clamped again here.
	pub(crate) fn tick(&self) -> Duration {
		self.poll_interval.max(MIN_POLL_INTERVAL)
	}

	/// Whether `bind("tcp::0")` is allowed. Default: `Strict`.
	pub fn port_policy(mut self, policy: PortPolicy) -> Self {
		self.port_policy = policy;
		self
	}
}
