use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cancellation token shared between a server and whoever stops it.
///
/// Accept loops check it once per iteration, so a cancelled loop returns
/// within one `poll_interval`.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
	cancelled: Arc<AtomicBool>,
}

impl Shutdown {
	pub fn new() -> Self {
		Self::default()
	}

	/// Asks every loop holding this token to stop.
	pub fn cancel(&self) {
		if !self.cancelled.swap(true, Ordering::AcqRel) {
			tracing::debug!("shutdown requested");
		}
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancelled.load(Ordering::Acquire)
	}
}
