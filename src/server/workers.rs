use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use parking_lot::{Condvar, Mutex};
use super::{DispatchStats, Shutdown};
use crate::error::{BoxError, IoError};

/// How a handler thread ended.
#[derive(Debug)]
enum Outcome {
	Completed,
	Failed(BoxError),
	Panicked(String),
}

#[derive(Debug)]
struct Report {
	worker: u64,
	peer: String,
	outcome: Outcome,
}

/// Counts live workers; `max` bounds it.
struct Slots {
	active: Mutex<usize>,
	freed: Condvar,
	max: usize,
}

/// Frees a slot when a worker exits, whichever way it exits.
struct SlotGuard(Arc<Slots>);

impl Drop for SlotGuard {
	fn drop(&mut self) {
		let mut active = self.0.active.lock();
		*active -= 1;
		self.0.freed.notify_one();
	}
}

/// One OS thread per connection, bounded, tracked and joined.
///
/// Every worker reports its outcome on a channel. The acceptor drains the
/// channel between accepts (`reap`) and once more after `join_all`, so a
/// failing handler is always logged and counted.
pub(crate) struct WorkerGroup {
	slots: Arc<Slots>,
	handles: Vec<JoinHandle<()>>,
	reports_tx: mpsc::Sender<Report>,
	reports_rx: mpsc::Receiver<Report>,
	next_id: u64,
}

impl WorkerGroup {
	pub(crate) fn new(max: usize) -> Self {
		let (reports_tx, reports_rx) = mpsc::channel();
		Self {
			slots: Arc::new(Slots {
				active: Mutex::new(0),
				freed: Condvar::new(),
				max: max.max(1),
			}),
			handles: Vec::new(),
			reports_tx,
			reports_rx,
			next_id: 0,
		}
	}

	/// Waits for a free slot, then runs `job` on a new named thread.
	///
	/// Returns `Ok(false)` without spawning if `shutdown` fires while waiting.
	pub(crate) fn spawn<F>(&mut self, peer: String, shutdown: &Shutdown, tick: Duration, job: F) -> Result<bool, IoError>
	where
		F: FnOnce() -> Result<(), BoxError> + Send + 'static,
	{
		if !self.acquire_slot(shutdown, tick) {
			return Ok(false);
		}
		let guard = SlotGuard(self.slots.clone());

		let worker = self.next_id;
		self.next_id += 1;
		let tx = self.reports_tx.clone();
		let thread_peer = peer.clone();

		let handle = std::thread::Builder::new()
			.name(format!("wd-worker-{worker}"))
			.spawn(move || {
				let _slot = guard;
				let outcome = match catch_unwind(AssertUnwindSafe(job)) {
					Ok(Ok(())) => Outcome::Completed,
					Ok(Err(err)) => Outcome::Failed(err),
					Err(payload) => Outcome::Panicked(panic_message(payload.as_ref())),
				};
				// The acceptor may already be gone; nothing left to tell.
				let _ = tx.send(Report { worker, peer: thread_peer, outcome });
			})
			.map_err(IoError::Spawn)?;

		tracing::trace!(worker, %peer, "worker spawned");
		self.handles.push(handle);
		Ok(true)
	}

	/// Handles every report received so far and forgets finished threads.
	pub(crate) fn reap(&mut self, stats: &mut DispatchStats) {
		while let Ok(report) = self.reports_rx.try_recv() {
			record(report, stats);
		}
		self.handles.retain(|h| !h.is_finished());
	}

	/// Waits for every in-flight worker, then reaps their reports.
	pub(crate) fn join_all(&mut self, stats: &mut DispatchStats) {
		let pending = self.handles.len();
		if pending > 0 {
			tracing::debug!(pending, "waiting for in-flight workers");
		}
		for handle in self.handles.drain(..) {
			// Panics are caught inside the worker; join only fails on abort.
			let _ = handle.join();
		}
		self.reap(stats);
	}

	/// Number of workers currently running a handler.
	#[cfg(test)]
	pub(crate) fn active(&self) -> usize {
		*self.slots.active.lock()
	}

	fn acquire_slot(&self, shutdown: &Shutdown, tick: Duration) -> bool {
		let mut active = self.slots.active.lock();
		while *active >= self.slots.max {
			if shutdown.is_cancelled() {
				return false;
			}
			self.slots.freed.wait_for(&mut active, tick);
		}
		*active += 1;
		true
	}
}

fn record(report: Report, stats: &mut DispatchStats) {
	let Report { worker, peer, outcome } = report;
	match outcome {
		Outcome::Completed => {
			stats.completed += 1;
			tracing::trace!(worker, %peer, "handler completed");
		}
		Outcome::Failed(err) => {
			stats.failed += 1;
			tracing::warn!(worker, %peer, error = %err, "handler failed");
		}
		Outcome::Panicked(msg) => {
			stats.failed += 1;
			tracing::warn!(worker, %peer, panic = %msg, "handler panicked");
		}
	}
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
	if let Some(s) = payload.downcast_ref::<&str>() {
		(*s).to_owned()
	} else if let Some(s) = payload.downcast_ref::<String>() {
		s.clone()
	} else {
		"non-string panic payload".to_owned()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::atomic::{AtomicUsize, Ordering};

	const TICK: Duration = Duration::from_millis(10);

	#[test]
	fn outcomes_are_counted() {
		let mut group = WorkerGroup::new(4);
		let shutdown = Shutdown::new();
		let mut stats = DispatchStats::default();

		group.spawn("ok".into(), &shutdown, TICK, || Ok(())).unwrap();
		group.spawn("err".into(), &shutdown, TICK, || Err("boom".into())).unwrap();
		group.spawn("panic".into(), &shutdown, TICK, || panic!("kaboom")).unwrap();
		group.join_all(&mut stats);

		assert_eq!(stats.completed, 1);
		assert_eq!(stats.failed, 2);
		assert_eq!(group.active(), 0);
	}

	#[test]
	fn never_exceeds_max() {
		let mut group = WorkerGroup::new(2);
		let shutdown = Shutdown::new();
		let live = Arc::new(AtomicUsize::new(0));
		let peak = Arc::new(AtomicUsize::new(0));

		for i in 0..6 {
			let (live, peak) = (live.clone(), peak.clone());
			group
				.spawn(format!("w{i}"), &shutdown, TICK, move || {
					let now = live.fetch_add(1, Ordering::SeqCst) + 1;
					peak.fetch_max(now, Ordering::SeqCst);
					std::thread::sleep(Duration::from_millis(20));
					live.fetch_sub(1, Ordering::SeqCst);
					Ok(())
				})
				.unwrap();
		}
		let mut stats = DispatchStats::default();
		group.join_all(&mut stats);

		assert!(peak.load(Ordering::SeqCst) <= 2);
		assert_eq!(stats.completed, 6);
	}

	#[test]
	fn cancelled_while_full_does_not_spawn() {
		let mut group = WorkerGroup::new(1);
		let shutdown = Shutdown::new();
		let (release_tx, release_rx) = mpsc::channel::<()>();

		group
			.spawn("blocker".into(), &shutdown, TICK, move || {
				let _ = release_rx.recv();
				Ok(())
			})
			.unwrap();

		shutdown.cancel();
		let spawned = group.spawn("late".into(), &shutdown, TICK, || Ok(())).unwrap();
		assert!(!spawned);

		release_tx.send(()).unwrap();
		let mut stats = DispatchStats::default();
		group.join_all(&mut stats);
		assert_eq!(stats.completed, 1);
	}
}
