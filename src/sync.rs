//! The lock handed to every connection handler.

/// A plain mutual-exclusion lock with no protected data.
///
/// Handlers share one instance per server and use it to serialize whatever
/// side effect they have in common (a console, a log file, a shared socket).
/// The server itself never takes it. Unlocking is dropping the guard.
#[derive(Default)]
pub struct Mutex {
	inner: parking_lot::Mutex<()>,
}

/// Held lock; released on drop.
pub type MutexGuard<'a> = parking_lot::MutexGuard<'a, ()>;

impl Mutex {
	pub const fn new() -> Self {
		Self { inner: parking_lot::const_mutex(()) }
	}

	/// Blocks until the lock is acquired.
	pub fn lock(&self) -> MutexGuard<'_> {
		self.inner.lock()
	}

	/// Acquires the lock only if nobody holds it.
	pub fn try_lock(&self) -> Option<MutexGuard<'_>> {
		self.inner.try_lock()
	}

	pub fn is_locked(&self) -> bool {
		self.inner.is_locked()
	}
}

impl std::fmt::Debug for Mutex {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Mutex").field("locked", &self.is_locked()).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::sync::Arc;
	use std::sync::atomic::{AtomicUsize, Ordering};

	#[test]
	fn try_lock_fails_while_held() {
		let m = Mutex::new();
		let guard = m.lock();
		assert!(m.try_lock().is_none());
		drop(guard);
		assert!(m.try_lock().is_some());
	}

	#[test]
	fn serializes_threads() {
		let m = Arc::new(Mutex::new());
		let inside = Arc::new(AtomicUsize::new(0));
		let handles: Vec<_> = (0..8)
			.map(|_| {
				let (m, inside) = (m.clone(), inside.clone());
				std::thread::spawn(move || {
					for _ in 0..100 {
						let _g = m.lock();
						assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
						inside.fetch_sub(1, Ordering::SeqCst);
					}
				})
			})
			.collect();
		for h in handles {
			h.join().unwrap();
		}
	}
}
