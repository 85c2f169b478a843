//! Readiness multiplexing over epoll.
//!
//! A `Reactor` owns one epoll descriptor and the set of descriptors
//! registered with it. `wait()` blocks for one batch of readiness events,
//! `dispatch()` hands that batch to a callback one descriptor at a time.

mod event;

pub use self::event::EventKind;

use crate::error::{SocketError, errno};
use std::collections::HashMap;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

const EMPTY_EVENT: libc::epoll_event = libc::epoll_event { events: 0, u64: 0 };

/// An epoll instance plus its registered set and last ready batch.
pub struct Reactor {
	epoll: OwnedFd,
	registered: HashMap<RawFd, u32>,
	ready: Vec<libc::epoll_event>,
}

impl Reactor {
	/// Creates a new epoll instance (close-on-exec).
	pub fn new() -> Result<Self, SocketError> {
		let fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
		if fd == -1 {
			return Err(SocketError::Create { errno: errno() });
		}
		Ok(Self {
			epoll: unsafe { OwnedFd::from_raw_fd(fd) },
			registered: HashMap::new(),
			ready: Vec::new(),
		})
	}

	/// Registers a descriptor for every readiness condition, edge-triggered.
	///
	/// A descriptor can be registered once; a second `register()` of the same
	/// descriptor fails with `EEXIST` and leaves the first registration intact.
	///
	/// The kernel forgets a descriptor when it is closed, the registered set
	/// does not. If a remembered descriptor number is accepted again by the
	/// kernel, the old entry was stale and is replaced.
	pub fn register<S: AsRawFd>(&mut self, socket: &S) -> Result<&mut Self, SocketError> {
		let fd = socket.as_raw_fd();
		let mut event = libc::epoll_event {
			events: event::INTEREST,
			u64: fd as u64,
		};

		self.ctl(libc::EPOLL_CTL_ADD, fd, &mut event)?;

		if self.registered.insert(fd, event::INTEREST).is_some() {
			tracing::debug!(fd, "replaced stale reactor entry");
		} else {
			tracing::debug!(fd, "registered with reactor");
		}
		Ok(self)
	}

	/// Removes a descriptor. Fails with `ENOENT` if it was never registered.
	pub fn unregister<S: AsRawFd>(&mut self, socket: &S) -> Result<&mut Self, SocketError> {
		let fd = socket.as_raw_fd();
		if !self.registered.contains_key(&fd) {
			return Err(SocketError::Registration { errno: libc::ENOENT, fd });
		}

		// Pre-2.6.9 kernels want a non-null event even for DEL.
		let mut event = EMPTY_EVENT;
		match self.ctl(libc::EPOLL_CTL_DEL, fd, &mut event) {
			Ok(()) => {}
			// Closed (or closed and reused) descriptor: the kernel already
			// dropped it, only our entry is left.
			Err(SocketError::Registration { errno, .. }) if errno == libc::ENOENT || errno == libc::EBADF => {
				tracing::debug!(fd, errno, "dropping stale reactor entry");
			}
			Err(err) => return Err(err),
		}
		self.registered.remove(&fd);
		self.ready.retain(|ev| ev.u64 as RawFd != fd);

		tracing::debug!(fd, "unregistered from reactor");
		Ok(self)
	}

	/// Number of registered descriptors.
	pub fn len(&self) -> usize {
		self.registered.len()
	}

	pub fn is_empty(&self) -> bool {
		self.registered.is_empty()
	}

	pub fn is_registered(&self, fd: RawFd) -> bool {
		self.registered.contains_key(&fd)
	}

	/// Blocks until a registered descriptor is ready or `timeout` elapses.
	///
	/// `None` or a zero timeout waits indefinitely. With nothing registered
	/// this returns `false` at once instead of blocking forever.
	/// Returns whether any events arrived.
	pub fn wait(&mut self, timeout: Option<Duration>) -> Result<bool, SocketError> {
		self.ready.clear();
		if self.registered.is_empty() {
			return Ok(false);
		}

		let timeout_ms = match timeout {
			None => -1,
			Some(t) if t.is_zero() => -1,
			Some(t) => t.as_millis().clamp(1, libc::c_int::MAX as u128) as libc::c_int,
		};

		// The batch never needs to be larger than the registered set.
		self.ready.resize(self.registered.len(), EMPTY_EVENT);

		let n = loop {
			let n = unsafe {
				libc::epoll_wait(
					self.epoll.as_raw_fd(),
					self.ready.as_mut_ptr(),
					self.ready.len() as libc::c_int,
					timeout_ms,
				)
			};
			if n >= 0 {
				break n as usize;
			}
			let e = errno();
			if e != libc::EINTR {
				self.ready.clear();
				return Err(SocketError::Wait { errno: e });
			}
		};

		self.ready.truncate(n);
		tracing::trace!(ready = n, "reactor woke");
		Ok(n > 0)
	}

	/// Calls `handler(kind, fd)` once per descriptor from the last `wait()`.
	///
	/// Returns how many events were handled.
	pub fn dispatch<F>(&self, mut handler: F) -> usize
	where
		F: FnMut(EventKind, RawFd),
	{
		for (kind, fd) in self.ready_events() {
			handler(kind, fd);
		}
		self.ready.len()
	}

	/// Like `dispatch`, but stops at the first handler error.
	pub fn try_dispatch<F, E>(&self, mut handler: F) -> Result<usize, E>
	where
		F: FnMut(EventKind, RawFd) -> Result<(), E>,
	{
		let mut handled = 0;
		for (kind, fd) in self.ready_events() {
			handler(kind, fd)?;
			handled += 1;
		}
		Ok(handled)
	}

	fn ready_events(&self) -> impl Iterator<Item = (EventKind, RawFd)> + '_ {
		self.ready.iter().map(|ev| {
			// epoll_event is packed on x86_64: copy fields out, never borrow.
			let bits = ev.events;
			let token = ev.u64;
			(EventKind::classify(bits), token as RawFd)
		})
	}

	fn ctl(&self, op: libc::c_int, fd: RawFd, event: &mut libc::epoll_event) -> Result<(), SocketError> {
		let result = unsafe { libc::epoll_ctl(self.epoll.as_raw_fd(), op, fd, event) };
		if result == -1 {
			return Err(SocketError::Registration { errno: errno(), fd });
		}
		Ok(())
	}
}

impl AsRawFd for Reactor {
	fn as_raw_fd(&self) -> RawFd {
		self.epoll.as_raw_fd()
	}
}

impl std::fmt::Debug for Reactor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Reactor")
			.field("epoll", &self.epoll.as_raw_fd())
			.field("registered", &self.registered.len())
			.field("ready", &self.ready.len())
			.finish()
	}
}
