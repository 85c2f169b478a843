use std::sync::Arc;
use super::workers::WorkerGroup;
use super::{DispatchStats, HandlerResult, Server};
use crate::addr::Address;
use crate::error::{Error, SocketError, errno, is_ignored_error};
use crate::reactor::{EventKind, Reactor};
use crate::socket::Socket;
use crate::sync::Mutex;

impl Server {
	/// Accepts and handles one connection at a time on the calling thread.
	///
	/// A slow handler stalls every pending connection. A handler error ends
	/// the loop and is returned as `Error::Handler`.
	pub fn accept_block<F>(&self, mut handler: F) -> crate::Result<DispatchStats>
	where
		F: FnMut(Socket, Address, &Mutex) -> HandlerResult,
	{
		let listener = self.listener()?;
		let mut stats = DispatchStats::default();
		tracing::debug!(fd = listener.raw(), "blocking accept loop started");

		while !self.shutdown.is_cancelled() {
			if !listener.poll_readable(self.config.tick())? {
				continue;
			}
			let Some((socket, addr)) = accept(listener)? else {
				continue;
			};
			stats.accepted += 1;
			tracing::trace!(peer = ?addr, fd = socket.raw(), "accepted");

			handler(socket, addr, self.io_lock.as_ref()).map_err(Error::Handler)?;
			stats.completed += 1;
		}

		tracing::debug!(?stats, "blocking accept loop stopped");
		Ok(stats)
	}

	/// Accepts on the calling thread, handles each connection on its own
	/// worker thread.
	///
	/// At most `max_workers` handlers run at once. Handler failures are
	/// logged and counted, never fatal. When the loop stops it waits for
	/// every in-flight handler before returning.
	pub fn accept_async<F>(&self, handler: F) -> crate::Result<DispatchStats>
	where
		F: Fn(Socket, Address, &Mutex) -> HandlerResult + Send + Sync + 'static,
	{
		let listener = self.listener()?;
		let handler = Arc::new(handler);
		let mut workers = WorkerGroup::new(self.config.max_workers);
		let mut stats = DispatchStats::default();
		tracing::debug!(fd = listener.raw(), max_workers = self.config.max_workers, "threaded accept loop started");

		let result = self.run_async(listener, &handler, &mut workers, &mut stats);
		workers.join_all(&mut stats);

		tracing::debug!(?stats, "threaded accept loop stopped");
		result.map(|()| stats)
	}

	/// Like `accept_async`, but the listener is non-blocking and driven by a
	/// `Reactor`; every readiness event drains all pending connections.
	///
	/// The listener is switched back to blocking mode when the loop stops.
	pub fn accept_epoll<F>(&self, handler: F) -> crate::Result<DispatchStats>
	where
		F: Fn(Socket, Address, &Mutex) -> HandlerResult + Send + Sync + 'static,
	{
		let listener = self.listener()?;
		let handler = Arc::new(handler);
		let mut workers = WorkerGroup::new(self.config.max_workers);
		let mut stats = DispatchStats::default();

		listener.set_nonblocking(true)?;
		let mut reactor = Reactor::new()?;
		reactor.register(listener)?;
		tracing::debug!(fd = listener.raw(), max_workers = self.config.max_workers, "epoll accept loop started");

		let result = self.run_epoll(listener, &mut reactor, &handler, &mut workers, &mut stats);
		workers.join_all(&mut stats);

		let restored = reactor
			.unregister(listener)
			.and_then(|_| listener.set_nonblocking(false));
		tracing::debug!(?stats, "epoll accept loop stopped");

		result?;
		restored?;
		Ok(stats)
	}

	fn run_async<F>(
		&self,
		listener: &Socket,
		handler: &Arc<F>,
		workers: &mut WorkerGroup,
		stats: &mut DispatchStats,
	) -> crate::Result<()>
	where
		F: Fn(Socket, Address, &Mutex) -> HandlerResult + Send + Sync + 'static,
	{
		while !self.shutdown.is_cancelled() {
			workers.reap(stats);
			if !listener.poll_readable(self.config.tick())? {
				continue;
			}
			if let Some((socket, addr)) = accept(listener)? {
				// false only on shutdown, which the loop condition sees next.
				let _ = self.hand_off(socket, addr, handler, workers, stats)?;
			}
		}
		Ok(())
	}

	fn run_epoll<F>(
		&self,
		listener: &Socket,
		reactor: &mut Reactor,
		handler: &Arc<F>,
		workers: &mut WorkerGroup,
		stats: &mut DispatchStats,
	) -> crate::Result<()>
	where
		F: Fn(Socket, Address, &Mutex) -> HandlerResult + Send + Sync + 'static,
	{
		let listen_fd = listener.raw();

		while !self.shutdown.is_cancelled() {
			workers.reap(stats);
			if !reactor.wait(Some(self.config.tick()))? {
				continue;
			}

			reactor.try_dispatch(|kind, fd| -> crate::Result<()> {
				if fd != listen_fd {
					return Ok(());
				}
				match kind {
					EventKind::Read | EventKind::Write => {
						// Edge-triggered: one event may stand for many connections.
						// Stop draining once shutdown wins the wait for a slot;
						// what is left stays queued in the backlog.
						while let Some((socket, addr)) = accept(listener)? {
							if !self.hand_off(socket, addr, handler, workers, stats)? {
								break;
							}
						}
						Ok(())
					}
					other => {
						tracing::warn!(fd, kind = ?other, "unexpected event on listener");
						Ok(())
					}
				}
			})?;
		}
		Ok(())
	}

	/// Spawns a worker for one accepted connection.
	///
	/// Returns `false` if shutdown fired while waiting for a free slot; the
	/// connection is closed unhandled.
	fn hand_off<F>(
		&self,
		socket: Socket,
		addr: Address,
		handler: &Arc<F>,
		workers: &mut WorkerGroup,
		stats: &mut DispatchStats,
	) -> crate::Result<bool>
	where
		F: Fn(Socket, Address, &Mutex) -> HandlerResult + Send + Sync + 'static,
	{
		let peer = format!("{addr:?}");
		tracing::trace!(%peer, fd = socket.raw(), "accepted");

		let handler = Arc::clone(handler);
		let io_lock = Arc::clone(&self.io_lock);
		let job = move || (*handler)(socket, addr, io_lock.as_ref());

		let spawned = workers.spawn(peer, &self.shutdown, self.config.tick(), job)?;
		if spawned {
			stats.accepted += 1;
		}
		Ok(spawned)
	}
}

/// One `accept()` on `listener`.
///
/// `Ok(None)` means "nothing to hand out right now": the queue is empty on a
/// non-blocking listener, or the pending connection died (`ECONNRESET`,
/// `EPIPE`, `ECONNABORTED`) before we got to it. `EINTR` is retried.
fn accept(listener: &Socket) -> Result<Option<(Socket, Address)>, SocketError> {
	use std::os::fd::{FromRawFd, OwnedFd};

	loop {
		let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
		let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

		let fd = unsafe {
			libc::accept4(
				listener.raw(),
				&mut storage as *mut _ as *mut libc::sockaddr,
				&mut len,
				libc::SOCK_CLOEXEC,
			)
		};

		if fd == -1 {
			let e = errno();
			if e == libc::EINTR {
				continue;
			}
			if is_ignored_error(e) || e == libc::ECONNABORTED {
				if e != libc::EAGAIN && e != libc::EWOULDBLOCK {
					tracing::warn!(errno = e, "pending connection dropped before accept");
				}
				return Ok(None);
			}
			tracing::error!(errno = e, fd = listener.raw(), "accept failed");
			return Err(SocketError::Accept { errno: e });
		}

		let socket = Socket::from_fd(unsafe { OwnedFd::from_raw_fd(fd) });
		let addr = Address::from_storage(&storage, len).unwrap_or_default();
		return Ok(Some((socket, addr)));
	}
}

/*
 ---
  The three loops side by side:
  ┌──────────────┬──────────────────────┬──────────────────┬──────────────────────┐
  │   Strategy   │ Waits on             │ Handler runs on  │ Handler error        │
  ├──────────────┼──────────────────────┼──────────────────┼──────────────────────┤
  │ accept_block │ poll(listener)       │ acceptor thread  │ ends the loop        │
  ├──────────────┼──────────────────────┼──────────────────┼──────────────────────┤
  │ accept_async │ poll(listener)       │ worker thread    │ logged + counted     │
  ├──────────────┼──────────────────────┼──────────────────┼──────────────────────┤
  │ accept_epoll │ Reactor::wait (ET)   │ worker thread    │ logged + counted     │
  └──────────────┴──────────────────────┴──────────────────┴──────────────────────┘
  All three re-check the shutdown token at least every poll_interval.
  ---
*/
