use std::os::fd::AsRawFd;
use std::time::Duration;
use crate::addr::Address;
use crate::error::{IoError, SocketError, errno};

/// Sets SO_REUSEADDR on a socket.
///
/// Allows binding to an address that's in TIME_WAIT state.
/// Essential for server restarts.
pub fn set_reuse_addr<S: AsRawFd>(socket: &S, enable: bool) -> Result<(), SocketError> {
	let val: libc::c_int = if enable { 1 } else { 0 };
	let result = unsafe {
		libc::setsockopt(
			socket.as_raw_fd(),
			libc::SOL_SOCKET,
			libc::SO_REUSEADDR,
			&val as *const _ as *const libc::c_void,
			std::mem::size_of::<libc::c_int>() as libc::socklen_t,
		)
	};
	if result == -1 {
		Err(SocketError::SetOption { errno: errno(), option: "SO_REUSEADDR" })
	} else {
		Ok(())
	}
}

/// Sets or clears the `O_NONBLOCK` flag.
///
/// Required before registering a listener with the reactor.
pub fn set_nonblocking<S: AsRawFd>(socket: &S, nonblocking: bool) -> Result<(), SocketError> {
	let flags = unsafe { libc::fcntl(socket.as_raw_fd(), libc::F_GETFL) };
	if flags == -1 {
		return Err(SocketError::GetOption { errno: errno(), option: "F_GETFL" });
	}
	let new_flags = if nonblocking {
		flags | libc::O_NONBLOCK
	} else {
		flags & !libc::O_NONBLOCK
	};
	let result = unsafe { libc::fcntl(socket.as_raw_fd(), libc::F_SETFL, new_flags) };
	if result == -1 {
		return Err(SocketError::SetOption { errno: errno(), option: "O_NONBLOCK" });
	}
	Ok(())
}

/// Ignores SIGPIPE for the whole process.
///
/// `write()` already sends with `MSG_NOSIGNAL`, but `sendfile()` has no such
/// flag. Rust binaries start with SIGPIPE ignored; call this when embedding
/// the crate in a host that does not.
pub fn ignore_sigpipe() {
	unsafe {
		libc::signal(libc::SIGPIPE, libc::SIG_IGN);
	}
}

pub(super) fn local_address<S: AsRawFd>(socket: &S) -> Result<Address, SocketError> {
	let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
	let mut len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;

	let result = unsafe {
		libc::getsockname(
			socket.as_raw_fd(),
			&mut storage as *mut _ as *mut libc::sockaddr,
			&mut len,
		)
	};
	if result == -1 {
		return Err(SocketError::GetOption { errno: errno(), option: "getsockname" });
	}

	Address::from_storage(&storage, len).ok_or(SocketError::InvalidAddress { reason: "not an IPv4 socket" })
}

pub(super) fn poll_readable<S: AsRawFd>(socket: &S, timeout: Duration) -> Result<bool, IoError> {
	let mut pfd = libc::pollfd {
		fd: socket.as_raw_fd(),
		events: libc::POLLIN,
		revents: 0,
	};
	let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;

	let n = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
	if n == -1 {
		let e = errno();
		if e == libc::EINTR {
			return Ok(false);
		}
		return Err(IoError::Poll { errno: e });
	}
	// POLLERR/POLLHUP also count: the following accept()/recv() reports them.
	Ok(n > 0 && pfd.revents != 0)
}
