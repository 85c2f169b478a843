mod io;
mod options;

pub use self::io::READ_CHUNK;
pub use self::options::{ignore_sigpipe, set_nonblocking, set_reuse_addr};

use crate::addr::Address;
use crate::error::{SocketError, errno};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};

/// An owned socket descriptor.
///
/// Holds at most one open descriptor and closes it on drop.
/// Move-only: there is no `Clone`. To let someone else use the descriptor,
/// lend them `&Socket` (or `as_fd()`), never a second owner.
///
/// An empty socket reports `-1` from `raw()`; syscalls made through it fail
/// with `EBADF`.
#[derive(Debug, Default)]
pub struct Socket {
	fd: Option<OwnedFd>,
}

impl Socket {
	/// A socket that owns nothing.
	pub const fn empty() -> Self {
		Self { fd: None }
	}

	/// Creates a new socket.
	///
	/// Calls `socket(domain, ty | SOCK_CLOEXEC, protocol)`.
	pub fn new(domain: libc::c_int, ty: libc::c_int, protocol: libc::c_int) -> Result<Self, SocketError> {
		let fd = unsafe {
			libc::socket(domain, ty | libc::SOCK_CLOEXEC, protocol)
		};
		if fd < 0 {
			return Err(SocketError::Create { errno: errno() });
		}
		Ok(Self::from_fd(unsafe { OwnedFd::from_raw_fd(fd) }))
	}

	/// Creates a connected pair of Unix stream sockets.
	pub fn pair() -> Result<(Self, Self), SocketError> {
		let mut fds = [-1 as libc::c_int; 2];
		let result = unsafe {
			libc::socketpair(
				libc::AF_UNIX,
				libc::SOCK_STREAM | libc::SOCK_CLOEXEC,
				0,
				fds.as_mut_ptr(),
			)
		};
		if result == -1 {
			return Err(SocketError::Create { errno: errno() });
		}
		let (a, b) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
		Ok((Self::from_fd(a), Self::from_fd(b)))
	}

	pub(crate) fn from_fd(fd: OwnedFd) -> Self {
		Self { fd: Some(fd) }
	}

	/// Returns the raw descriptor, or `-1` if empty.
	#[inline]
	pub fn raw(&self) -> RawFd {
		self.fd.as_ref().map_or(-1, |fd| fd.as_raw_fd())
	}

	/// Borrows the descriptor, or None if empty.
	pub fn as_fd(&self) -> Option<BorrowedFd<'_>> {
		self.fd.as_ref().map(AsFd::as_fd)
	}

	/// True while a descriptor is owned.
	pub fn is_open(&self) -> bool {
		self.fd.is_some()
	}

	/// Closes the descriptor. Calling it again is a no-op.
	pub fn close(&mut self) {
		drop(self.fd.take());
	}

	/// Enables `SO_REUSEADDR`.
	pub fn set_reuse_address(&self) -> Result<(), SocketError> {
		set_reuse_addr(self, true)
	}

	/// Sets or clears `O_NONBLOCK`.
	pub fn set_nonblocking(&self, nonblocking: bool) -> Result<(), SocketError> {
		set_nonblocking(self, nonblocking)
	}

	/// Returns the local address the kernel bound this socket to.
	pub fn local_address(&self) -> Result<Address, SocketError> {
		options::local_address(self)
	}

	/// Waits up to `timeout` for the socket to become readable
	/// (or, for a listener, for a connection to be pending).
	///
	/// An interrupted wait reports "not ready".
	pub fn poll_readable(&self, timeout: std::time::Duration) -> Result<bool, crate::error::IoError> {
		options::poll_readable(self, timeout)
	}
}

impl AsRawFd for Socket {
	fn as_raw_fd(&self) -> RawFd {
		self.raw()
	}
}

impl FromRawFd for Socket {
	/// Takes ownership of `fd`. A negative value yields an empty socket.
	unsafe fn from_raw_fd(fd: RawFd) -> Self {
		if fd < 0 {
			return Self::empty();
		}
		unsafe { Self::from_fd(OwnedFd::from_raw_fd(fd)) }
	}
}

impl IntoRawFd for Socket {
	/// Releases ownership; an empty socket yields `-1`.
	fn into_raw_fd(mut self) -> RawFd {
		self.fd.take().map_or(-1, IntoRawFd::into_raw_fd)
	}
}

impl From<OwnedFd> for Socket {
	fn from(fd: OwnedFd) -> Self {
		Self::from_fd(fd)
	}
}

impl std::fmt::Display for Socket {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.raw())
	}
}

/*
 ---
  Ownership at a glance:
  ┌────────────────────────┬────────────────────────────────────┐
  │        Operation       │            Descriptor              │
  ├────────────────────────┼────────────────────────────────────┤
  │ let b = a;             │ moves; `a` is gone                 │
  ├────────────────────────┼────────────────────────────────────┤
  │ f(&a)                  │ borrowed; `a` still owns it        │
  ├────────────────────────┼────────────────────────────────────┤
  │ a.close()              │ closed, `a.raw() == -1`            │
  ├────────────────────────┼────────────────────────────────────┤
  │ drop(a)                │ closed                             │
  └────────────────────────┴────────────────────────────────────┘
  ---
*/

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn close_is_idempotent() {
		let mut sock = Socket::new(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();
		assert!(sock.raw() >= 0);
		sock.close();
		assert_eq!(sock.raw(), -1);
		sock.close();
		assert!(!sock.is_open());
	}

	#[test]
	fn negative_raw_fd_is_empty() {
		let sock = unsafe { Socket::from_raw_fd(-1) };
		assert!(!sock.is_open());
		assert_eq!(sock.into_raw_fd(), -1);
	}

	#[test]
	fn move_transfers_the_descriptor() {
		let a = Socket::new(libc::AF_INET, libc::SOCK_STREAM, 0).unwrap();
		let fd = a.raw();
		let b = a;
		assert_eq!(b.raw(), fd);
		assert_eq!(b.to_string(), fd.to_string());
	}
}
