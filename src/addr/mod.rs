//! Socket addresses and connection strings.
//!
//! - `Address`: an IPv4 `sockaddr_in` buffer handed to and filled by syscalls
//! - `ConnectionInfo`: a parsed `protocol:host:port` string

mod conn;

pub use self::conn::{ConnectionInfo, PortPolicy, Protocol};

use crate::error::SocketError;
use std::net::Ipv4Addr;

/// An IPv4 socket address (family + port + packed address).
///
/// Owns the raw buffer the kernel reads on `bind()`/`connect()` and writes on
/// `accept()`/`getsockname()`. The buffer is zeroed before any field is set,
/// so the padding bytes never carry garbage into a syscall.
///
/// There is no `PartialEq`: compare addresses through `to_string()`.
#[derive(Clone, Copy)]
pub struct Address {
	raw: libc::sockaddr_in,
}

impl Address {
	/// Creates an address from its components.
	///
	/// `ip` is in network order (`[127, 0, 0, 1]`), `port` in host order.
	pub fn new(family: libc::c_int, ip: [u8; 4], port: u16) -> Self {
		let mut raw: libc::sockaddr_in = unsafe { std::mem::zeroed() };
		raw.sin_family = family as libc::sa_family_t;
		raw.sin_port = port.to_be();
		raw.sin_addr = libc::in_addr {
			s_addr: u32::from_be_bytes(ip).to_be(),
		};
		Self { raw }
	}

	/// Parses a dotted-quad IPv4 address.
	///
	/// Invalid text is an error, never a silent `0.0.0.0`.
	pub fn parse(ip: &str, port: u16) -> Result<Self, SocketError> {
		let parsed: Ipv4Addr = ip.parse().map_err(|_| SocketError::InvalidAddress {
			reason: "not a dotted-quad IPv4 address",
		})?;
		Ok(Self::new(libc::AF_INET, parsed.octets(), port))
	}

	/// Copies an address the kernel wrote into a `sockaddr_storage`.
	///
	/// Returns None if the kernel reported something other than IPv4.
	pub(crate) fn from_storage(storage: &libc::sockaddr_storage, len: libc::socklen_t) -> Option<Self> {
		if len < std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t
			|| storage.ss_family != libc::AF_INET as libc::sa_family_t
		{
			return None;
		}
		let raw = unsafe { *(storage as *const _ as *const libc::sockaddr_in) };
		Some(Self { raw })
	}

	/// Returns the address family (`AF_INET`, or 0 for a default address).
	pub fn family(&self) -> libc::c_int {
		self.raw.sin_family as libc::c_int
	}

	/// Returns the IP bytes in network order.
	pub fn ip(&self) -> [u8; 4] {
		self.raw.sin_addr.s_addr.to_ne_bytes()
	}

	/// Returns the port in host order.
	pub fn port(&self) -> u16 {
		u16::from_be(self.raw.sin_port)
	}

	/// Length of the raw buffer, for syscalls taking an address length.
	pub fn size(&self) -> libc::socklen_t {
		std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t
	}

	/// Pointer to the raw buffer, valid for `self.size()` bytes.
	pub(crate) fn as_ptr(&self) -> *const libc::sockaddr {
		&self.raw as *const _ as *const libc::sockaddr
	}
}

impl Default for Address {
	fn default() -> Self {
		Self { raw: unsafe { std::mem::zeroed() } }
	}
}

impl std::fmt::Display for Address {
	/// Renders the numeric host only (no port). Anything that is not an
	/// `AF_INET` address renders as `unknown`.
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		if self.family() != libc::AF_INET {
			return f.write_str("unknown");
		}
		write!(f, "{}", Ipv4Addr::from(self.ip()))
	}
}

impl std::fmt::Debug for Address {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}:{}", self, self.port())
	}
}

/*
 ---
  Byte order, once:
  ┌──────────────┬───────────────────┬──────────────────────────────┐
  │    Field     │ Stored as         │ Accessor returns             │
  ├──────────────┼───────────────────┼──────────────────────────────┤
  │ sin_port     │ big-endian u16    │ host-order u16               │
  ├──────────────┼───────────────────┼──────────────────────────────┤
  │ sin_addr     │ bytes in wire     │ [u8; 4] in wire order        │
  │              │ order (u32 blob)  │ (127.0.0.1 → [127, 0, 0, 1]) │
  └──────────────┴───────────────────┴──────────────────────────────┘
  ---
*/

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn components_survive_the_raw_buffer() {
		let addr = Address::new(libc::AF_INET, [10, 1, 2, 3], 8080);
		assert_eq!(addr.ip(), [10, 1, 2, 3]);
		assert_eq!(addr.port(), 8080);
		assert_eq!(addr.family(), libc::AF_INET);
		assert_eq!(format!("{addr:?}"), "10.1.2.3:8080");
	}

	#[test]
	fn foreign_family_renders_unknown() {
		let addr = Address::new(libc::AF_INET6, [10, 1, 2, 3], 80);
		assert_eq!(addr.to_string(), "unknown");
		assert_eq!(format!("{addr:?}"), "unknown:80");
	}

	#[test]
	fn storage_of_another_family_is_rejected() {
		let mut storage: libc::sockaddr_storage = unsafe { std::mem::zeroed() };
		storage.ss_family = libc::AF_INET6 as libc::sa_family_t;
		let len = std::mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
		assert!(Address::from_storage(&storage, len).is_none());
	}
}
