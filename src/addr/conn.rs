use super::Address;
use crate::error::ParseError;
use std::ffi::{CStr, CString};

/// Transport named by the first field of a connection string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
	Tcp,
	Udp,
}

impl Protocol {
	/// Returns the `socket()` type constant.
	pub fn sock_type(self) -> libc::c_int {
		match self {
			Protocol::Tcp => libc::SOCK_STREAM,
			Protocol::Udp => libc::SOCK_DGRAM,
		}
	}

	/// Returns the IP protocol number.
	pub fn raw(self) -> libc::c_int {
		match self {
			Protocol::Tcp => libc::IPPROTO_TCP,
			Protocol::Udp => libc::IPPROTO_UDP,
		}
	}
}

/// Whether port `0` (kernel-assigned) is acceptable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PortPolicy {
	/// Port must be in `1..=65535`.
	#[default]
	Strict,
	/// Port `0` is also accepted and lets the kernel pick one.
	AllowEphemeral,
}

/// A parsed `protocol:host:port` connection string.
///
/// Always IPv4. An empty host means `INADDR_ANY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
	protocol: Protocol,
	ip: [u8; 4],
	port: u16,
}

impl ConnectionInfo {
	/// Parses a connection string, rejecting port `0`.
	///
	/// ```ignore
	/// let info = ConnectionInfo::parse("tcp::8080")?;
	/// assert_eq!(info.ip(), [0, 0, 0, 0]);
	/// ```
	pub fn parse(conn: &str) -> Result<Self, ParseError> {
		Self::parse_with(conn, PortPolicy::Strict)
	}

	/// Parses a connection string under the given port policy.
	///
	/// Host names go through `getaddrinfo()` and the first IPv4 result wins.
	pub fn parse_with(conn: &str, policy: PortPolicy) -> Result<Self, ParseError> {
		let parts: Vec<&str> = conn.split(':').collect();
		if conn.is_empty() || parts.len() > 3 {
			return Err(ParseError::InvalidConnectionString { input: conn.to_owned() });
		}

		let protocol = match parts[0] {
			"tcp" => Protocol::Tcp,
			"udp" => Protocol::Udp,
			other => return Err(ParseError::InvalidProtocol { protocol: other.to_owned() }),
		};

		let ip = match parts.get(1).copied() {
			None | Some("") => [0, 0, 0, 0],
			Some(host) => resolve_first(host)?,
		};

		let port_text = parts.get(2).copied().unwrap_or("");
		let port = parse_port(port_text, policy)?;

		Ok(Self { protocol, ip, port })
	}

	pub fn protocol(&self) -> Protocol {
		self.protocol
	}

	/// Always `AF_INET`.
	pub fn family(&self) -> libc::c_int {
		libc::AF_INET
	}

	pub fn ip(&self) -> [u8; 4] {
		self.ip
	}

	pub fn port(&self) -> u16 {
		self.port
	}

	/// The address to `bind()`/`connect()` to.
	pub fn address(&self) -> Address {
		Address::new(self.family(), self.ip, self.port)
	}
}

impl std::fmt::Display for ConnectionInfo {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let proto = match self.protocol {
			Protocol::Tcp => "tcp",
			Protocol::Udp => "udp",
		};
		let [a, b, c, d] = self.ip;
		write!(f, "{proto}:{a}.{b}.{c}.{d}:{}", self.port)
	}
}

fn parse_port(text: &str, policy: PortPolicy) -> Result<u16, ParseError> {
	let invalid = || ParseError::InvalidPort { port: text.to_owned() };
	// u16::from_str takes a leading '+'; a port is digits only.
	if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
		return Err(invalid());
	}
	let port: u16 = text.parse().map_err(|_| invalid())?;
	if port == 0 && policy == PortPolicy::Strict {
		return Err(invalid());
	}
	Ok(port)
}

/// `addrinfo` list freed on every exit path.
struct AddrInfoList(*mut libc::addrinfo);

impl Drop for AddrInfoList {
	fn drop(&mut self) {
		if !self.0.is_null() {
			unsafe { libc::freeaddrinfo(self.0) };
		}
	}
}

/// Resolves `host` and returns the first IPv4 address in resolver order.
fn resolve_first(host: &str) -> Result<[u8; 4], ParseError> {
	let invalid = |reason: String| ParseError::InvalidHost { host: host.to_owned(), reason };
	let node = CString::new(host).map_err(|_| invalid("contains a NUL byte".into()))?;

	let mut hints: libc::addrinfo = unsafe { std::mem::zeroed() };
	hints.ai_family = libc::AF_INET;

	let mut list = AddrInfoList(std::ptr::null_mut());
	let rc = unsafe { libc::getaddrinfo(node.as_ptr(), std::ptr::null(), &hints, &mut list.0) };
	if rc != 0 {
		let reason = unsafe { CStr::from_ptr(libc::gai_strerror(rc)) };
		return Err(invalid(reason.to_string_lossy().into_owned()));
	}

	// First entry only, resolver order is kept as-is.
	let first = unsafe { list.0.as_ref() }.ok_or_else(|| invalid("no addresses".into()))?;
	if first.ai_addr.is_null() || first.ai_family != libc::AF_INET {
		return Err(invalid("no IPv4 address".into()));
	}
	let sin = unsafe { &*(first.ai_addr as *const libc::sockaddr_in) };
	Ok(sin.sin_addr.s_addr.to_ne_bytes())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_fields_fall_back_to_any_host_but_not_to_a_port() {
		assert!(matches!(
			ConnectionInfo::parse("tcp"),
			Err(ParseError::InvalidPort { .. })
		));
		assert!(matches!(
			ConnectionInfo::parse("udp:"),
			Err(ParseError::InvalidPort { .. })
		));
	}

	#[test]
	fn display_is_a_connection_string() {
		let info = ConnectionInfo::parse("udp:127.0.0.1:53").unwrap();
		assert_eq!(info.to_string(), "udp:127.0.0.1:53");
		assert_eq!(ConnectionInfo::parse(&info.to_string()).unwrap(), info);
	}

	#[test]
	fn protocol_constants() {
		assert_eq!(Protocol::Tcp.sock_type(), libc::SOCK_STREAM);
		assert_eq!(Protocol::Udp.raw(), libc::IPPROTO_UDP);
	}
}
