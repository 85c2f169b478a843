use crate::addr::{Address, ConnectionInfo};
use crate::error::{SocketError, errno};
use crate::socket::Socket;

/// The connecting side: one socket per `connect()`.
///
/// ```ignore
/// let mut client = Client::new();
/// client.connect("tcp:127.0.0.1:8080")?;
/// client.socket().write(b"PING")?;
/// let reply = client.socket().read()?;
/// client.disconnect();
/// ```
#[derive(Debug, Default)]
pub struct Client {
	socket: Socket,
	peer: Option<Address>,
}

impl Client {
	pub fn new() -> Self {
		Self::default()
	}

	/// Connects to the endpoint named by `conn`.
	///
	/// An empty host connects to the local machine. A previous connection,
	/// if any, is closed first.
	pub fn connect(&mut self, conn: &str) -> crate::Result<&mut Self> {
		let info = ConnectionInfo::parse(conn)?;
		let addr = info.address();
		let socket = Socket::new(info.family(), info.protocol().sock_type(), info.protocol().raw())?;

		let result = unsafe { libc::connect(socket.raw(), addr.as_ptr(), addr.size()) };
		if result == -1 {
			return Err(SocketError::Connect { errno: errno(), addr: format!("{addr:?}") }.into());
		}

		tracing::debug!(peer = ?addr, fd = socket.raw(), "connected");
		self.disconnect();
		self.socket = socket;
		self.peer = Some(addr);
		Ok(self)
	}

	/// Closes the connection. Calling it again is a no-op.
	pub fn disconnect(&mut self) -> &mut Self {
		if self.socket.is_open() {
			tracing::debug!(fd = self.socket.raw(), "disconnecting");
		}
		self.socket.close();
		self.peer = None;
		self
	}

	pub fn is_connected(&self) -> bool {
		self.socket.is_open()
	}

	/// The connected socket (empty when disconnected).
	pub fn socket(&self) -> &Socket {
		&self.socket
	}

	/// The address passed to `connect()`.
	pub fn peer(&self) -> Option<Address> {
		self.peer
	}

	/// Hands the socket over, leaving the client disconnected.
	pub fn into_socket(self) -> Socket {
		self.socket
	}
}
