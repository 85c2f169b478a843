//! Bound, listening TCP endpoint and its accept loops.
//!
//! `bind()` then `listen()`, once each and in that order, then one of:
//! - `accept_block`: handler runs on the accepting thread
//! - `accept_async`: one worker thread per connection
//! - `accept_epoll`: non-blocking listener driven by a `Reactor`,
//!   one worker thread per connection

mod config;
mod dispatch;
mod shutdown;
mod workers;

pub use self::config::{MIN_POLL_INTERVAL, ServerConfig};
pub use self::shutdown::Shutdown;

use std::sync::Arc;
use crate::addr::{Address, ConnectionInfo};
use crate::error::{BoxError, SocketError, errno};
use crate::socket::Socket;
use crate::sync::Mutex;

/// What a connection handler returns.
pub type HandlerResult = Result<(), BoxError>;

/// Counters returned by an accept loop when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
	/// Connections accepted and handed to the handler.
	pub accepted: u64,
	/// Handler invocations that returned `Ok`.
	pub completed: u64,
	/// Handler invocations that returned `Err` or panicked (threaded
	/// strategies only; in `accept_block` an error ends the loop instead).
	pub failed: u64,
}

struct Endpoint {
	info: ConnectionInfo,
	addr: Address,
	socket: Socket,
}

/// A listening socket plus the state its handlers share.
///
/// ```ignore
/// let mut server = Server::new();
/// server.bind("tcp::8080")?.listen()?;
/// server.accept_async(|sock, addr, lock| {
///     let request = sock.read()?;
///     let _guard = lock.lock();
///     sock.write(&request)?;
///     Ok(())
/// })?;
/// ```
pub struct Server {
	config: ServerConfig,
	endpoint: Option<Endpoint>,
	listening: bool,
	io_lock: Arc<Mutex>,
	shutdown: Shutdown,
}

impl Default for Server {
	fn default() -> Self {
		Self::new()
	}
}

impl Server {
	pub fn new() -> Self {
		Self::with_config(ServerConfig::default())
	}

	pub fn with_config(config: ServerConfig) -> Self {
		Self {
			config,
			endpoint: None,
			listening: false,
			io_lock: Arc::new(Mutex::new()),
			shutdown: Shutdown::new(),
		}
	}

	/// Parses `conn`, creates the socket, enables `SO_REUSEADDR` and binds.
	///
	/// Can be called once per server.
	pub fn bind(&mut self, conn: &str) -> crate::Result<&mut Self> {
		if self.endpoint.is_some() {
			return Err(SocketError::AlreadyBound.into());
		}

		let info = ConnectionInfo::parse_with(conn, self.config.port_policy)?;
		let addr = info.address();
		let socket = Socket::new(info.family(), info.protocol().sock_type(), info.protocol().raw())?;
		socket.set_reuse_address()?;

		let result = unsafe { libc::bind(socket.raw(), addr.as_ptr(), addr.size()) };
		if result == -1 {
			return Err(SocketError::Bind { errno: errno(), addr: format!("{addr:?}") }.into());
		}

		tracing::debug!(%info, fd = socket.raw(), "bound");
		self.endpoint = Some(Endpoint { info, addr, socket });
		Ok(self)
	}

	/// Marks the bound socket passive with the configured backlog.
	///
	/// Can be called once, after `bind()`.
	pub fn listen(&mut self) -> crate::Result<&mut Self> {
		let backlog = self.config.backlog;
		let endpoint = self.endpoint.as_ref().ok_or(SocketError::NotBound)?;
		if self.listening {
			return Err(SocketError::AlreadyListening.into());
		}

		let result = unsafe { libc::listen(endpoint.socket.raw(), backlog) };
		if result == -1 {
			return Err(SocketError::Listen { errno: errno(), backlog }.into());
		}

		tracing::debug!(addr = ?endpoint.addr, backlog, "listening");
		self.listening = true;
		Ok(self)
	}

	/// The parsed connection string, once bound.
	pub fn connection_info(&self) -> Option<&ConnectionInfo> {
		self.endpoint.as_ref().map(|e| &e.info)
	}

	/// The address passed to `bind()`, once bound.
	pub fn bind_address(&self) -> Option<Address> {
		self.endpoint.as_ref().map(|e| e.addr)
	}

	/// The address the kernel actually bound (resolves port `0`).
	pub fn local_address(&self) -> Result<Address, SocketError> {
		self.endpoint.as_ref().ok_or(SocketError::NotBound)?.socket.local_address()
	}

	/// The lock passed to every handler.
	pub fn io_lock(&self) -> &Mutex {
		&self.io_lock
	}

	/// A token that stops this server's accept loop when cancelled.
	pub fn shutdown_handle(&self) -> Shutdown {
		self.shutdown.clone()
	}

	pub fn is_listening(&self) -> bool {
		self.listening
	}

	pub fn config(&self) -> &ServerConfig {
		&self.config
	}

	/// The listening socket, or `NotListening` if dispatch came too early.
	fn listener(&self) -> Result<&Socket, SocketError> {
		match &self.endpoint {
			Some(endpoint) if self.listening => Ok(&endpoint.socket),
			_ => Err(SocketError::NotListening),
		}
	}
}

impl std::fmt::Debug for Server {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Server")
			.field("config", &self.config)
			.field("endpoint", &self.endpoint.as_ref().map(|e| e.info))
			.field("listening", &self.listening)
			.field("cancelled", &self.shutdown.is_cancelled())
			.finish()
	}
}
