pub mod reactor;
pub mod server;
mod addr;
mod client;
mod error;
mod socket;
mod sync;

pub use self::error::{BoxError, Error, IoError, ParseError, Result, SocketError, errno, is_ignored_error};
pub use self::addr::{Address, ConnectionInfo, PortPolicy, Protocol};
pub use self::socket::{Socket, READ_CHUNK, ignore_sigpipe, set_nonblocking, set_reuse_addr};
pub use self::reactor::{EventKind, Reactor};
pub use self::server::{DispatchStats, HandlerResult, Server, ServerConfig, Shutdown};
pub use self::client::Client;
pub use self::sync::{Mutex, MutexGuard};
