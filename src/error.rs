use std::path::PathBuf;

/// Boxed error returned by connection handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Crate-wide result type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Socket creation/configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    #[error("socket() failed: {}", errno_to_str(*.errno))]
    Create { errno: i32 },

    #[error("bind({addr}) failed: {}", errno_to_str(*.errno))]
    Bind { errno: i32, addr: String },

    #[error("listen(backlog={backlog}) failed: {}", errno_to_str(*.errno))]
    Listen { errno: i32, backlog: i32 },

    #[error("connect({addr}) failed: {}", errno_to_str(*.errno))]
    Connect { errno: i32, addr: String },

    #[error("accept() failed: {}", errno_to_str(*.errno))]
    Accept { errno: i32 },

    #[error("setsockopt({option}) failed: {}", errno_to_str(*.errno))]
    SetOption { errno: i32, option: &'static str },

    #[error("getsockopt({option}) failed: {}", errno_to_str(*.errno))]
    GetOption { errno: i32, option: &'static str },

    #[error("reactor registration of fd {fd} failed: {}", errno_to_str(*.errno))]
    Registration { errno: i32, fd: i32 },

    #[error("epoll_wait() failed: {}", errno_to_str(*.errno))]
    Wait { errno: i32 },

    #[error("invalid address: {reason}")]
    InvalidAddress { reason: &'static str },

    #[error("server is not bound")]
    NotBound,

    #[error("server is already bound")]
    AlreadyBound,

    #[error("server is already listening")]
    AlreadyListening,

    #[error("server is not listening")]
    NotListening,
}

/// I/O operation errors.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("recv() failed: {}", errno_to_str(*.errno))]
    Read { errno: i32 },

    #[error("send() failed: {}", errno_to_str(*.errno))]
    Write { errno: i32 },

    #[error("sendfile() failed: {}", errno_to_str(*.errno))]
    SendFile { errno: i32 },

    #[error("poll() failed: {}", errno_to_str(*.errno))]
    Poll { errno: i32 },

    #[error("file {}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn worker thread")]
    Spawn(#[source] std::io::Error),
}

/// Connection string errors.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("invalid connection string {input:?}: expected protocol:host:port")]
    InvalidConnectionString { input: String },

    #[error("invalid protocol {protocol:?}: expected tcp or udp")]
    InvalidProtocol { protocol: String },

    #[error("invalid host {host:?}: {reason}")]
    InvalidHost { host: String, reason: String },

    #[error("invalid port {port:?}")]
    InvalidPort { port: String },
}

/// Any failure surfaced by this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Socket(#[from] SocketError),

    #[error(transparent)]
    Io(#[from] IoError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("connection handler failed")]
    Handler(#[source] BoxError),
}

/// Returns current errno value.
#[inline]
pub fn errno() -> i32 {
    unsafe { *libc::__errno_location() }
}

/// Errors that end a read/write as a clean short result instead of failing.
///
/// The peer going away (`EPIPE`, `ECONNRESET`) or a non-blocking socket
/// running dry (`EAGAIN`) are treated as end-of-stream.
#[inline]
pub fn is_ignored_error(errno: i32) -> bool {
    errno == libc::EPIPE
        || errno == libc::ECONNRESET
        || errno == libc::EAGAIN
        || errno == libc::EWOULDBLOCK
}

/// Converts errno to human-readable string.
fn errno_to_str(errno: i32) -> String {
    match errno {
        libc::EACCES => "permission denied".into(),
        libc::EADDRINUSE => "address already in use".into(),
        libc::EADDRNOTAVAIL => "address not available".into(),
        libc::EAFNOSUPPORT => "address family not supported".into(),
        libc::EAGAIN => "resource temporarily unavailable".into(),
        libc::EBADF => "bad file descriptor".into(),
        libc::ECONNABORTED => "connection aborted".into(),
        libc::ECONNREFUSED => "connection refused".into(),
        libc::ECONNRESET => "connection reset by peer".into(),
        libc::EEXIST => "already registered".into(),
        libc::EINPROGRESS => "operation in progress".into(),
        libc::EINTR => "interrupted by signal".into(),
        libc::EINVAL => "invalid argument".into(),
        libc::EMFILE => "too many open files".into(),
        libc::ENETUNREACH => "network unreachable".into(),
        libc::ENOBUFS => "no buffer space available".into(),
        libc::ENOENT => "not registered".into(),
        libc::ENOTCONN => "not connected".into(),
        libc::EOPNOTSUPP => "operation not supported".into(),
        libc::EPIPE => "broken pipe".into(),
        libc::ETIMEDOUT => "connection timed out".into(),
        _ => format!("errno {}", errno),
    }
}

/// Maps errno to std::io::ErrorKind.
fn errno_to_kind(errno: i32) -> std::io::ErrorKind {
    match errno {
        libc::EACCES | libc::EPERM => std::io::ErrorKind::PermissionDenied,
        libc::EADDRINUSE => std::io::ErrorKind::AddrInUse,
        libc::EADDRNOTAVAIL => std::io::ErrorKind::AddrNotAvailable,
        libc::EAGAIN => std::io::ErrorKind::WouldBlock,
        libc::ECONNREFUSED => std::io::ErrorKind::ConnectionRefused,
        libc::ECONNRESET => std::io::ErrorKind::ConnectionReset,
        libc::EEXIST => std::io::ErrorKind::AlreadyExists,
        libc::EINTR => std::io::ErrorKind::Interrupted,
        libc::EINVAL => std::io::ErrorKind::InvalidInput,
        libc::ENOENT => std::io::ErrorKind::NotFound,
        libc::ENOTCONN => std::io::ErrorKind::NotConnected,
        libc::EPIPE => std::io::ErrorKind::BrokenPipe,
        libc::ETIMEDOUT => std::io::ErrorKind::TimedOut,
        _ => std::io::ErrorKind::Other,
    }
}

impl From<SocketError> for std::io::Error {
    fn from(err: SocketError) -> Self {
        let errno = match &err {
            SocketError::Create { errno } => *errno,
            SocketError::Bind { errno, .. } => *errno,
            SocketError::Listen { errno, .. } => *errno,
            SocketError::Connect { errno, .. } => *errno,
            SocketError::Accept { errno } => *errno,
            SocketError::SetOption { errno, .. } => *errno,
            SocketError::GetOption { errno, .. } => *errno,
            SocketError::Registration { errno, .. } => *errno,
            SocketError::Wait { errno } => *errno,
            SocketError::InvalidAddress { .. } => libc::EINVAL,
            SocketError::NotBound | SocketError::NotListening => libc::ENOTCONN,
            SocketError::AlreadyBound | SocketError::AlreadyListening => libc::EINVAL,
        };
        std::io::Error::new(errno_to_kind(errno), err)
    }
}

impl From<IoError> for std::io::Error {
    fn from(err: IoError) -> Self {
        let kind = match &err {
            IoError::Read { errno }
            | IoError::Write { errno }
            | IoError::SendFile { errno }
            | IoError::Poll { errno } => errno_to_kind(*errno),
            IoError::File { source, .. } | IoError::Spawn(source) => source.kind(),
        };
        std::io::Error::new(kind, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignored_set_is_exactly_pipe_reset_and_would_block() {
        assert!(is_ignored_error(libc::EPIPE));
        assert!(is_ignored_error(libc::ECONNRESET));
        assert!(is_ignored_error(libc::EAGAIN));
        assert!(is_ignored_error(libc::EWOULDBLOCK));
        assert!(!is_ignored_error(libc::EINTR));
        assert!(!is_ignored_error(libc::EBADF));
    }

    #[test]
    fn socket_errors_map_to_io_kinds() {
        let err: std::io::Error = SocketError::Registration { errno: libc::EEXIST, fd: 3 }.into();
        assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);

        let err: std::io::Error = IoError::Write { errno: libc::EPIPE }.into();
        assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
    }

    #[test]
    fn messages_name_the_errno() {
        let err = SocketError::Bind { errno: libc::EADDRINUSE, addr: "0.0.0.0:80".into() };
        assert_eq!(err.to_string(), "bind(0.0.0.0:80) failed: address already in use");
    }
}
