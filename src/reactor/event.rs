/// What a ready descriptor is reported as.
///
/// A descriptor can signal several conditions at once; `classify` picks the
/// single most actionable one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
	Read,
	Write,
	Close,
	Error,
	Unknown,
}

/// Interest mask used for every registration: everything, edge-triggered.
pub(crate) const INTEREST: u32 = (libc::EPOLLIN
	| libc::EPOLLOUT
	| libc::EPOLLPRI
	| libc::EPOLLERR
	| libc::EPOLLHUP
	| libc::EPOLLRDHUP
	| libc::EPOLLET) as u32;

const READ_FAMILY: u32 = (libc::EPOLLIN | libc::EPOLLPRI | libc::EPOLLRDNORM | libc::EPOLLRDBAND) as u32;
const WRITE_FAMILY: u32 = (libc::EPOLLOUT | libc::EPOLLWRNORM | libc::EPOLLWRBAND) as u32;
const HANGUP_FAMILY: u32 = (libc::EPOLLHUP | libc::EPOLLRDHUP) as u32;

impl EventKind {
	/// Classifies an `epoll_event.events` mask.
	///
	/// Precedence is fixed: Error, then Read, then Write, then Close.
	/// A socket that is readable and half-closed by the peer is `Read`,
	/// so buffered data is drained before the close is seen.
	pub fn classify(events: u32) -> Self {
		if events & libc::EPOLLERR as u32 != 0 {
			EventKind::Error
		} else if events & READ_FAMILY != 0 {
			EventKind::Read
		} else if events & WRITE_FAMILY != 0 {
			EventKind::Write
		} else if events & HANGUP_FAMILY != 0 {
			EventKind::Close
		} else {
			EventKind::Unknown
		}
	}
}

/*
 ---
  Precedence:
  ┌──────┬───────────────────────────────────┬──────────┐
  │ Rank │ Bits                              │ Kind     │
  ├──────┼───────────────────────────────────┼──────────┤
  │ 1    │ EPOLLERR                          │ Error    │
  ├──────┼───────────────────────────────────┼──────────┤
  │ 2    │ EPOLLIN PRI RDNORM RDBAND         │ Read     │
  ├──────┼───────────────────────────────────┼──────────┤
  │ 3    │ EPOLLOUT WRNORM WRBAND            │ Write    │
  ├──────┼───────────────────────────────────┼──────────┤
  │ 4    │ EPOLLHUP RDHUP                    │ Close    │
  ├──────┼───────────────────────────────────┼──────────┤
  │ 5    │ anything else                     │ Unknown  │
  └──────┴───────────────────────────────────┴──────────┘
  ---
*/
