use std::time::{Duration, Instant};
use wiredispatch::{EventKind, Reactor, Socket, SocketError};

const SHORT: Duration = Duration::from_millis(200);

#[test]
fn empty_reactor_returns_immediately() {
	let mut reactor = Reactor::new().unwrap();
	let start = Instant::now();
	assert!(!reactor.wait(None).unwrap());
	assert!(start.elapsed() < Duration::from_millis(50));
	assert_eq!(reactor.dispatch(|_, _| panic!("no events expected")), 0);
}

#[test]
fn double_registration_fails_and_keeps_the_first() {
	let (a, _b) = Socket::pair().unwrap();
	let mut reactor = Reactor::new().unwrap();

	reactor.register(&a).unwrap();
	let err = reactor.register(&a).unwrap_err();
	assert!(matches!(err, SocketError::Registration { errno, fd } if errno == libc::EEXIST && fd == a.raw()));

	assert_eq!(reactor.len(), 1);
	assert!(reactor.is_registered(a.raw()));
}

#[test]
fn unregistering_an_unknown_socket_fails() {
	let (a, _b) = Socket::pair().unwrap();
	let mut reactor = Reactor::new().unwrap();

	let err = reactor.unregister(&a).unwrap_err();
	assert!(matches!(err, SocketError::Registration { errno, .. } if errno == libc::ENOENT));

	reactor.register(&a).unwrap().unregister(&a).unwrap();
	assert!(reactor.is_empty());
	assert!(!reactor.wait(Some(SHORT)).unwrap());
}

#[test]
fn fresh_socket_is_writable() {
	let (a, _b) = Socket::pair().unwrap();
	let mut reactor = Reactor::new().unwrap();
	reactor.register(&a).unwrap();

	assert!(reactor.wait(Some(SHORT)).unwrap());
	let mut seen = Vec::new();
	let handled = reactor.dispatch(|kind, fd| seen.push((kind, fd)));
	assert_eq!(handled, 1);
	assert_eq!(seen, vec![(EventKind::Write, a.raw())]);
}

#[test]
fn pending_data_is_read_even_when_writable() {
	let (a, b) = Socket::pair().unwrap();
	let mut reactor = Reactor::new().unwrap();
	reactor.register(&a).unwrap();
	b.write(b"hello").unwrap();

	assert!(reactor.wait(Some(SHORT)).unwrap());
	let mut kinds = Vec::new();
	reactor.dispatch(|kind, _| kinds.push(kind));
	assert_eq!(kinds, vec![EventKind::Read]);
	assert_eq!(a.read().unwrap(), b"hello");
}

#[test]
fn peer_close_with_data_still_reads_first() {
	let (a, b) = Socket::pair().unwrap();
	b.write(b"last words").unwrap();
	drop(b);

	let mut reactor = Reactor::new().unwrap();
	reactor.register(&a).unwrap();
	assert!(reactor.wait(Some(SHORT)).unwrap());

	let mut kinds = Vec::new();
	reactor.dispatch(|kind, _| kinds.push(kind));
	assert_eq!(kinds, vec![EventKind::Read]);
}

#[test]
fn edge_triggered_reports_a_transition_once() {
	let (a, _b) = Socket::pair().unwrap();
	let mut reactor = Reactor::new().unwrap();
	reactor.register(&a).unwrap();

	assert!(reactor.wait(Some(SHORT)).unwrap());
	// Still writable, but nothing changed: no second notification.
	assert!(!reactor.wait(Some(SHORT)).unwrap());
	assert_eq!(reactor.dispatch(|_, _| {}), 0);
}

#[test]
fn try_dispatch_stops_at_first_error() {
	let (a, _b) = Socket::pair().unwrap();
	let (c, _d) = Socket::pair().unwrap();
	let mut reactor = Reactor::new().unwrap();
	reactor.register(&a).unwrap().register(&c).unwrap();

	assert!(reactor.wait(Some(SHORT)).unwrap());
	let mut calls = 0;
	let result: Result<usize, &str> = reactor.try_dispatch(|_, _| {
		calls += 1;
		Err("stop")
	});
	assert_eq!(result, Err("stop"));
	assert_eq!(calls, 1);
}

#[test]
fn timeout_elapses_without_events() {
	let (a, _b) = Socket::pair().unwrap();
	let mut reactor = Reactor::new().unwrap();
	reactor.register(&a).unwrap();
	assert!(reactor.wait(Some(SHORT)).unwrap());

	let start = Instant::now();
	assert!(!reactor.wait(Some(Duration::from_millis(50))).unwrap());
	assert!(start.elapsed() >= Duration::from_millis(40));
}

/// Points `target`'s descriptor number at `source`'s file, closing the file
/// `target` had. The number stays owned by `target`.
fn reuse_number(target: &Socket, source: &Socket) {
	assert_eq!(unsafe { libc::dup2(source.raw(), target.raw()) }, target.raw());
}

#[test]
fn reused_descriptor_number_can_be_registered_again() {
	let (a, _b) = Socket::pair().unwrap();
	let (c, d) = Socket::pair().unwrap();
	let mut reactor = Reactor::new().unwrap();
	reactor.register(&a).unwrap();
	assert!(reactor.wait(Some(SHORT)).unwrap());

	// a's file is closed, so the kernel dropped its registration.
	reuse_number(&a, &c);
	reactor.register(&a).unwrap();
	assert_eq!(reactor.len(), 1);

	d.write(b"fresh").unwrap();
	assert!(reactor.wait(Some(SHORT)).unwrap());
	let mut seen = Vec::new();
	reactor.dispatch(|kind, fd| seen.push((kind, fd)));
	assert_eq!(seen, vec![(EventKind::Read, a.raw())]);
}

#[test]
fn stale_entry_is_dropped_on_unregister() {
	let (a, _b) = Socket::pair().unwrap();
	let (c, _d) = Socket::pair().unwrap();
	let mut reactor = Reactor::new().unwrap();
	reactor.register(&a).unwrap();

	reuse_number(&a, &c);
	reactor.unregister(&a).unwrap();
	assert!(reactor.is_empty());
}
