use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::Path;
use super::Socket;
use crate::error::{IoError, errno, is_ignored_error};

/// Bytes requested per `recv()` call in `Socket::read()`.
///
/// A `recv()` returning fewer bytes than this ends the read.
pub const READ_CHUNK: usize = 4096;

impl Socket {
	/// Reads until the peer has nothing more queued.
	///
	/// Loops `recv()` of `READ_CHUNK` bytes, growing the buffer, and stops at
	/// the first short read (EOF included). `EINTR` is retried; `EPIPE`,
	/// `ECONNRESET` and `EAGAIN` end the read with whatever arrived so far.
	pub fn read(&self) -> Result<Vec<u8>, IoError> {
		let mut buf = Vec::with_capacity(READ_CHUNK);

		loop {
			let start = buf.len();
			buf.resize(start + READ_CHUNK, 0);

			let n = unsafe {
				libc::recv(
					self.as_raw_fd(),
					buf[start..].as_mut_ptr() as *mut libc::c_void,
					READ_CHUNK,
					0,
				)
			};

			if n < 0 {
				buf.truncate(start);
				let e = errno();
				if e == libc::EINTR {
					continue;
				}
				if is_ignored_error(e) {
					break;
				}
				return Err(IoError::Read { errno: e });
			}

			let n = n as usize;
			buf.truncate(start + n);
			if n < READ_CHUNK {
				break;
			}
		}

		Ok(buf)
	}

	/// Sends all of `bytes`, looping over partial sends.
	///
	/// Returns the number of bytes sent, which is short of `bytes.len()` only
	/// when the peer went away or a non-blocking socket filled up.
	pub fn write(&self, bytes: &[u8]) -> Result<usize, IoError> {
		let mut sent = 0;

		while sent < bytes.len() {
			let rest = &bytes[sent..];
			let n = unsafe {
				libc::send(
					self.as_raw_fd(),
					rest.as_ptr() as *const libc::c_void,
					rest.len(),
					libc::MSG_NOSIGNAL,
				)
			};

			if n < 0 {
				let e = errno();
				if e == libc::EINTR {
					continue;
				}
				if is_ignored_error(e) {
					break;
				}
				return Err(IoError::Write { errno: e });
			}
			sent += n as usize;
		}

		Ok(sent)
	}

	/// Zero-copy transfer of a whole file to the socket.
	///
	/// The file is opened read-only and closed on every return path.
	/// Returns the number of bytes sent.
	pub fn write_file<P: AsRef<Path>>(&self, path: P) -> Result<usize, IoError> {
		let path = path.as_ref();
		let file_err = |source| IoError::File { path: path.to_path_buf(), source };

		let file = File::open(path).map_err(file_err)?;
		let len = file.metadata().map_err(file_err)?.len() as usize;

		let mut offset: libc::off_t = 0;
		let mut sent = 0;

		while sent < len {
			let n = send_to_socket(&file, self, &mut offset, len - sent);
			match n {
				Ok(0) => break, // file shrank underneath us
				Ok(n) => sent += n,
				Err(e) if e == libc::EINTR => continue,
				Err(e) if is_ignored_error(e) => break,
				Err(e) => return Err(IoError::SendFile { errno: e }),
			}
		}

		Ok(sent)
	}
}

/// One `sendfile()` call; advances `offset` by the bytes sent.
fn send_to_socket(file: &File, socket: &Socket, offset: &mut libc::off_t, count: usize) -> Result<usize, i32> {
	let n = unsafe {
		libc::sendfile(socket.as_raw_fd(), file.as_raw_fd(), offset as *mut libc::off_t, count)
	};
	if n < 0 {
		Err(errno())
	} else {
		Ok(n as usize)
	}
}

/*
 ---
  How each loop ends:
  ┌────────────┬──────────────────────┬──────────────────────────────┐
  │   Call     │ Normal exit          │ Early, but Ok                │
  ├────────────┼──────────────────────┼──────────────────────────────┤
  │ read       │ recv() < READ_CHUNK  │ EPIPE / ECONNRESET / EAGAIN  │
  ├────────────┼──────────────────────┼──────────────────────────────┤
  │ write      │ all bytes sent       │ same set, returns bytes sent │
  ├────────────┼──────────────────────┼──────────────────────────────┤
  │ write_file │ file length sent     │ same set, or sendfile() == 0 │
  └────────────┴──────────────────────┴──────────────────────────────┘
  EINTR is retried everywhere; anything else is an IoError.
  ---
*/
