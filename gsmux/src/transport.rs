//! # transport - The serial line to the modem
//!
//! The dispatcher wants two things from the line: a way to poll for the next
//! octet without blocking, and a way to write. `IoTransport` gives you that
//! over anything implementing `Read + Write` - a serial device opened as a
//! file, or a TCP connection to a serial bridge. Set a short read timeout (or
//! non-blocking mode) on the underlying stream, otherwise every poll blocks
//! for as long as the stream does.

// ****************************************************************************
//
// Imports
//
// ****************************************************************************

use std::fmt;
use std::io;
use std::io::prelude::*;

// ****************************************************************************
//
// Public Types
//
// ****************************************************************************

/// A byte pipe to the modem.
pub trait Transport {
	/// Return the next octet if there is one. `Ok(None)` means nothing has
	/// arrived yet; it never blocks for long.
	fn read_byte(&mut self) -> io::Result<Option<u8>>;

	/// Write all of `data`.
	fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

	/// Push anything buffered out to the modem.
	fn flush(&mut self) -> io::Result<()>;
}

/// Adapts a std stream into a `Transport`.
pub struct IoTransport<S> {
	stream: S,
	buffer: [u8; READ_CHUNK],
	pos: usize,
	len: usize,
}

// ****************************************************************************
//
// Private Data
//
// ****************************************************************************

const READ_CHUNK: usize = 64;

// ****************************************************************************
//
// Public Functions
//
// ****************************************************************************

impl<S> IoTransport<S>
where
	S: Read + Write,
{
	/// Wrap a stream.
	pub fn new(stream: S) -> IoTransport<S> {
		IoTransport {
			stream: stream,
			buffer: [0u8; READ_CHUNK],
			pos: 0,
			len: 0,
		}
	}

	/// Get at the stream, e.g. to change its timeouts.
	pub fn get_ref(&self) -> &S {
		&self.stream
	}

	/// Unwrap the stream. Anything read but not yet consumed is lost.
	pub fn into_inner(self) -> S {
		self.stream
	}
}

impl<S> Transport for IoTransport<S>
where
	S: Read + Write,
{
	fn read_byte(&mut self) -> io::Result<Option<u8>> {
		if self.pos == self.len {
			self.pos = 0;
			self.len = 0;
			match self.stream.read(&mut self.buffer) {
				// A stream (rather than a serial port) has gone away
				Ok(0) => {
					return Err(io::Error::new(
						io::ErrorKind::UnexpectedEof,
						"modem link closed",
					))
				}
				Ok(n) => {
					trace!("Read {} octets from modem", n);
					self.len = n;
				}
				Err(ref e) if is_no_data(e.kind()) => return Ok(None),
				Err(e) => return Err(e),
			}
		}
		let b = self.buffer[self.pos];
		self.pos += 1;
		Ok(Some(b))
	}

	fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
		self.stream.write_all(data)
	}

	fn flush(&mut self) -> io::Result<()> {
		self.stream.flush()
	}
}

impl<T> Transport for Box<T>
where
	T: Transport + ?Sized,
{
	fn read_byte(&mut self) -> io::Result<Option<u8>> {
		(**self).read_byte()
	}

	fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
		(**self).write_all(data)
	}

	fn flush(&mut self) -> io::Result<()> {
		(**self).flush()
	}
}

/// Don't log the buffer contents
impl<S> fmt::Debug for IoTransport<S> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "IoTransport {{ buffered: {} }}", self.len - self.pos)
	}
}

// ****************************************************************************
//
// Private Functions
//
// ****************************************************************************

/// Errors which just mean "try again later"
fn is_no_data(kind: io::ErrorKind) -> bool {
	match kind {
		io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted => true,
		_ => false,
	}
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
