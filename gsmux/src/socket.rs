//! # socket - Per-channel state
//!
//! A `VirtualSocket` is what we know about one of the modem's TCP channels:
//! whether it is connected, how much data the modem says it is holding for
//! us, and the data we've already fetched but the user hasn't read yet.
//!
//! The operations on a socket (connect, write, read and so on) all need the
//! serial line, so they live on `Modem` and take a `SocketHandle`. `Client`
//! wraps a handle and the modem up as an `io::Read + io::Write`.

// ****************************************************************************
//
// Imports
//
// ****************************************************************************

use std::fmt;
use std::io;

use error::Error;
use modem::Modem;
use registry::SocketHandle;
use ring_buffer::RingBuffer;
use scheduler::Scheduler;
use transport::Transport;

// ****************************************************************************
//
// Public Types
//
// ****************************************************************************

/// Where a socket is in its life.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SocketState {
	/// Registered, never connected
	Idle,
	/// `AT+CIPSTART` in progress
	Connecting,
	Connected,
	/// `AT+CIPCLOSE` in progress
	Closing,
	/// Closed by us or by the far end, or the connect failed
	Closed,
}

/// Whether a connection is plain TCP or wrapped in the modem's own SSL.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Security {
	Plain,
	Secure,
}

/// One multiplexed TCP channel.
#[derive(Debug)]
pub struct VirtualSocket {
	pub(crate) channel: u8,
	pub(crate) id: u32,
	pub(crate) state: SocketState,
	pub(crate) security: Security,
	/// Octets the modem says it is holding for us
	pub(crate) available: usize,
	/// Set by a data-available notice (or by a forced poll), cleared when
	/// we ask the modem how much it has
	pub(crate) got_data: bool,
	/// When we last forced a poll
	pub(crate) prev_check: Option<u64>,
	pub(crate) rx: RingBuffer,
}

/// Reads and writes one socket through the standard I/O traits.
///
/// A read that finds nothing buffered on a connected socket fails with
/// `WouldBlock`. A read on a closed socket with nothing buffered returns
/// `Ok(0)`, as at end-of-file.
pub struct Client<'a, T: 'a, S: 'a> {
	modem: &'a mut Modem<T, S>,
	handle: SocketHandle,
}

// ****************************************************************************
//
// Public Functions
//
// ****************************************************************************

impl VirtualSocket {
	pub(crate) fn new(channel: u8, id: u32, security: Security) -> VirtualSocket {
		VirtualSocket {
			channel: channel,
			id: id,
			state: SocketState::Idle,
			security: security,
			available: 0,
			got_data: false,
			prev_check: None,
			rx: RingBuffer::new(),
		}
	}

	pub fn channel(&self) -> u8 {
		self.channel
	}

	pub fn state(&self) -> SocketState {
		self.state
	}

	pub fn security(&self) -> Security {
		self.security
	}

	pub fn is_connected(&self) -> bool {
		self.state == SocketState::Connected
	}

	/// What the modem last told us it is holding.
	pub fn modem_available(&self) -> usize {
		self.available
	}

	/// What we've fetched and not yet handed over.
	pub fn buffered(&self) -> usize {
		self.rx.size()
	}

	/// Will the next `maintain` ask the modem about this socket?
	pub fn needs_poll(&self) -> bool {
		self.got_data
	}

	/// The far end has gone.
	pub(crate) fn mark_closed(&mut self) {
		if self.state != SocketState::Closed {
			info!("Channel {} closed", self.channel);
		}
		self.state = SocketState::Closed;
	}

	/// Forget everything we'd fetched or been told about.
	pub(crate) fn reset(&mut self) {
		self.rx.clear();
		self.available = 0;
		self.got_data = false;
	}
}

impl<'a, T, S> Client<'a, T, S>
where
	T: Transport,
	S: Scheduler,
{
	pub fn new(modem: &'a mut Modem<T, S>, handle: SocketHandle) -> Client<'a, T, S> {
		Client {
			modem: modem,
			handle: handle,
		}
	}

	pub fn handle(&self) -> SocketHandle {
		self.handle
	}

	/// See `Modem::available`.
	pub fn available(&mut self) -> usize {
		self.modem.available(self.handle)
	}

	/// See `Modem::close`.
	pub fn close(&mut self) {
		self.modem.close(self.handle)
	}
}

impl<'a, T, S> io::Read for Client<'a, T, S>
where
	T: Transport,
	S: Scheduler,
{
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		if buf.is_empty() {
			return Ok(0);
		}
		let count = self.modem.read(self.handle, buf);
		if count > 0 {
			return Ok(count);
		}
		match self.modem.state(self.handle) {
			None => Err(Error::BadHandle.into()),
			Some(SocketState::Connected) => {
				Err(io::Error::new(io::ErrorKind::WouldBlock, "no data yet"))
			}
			Some(_) => Ok(0),
		}
	}
}

impl<'a, T, S> io::Write for Client<'a, T, S>
where
	T: Transport,
	S: Scheduler,
{
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		if buf.is_empty() {
			return Ok(0);
		}
		let count = self.modem.write(self.handle, buf);
		if count > 0 {
			return Ok(count);
		}
		let err = match self.modem.state(self.handle) {
			None => Error::BadHandle,
			Some(SocketState::Connected) => Error::WriteFailed,
			Some(_) => Error::NotConnected,
		};
		Err(err.into())
	}

	fn flush(&mut self) -> io::Result<()> {
		self.modem.flush();
		Ok(())
	}
}

impl<'a, T, S> fmt::Debug for Client<'a, T, S> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "Client {{ handle: {} }}", self.handle)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn new_socket_is_idle_and_empty() {
		let s = VirtualSocket::new(3, 9, Security::Secure);
		assert_eq!(s.channel(), 3);
		assert_eq!(s.state(), SocketState::Idle);
		assert_eq!(s.security(), Security::Secure);
		assert!(!s.is_connected());
		assert_eq!(s.buffered(), 0);
		assert_eq!(s.modem_available(), 0);
		assert!(!s.needs_poll());
	}

	#[test]
	fn reset_forgets_data() {
		let mut s = VirtualSocket::new(0, 1, Security::Plain);
		s.rx.push(1);
		s.available = 10;
		s.got_data = true;
		s.state = SocketState::Connected;
		s.reset();
		assert_eq!(s.buffered(), 0);
		assert_eq!(s.modem_available(), 0);
		assert!(!s.needs_poll());
		// Reset doesn't change the connection
		assert!(s.is_connected());
		s.mark_closed();
		s.mark_closed();
		assert_eq!(s.state(), SocketState::Closed);
	}
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
