//! # dispatcher - Owns the serial line to the modem
//!
//! The dispatcher is the only thing allowed to write to the modem, and the
//! only thing which reads from it. It sends one command at a time and then
//! waits for the response to end with one of the given terminators. While it
//! waits it watches for unsolicited notices (see the `urc` module), parses
//! them and passes them to a `UrcHandler`, so they never get mixed up with
//! the response.
//!
//! Once a terminator has matched, the caller can carry on reading the
//! fields which follow it with `read_until` and friends.
//!
//! There is no parallelism here. A wait is a loop which yields to the
//! `Scheduler` each time round, reads whatever octets have arrived, and
//! gives up when the timeout has passed. A wait which times out returns a
//! `Response` with index 0.

// ****************************************************************************
//
// Imports
//
// ****************************************************************************

use std::fmt;
use std::io;

use config::Config;
use matcher::{Accumulator, Terminators, GSM_NL};
use scheduler::Scheduler;
use transport::Transport;
use urc::{self, Marker, Urc, UrcHandler};

// ****************************************************************************
//
// Public Types
//
// ****************************************************************************

/// The outcome of a wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
	/// Which terminator matched, counting from 1. 0 means none did before
	/// the timeout.
	pub index: u8,
	/// What arrived before the terminator (unsolicited notices excluded).
	/// Always empty after a timeout.
	pub text: String,
}

/// Sends commands and collects responses on one transport.
pub struct Dispatcher<T, S> {
	transport: T,
	scheduler: S,
	/// An octet we've read to see if there was one, but not yet consumed
	lookahead: Option<u8>,
	/// What's come in since the current wait started
	acc: Accumulator,
	/// The last idle poll ended part way through a line, which is still in
	/// `acc` for the next idle poll to finish
	partial_line: bool,
	/// Octets read so far, of any kind
	received: u64,
	/// So a dead link doesn't fill the log
	last_error: Option<io::ErrorKind>,
	stream_timeout_ms: u32,
	skip_timeout_ms: u32,
}

// ****************************************************************************
//
// Public Data
//
// ****************************************************************************

/// Terminator for the header of a `+CIPRXGET` response
pub const RXGET_HEADER: &str = "+CIPRXGET:";

// ****************************************************************************
//
// Public Functions
//
// ****************************************************************************

impl Response {
	/// Did the first terminator (by default, `OK`) match?
	pub fn is_ok(&self) -> bool {
		self.index == 1
	}

	/// Did nothing match?
	pub fn timed_out(&self) -> bool {
		self.index == 0
	}
}

impl<T, S> Dispatcher<T, S>
where
	T: Transport,
	S: Scheduler,
{
	pub fn new(transport: T, scheduler: S, config: &Config) -> Dispatcher<T, S> {
		Dispatcher {
			transport: transport,
			scheduler: scheduler,
			lookahead: None,
			acc: Accumulator::new(),
			partial_line: false,
			received: 0,
			last_error: None,
			stream_timeout_ms: config.stream_timeout_ms,
			skip_timeout_ms: config.skip_timeout_ms,
		}
	}

	/// Milliseconds, from our scheduler.
	pub fn millis(&mut self) -> u64 {
		self.scheduler.millis()
	}

	/// Give the environment a chance to run.
	pub fn yield_now(&mut self) {
		self.scheduler.yield_now()
	}

	/// Wait a while, yielding as we go.
	pub fn delay(&mut self, ms: u32) {
		self.scheduler.delay(ms)
	}

	/// Send `AT<command>\r\n`.
	pub fn send_at(&mut self, command: &str) {
		debug!("Tx: AT{}", command);
		let mut line = Vec::with_capacity(command.len() + 4);
		line.extend_from_slice(b"AT");
		line.extend_from_slice(command.as_bytes());
		line.extend_from_slice(GSM_NL.as_bytes());
		self.write_raw(&line);
		self.flush();
		self.scheduler.yield_now();
	}

	/// Write octets straight to the modem, e.g. the payload after a `>`
	/// prompt.
	pub fn write_raw(&mut self, data: &[u8]) {
		trace!("Writing {} octets", data.len());
		if let Err(e) = self.transport.write_all(data) {
			self.note_error(e);
		}
	}

	pub fn flush(&mut self) {
		if let Err(e) = self.transport.flush() {
			self.note_error(e);
		}
	}

	/// Is there anything waiting to be read?
	pub fn has_pending(&mut self) -> bool {
		if self.lookahead.is_none() {
			self.lookahead = self.poll_byte();
		}
		self.lookahead.is_some()
	}

	/// Wait for the response to end with one of `terms`, handing any
	/// unsolicited notices we see on the way to `handler`.
	///
	/// With no terminators this is an idle poll, which just drains notices.
	/// An idle poll that times out half way through a line keeps that line,
	/// so a notice split across back-to-back idle polls is still seen.
	pub fn wait_response(
		&mut self,
		handler: &mut dyn UrcHandler,
		timeout_ms: u32,
		terms: &Terminators,
	) -> Response {
		let idle = terms.is_empty();
		if !(idle && self.partial_line) {
			self.acc.clear();
		}
		self.partial_line = false;
		let start = self.scheduler.millis();
		let mut matched = None;
		'wait: loop {
			self.scheduler.yield_now();
			while let Some(b) = self.next_byte() {
				// Skip NULs, just in case
				if b == 0 {
					continue;
				}
				self.acc.push(b);
				if urc::new_message_marker(self.acc.as_bytes()) {
					self.new_message(handler);
				} else if let Some(m) = terms.matched(self.acc.as_bytes()) {
					matched = Some(m);
					break 'wait;
				} else {
					match urc::socket_marker(self.acc.as_bytes()) {
						Some(Marker::RxGet) => self.data_available(handler),
						Some(Marker::Closed) => self.closed(handler),
						None => {}
					}
				}
			}
			if self.scheduler.millis() - start >= u64::from(timeout_ms) {
				break;
			}
		}
		match matched {
			Some((index, term_len)) => {
				let text = {
					let bytes = self.acc.as_bytes();
					String::from_utf8_lossy(&bytes[..bytes.len() - term_len]).into_owned()
				};
				debug!("Rx: {:?} matched #{} of {:?}", text.trim(), index, terms);
				self.acc.clear();
				Response {
					index: index,
					text: text,
				}
			}
			None => {
				{
					let leftover = String::from_utf8_lossy(self.acc.as_bytes());
					let leftover = leftover.trim();
					if !leftover.is_empty() {
						debug!("Unhandled: {:?}", leftover);
					}
				}
				if idle {
					self.acc.keep_last_line();
					self.partial_line = !self.acc.is_empty();
				} else {
					self.acc.clear();
				}
				Response {
					index: 0,
					text: String::new(),
				}
			}
		}
	}

	/// Drain notices for `timeout_ms`. True if anything at all arrived.
	pub fn idle_poll(&mut self, handler: &mut dyn UrcHandler, timeout_ms: u32) -> bool {
		let before = self.received;
		self.wait_response(handler, timeout_ms, &Terminators::none());
		self.received != before
	}

	/// Did the last idle poll stop part way through a line?
	pub fn mid_line(&self) -> bool {
		self.partial_line
	}

	/// Send a command and wait for the response.
	pub fn execute(
		&mut self,
		handler: &mut dyn UrcHandler,
		command: &str,
		terms: &Terminators,
		timeout_ms: u32,
	) -> Response {
		self.send_at(command);
		self.wait_response(handler, timeout_ms, terms)
	}

	/// Wait for the header of a `+CIPRXGET` response and return its mode.
	/// A data-available notice which crosses our request looks just like
	/// the header we're after, so those are passed to `handler` and we
	/// carry on waiting.
	pub fn wait_rxget_header(
		&mut self,
		handler: &mut dyn UrcHandler,
		timeout_ms: u32,
	) -> Option<i64> {
		let terms = Terminators::new(&[RXGET_HEADER]);
		let start = self.scheduler.millis();
		loop {
			let elapsed = self.scheduler.millis() - start;
			if elapsed >= u64::from(timeout_ms) {
				return None;
			}
			let rsp = self.wait_response(handler, timeout_ms - elapsed as u32, &terms);
			if rsp.timed_out() {
				return None;
			}
			let mode = self.read_int_until(b',');
			if mode != urc::RXGET_MODE_NOTICE {
				return Some(mode);
			}
			let stream_timeout = self.stream_timeout_ms;
			let field = self.read_bytes_until(b'\n', stream_timeout);
			match urc::parse_channel(&field) {
				Some(channel) => handler.handle_urc(Urc::DataAvailable { channel: channel }),
				None => warn!("Bad channel in data notice: {:?}", String::from_utf8_lossy(&field)),
			}
		}
	}

	/// Read one octet, waiting up to `timeout_ms` for it.
	pub fn read_byte(&mut self, timeout_ms: u32) -> Option<u8> {
		let start = self.scheduler.millis();
		loop {
			if let Some(b) = self.next_byte() {
				return Some(b);
			}
			if self.scheduler.millis() - start >= u64::from(timeout_ms) {
				return None;
			}
			self.scheduler.yield_now();
		}
	}

	/// Read up to `delimiter`, which is consumed but not returned. Gives up
	/// (returning what it has) after the stream timeout.
	pub fn read_until(&mut self, delimiter: u8) -> String {
		let timeout = self.stream_timeout_ms;
		let bytes = self.read_bytes_until(delimiter, timeout);
		String::from_utf8_lossy(&bytes).into_owned()
	}

	/// Read up to `delimiter` and parse what was read as a number. Anything
	/// which isn't a number reads as 0.
	pub fn read_int_until(&mut self, delimiter: u8) -> i64 {
		let timeout = self.stream_timeout_ms;
		let bytes = self.read_bytes_until(delimiter, timeout);
		urc::parse_int(&bytes)
	}

	/// Throw away everything up to and including `delimiter`. False if we
	/// didn't find one in time.
	pub fn skip_until(&mut self, delimiter: u8) -> bool {
		let timeout = self.skip_timeout_ms;
		let start = self.scheduler.millis();
		while self.scheduler.millis() - start < u64::from(timeout) {
			match self.next_byte() {
				Some(b) if b == delimiter => return true,
				Some(_) => {}
				None => self.scheduler.yield_now(),
			}
		}
		false
	}
}

impl<T, S> fmt::Debug for Dispatcher<T, S> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(
			f,
			"Dispatcher {{ acc: {:?}, lookahead: {:?} }}",
			self.acc, self.lookahead
		)
	}
}

// ****************************************************************************
//
// Private Functions
//
// ****************************************************************************

impl<T, S> Dispatcher<T, S>
where
	T: Transport,
	S: Scheduler,
{
	/// The next octet, if one has arrived.
	fn next_byte(&mut self) -> Option<u8> {
		let b = match self.lookahead.take() {
			Some(b) => Some(b),
			None => self.poll_byte(),
		};
		if b.is_some() {
			self.received += 1;
		}
		b
	}

	fn poll_byte(&mut self) -> Option<u8> {
		match self.transport.read_byte() {
			Ok(Some(b)) => {
				self.last_error = None;
				Some(b)
			}
			Ok(None) => None,
			Err(e) => {
				self.note_error(e);
				None
			}
		}
	}

	/// Transport errors are treated as silence. We only log each new one.
	fn note_error(&mut self, e: io::Error) {
		if self.last_error != Some(e.kind()) {
			warn!("Transport error: {}", e);
			self.last_error = Some(e.kind());
		}
	}

	fn read_bytes_until(&mut self, delimiter: u8, timeout_ms: u32) -> Vec<u8> {
		let mut out = Vec::new();
		let start = self.scheduler.millis();
		while self.scheduler.millis() - start < u64::from(timeout_ms) {
			match self.next_byte() {
				Some(b) if b == delimiter => break,
				Some(b) => out.push(b),
				None => self.scheduler.yield_now(),
			}
		}
		out
	}

	/// `\r\n+CMTI: "<mem>",<index>\r\n`
	fn new_message(&mut self, handler: &mut dyn UrcHandler) {
		let mem = self.read_until(b',');
		let index = self.read_int_until(b'\n');
		debug!("New message: {} {}", mem.trim(), index);
		if index >= 0 {
			handler.handle_urc(Urc::NewMessage { index: index as u32 });
		}
		self.acc.clear();
	}

	/// `\r\n+CIPRXGET: <mode>...`. Only mode 1 is a notice; anything else is
	/// put back for the caller.
	fn data_available(&mut self, handler: &mut dyn UrcHandler) {
		let timeout = self.stream_timeout_ms;
		let mode = self.read_bytes_until(b',', timeout);
		if urc::parse_int(&mode) == urc::RXGET_MODE_NOTICE {
			let field = self.read_bytes_until(b'\n', timeout);
			match urc::parse_channel(&field) {
				Some(channel) => handler.handle_urc(Urc::DataAvailable { channel: channel }),
				None => warn!("Bad channel in data notice: {:?}", String::from_utf8_lossy(&field)),
			}
			self.acc.clear();
		} else {
			self.acc.extend(&mode);
		}
	}

	/// `<ch>, CLOSED\r\n`
	fn closed(&mut self, handler: &mut dyn UrcHandler) {
		match urc::closed_channel(self.acc.as_bytes()) {
			Some(channel) => {
				debug!("Closed: {}", channel);
				handler.handle_urc(Urc::Closed { channel: channel });
			}
			None => warn!("Closed notice without a channel"),
		}
		self.acc.clear();
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use config::Config;
	use mock::{MockModem, MockScheduler};

	/// Remembers what it was told
	#[derive(Default)]
	struct Seen(Vec<Urc>);

	impl UrcHandler for Seen {
		fn handle_urc(&mut self, urc: Urc) {
			self.0.push(urc);
		}
	}

	fn make(modem: &MockModem) -> Dispatcher<MockModem, MockScheduler> {
		Dispatcher::new(modem.clone(), MockScheduler::new(), &Config::default())
	}

	#[test]
	fn ok_matches_first() {
		let modem = MockModem::new();
		modem.inject(b"\r\nOK\r\n");
		let mut d = make(&modem);
		let mut seen = Seen::default();
		let rsp = d.wait_response(&mut seen, 1000, &Terminators::default());
		assert_eq!(rsp.index, 1);
		assert!(rsp.text.trim().is_empty());
		assert!(seen.0.is_empty());
	}

	#[test]
	fn timeout_is_index_zero() {
		let modem = MockModem::new();
		modem.inject(b"\r\nOK");
		let mut d = make(&modem);
		let mut seen = Seen::default();
		let start = d.millis();
		let rsp = d.wait_response(&mut seen, 50, &Terminators::default());
		assert!(rsp.timed_out());
		assert_eq!(rsp.text, "");
		assert!(d.millis() - start >= 50);
		assert!(seen.0.is_empty());
	}

	#[test]
	fn execute_writes_the_command() {
		let modem = MockModem::new();
		modem.on("+CSQ", "\r\n+CSQ: 17,0\r\n\r\nOK\r\n");
		let mut d = make(&modem);
		let mut seen = Seen::default();
		let rsp = d.execute(&mut seen, "+CSQ", &Terminators::default(), 1000);
		assert!(rsp.is_ok());
		assert_eq!(rsp.text.trim(), "+CSQ: 17,0");
		assert_eq!(modem.written(), b"AT+CSQ\r\n".to_vec());
	}

	#[test]
	fn data_notice_does_not_satisfy_wait() {
		let modem = MockModem::new();
		modem.inject(b"\r\n+CIPRXGET: 1,2\r\nOK\r\n");
		let mut d = make(&modem);
		let mut seen = Seen::default();
		let rsp = d.wait_response(&mut seen, 1000, &Terminators::default());
		assert_eq!(rsp.index, 1);
		assert_eq!(seen.0, vec![Urc::DataAvailable { channel: 2 }]);
	}

	#[test]
	fn closed_notice_mid_response() {
		let modem = MockModem::new();
		modem.inject(b"\r\n+CSQ: 17,0\r\n\r\n3, CLOSED\r\n\r\nOK\r\n");
		let mut d = make(&modem);
		let mut seen = Seen::default();
		let rsp = d.wait_response(&mut seen, 1000, &Terminators::default());
		assert_eq!(rsp.index, 1);
		assert_eq!(seen.0, vec![Urc::Closed { channel: 3 }]);
	}

	#[test]
	fn new_message_goes_to_handler() {
		let modem = MockModem::new();
		modem.inject(b"\r\n+CMTI: \"SM\",12\r\n\r\nERROR\r\n");
		let mut d = make(&modem);
		let mut seen = Seen::default();
		let rsp = d.wait_response(&mut seen, 1000, &Terminators::default());
		assert_eq!(rsp.index, 2);
		assert_eq!(seen.0, vec![Urc::NewMessage { index: 12 }]);
	}

	#[test]
	fn caller_may_wait_for_rxget_header() {
		let modem = MockModem::new();
		modem.inject(b"\r\n+CIPRXGET: 4,0,7\r\nOK\r\n");
		let mut d = make(&modem);
		let mut seen = Seen::default();
		assert_eq!(d.wait_rxget_header(&mut seen, 1000), Some(4));
		assert_eq!(d.skip_until(b','), true);
		assert_eq!(d.read_int_until(b'\n'), 7);
		assert!(d.wait_response(&mut seen, 1000, &Terminators::default()).is_ok());
		assert!(seen.0.is_empty());
	}

	#[test]
	fn notice_crossing_a_fetch_is_delivered() {
		let modem = MockModem::new();
		modem.inject(b"\r\n+CIPRXGET: 1,1\r\n\r\n+CIPRXGET: 4,1,0\r\nOK\r\n");
		let mut d = make(&modem);
		let mut seen = Seen::default();
		assert_eq!(d.wait_rxget_header(&mut seen, 1000), Some(4));
		assert_eq!(seen.0, vec![Urc::DataAvailable { channel: 1 }]);
	}

	#[test]
	fn other_rxget_modes_are_kept_in_the_text() {
		let modem = MockModem::new();
		modem.inject(b"\r\n+CIPRXGET: 4,0,0\r\nOK\r\n");
		let mut d = make(&modem);
		let mut seen = Seen::default();
		let rsp = d.wait_response(&mut seen, 1000, &Terminators::default());
		assert!(rsp.is_ok());
		assert!(rsp.text.contains("+CIPRXGET: 4"));
		assert!(seen.0.is_empty());
	}

	#[test]
	fn data_notice_at_start_of_wait() {
		let modem = MockModem::new();
		modem.inject(b"+CIPRXGET: 1,2\r\nOK\r\n");
		let mut d = make(&modem);
		let mut seen = Seen::default();
		let rsp = d.wait_response(&mut seen, 1000, &Terminators::default());
		assert_eq!(rsp.index, 1);
		assert_eq!(seen.0, vec![Urc::DataAvailable { channel: 2 }]);
	}

	#[test]
	fn idle_polls_keep_a_partial_line() {
		let modem = MockModem::new();
		let mut d = make(&modem);
		let mut seen = Seen::default();
		modem.inject(b"\r\nOK\r\n\r\n2, CLO");
		assert!(d.idle_poll(&mut seen, 10));
		assert!(d.mid_line());
		assert!(seen.0.is_empty());
		modem.inject(b"SED\r\n");
		assert!(d.idle_poll(&mut seen, 10));
		assert!(!d.mid_line());
		assert_eq!(seen.0, vec![Urc::Closed { channel: 2 }]);
		assert!(!d.idle_poll(&mut seen, 10));
	}

	#[test]
	fn commands_start_afresh_after_idle_poll() {
		let modem = MockModem::new();
		let mut d = make(&modem);
		let mut seen = Seen::default();
		modem.inject(b"\r\njunk");
		assert!(d.idle_poll(&mut seen, 10));
		assert!(d.mid_line());
		modem.inject(b"\r\n+CSQ: 5,0\r\n\r\nOK\r\n");
		let rsp = d.wait_response(&mut seen, 1000, &Terminators::default());
		assert!(rsp.is_ok());
		assert_eq!(rsp.text.trim(), "+CSQ: 5,0");
	}

	#[test]
	fn nuls_are_skipped() {
		let modem = MockModem::new();
		modem.on_bytes("+CGATT?", b"\r\n+CGATT: 1\r\n\x00\r\nO\x00K\r\n");
		let mut d = make(&modem);
		let mut seen = Seen::default();
		let rsp = d.execute(&mut seen, "+CGATT?", &Terminators::default(), 1000);
		assert!(rsp.is_ok());
		assert_eq!(rsp.text.trim(), "+CGATT: 1");
	}

	#[test]
	fn field_readers() {
		let modem = MockModem::new();
		modem.inject(b" 2,0,10\r\nxyz");
		let mut d = make(&modem);
		assert_eq!(d.read_until(b','), " 2");
		assert!(d.skip_until(b','));
		assert_eq!(d.read_int_until(b'\n'), 10);
		assert!(d.has_pending());
		assert_eq!(d.read_byte(10), Some(b'x'));
		assert!(!d.skip_until(b'!'));
		assert!(!d.has_pending());
		assert_eq!(d.read_byte(10), None);
	}
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
