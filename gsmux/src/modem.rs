//! # modem - A session with one modem
//!
//! `Modem` owns the dispatcher, and with it the serial line, plus the
//! socket registry. It offers two sets of operations:
//!
//! * the raw command primitives (`send_at`, `wait_response`, `execute` and
//!   the field readers) for code which drives the modem's other features;
//! * the socket operations (`connect`, `write`, `read`, `available`,
//!   `close`, ...) on a `SocketHandle` obtained from `socket`.
//!
//! Every operation runs to completion in the caller's thread. Unsolicited
//! notices seen while an operation waits are applied to the registry (or
//! passed to the new-message callback) as they arrive.
//!
//! The SIM800 protocol for a socket goes like this:
//!
//! ```text
//! AT+CIPSTART=0,"TCP","example.com",80      -> OK ... 0, CONNECT OK
//! AT+CIPSEND=0,10                           -> >
//! <10 octets><Ctrl-Z>                       -> DATA ACCEPT:0,10
//!                                              +CIPRXGET: 1,0  (some time later)
//! AT+CIPRXGET=4,0                           -> +CIPRXGET: 4,0,120 OK
//! AT+CIPRXGET=2,0,64                        -> +CIPRXGET: 2,0,64,56 <64 octets> OK
//! AT+CIPCLOSE=0                             -> 0, CLOSE OK
//! ```

// ****************************************************************************
//
// Imports
//
// ****************************************************************************

use std::fmt;
use std::net::Ipv4Addr;

use config::{Config, FetchEncoding};
use dispatcher::{Dispatcher, Response};
use error::Error;
use matcher::{Terminators, GSM_ERROR, GSM_OK};
use registry::{Registry, SocketHandle};
use scheduler::Scheduler;
use socket::{Client, Security, SocketState, VirtualSocket};
use transport::Transport;
use urc::{Urc, UrcHandler};

// ****************************************************************************
//
// Public Types
//
// ****************************************************************************

/// Called with the storage index of each newly received SMS. Runs inside the
/// dispatcher's wait loop, so it must be quick and must not touch the modem.
pub type NewMessageCallback = Box<dyn FnMut(u32) + Send>;

/// A session with one modem.
pub struct Modem<T, S> {
	dispatcher: Dispatcher<T, S>,
	registry: Registry,
	config: Config,
	on_new_message: Option<NewMessageCallback>,
	/// Did the last `AT+CIPSSL` we sent turn SSL on?
	ssl_enabled: bool,
}

// ****************************************************************************
//
// Private Types
//
// ****************************************************************************

/// Where the dispatcher sends notices while the session is waiting.
struct Notices<'a> {
	registry: &'a mut Registry,
	on_new_message: &'a mut Option<NewMessageCallback>,
}

// ****************************************************************************
//
// Private Data
//
// ****************************************************************************

const CONNECT_TERMINATORS: [&str; 5] = [
	"CONNECT OK\r\n",
	"CONNECT FAIL\r\n",
	"ALREADY CONNECT\r\n",
	"ERROR\r\n",
	// What we get when an SSL handshake fails
	"CLOSE OK\r\n",
];

const STATUS_TERMINATORS: [&str; 4] = [
	",\"CONNECTED\"",
	",\"CLOSED\"",
	",\"CLOSING\"",
	",\"INITIAL\"",
];

const SEND_PROMPT: &str = ">";
const SEND_ACCEPT: &str = "\r\nDATA ACCEPT:";
const SSL_SUPPORT: &str = "\r\n+CIPSSL:";

/// `test_at` waits this long for each `OK`...
const PING_TIMEOUT_MS: u32 = 200;
/// ...and pauses this long between attempts.
const PING_PAUSE_MS: u32 = 100;

// ****************************************************************************
//
// Public Functions
//
// ****************************************************************************

impl<T, S> Modem<T, S>
where
	T: Transport,
	S: Scheduler,
{
	pub fn new(transport: T, scheduler: S, config: Config) -> Modem<T, S> {
		Modem {
			dispatcher: Dispatcher::new(transport, scheduler, &config),
			registry: Registry::new(),
			config: config,
			on_new_message: None,
			ssl_enabled: false,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Have `callback` called whenever a new SMS notice arrives.
	pub fn set_new_message_callback<F>(&mut self, callback: F)
	where
		F: FnMut(u32) + Send + 'static,
	{
		self.on_new_message = Some(Box::new(callback));
	}

	/// New SMS notices will just be dropped.
	pub fn clear_new_message_callback(&mut self) {
		self.on_new_message = None;
	}

	// ------------------------------------------------------------------------
	// Command primitives
	// ------------------------------------------------------------------------

	/// Send `AT<command>\r\n`, without waiting for anything.
	pub fn send_at(&mut self, command: &str) {
		self.dispatcher.send_at(command)
	}

	/// Wait for one of `terms` (at most five are used).
	pub fn wait_response(&mut self, timeout_ms: u32, terms: &Terminators) -> Response {
		let mut notices = Notices {
			registry: &mut self.registry,
			on_new_message: &mut self.on_new_message,
		};
		self.dispatcher.wait_response(&mut notices, timeout_ms, terms)
	}

	/// Send a command and wait for one of `terms`.
	pub fn execute(&mut self, command: &str, terms: &Terminators, timeout_ms: u32) -> Response {
		self.send_at(command);
		self.wait_response(timeout_ms, terms)
	}

	/// Send a command and wait for `OK` or `ERROR` within the usual time.
	pub fn command(&mut self, command: &str) -> Response {
		let timeout = self.config.command_timeout_ms;
		self.execute(command, &Terminators::default(), timeout)
	}

	/// Read a field up to `delimiter`. See `Dispatcher::read_until`.
	pub fn read_until(&mut self, delimiter: u8) -> String {
		self.dispatcher.read_until(delimiter)
	}

	/// Read a numeric field up to `delimiter`.
	pub fn read_int_until(&mut self, delimiter: u8) -> i64 {
		self.dispatcher.read_int_until(delimiter)
	}

	/// Skip to just past `delimiter`.
	pub fn skip_until(&mut self, delimiter: u8) -> bool {
		self.dispatcher.skip_until(delimiter)
	}

	/// Read one octet off the line (not from a socket).
	pub fn read_raw_byte(&mut self, timeout_ms: u32) -> Option<u8> {
		self.dispatcher.read_byte(timeout_ms)
	}

	/// Write octets straight to the line.
	pub fn write_raw(&mut self, data: &[u8]) {
		self.dispatcher.write_raw(data)
	}

	pub fn flush(&mut self) {
		self.dispatcher.flush()
	}

	pub fn millis(&mut self) -> u64 {
		self.dispatcher.millis()
	}

	pub fn delay(&mut self, ms: u32) {
		self.dispatcher.delay(ms)
	}

	// ------------------------------------------------------------------------
	// Housekeeping
	// ------------------------------------------------------------------------

	/// Ask the modem how much it holds for each socket we've been told has
	/// data, then deal with any notices still on the line.
	pub fn maintain(&mut self) {
		for handle in self.registry.handles() {
			let poll = match self.registry.get_mut(handle) {
				Some(sock) if sock.got_data => {
					sock.got_data = false;
					true
				}
				_ => false,
			};
			if poll {
				let available = self.modem_get_available(handle);
				if let Some(sock) = self.registry.get_mut(handle) {
					sock.available = available;
				}
			}
		}
		let timeout = self.config.idle_poll_timeout_ms;
		while self.dispatcher.has_pending() || self.dispatcher.mid_line() {
			let mut notices = Notices {
				registry: &mut self.registry,
				on_new_message: &mut self.on_new_message,
			};
			// Stop if a line was left unfinished but nothing more came
			if !self.dispatcher.idle_poll(&mut notices, timeout) {
				break;
			}
		}
	}

	/// Knock with `AT` until the modem says `OK`, for up to `timeout_ms`.
	pub fn test_at(&mut self, timeout_ms: u32) -> bool {
		let start = self.millis();
		while self.millis() - start < u64::from(timeout_ms) {
			self.send_at("");
			if self.wait_response(PING_TIMEOUT_MS, &Terminators::default()).is_ok() {
				self.delay(PING_PAUSE_MS);
				return true;
			}
			self.delay(PING_PAUSE_MS);
		}
		warn!("No answer to AT after {}ms", timeout_ms);
		false
	}

	/// Does the modem support SSL connections?
	pub fn has_ssl(&mut self) -> bool {
		let timeout = self.config.command_timeout_ms;
		self.send_at("+CIPSSL=?");
		if !self.wait_response(timeout, &Terminators::new(&[SSL_SUPPORT])).is_ok() {
			return false;
		}
		self.wait_response(timeout, &Terminators::default()).is_ok()
	}

	// ------------------------------------------------------------------------
	// Sockets
	// ------------------------------------------------------------------------

	/// Register a new socket on `channel`. Any socket already there is
	/// forgotten about (but not closed).
	pub fn socket(&mut self, channel: u8, security: Security) -> Result<SocketHandle, Error> {
		self.registry.register(channel, security)
	}

	/// Close (if need be) and forget about a socket.
	pub fn release(&mut self, handle: SocketHandle) -> bool {
		let open = match self.registry.get(handle) {
			Some(sock) => sock.state != SocketState::Closed && sock.state != SocketState::Idle,
			None => return false,
		};
		if open {
			self.close(handle);
		}
		self.registry.remove(handle)
	}

	/// Look at a socket.
	pub fn socket_info(&self, handle: SocketHandle) -> Option<&VirtualSocket> {
		self.registry.get(handle)
	}

	/// The socket's state, or `None` if the handle is stale.
	pub fn state(&self, handle: SocketHandle) -> Option<SocketState> {
		self.registry.get(handle).map(|s| s.state)
	}

	/// Every socket currently registered.
	pub fn handles(&self) -> Vec<SocketHandle> {
		self.registry.handles()
	}

	/// Open a TCP connection to `host:port`. Anything already open on the
	/// channel is closed first.
	pub fn connect(&mut self, handle: SocketHandle, host: &str, port: u16) -> bool {
		let (channel, security) = match self.registry.get(handle) {
			Some(sock) => (sock.channel, sock.security),
			None => return false,
		};
		self.close(handle);
		self.dispatcher.yield_now();
		if let Some(sock) = self.registry.get_mut(handle) {
			sock.reset();
			sock.prev_check = None;
			sock.state = SocketState::Connecting;
		}
		let ok = self.modem_connect(channel, security, host, port);
		if let Some(sock) = self.registry.get_mut(handle) {
			sock.state = if ok {
				SocketState::Connected
			} else {
				SocketState::Closed
			};
		}
		if ok {
			info!("Channel {} connected to {}:{}", channel, host, port);
		} else {
			info!("Channel {} failed to connect to {}:{}", channel, host, port);
		}
		ok
	}

	/// Open a TCP connection to `addr:port`.
	pub fn connect_ip(&mut self, handle: SocketHandle, addr: Ipv4Addr, port: u16) -> bool {
		let host = addr.to_string();
		self.connect(handle, &host, port)
	}

	/// Send `data`. Returns how many octets the modem accepted; 0 on any
	/// failure.
	pub fn write(&mut self, handle: SocketHandle, data: &[u8]) -> usize {
		if data.is_empty() {
			return 0;
		}
		let channel = match self.registry.get(handle) {
			Some(sock) => sock.channel,
			None => return 0,
		};
		self.dispatcher.yield_now();
		self.maintain();
		self.modem_send(channel, data)
	}

	/// Fill `dest` with whatever we have, fetching more from the modem while
	/// it has some. Returns how many octets were copied; 0 if there's
	/// nothing to read.
	pub fn read(&mut self, handle: SocketHandle, dest: &mut [u8]) -> usize {
		if self.registry.get(handle).is_none() {
			return 0;
		}
		self.dispatcher.yield_now();
		self.maintain();
		let mut count = 0;
		while count < dest.len() {
			let space = match self.registry.get_mut(handle) {
				Some(sock) => {
					let chunk = sock.rx.pop_into(&mut dest[count..]);
					if chunk > 0 {
						count += chunk;
						continue;
					}
					if !sock.is_connected() {
						break;
					}
					sock.rx.available_space()
				}
				None => break,
			};
			self.maintain();
			let fetch = match self.registry.get(handle) {
				Some(sock) => sock.is_connected() && sock.available > 0,
				None => false,
			};
			if !fetch || self.modem_read(handle, space) == 0 {
				break;
			}
		}
		count
	}

	/// Read one octet.
	pub fn read_byte(&mut self, handle: SocketHandle) -> Option<u8> {
		let mut b = [0u8; 1];
		if self.read(handle, &mut b) == 1 {
			Some(b[0])
		} else {
			None
		}
	}

	/// Octets we could read: those we hold plus those the modem holds. As
	/// the modem doesn't always tell us when data arrives, an idle connected
	/// socket is polled every so often.
	pub fn available(&mut self, handle: SocketHandle) -> usize {
		self.dispatcher.yield_now();
		let now = self.dispatcher.millis();
		let interval = u64::from(self.config.poll_interval_ms);
		let idle = match self.registry.get_mut(handle) {
			Some(sock) => {
				let idle = sock.rx.is_empty() && sock.is_connected();
				if idle {
					let due = match sock.prev_check {
						Some(then) => now - then >= interval,
						None => true,
					};
					if due {
						sock.got_data = true;
						sock.prev_check = Some(now);
					}
				}
				idle
			}
			None => return 0,
		};
		if idle {
			self.maintain();
		}
		self.registry
			.get(handle)
			.map(|sock| sock.rx.size() + sock.available)
			.unwrap_or(0)
	}

	/// True if there's something to read or the connection is up.
	pub fn connected(&mut self, handle: SocketHandle) -> bool {
		self.available(handle) > 0 || self.is_connected(handle)
	}

	/// Is the connection up? Doesn't talk to the modem.
	pub fn is_connected(&self, handle: SocketHandle) -> bool {
		self.registry
			.get(handle)
			.map(|sock| sock.is_connected())
			.unwrap_or(false)
	}

	/// Close the connection and throw away anything unread.
	pub fn close(&mut self, handle: SocketHandle) {
		let channel = match self.registry.get_mut(handle) {
			Some(sock) => {
				sock.state = SocketState::Closing;
				sock.channel
			}
			None => return,
		};
		self.dispatcher.yield_now();
		let timeout = self.config.command_timeout_ms;
		self.execute(&format!("+CIPCLOSE={}", channel), &Terminators::default(), timeout);
		if let Some(sock) = self.registry.get_mut(handle) {
			sock.state = SocketState::Closed;
			sock.reset();
		}
		debug!("Channel {} closed by us", channel);
	}

	/// A `Read + Write` view of one socket.
	pub fn client(&mut self, handle: SocketHandle) -> Client<T, S> {
		Client::new(self, handle)
	}
}

impl<T, S> fmt::Debug for Modem<T, S> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(
			f,
			"Modem {{ registry: {:?}, ssl_enabled: {}, callback: {} }}",
			self.registry,
			self.ssl_enabled,
			self.on_new_message.is_some()
		)
	}
}

// ****************************************************************************
//
// Private Functions
//
// ****************************************************************************

impl<'a> UrcHandler for Notices<'a> {
	fn handle_urc(&mut self, urc: Urc) {
		match urc {
			Urc::DataAvailable { channel } => self.registry.deliver_data_available(channel),
			Urc::Closed { channel } => self.registry.deliver_closed(channel),
			Urc::NewMessage { index } => match *self.on_new_message {
				Some(ref mut callback) => callback(index),
				None => debug!("No one wants new message {}", index),
			},
		}
	}
}

impl<T, S> Modem<T, S>
where
	T: Transport,
	S: Scheduler,
{
	fn wait_rxget_header(&mut self) -> Option<i64> {
		let timeout = self.config.command_timeout_ms;
		let mut notices = Notices {
			registry: &mut self.registry,
			on_new_message: &mut self.on_new_message,
		};
		self.dispatcher.wait_rxget_header(&mut notices, timeout)
	}

	/// Wait for the `OK` / `ERROR` which ends most things.
	fn wait_ok(&mut self) -> Response {
		let timeout = self.config.command_timeout_ms;
		self.wait_response(timeout, &Terminators::new(&[GSM_OK, GSM_ERROR]))
	}

	fn modem_connect(&mut self, channel: u8, security: Security, host: &str, port: u16) -> bool {
		match security {
			Security::Secure => {
				if !self.command("+CIPSSL=1").is_ok() {
					warn!("Modem refused SSL on channel {}", channel);
					return false;
				}
				self.ssl_enabled = true;
			}
			Security::Plain if self.ssl_enabled => {
				if self.command("+CIPSSL=0").is_ok() {
					self.ssl_enabled = false;
				}
			}
			Security::Plain => {}
		}
		self.send_at(&format!("+CIPSTART={},\"TCP\",\"{}\",{}", channel, host, port));
		let timeout = self.config.connect_timeout_ms;
		let rsp = self.wait_response(timeout, &Terminators::new(&CONNECT_TERMINATORS));
		if !rsp.is_ok() {
			debug!("CIPSTART on {} gave #{}", channel, rsp.index);
		}
		rsp.is_ok()
	}

	fn modem_send(&mut self, channel: u8, data: &[u8]) -> usize {
		let timeout = self.config.command_timeout_ms;
		self.send_at(&format!("+CIPSEND={},{}", channel, data.len()));
		if !self.wait_response(timeout, &Terminators::new(&[SEND_PROMPT])).is_ok() {
			return 0;
		}
		self.dispatcher.write_raw(data);
		if let Some(terminator) = self.config.send_terminator {
			self.dispatcher.write_raw(&[terminator]);
		}
		self.dispatcher.flush();
		if !self.wait_response(timeout, &Terminators::new(&[SEND_ACCEPT])).is_ok() {
			return 0;
		}
		// Skip the channel
		self.dispatcher.skip_until(b',');
		let accepted = self.dispatcher.read_int_until(b'\n');
		if accepted < 0 {
			0
		} else {
			accepted as usize
		}
	}

	/// Fetch up to `size` octets into the socket's buffer. Returns how many
	/// the modem sent.
	fn modem_read(&mut self, handle: SocketHandle, size: usize) -> usize {
		let encoding = self.config.fetch_encoding;
		self.send_at(&format!(
			"+CIPRXGET={},{},{}",
			encoding.mode(),
			handle.channel(),
			size
		));
		match self.wait_rxget_header() {
			Some(mode) if mode == i64::from(encoding.mode()) => {}
			Some(mode) => {
				warn!("Unexpected fetch mode {}", mode);
				return 0;
			}
			None => return 0,
		}
		// Skip the channel
		self.dispatcher.skip_until(b',');
		let len = self.dispatcher.read_int_until(b',').max(0) as usize;
		let remaining = self.dispatcher.read_int_until(b'\n').max(0) as usize;
		let stream_timeout = self.config.stream_timeout_ms;
		let mut dropped = 0;
		let mut received = 0;
		for _ in 0..len {
			let byte = match encoding {
				FetchEncoding::Raw => self.dispatcher.read_byte(stream_timeout),
				FetchEncoding::Hex => {
					let hi = self.dispatcher.read_byte(stream_timeout);
					let lo = self.dispatcher.read_byte(stream_timeout);
					match (hi, lo) {
						(Some(hi), Some(lo)) => Some(decode_hex(hi, lo)),
						_ => None,
					}
				}
			};
			let byte = match byte {
				Some(b) => b,
				None => {
					warn!("Fetch on {} stopped after {} of {}", handle, received, len);
					break;
				}
			};
			received += 1;
			match self.registry.get_mut(handle) {
				Some(sock) => {
					if !sock.rx.push(byte) {
						dropped += 1;
					}
				}
				None => dropped += 1,
			}
		}
		if dropped > 0 {
			warn!("Dropped {} octets on {}", dropped, handle);
		}
		if let Some(sock) = self.registry.get_mut(handle) {
			sock.available = remaining;
		}
		self.wait_ok();
		trace!("Fetched {} octets on {}, {} remain", received, handle, remaining);
		received
	}

	/// How much the modem holds for this socket. If it's nothing, check the
	/// connection is still up.
	fn modem_get_available(&mut self, handle: SocketHandle) -> usize {
		let channel = handle.channel();
		self.send_at(&format!("+CIPRXGET=4,{}", channel));
		let mut result = 0;
		if self.wait_rxget_header().is_some() {
			// Skip the channel
			self.dispatcher.skip_until(b',');
			result = self.dispatcher.read_int_until(b'\n').max(0) as usize;
			self.wait_ok();
		}
		if result == 0 && !self.modem_get_connected(channel) {
			if let Some(sock) = self.registry.get_mut(handle) {
				if sock.state == SocketState::Connected {
					sock.mark_closed();
				}
			}
		}
		result
	}

	fn modem_get_connected(&mut self, channel: u8) -> bool {
		let timeout = self.config.command_timeout_ms;
		self.send_at(&format!("+CIPSTATUS={}", channel));
		let rsp = self.wait_response(timeout, &Terminators::new(&STATUS_TERMINATORS));
		self.wait_ok();
		rsp.is_ok()
	}
}

/// Two hex digits to an octet. Bad digits give 0.
fn decode_hex(hi: u8, lo: u8) -> u8 {
	let digits = [hi, lo];
	let text = String::from_utf8_lossy(&digits);
	match u8::from_str_radix(&text, 16) {
		Ok(b) => b,
		Err(_) => {
			warn!("Bad hex in fetch: {:?}", text);
			0
		}
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use config::Config;
	use mock::{MockModem, MockScheduler};
	use std::cell::Cell;
	use std::io;
	use std::rc::Rc;
	use std::sync::mpsc;
	use transport::Transport;

	/// A clock which the line below can see
	#[derive(Clone, Default)]
	struct Ticks(Rc<Cell<u64>>);

	impl Scheduler for Ticks {
		fn millis(&mut self) -> u64 {
			self.0.get()
		}

		fn yield_now(&mut self) {
			self.0.set(self.0.get() + 1);
		}
	}

	/// A slow serial line: at most one octet per tick
	struct Trickle {
		mock: MockModem,
		clock: Ticks,
		last: Option<u64>,
	}

	impl Transport for Trickle {
		fn read_byte(&mut self) -> io::Result<Option<u8>> {
			let now = self.clock.millis();
			if self.last == Some(now) {
				return Ok(None);
			}
			let b = self.mock.read_byte()?;
			if b.is_some() {
				self.last = Some(now);
			}
			Ok(b)
		}

		fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
			self.mock.write_all(data)
		}

		fn flush(&mut self) -> io::Result<()> {
			self.mock.flush()
		}
	}

	fn make(config: Config) -> (MockModem, Modem<MockModem, MockScheduler>) {
		let _ = ::env_logger::try_init();
		let mock = MockModem::new();
		let modem = Modem::new(mock.clone(), MockScheduler::new(), config);
		(mock, modem)
	}

	/// A socket on `channel` which the modem thinks is connected
	fn connected(channel: u8) -> (MockModem, Modem<MockModem, MockScheduler>, SocketHandle) {
		let (mock, mut modem) = make(Config::default());
		mock.on("+CIPCLOSE", "\r\nERROR\r\n");
		mock.once("+CIPSTART", &format!("\r\nOK\r\n\r\n{}, CONNECT OK\r\n", channel));
		let h = modem.socket(channel, Security::Plain).unwrap();
		assert!(modem.connect(h, "example.com", 80));
		mock.clear_written();
		(mock, modem, h)
	}

	#[test]
	fn connect_ok() {
		let (mock, mut modem) = make(Config::default());
		mock.on("+CIPCLOSE", "\r\nERROR\r\n");
		mock.once("+CIPSTART", "\r\nOK\r\n\r\n1, CONNECT OK\r\n");
		let h = modem.socket(1, Security::Plain).unwrap();
		assert!(modem.connect(h, "example.com", 80));
		assert!(modem.is_connected(h));
		assert_eq!(
			mock.commands(),
			vec!["+CIPCLOSE=1", "+CIPSTART=1,\"TCP\",\"example.com\",80"]
		);
	}

	#[test]
	fn connect_fail() {
		let (mock, mut modem) = make(Config::default());
		mock.on("+CIPCLOSE", "\r\nERROR\r\n");
		mock.once("+CIPSTART", "\r\nOK\r\n\r\n1, CONNECT FAIL\r\n");
		let h = modem.socket(1, Security::Plain).unwrap();
		assert!(!modem.connect(h, "example.com", 80));
		assert_eq!(modem.state(h), Some(SocketState::Closed));
	}

	#[test]
	fn connect_times_out() {
		let mut config = Config::default();
		config.connect_timeout_ms = 100;
		let (mock, mut modem) = make(config);
		mock.on("+CIPCLOSE", "\r\nERROR\r\n");
		mock.once("+CIPSTART", "\r\nOK\r\n");
		let h = modem.socket(0, Security::Plain).unwrap();
		assert!(!modem.connect(h, "example.com", 80));
		assert!(!modem.is_connected(h));
	}

	#[test]
	fn secure_connect_toggles_ssl() {
		let (mock, mut modem) = make(Config::default());
		mock.on("+CIPCLOSE", "\r\nERROR\r\n");
		mock.on("+CIPSSL", "\r\nOK\r\n");
		mock.on("+CIPSTART=0", "\r\nOK\r\n\r\n0, CONNECT OK\r\n");
		mock.on("+CIPSTART=1", "\r\nOK\r\n\r\n1, CONNECT OK\r\n");
		let secure = modem.socket(0, Security::Secure).unwrap();
		assert!(modem.connect(secure, "example.com", 443));
		let plain = modem.socket(1, Security::Plain).unwrap();
		assert!(modem.connect(plain, "example.com", 80));
		let again = modem.socket(1, Security::Plain).unwrap();
		assert!(modem.connect(again, "example.com", 80));
		assert_eq!(mock.count("+CIPSSL=1"), 1);
		// Only turned off once, as it was only on once
		assert_eq!(mock.count("+CIPSSL=0"), 1);
	}

	#[test]
	fn ssl_refused_aborts_connect() {
		let (mock, mut modem) = make(Config::default());
		mock.on("+CIPCLOSE", "\r\nERROR\r\n");
		mock.on("+CIPSSL", "\r\nERROR\r\n");
		let h = modem.socket(0, Security::Secure).unwrap();
		assert!(!modem.connect(h, "example.com", 443));
		assert_eq!(mock.count("+CIPSTART"), 0);
		assert_eq!(modem.state(h), Some(SocketState::Closed));
	}

	#[test]
	fn connect_ip_uses_dotted_quad() {
		let (mock, mut modem) = make(Config::default());
		mock.on("+CIPCLOSE", "\r\nERROR\r\n");
		mock.once("+CIPSTART", "\r\nOK\r\n\r\n2, CONNECT OK\r\n");
		let h = modem.socket(2, Security::Plain).unwrap();
		assert!(modem.connect_ip(h, Ipv4Addr::new(10, 0, 0, 1), 8080));
		assert_eq!(mock.count("+CIPSTART=2,\"TCP\",\"10.0.0.1\",8080"), 1);
	}

	#[test]
	fn write_is_accepted() {
		let (mock, mut modem, h) = connected(0);
		mock.once_with_payload("+CIPSEND=0,10", "\r\n>", 10, "\r\nDATA ACCEPT:0,10\r\n");
		assert_eq!(modem.write(h, b"0123456789"), 10);
		let mut expected = b"AT+CIPSEND=0,10\r\n0123456789".to_vec();
		expected.push(0x1A);
		assert_eq!(mock.written(), expected);
	}

	#[test]
	fn write_without_prompt_is_zero() {
		let (mock, mut modem, h) = connected(0);
		mock.once("+CIPSEND", "\r\nERROR\r\n");
		assert_eq!(modem.write(h, b"abc"), 0);
		// Nothing to write, nothing sent
		mock.clear_written();
		assert_eq!(modem.write(h, b""), 0);
		assert!(mock.written().is_empty());
	}

	#[test]
	fn read_with_nothing_available_sends_no_fetch() {
		let (mock, mut modem, h) = connected(0);
		let mut buf = [0u8; 16];
		assert_eq!(modem.read(h, &mut buf), 0);
		assert_eq!(mock.count("+CIPRXGET"), 0);
	}

	#[test]
	fn data_notice_then_read() {
		let (mock, mut modem, h) = connected(3);
		mock.once("+CIPRXGET=4,3", "\r\n+CIPRXGET: 4,3,5\r\n\r\nOK\r\n");
		mock.once("+CIPRXGET=2,3,64", "\r\n+CIPRXGET: 2,3,5,0\r\nhello\r\nOK\r\n");
		mock.inject(b"\r\n+CIPRXGET: 1,3\r\n");
		let mut buf = [0u8; 16];
		assert_eq!(modem.read(h, &mut buf), 5);
		assert_eq!(&buf[..5], b"hello");
		assert_eq!(modem.socket_info(h).unwrap().modem_available(), 0);
		assert_eq!(mock.count("+CIPRXGET=2"), 1);
	}

	#[test]
	fn hex_fetch() {
		let mut config = Config::default();
		config.fetch_encoding = FetchEncoding::Hex;
		let (mock, mut modem) = make(config);
		mock.on("+CIPCLOSE", "\r\nERROR\r\n");
		mock.once("+CIPSTART", "\r\nOK\r\n\r\n0, CONNECT OK\r\n");
		let h = modem.socket(0, Security::Plain).unwrap();
		assert!(modem.connect(h, "example.com", 80));
		mock.once("+CIPRXGET=4,0", "\r\n+CIPRXGET: 4,0,3\r\n\r\nOK\r\n");
		mock.once("+CIPRXGET=3,0,64", "\r\n+CIPRXGET: 3,0,3,0\r\n00FFzz\r\nOK\r\n");
		mock.inject(b"\r\n+CIPRXGET: 1,0\r\n");
		let mut buf = [0u8; 8];
		assert_eq!(modem.read(h, &mut buf), 3);
		assert_eq!(&buf[..3], &[0x00, 0xFF, 0x00]);
	}

	#[test]
	fn available_polls_an_idle_socket() {
		let (mock, mut modem, h) = connected(0);
		mock.on("+CIPRXGET=4,0", "\r\n+CIPRXGET: 4,0,7\r\n\r\nOK\r\n");
		assert_eq!(modem.available(h), 7);
		assert_eq!(mock.count("+CIPRXGET=4"), 1);
		// Too soon to ask again
		assert_eq!(modem.available(h), 7);
		assert_eq!(mock.count("+CIPRXGET=4"), 1);
		modem.delay(500);
		assert_eq!(modem.available(h), 7);
		assert_eq!(mock.count("+CIPRXGET=4"), 2);
		assert!(modem.connected(h));
	}

	#[test]
	fn status_check_notices_lost_link() {
		let (mock, mut modem, h) = connected(0);
		mock.on("+CIPRXGET=4,0", "\r\n+CIPRXGET: 4,0,0\r\n\r\nOK\r\n");
		mock.on(
			"+CIPSTATUS=0",
			"\r\n+CIPSTATUS: 0,0,\"TCP\",\"1.2.3.4\",\"80\",\"CLOSED\"\r\n\r\nOK\r\n",
		);
		assert_eq!(modem.available(h), 0);
		assert_eq!(modem.state(h), Some(SocketState::Closed));
		assert!(!modem.connected(h));
	}

	#[test]
	fn status_check_keeps_live_link() {
		let (mock, mut modem, h) = connected(0);
		mock.on("+CIPRXGET=4,0", "\r\n+CIPRXGET: 4,0,0\r\n\r\nOK\r\n");
		mock.on(
			"+CIPSTATUS=0",
			"\r\n+CIPSTATUS: 0,0,\"TCP\",\"1.2.3.4\",\"80\",\"CONNECTED\"\r\n\r\nOK\r\n",
		);
		assert_eq!(modem.available(h), 0);
		assert!(modem.is_connected(h));
	}

	#[test]
	fn closed_notice_during_command() {
		let (mock, mut modem, h) = connected(2);
		mock.once("+CSQ", "\r\n+CSQ: 17,0\r\n\r\n2, CLOSED\r\n\r\nOK\r\n");
		assert!(modem.command("+CSQ").is_ok());
		assert_eq!(modem.state(h), Some(SocketState::Closed));
		// Exactly once: nothing left over to close it again
		assert_eq!(mock.unread(), 0);
	}

	#[test]
	fn close_twice_is_close_once() {
		let (mock, mut modem, h) = connected(1);
		mock.on("+CIPCLOSE", "\r\n1, CLOSE OK\r\n");
		modem.close(h);
		let after_one = (modem.state(h), modem.available(h));
		modem.close(h);
		assert_eq!((modem.state(h), modem.available(h)), after_one);
		assert_eq!(after_one, (Some(SocketState::Closed), 0));
		assert_eq!(mock.count("+CIPCLOSE=1"), 2);
	}

	#[test]
	fn stale_handles_do_nothing() {
		let (mock, mut modem, old) = connected(0);
		let new = modem.socket(0, Security::Plain).unwrap();
		let mut buf = [0u8; 4];
		assert_eq!(modem.read(old, &mut buf), 0);
		assert_eq!(modem.write(old, b"abc"), 0);
		assert_eq!(modem.available(old), 0);
		assert!(!modem.connect(old, "example.com", 80));
		modem.close(old);
		assert!(mock.commands().is_empty());
		assert_eq!(modem.state(old), None);
		assert_eq!(modem.state(new), Some(SocketState::Idle));
	}

	#[test]
	fn new_message_callback() {
		let (mock, mut modem) = make(Config::default());
		let (tx, rx) = mpsc::channel();
		modem.set_new_message_callback(move |index| {
			let _ = tx.send(index);
		});
		mock.once("+CSQ", "\r\n+CMTI: \"SM\",3\r\n\r\n+CSQ: 9,0\r\n\r\nOK\r\n");
		assert!(modem.command("+CSQ").is_ok());
		assert_eq!(rx.try_recv(), Ok(3));
	}

	#[test]
	fn data_notice_at_start_of_response() {
		let (mock, mut modem, h) = connected(2);
		mock.once("+CSQ", "+CIPRXGET: 1,2\r\nOK\r\n");
		let rsp = modem.command("+CSQ");
		assert_eq!(rsp.index, 1);
		assert!(modem.socket_info(h).unwrap().needs_poll());
	}

	#[test]
	fn maintain_sees_notice_split_across_polls() {
		let _ = ::env_logger::try_init();
		let mock = MockModem::new();
		let clock = Ticks::default();
		let line = Trickle {
			mock: mock.clone(),
			clock: clock.clone(),
			last: None,
		};
		let mut modem = Modem::new(line, clock, Config::default());
		mock.on("+CIPCLOSE", "\r\nERROR\r\n");
		mock.once("+CIPSTART", "\r\nOK\r\n\r\n2, CONNECT OK\r\n");
		let h = modem.socket(2, Security::Plain).unwrap();
		assert!(modem.connect(h, "example.com", 80));
		// Longer than one idle poll takes to read, at one octet per tick
		mock.inject(b"\r\n2, CLOSED\r\n");
		modem.delay(1);
		modem.maintain();
		assert_eq!(mock.unread(), 0);
		assert_eq!(modem.state(h), Some(SocketState::Closed));
	}

	#[test]
	fn maintain_drains_notices() {
		let (mock, mut modem, h) = connected(4);
		mock.inject(b"\r\n4, CLOSED\r\n");
		modem.maintain();
		assert_eq!(mock.unread(), 0);
		assert_eq!(modem.state(h), Some(SocketState::Closed));
	}

	#[test]
	fn ping() {
		let (mock, mut modem) = make(Config::default());
		assert!(!modem.test_at(1_000));
		assert!(mock.count("") > 1);
		mock.on("", "\r\nOK\r\n");
		assert!(modem.test_at(1_000));
	}

	#[test]
	fn ssl_support() {
		let (mock, mut modem) = make(Config::default());
		mock.once("+CIPSSL=?", "\r\n+CIPSSL: (0,1)\r\n\r\nOK\r\n");
		assert!(modem.has_ssl());
		assert!(!modem.has_ssl());
	}

	#[test]
	fn client_reads_and_writes() {
		use std::io::{ErrorKind, Read, Write};
		let (mock, mut modem, h) = connected(0);
		mock.once_with_payload("+CIPSEND=0,2", ">", 2, "\r\nDATA ACCEPT:0,2\r\n");
		{
			let mut client = modem.client(h);
			assert_eq!(client.write(b"hi").unwrap(), 2);
			let mut buf = [0u8; 4];
			assert_eq!(client.read(&mut buf).unwrap_err().kind(), ErrorKind::WouldBlock);
		}
		mock.on("+CIPCLOSE", "\r\n0, CLOSE OK\r\n");
		modem.close(h);
		let mut client = modem.client(h);
		let mut buf = [0u8; 4];
		assert_eq!(client.read(&mut buf).unwrap(), 0);
		assert_eq!(client.write(b"x").unwrap_err().kind(), ErrorKind::NotConnected);
	}

	#[test]
	fn hex_digits() {
		assert_eq!(decode_hex(b'4', b'1'), 0x41);
		assert_eq!(decode_hex(b'f', b'f'), 0xFF);
		assert_eq!(decode_hex(b'g', b'0'), 0);
	}
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
