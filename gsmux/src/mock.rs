//! # mock - A scripted modem, for tests
//!
//! `MockModem` is a `Transport` which answers AT commands from a list of
//! rules. Each rule names a command prefix (what follows `AT`) and the
//! octets to send back when a matching command line arrives. A rule can
//! also say that the command is followed by a fixed-length payload, as with
//! `AT+CIPSEND`, in which case the second reply goes out once the payload
//! has been written. Unsolicited notices can be pushed in at any time.
//!
//! Clones share state, so a test can keep one clone to poke at while the
//! modem session owns the other.
//!
//! `MockScheduler` is a clock which only moves when someone yields, so
//! timeouts in tests take no real time at all.

// ****************************************************************************
//
// Imports
//
// ****************************************************************************

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use config::SUB;
use scheduler::Scheduler;
use transport::Transport;

// ****************************************************************************
//
// Public Types
//
// ****************************************************************************

/// A scripted modem.
#[derive(Clone, Default)]
pub struct MockModem {
	inner: Arc<Mutex<Inner>>,
}

/// A clock that advances one millisecond per yield.
#[derive(Debug, Clone, Default)]
pub struct MockScheduler {
	now: u64,
}

// ****************************************************************************
//
// Private Types
//
// ****************************************************************************

#[derive(Default)]
struct Inner {
	/// Waiting to be read by the host
	to_host: VecDeque<u8>,
	/// Everything the host has written
	written: Vec<u8>,
	/// Command lines the host has sent, without `AT` and CRLF
	commands: Vec<String>,
	/// The command line being built up
	line: Vec<u8>,
	/// Payload octets still expected, and what to send when they've arrived
	payload: Option<(usize, Vec<u8>)>,
	rules: Vec<Rule>,
}

struct Rule {
	prefix: String,
	reply: Vec<u8>,
	payload: Option<(usize, Vec<u8>)>,
	once: bool,
}

// ****************************************************************************
//
// Public Functions
//
// ****************************************************************************

impl MockModem {
	pub fn new() -> MockModem {
		MockModem::default()
	}

	/// Answer every command starting `AT<prefix>` with `reply`. Later rules
	/// are tried first, so they can override earlier ones.
	pub fn on(&self, prefix: &str, reply: &str) {
		self.add(prefix, reply.as_bytes(), None, false);
	}

	/// As `on`, but only for the next matching command.
	pub fn once(&self, prefix: &str, reply: &str) {
		self.add(prefix, reply.as_bytes(), None, true);
	}

	/// As `on`, with octets rather than text.
	pub fn on_bytes(&self, prefix: &str, reply: &[u8]) {
		self.add(prefix, reply, None, false);
	}

	/// Answer the next matching command with `prompt`, then wait for
	/// `length` payload octets and answer those with `reply`.
	pub fn once_with_payload(&self, prefix: &str, prompt: &str, length: usize, reply: &str) {
		self.add(
			prefix,
			prompt.as_bytes(),
			Some((length, reply.as_bytes().to_vec())),
			true,
		);
	}

	/// Send something the host didn't ask for.
	pub fn inject(&self, data: &[u8]) {
		self.lock().to_host.extend(data.iter().cloned());
	}

	/// Everything written so far.
	pub fn written(&self) -> Vec<u8> {
		self.lock().written.clone()
	}

	/// Every command line sent so far, without the `AT` and CRLF.
	pub fn commands(&self) -> Vec<String> {
		self.lock().commands.clone()
	}

	/// How many commands starting `AT<prefix>` have been sent.
	pub fn count(&self, prefix: &str) -> usize {
		self.lock()
			.commands
			.iter()
			.filter(|c| c.starts_with(prefix))
			.count()
	}

	/// Forget what's been written.
	pub fn clear_written(&self) {
		let mut inner = self.lock();
		inner.written.clear();
		inner.commands.clear();
	}

	/// Octets the host hasn't read yet.
	pub fn unread(&self) -> usize {
		self.lock().to_host.len()
	}
}

impl Transport for MockModem {
	fn read_byte(&mut self) -> io::Result<Option<u8>> {
		Ok(self.lock().to_host.pop_front())
	}

	fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
		let mut inner = self.lock();
		for &b in data {
			inner.receive(b);
		}
		Ok(())
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

impl fmt::Debug for MockModem {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "MockModem {{ unread: {} }}", self.unread())
	}
}

impl MockScheduler {
	pub fn new() -> MockScheduler {
		MockScheduler::default()
	}
}

impl Scheduler for MockScheduler {
	fn millis(&mut self) -> u64 {
		self.now
	}

	fn yield_now(&mut self) {
		self.now += 1;
	}
}

// ****************************************************************************
//
// Private Functions
//
// ****************************************************************************

impl MockModem {
	fn lock(&self) -> MutexGuard<Inner> {
		match self.inner.lock() {
			Ok(guard) => guard,
			// A test thread panicked while holding the lock; the state
			// is still good enough to look at
			Err(poisoned) => poisoned.into_inner(),
		}
	}

	fn add(&self, prefix: &str, reply: &[u8], payload: Option<(usize, Vec<u8>)>, once: bool) {
		self.lock().rules.push(Rule {
			prefix: prefix.to_owned(),
			reply: reply.to_vec(),
			payload: payload,
			once: once,
		});
	}
}

impl Inner {
	fn receive(&mut self, b: u8) {
		self.written.push(b);
		if let Some((remaining, reply)) = self.payload.take() {
			if remaining > 1 {
				self.payload = Some((remaining - 1, reply));
			} else {
				self.to_host.extend(reply);
			}
			return;
		}
		match b {
			SUB => {}
			b'\n' => {
				let line = String::from_utf8_lossy(&self.line).trim().to_owned();
				self.line.clear();
				if line.starts_with("AT") {
					self.command(line[2..].to_owned());
				}
			}
			_ => self.line.push(b),
		}
	}

	fn command(&mut self, command: String) {
		let found = self
			.rules
			.iter()
			.rposition(|r| command.starts_with(r.prefix.as_str()));
		if let Some(idx) = found {
			let (reply, payload) = if self.rules[idx].once {
				let rule = self.rules.remove(idx);
				(rule.reply, rule.payload)
			} else {
				let rule = &self.rules[idx];
				(rule.reply.clone(), rule.payload.clone())
			};
			self.to_host.extend(reply);
			self.payload = match payload {
				Some((0, after)) => {
					self.to_host.extend(after);
					None
				}
				p => p,
			};
		}
		self.commands.push(command);
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn drain(m: &mut MockModem) -> Vec<u8> {
		let mut out = Vec::new();
		while let Some(b) = m.read_byte().unwrap() {
			out.push(b);
		}
		out
	}

	#[test]
	fn later_rules_win_and_once_rules_expire() {
		let mut m = MockModem::new();
		m.on("+CSQ", "A");
		m.once("+CSQ", "B");
		m.write_all(b"AT+CSQ\r\n").unwrap();
		m.write_all(b"AT+CSQ\r\n").unwrap();
		m.write_all(b"AT+COPS?\r\n").unwrap();
		assert_eq!(drain(&mut m), b"BA".to_vec());
		assert_eq!(m.commands(), vec!["+CSQ", "+CSQ", "+COPS?"]);
		assert_eq!(m.count("+C"), 3);
	}

	#[test]
	fn payload_then_reply() {
		let mut m = MockModem::new();
		m.once_with_payload("+CIPSEND=0,3", ">", 3, "ACK");
		m.write_all(b"AT+CIPSEND=0,3\r\n").unwrap();
		assert_eq!(drain(&mut m), b">".to_vec());
		m.write_all(b"ab").unwrap();
		assert_eq!(m.unread(), 0);
		m.write_all(b"\n\x1a").unwrap();
		assert_eq!(drain(&mut m), b"ACK".to_vec());
		assert_eq!(m.commands().len(), 1);
	}

	#[test]
	fn scheduler_moves_on_yield() {
		let mut s = MockScheduler::new();
		assert_eq!(s.millis(), 0);
		s.delay(25);
		assert_eq!(s.millis(), 25);
	}
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
