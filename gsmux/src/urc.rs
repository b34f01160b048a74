//! # urc - Unsolicited result codes
//!
//! The modem tells us about some things without being asked:
//!
//! * `+CIPRXGET: 1,<ch>` - data has arrived on channel `<ch>`;
//! * `<ch>, CLOSED` - the far end closed channel `<ch>`;
//! * `+CMTI: "<mem>",<index>` - an SMS has been stored at `<index>`.
//!
//! These can turn up at any point, including half way through the response
//! to some unrelated command. The dispatcher checks for the markers after
//! every octet it receives and, when one is found, parses the rest of the
//! notice and hands a `Urc` to a `UrcHandler`. The notice is then forgotten
//! about - it never counts towards matching a terminator.

// ****************************************************************************
//
// Imports
//
// ****************************************************************************

use config::MUX_COUNT;

// ****************************************************************************
//
// Public Types
//
// ****************************************************************************

/// A decoded unsolicited notice.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Urc {
	/// The modem is holding data for this channel
	DataAvailable { channel: u8 },
	/// This channel's connection has gone
	Closed { channel: u8 },
	/// A new SMS has arrived and been stored at this index
	NewMessage { index: u32 },
}

/// Whoever wants to know about unsolicited notices. Called synchronously from
/// inside the dispatcher's wait loop, so implementations must be quick and
/// must not try to talk to the modem.
pub trait UrcHandler {
	fn handle_urc(&mut self, urc: Urc);
}

/// Which socket notice marker the received text currently ends with.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Marker {
	/// `+CIPRXGET:` at the start of a line - mode (and maybe channel)
	/// follow on the wire
	RxGet,
	/// `CLOSED\r\n` - the channel is already in the received text
	Closed,
}

// ****************************************************************************
//
// Public Data
//
// ****************************************************************************

pub const NEW_MESSAGE_MARKER: &[u8] = b"+CMTI:";
pub const RXGET_MARKER: &[u8] = b"+CIPRXGET:";
pub const CLOSED_MARKER: &[u8] = b"CLOSED\r\n";

/// `+CIPRXGET` mode used by the modem's own data-available notice
pub const RXGET_MODE_NOTICE: i64 = 1;

// ****************************************************************************
//
// Public Functions
//
// ****************************************************************************

/// Is the new-message marker at the end of `text`, at the start of a line?
/// This one is checked before the caller's terminators.
pub fn new_message_marker(text: &[u8]) -> bool {
	ends_line_with(text, NEW_MESSAGE_MARKER)
}

/// Do any of the socket markers end `text`? These are checked after the
/// caller's terminators, so a caller can wait for `+CIPRXGET:` itself.
pub fn socket_marker(text: &[u8]) -> Option<Marker> {
	if ends_line_with(text, RXGET_MARKER) {
		Some(Marker::RxGet)
	} else if text.ends_with(CLOSED_MARKER) {
		Some(Marker::Closed)
	} else {
		None
	}
}

/// Pull the channel out of text ending `<ch>, CLOSED\r\n`. The channel
/// starts the line the marker is on.
pub fn closed_channel(text: &[u8]) -> Option<u8> {
	if !text.ends_with(CLOSED_MARKER) {
		return None;
	}
	let body = &text[..text.len() - CLOSED_MARKER.len()];
	let line_start = match find_last(body, b"\r\n") {
		Some(pos) => pos + 2,
		None => 0,
	};
	let line = &body[line_start..];
	let field = match line.iter().position(|&b| b == b',') {
		Some(comma) => &line[..comma],
		None => return None,
	};
	parse_channel(field)
}

/// Strictly parse a channel number: optional surrounding whitespace, then
/// digits, and it must be in range.
pub fn parse_channel(field: &[u8]) -> Option<u8> {
	let s = String::from_utf8_lossy(field);
	match s.trim().parse::<u8>() {
		Ok(ch) if (ch as usize) < MUX_COUNT => Some(ch),
		_ => None,
	}
}

/// Leniently parse a number the way the modem's fields need: skip leading
/// whitespace, take an optional sign and as many digits as there are, and
/// ignore the rest. No digits gives 0.
pub fn parse_int(field: &[u8]) -> i64 {
	let mut iter = field
		.iter()
		.cloned()
		.skip_while(|b| b.is_ascii_whitespace())
		.peekable();
	let negative = match iter.peek() {
		Some(&b'-') => {
			iter.next();
			true
		}
		Some(&b'+') => {
			iter.next();
			false
		}
		_ => false,
	};
	let mut value: i64 = 0;
	for b in iter {
		if !b.is_ascii_digit() {
			break;
		}
		value = value.saturating_mul(10).saturating_add(i64::from(b - b'0'));
	}
	if negative {
		-value
	} else {
		value
	}
}

// ****************************************************************************
//
// Private Functions
//
// ****************************************************************************

/// `text` ends with `marker`, and the marker starts either `text` or a line.
fn ends_line_with(text: &[u8], marker: &[u8]) -> bool {
	if !text.ends_with(marker) {
		return false;
	}
	let before = &text[..text.len() - marker.len()];
	before.is_empty() || before.ends_with(b"\r\n")
}

fn find_last(haystack: &[u8], needle: &[u8]) -> Option<usize> {
	if haystack.len() < needle.len() {
		return None;
	}
	(0..haystack.len() - needle.len() + 1)
		.rev()
		.find(|&i| &haystack[i..i + needle.len()] == needle)
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn markers() {
		assert!(new_message_marker(b"junk\r\n+CMTI:"));
		assert!(new_message_marker(b"+CMTI:"));
		assert!(!new_message_marker(b"junk+CMTI:"));
		assert_eq!(socket_marker(b"\r\n+CIPRXGET:"), Some(Marker::RxGet));
		assert_eq!(socket_marker(b"+CIPRXGET:"), Some(Marker::RxGet));
		assert_eq!(socket_marker(b"AT+CIPRXGET:"), None);
		assert_eq!(socket_marker(b"\r\n1, CLOSED\r\n"), Some(Marker::Closed));
		assert_eq!(socket_marker(b"CLOSE OK\r\n"), None);
	}

	#[test]
	fn closed_channel_from_last_line() {
		assert_eq!(closed_channel(b"\r\n3, CLOSED\r\n"), Some(3));
		assert_eq!(closed_channel(b"2, CLOSED\r\n"), Some(2));
		assert_eq!(closed_channel(b"\r\nOK\r\n\r\n4, CLOSED\r\n"), Some(4));
		// No channel - must not be mistaken for channel 0
		assert_eq!(closed_channel(b"\r\nCLOSED\r\n"), None);
		assert_eq!(closed_channel(b"\r\nx, CLOSED\r\n"), None);
		// Out of range
		assert_eq!(closed_channel(b"\r\n9, CLOSED\r\n"), None);
	}

	#[test]
	fn lenient_ints() {
		assert_eq!(parse_int(b" 1"), 1);
		assert_eq!(parse_int(b"10\r"), 10);
		assert_eq!(parse_int(b"-5,"), -5);
		assert_eq!(parse_int(b"\"SM\""), 0);
		assert_eq!(parse_int(b""), 0);
	}
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
