//! # config - Tunables for a modem session
//!
//! The sizes here are fixed at compile time, as they set the size of arrays
//! held in the session. The timeouts are all per-session and may be changed
//! through `Config`.

// ****************************************************************************
//
// Public Types
//
// ****************************************************************************

/// How payload is fetched from the modem with `AT+CIPRXGET`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FetchEncoding {
	/// Mode 2 - the payload octets are passed through as-is.
	Raw,
	/// Mode 3 - each payload octet arrives as two hex digits. Slower, but
	/// safe on links which mangle control characters.
	Hex,
}

/// Per-session settings. All timeouts are in milliseconds.
#[derive(Debug, Clone)]
pub struct Config {
	/// Default wait for `OK` / `ERROR` after a command.
	pub command_timeout_ms: u32,
	/// How long `AT+CIPSTART` may take to report.
	pub connect_timeout_ms: u32,
	/// How long `test_at` keeps knocking before giving up.
	pub init_timeout_ms: u32,
	/// Limit for reading one comma or newline delimited field.
	pub stream_timeout_ms: u32,
	/// Limit for skipping forward to a delimiter.
	pub skip_timeout_ms: u32,
	/// Length of one idle poll when draining unsolicited notices.
	pub idle_poll_timeout_ms: u32,
	/// Minimum gap between forced availability checks on an idle socket.
	/// The SIM800 sometimes forgets to tell us data has arrived.
	pub poll_interval_ms: u32,
	/// Raw or hex payload fetches.
	pub fetch_encoding: FetchEncoding,
	/// Octet written after the payload of a `AT+CIPSEND`, if any.
	pub send_terminator: Option<u8>,
}

// ****************************************************************************
//
// Public Data
//
// ****************************************************************************

/// Number of TCP channels the modem multiplexes.
pub const MUX_COUNT: usize = 5;

/// Capacity of each socket's receive buffer.
pub const RX_BUFFER_SIZE: usize = 64;

/// Cap on the text accumulated while waiting for a terminator.
pub const RESPONSE_BUFFER_SIZE: usize = 256;

/// Most terminators a single wait will look for.
pub const MAX_TERMINATORS: usize = 5;

/// Ctrl-Z
pub const SUB: u8 = 0x1A;

// ****************************************************************************
//
// Public Functions
//
// ****************************************************************************

impl FetchEncoding {
	/// The `AT+CIPRXGET` mode number for this encoding.
	pub fn mode(&self) -> u8 {
		match *self {
			FetchEncoding::Raw => 2,
			FetchEncoding::Hex => 3,
		}
	}
}

impl Default for Config {
	fn default() -> Config {
		Config {
			command_timeout_ms: 1_000,
			connect_timeout_ms: 75_000,
			init_timeout_ms: 10_000,
			stream_timeout_ms: 1_000,
			skip_timeout_ms: 3_000,
			idle_poll_timeout_ms: 10,
			poll_interval_ms: 500,
			fetch_encoding: FetchEncoding::Raw,
			send_terminator: Some(SUB),
		}
	}
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
