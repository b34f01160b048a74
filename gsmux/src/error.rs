//! # error - Things that can go wrong
//!
//! Most of the protocol reports failure with a sentinel (a zero count, a
//! `false`, a terminator index of 0) because a modem that fails to answer is
//! normal operation, not an exceptional case. This type covers the rest.

// ****************************************************************************
//
// Imports
//
// ****************************************************************************

use std::error;
use std::fmt;
use std::io;

// ****************************************************************************
//
// Public Types
//
// ****************************************************************************

/// All possible errors the modem layer might want to report.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Error {
	/// An underlying transport error
	IOError(io::ErrorKind),
	/// Channel numbers run from 0 to `MUX_COUNT - 1`
	BadChannel(u8),
	/// The handle was not recognised - it has been superseded by a newer
	/// socket on the same channel
	BadHandle,
	/// The modem did not report `CONNECT OK`
	ConnectFailed,
	/// The socket is not connected
	NotConnected,
	/// The modem did not accept the data
	WriteFailed,
	/// Something is already open on this channel
	ChannelInUse(u8),
}

// ****************************************************************************
//
// Public Functions
//
// ****************************************************************************

impl fmt::Display for Error {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			Error::IOError(kind) => write!(f, "transport error: {:?}", kind),
			Error::BadChannel(ch) => write!(f, "bad channel {}", ch),
			Error::BadHandle => write!(f, "stale socket handle"),
			Error::ConnectFailed => write!(f, "connect failed"),
			Error::NotConnected => write!(f, "not connected"),
			Error::WriteFailed => write!(f, "write not accepted"),
			Error::ChannelInUse(ch) => write!(f, "channel {} in use", ch),
		}
	}
}

impl error::Error for Error {}

/// Wrap io::Errors into Errors easily
impl From<io::Error> for Error {
	fn from(e: io::Error) -> Error {
		Error::IOError(e.kind())
	}
}

/// So the `Client` adapter can hand our errors to `io::Read` users
impl From<Error> for io::Error {
	fn from(e: Error) -> io::Error {
		let kind = match e {
			Error::IOError(kind) => kind,
			Error::BadChannel(_) => io::ErrorKind::InvalidInput,
			Error::BadHandle | Error::NotConnected => io::ErrorKind::NotConnected,
			Error::ConnectFailed => io::ErrorKind::ConnectionRefused,
			Error::WriteFailed => io::ErrorKind::WriteZero,
			Error::ChannelInUse(_) => io::ErrorKind::AddrInUse,
		};
		io::Error::new(kind, e)
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn io_round_trip_keeps_kind() {
		let e: Error = io::Error::new(io::ErrorKind::BrokenPipe, "gone").into();
		assert_eq!(e, Error::IOError(io::ErrorKind::BrokenPipe));
		let back: io::Error = Error::BadHandle.into();
		assert_eq!(back.kind(), io::ErrorKind::NotConnected);
		assert_eq!(format!("{}", Error::BadChannel(7)), "bad channel 7");
	}
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
