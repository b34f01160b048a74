//! # matcher - Spotting the end of a response
//!
//! AT responses have no framing. We know a response is over when the text
//! received so far ends with one of the strings we were told to look for.
//! Callers supply up to five of them and the order matters: if two could
//! match, the earlier one wins.

// ****************************************************************************
//
// Imports
//
// ****************************************************************************

use std::fmt;

use config::{MAX_TERMINATORS, RESPONSE_BUFFER_SIZE};

// ****************************************************************************
//
// Public Types
//
// ****************************************************************************

/// The set of strings which will end a wait, in priority order.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Terminators<'a> {
	items: [Option<&'a [u8]>; MAX_TERMINATORS],
}

/// The text received while waiting for a terminator. Bounded; if it fills
/// up the oldest octets are dropped, which is harmless as we only ever look
/// at the end of it.
#[derive(Clone, Default)]
pub struct Accumulator {
	data: Vec<u8>,
	/// Octets have been lost off the front since the last clear
	truncated: bool,
}

// ****************************************************************************
//
// Public Data
//
// ****************************************************************************

pub const GSM_NL: &str = "\r\n";
pub const GSM_OK: &str = "OK\r\n";
pub const GSM_ERROR: &str = "ERROR\r\n";

// ****************************************************************************
//
// Public Functions
//
// ****************************************************************************

impl<'a> Terminators<'a> {
	/// Builds a set from `candidates`, in the order given. Anything past the
	/// fifth is ignored. Empty strings are ignored, as they would match
	/// straight away.
	pub fn new(candidates: &[&'a str]) -> Terminators<'a> {
		if candidates.len() > MAX_TERMINATORS {
			warn!(
				"Only {} terminators supported, ignoring {} more",
				MAX_TERMINATORS,
				candidates.len() - MAX_TERMINATORS
			);
		}
		let mut items = [None; MAX_TERMINATORS];
		for (slot, &c) in items.iter_mut().zip(candidates.iter()) {
			if !c.is_empty() {
				*slot = Some(c.as_bytes());
			}
		}
		Terminators { items: items }
	}

	/// Matches nothing. Used for idle polls which only want to drain
	/// unsolicited notices.
	pub fn none() -> Terminators<'static> {
		Terminators {
			items: [None; MAX_TERMINATORS],
		}
	}

	/// Returns the 1-based index of the first terminator `text` ends with,
	/// and that terminator's length.
	pub fn matched(&self, text: &[u8]) -> Option<(u8, usize)> {
		for (i, item) in self.items.iter().enumerate() {
			if let Some(t) = *item {
				if text.ends_with(t) {
					return Some(((i + 1) as u8, t.len()));
				}
			}
		}
		None
	}

	pub fn is_empty(&self) -> bool {
		self.items.iter().all(|i| i.is_none())
	}
}

/// `OK` then `ERROR`
impl Default for Terminators<'static> {
	fn default() -> Terminators<'static> {
		Terminators::new(&[GSM_OK, GSM_ERROR])
	}
}

impl<'a> fmt::Debug for Terminators<'a> {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let mut list = f.debug_list();
		for item in self.items.iter() {
			if let Some(t) = *item {
				list.entry(&String::from_utf8_lossy(t).trim());
			}
		}
		list.finish()
	}
}

impl Accumulator {
	pub fn new() -> Accumulator {
		Accumulator {
			data: Vec::with_capacity(RESPONSE_BUFFER_SIZE),
			truncated: false,
		}
	}

	/// Append an octet, dropping the oldest if we're full.
	pub fn push(&mut self, byte: u8) {
		if self.data.len() == RESPONSE_BUFFER_SIZE {
			if !self.truncated {
				warn!("Response longer than {} octets, losing the start", RESPONSE_BUFFER_SIZE);
				self.truncated = true;
			}
			self.data.remove(0);
		}
		self.data.push(byte);
	}

	/// Append several octets.
	pub fn extend(&mut self, bytes: &[u8]) {
		for b in bytes {
			self.push(*b);
		}
	}

	pub fn ends_with(&self, marker: &[u8]) -> bool {
		self.data.ends_with(marker)
	}

	pub fn as_bytes(&self) -> &[u8] {
		&self.data
	}

	pub fn len(&self) -> usize {
		self.data.len()
	}

	pub fn is_empty(&self) -> bool {
		self.data.is_empty()
	}

	/// Has anything been dropped off the front since the last clear?
	pub fn truncated(&self) -> bool {
		self.truncated
	}

	pub fn clear(&mut self) {
		self.data.clear();
		self.truncated = false;
	}

	/// Throw away every complete line, keeping whatever follows the last
	/// CRLF.
	pub fn keep_last_line(&mut self) {
		let keep_from = (0..self.data.len().saturating_sub(1))
			.rev()
			.find(|&i| &self.data[i..i + 2] == b"\r\n")
			.map(|i| i + 2);
		if let Some(start) = keep_from {
			self.data.drain(..start);
		}
	}
}

impl fmt::Debug for Accumulator {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "Accumulator {{ len: {} }}", self.data.len())
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn long_responses_lose_the_start() {
		let mut acc = Accumulator::new();
		for _ in 0..RESPONSE_BUFFER_SIZE {
			acc.push(b'x');
		}
		assert!(!acc.truncated());
		acc.extend(b"OK\r\n");
		assert!(acc.truncated());
		assert_eq!(acc.len(), RESPONSE_BUFFER_SIZE);
		assert!(acc.ends_with(b"xOK\r\n"));
		acc.clear();
		assert!(!acc.truncated());
	}

	#[test]
	fn keep_last_line() {
		let mut acc = Accumulator::new();
		acc.extend(b"\r\nOK\r\n\r\n2, CL");
		acc.keep_last_line();
		assert_eq!(acc.as_bytes(), b"2, CL");
		acc.keep_last_line();
		assert_eq!(acc.as_bytes(), b"2, CL");
		acc.extend(b"OSED\r\n");
		acc.keep_last_line();
		assert!(acc.is_empty());
	}

	#[test]
	fn default_is_ok_then_error() {
		let t = Terminators::default();
		assert_eq!(t.matched(b"\r\nOK\r\n"), Some((1, 4)));
		assert_eq!(t.matched(b"\r\nERROR\r\n"), Some((2, 7)));
		assert_eq!(t.matched(b"\r\nOK"), None);
	}

	#[test]
	fn earlier_candidate_wins() {
		// Both could match; the order given decides
		let t = Terminators::new(&["K\r\n", "OK\r\n"]);
		assert_eq!(t.matched(b"OK\r\n"), Some((1, 3)));
		let t = Terminators::new(&["OK\r\n", "K\r\n"]);
		assert_eq!(t.matched(b"OK\r\n"), Some((1, 4)));
	}

	#[test]
	fn empty_and_extra_candidates_are_skipped() {
		let t = Terminators::new(&["", "B", "C", "D", "E", "F"]);
		assert_eq!(t.matched(b"xB"), Some((2, 1)));
		assert_eq!(t.matched(b"xE"), Some((5, 1)));
		assert_eq!(t.matched(b"xF"), None);
		assert_eq!(t.matched(b"x"), None);
		assert!(Terminators::none().is_empty());
		assert_eq!(Terminators::none().matched(b"OK\r\n"), None);
	}

	#[test]
	fn accumulator_keeps_the_tail() {
		let mut a = Accumulator::new();
		for _ in 0..RESPONSE_BUFFER_SIZE {
			a.push(b'x');
		}
		a.extend(b"OK\r\n");
		assert_eq!(a.len(), RESPONSE_BUFFER_SIZE);
		assert!(a.ends_with(b"xOK\r\n"));
		a.clear();
		assert!(a.is_empty());
	}
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
