//! # ring_buffer - Receive buffer for a virtual socket
//!
//! Payload fetched from the modem sits here until the socket's user reads
//! it. The capacity is fixed; when it's full the fetch must stop and try
//! again once the user has made some room.

// ****************************************************************************
//
// Imports
//
// ****************************************************************************

use std::fmt;

use config::RX_BUFFER_SIZE;

// ****************************************************************************
//
// Public Types
//
// ****************************************************************************

/// A fixed-capacity FIFO of octets.
pub struct RingBuffer {
	data: [u8; RX_BUFFER_SIZE],
	/// Index of the oldest octet
	head: usize,
	/// Number of octets held
	len: usize,
}

// ****************************************************************************
//
// Public Functions
//
// ****************************************************************************

impl RingBuffer {
	pub fn new() -> RingBuffer {
		RingBuffer {
			data: [0u8; RX_BUFFER_SIZE],
			head: 0,
			len: 0,
		}
	}

	/// Append an octet. Returns false, and does nothing, if we're full.
	pub fn push(&mut self, byte: u8) -> bool {
		if self.len == RX_BUFFER_SIZE {
			return false;
		}
		let tail = (self.head + self.len) % RX_BUFFER_SIZE;
		self.data[tail] = byte;
		self.len += 1;
		true
	}

	/// Remove up to `dest.len()` octets, oldest first. Returns how many were
	/// copied.
	pub fn pop_into(&mut self, dest: &mut [u8]) -> usize {
		let count = dest.len().min(self.len);
		for slot in dest[..count].iter_mut() {
			*slot = self.data[self.head];
			self.head = (self.head + 1) % RX_BUFFER_SIZE;
		}
		self.len -= count;
		if self.len == 0 {
			self.head = 0;
		}
		count
	}

	/// Remove the oldest octet.
	pub fn pop(&mut self) -> Option<u8> {
		let mut b = [0u8; 1];
		if self.pop_into(&mut b) == 1 {
			Some(b[0])
		} else {
			None
		}
	}

	/// Octets currently held.
	pub fn size(&self) -> usize {
		self.len
	}

	pub fn is_empty(&self) -> bool {
		self.len == 0
	}

	/// Room left before `push` starts failing.
	pub fn available_space(&self) -> usize {
		RX_BUFFER_SIZE - self.len
	}

	pub fn capacity(&self) -> usize {
		RX_BUFFER_SIZE
	}

	/// Throw everything away.
	pub fn clear(&mut self) {
		self.head = 0;
		self.len = 0;
	}
}

impl Default for RingBuffer {
	fn default() -> RingBuffer {
		RingBuffer::new()
	}
}

/// Don't log the contents
impl fmt::Debug for RingBuffer {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "RingBuffer {{ size: {}/{} }}", self.len, RX_BUFFER_SIZE)
	}
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
