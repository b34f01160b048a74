//! # registry - Which socket owns which channel
//!
//! The modem numbers its TCP connections 0 to `MUX_COUNT - 1`. The registry
//! holds at most one `VirtualSocket` per channel. Users don't get a
//! reference to the socket; they get a `SocketHandle`, which names the
//! channel and the particular socket registered on it. When a new socket is
//! registered on a channel the old one is thrown away, and any handles to it
//! stop working.

// ****************************************************************************
//
// Imports
//
// ****************************************************************************

use std::fmt;

use config::MUX_COUNT;
use error::Error;
use socket::{Security, VirtualSocket};

// ****************************************************************************
//
// Public Types
//
// ****************************************************************************

/// Names a socket. Cheap to copy.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SocketHandle {
	channel: u8,
	id: u32,
}

/// The channel table.
#[derive(Debug)]
pub struct Registry {
	sockets: [Option<VirtualSocket>; MUX_COUNT],
	next_id: u32,
}

// ****************************************************************************
//
// Public Functions
//
// ****************************************************************************

impl SocketHandle {
	pub fn channel(&self) -> u8 {
		self.channel
	}

	pub fn id(&self) -> u32 {
		self.id
	}
}

impl fmt::Display for SocketHandle {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}#{}", self.channel, self.id)
	}
}

impl Registry {
	pub fn new() -> Registry {
		Registry {
			sockets: Default::default(),
			next_id: 0,
		}
	}

	/// Put a new socket on `channel`, replacing whatever was there.
	pub fn register(&mut self, channel: u8, security: Security) -> Result<SocketHandle, Error> {
		let slot = self
			.sockets
			.get_mut(channel as usize)
			.ok_or(Error::BadChannel(channel))?;
		let id = self.next_id;
		self.next_id = self.next_id.wrapping_add(1);
		if let Some(ref old) = *slot {
			debug!("Socket {}#{} superseded", old.channel, old.id);
		}
		*slot = Some(VirtualSocket::new(channel, id, security));
		Ok(SocketHandle {
			channel: channel,
			id: id,
		})
	}

	/// Take a socket out of the table. False if the handle was stale.
	pub fn remove(&mut self, handle: SocketHandle) -> bool {
		if self.get(handle).is_some() {
			self.sockets[handle.channel as usize] = None;
			true
		} else {
			false
		}
	}

	pub fn get(&self, handle: SocketHandle) -> Option<&VirtualSocket> {
		match self.sockets.get(handle.channel as usize) {
			Some(&Some(ref s)) if s.id == handle.id => Some(s),
			_ => None,
		}
	}

	pub fn get_mut(&mut self, handle: SocketHandle) -> Option<&mut VirtualSocket> {
		match self.sockets.get_mut(handle.channel as usize) {
			Some(&mut Some(ref mut s)) if s.id == handle.id => Some(s),
			_ => None,
		}
	}

	/// The handle of whatever socket is on `channel` right now.
	pub fn current(&self, channel: u8) -> Option<SocketHandle> {
		match self.sockets.get(channel as usize) {
			Some(&Some(ref s)) => Some(SocketHandle {
				channel: s.channel,
				id: s.id,
			}),
			_ => None,
		}
	}

	/// Handles for every registered socket, lowest channel first.
	pub fn handles(&self) -> Vec<SocketHandle> {
		(0..MUX_COUNT as u8).filter_map(|ch| self.current(ch)).collect()
	}

	/// A closed notice for `channel`.
	pub fn deliver_closed(&mut self, channel: u8) {
		match self.by_channel_mut(channel) {
			Some(s) => s.mark_closed(),
			None => debug!("Closed notice for empty channel {}", channel),
		}
	}

	/// A data-available notice for `channel`.
	pub fn deliver_data_available(&mut self, channel: u8) {
		match self.by_channel_mut(channel) {
			Some(s) => s.got_data = true,
			None => debug!("Data notice for empty channel {}", channel),
		}
	}
}

impl Default for Registry {
	fn default() -> Registry {
		Registry::new()
	}
}

// ****************************************************************************
//
// Private Functions
//
// ****************************************************************************

impl Registry {
	fn by_channel_mut(&mut self, channel: u8) -> Option<&mut VirtualSocket> {
		match self.sockets.get_mut(channel as usize) {
			Some(&mut Some(ref mut s)) => Some(s),
			_ => None,
		}
	}
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
