//! # gsmux - TCP sockets multiplexed over an AT-command cellular modem
//!
//! Dual MIT/Apache 2.0 licensed.
//!
//! ## Overview
//!
//! SIM800-class modems accept AT commands on a single serial line and can
//! hold several TCP connections open at once, each identified by a small
//! channel number. The same line carries command responses and unsolicited
//! notices (data arrived, connection closed, SMS received) which can turn up
//! in the middle of any response.
//!
//! This crate is the layer that sits on that line:
//!
//! * the `Dispatcher` sends a command and waits for one of up to five
//!   terminators, while pulling any unsolicited notices out of the byte
//!   stream and routing them elsewhere;
//! * the socket registry maps each channel to a `VirtualSocket`, with its
//!   own receive `RingBuffer`;
//! * the `Modem` ties the two together and offers connect / write / read /
//!   available / close on a `SocketHandle`, plus the raw command primitives
//!   for code which drives the modem's other features.
//!
//! Everything runs in the caller's thread. Every wait is bounded by a
//! timeout, and every wait loop calls `Scheduler::yield_now` so the caller's
//! environment gets a look in. If you would rather talk to the modem by
//! message passing, see the `gsmux-task` crate.
//!
//! ```no_run
//! extern crate gsmux;
//!
//! use std::io::Write;
//! use std::net::TcpStream;
//! use std::time::Duration;
//!
//! # fn main() {
//! // A modem on the far side of a serial-to-TCP bridge
//! let stream = TcpStream::connect("127.0.0.1:7000").unwrap();
//! stream.set_read_timeout(Some(Duration::from_millis(5))).unwrap();
//! let transport = gsmux::IoTransport::new(stream);
//! let scheduler = gsmux::StdScheduler::new();
//! let mut modem = gsmux::Modem::new(transport, scheduler, gsmux::Config::default());
//!
//! let handle = modem.socket(0, gsmux::Security::Plain).unwrap();
//! if modem.connect(handle, "example.com", 80) {
//! 	let mut client = modem.client(handle);
//! 	client.write_all(b"GET / HTTP/1.0\r\n\r\n").unwrap();
//! }
//! # }
//! ```

// ****************************************************************************
//
// Crates
//
// ****************************************************************************

#[cfg(test)]
extern crate env_logger;
#[macro_use]
extern crate log;
#[cfg(test)]
extern crate rand;

// ****************************************************************************
//
// Sub-modules
//
// ****************************************************************************

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod matcher;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod modem;
pub mod registry;
pub mod ring_buffer;
pub mod scheduler;
pub mod socket;
pub mod transport;
pub mod urc;

// ****************************************************************************
//
// Imports
//
// ****************************************************************************

pub use config::{Config, FetchEncoding, MUX_COUNT, RX_BUFFER_SIZE};
pub use dispatcher::{Dispatcher, Response};
pub use error::Error;
pub use matcher::Terminators;
pub use modem::Modem;
pub use registry::{Registry, SocketHandle};
pub use ring_buffer::RingBuffer;
pub use scheduler::{Scheduler, StdScheduler};
pub use socket::{Client, Security, SocketState, VirtualSocket};
pub use transport::{IoTransport, Transport};
pub use urc::{Urc, UrcHandler};

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
