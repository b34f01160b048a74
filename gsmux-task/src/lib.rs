//! # gsmux-task - A modem session as a message-passing task
//!
//! Dual MIT/Apache 2.0 licensed.
//!
//! The `gsmux` API blocks the caller while it talks to the modem. This crate
//! puts a `Modem` on its own thread and lets users drive it with messages
//! instead. A user asks the task to open a socket and, once it is open,
//! receives asynchronous indications when data arrives on the socket and
//! when the socket closes. Users can also pass raw AT commands through, and
//! subscribe to new-SMS notices.
//!
//! Only one indication of received data is outstanding per socket. The
//! user must send `Response::Received` before it will be sent any more.
//!
//! ```no_run
//! extern crate gsmux;
//! extern crate gsmux_task;
//!
//! use gsmux_task::service::{make_channel, Context, Message, ServiceProvider};
//! use gsmux_task::{Confirm, Indication, ReqOpen, TaskConfig};
//!
//! # fn main() {
//! let stream = std::net::TcpStream::connect("127.0.0.1:7000").unwrap();
//! stream.set_read_timeout(Some(std::time::Duration::from_millis(5))).unwrap();
//! let modem = gsmux::Modem::new(
//! 	gsmux::IoTransport::new(stream),
//! 	gsmux::StdScheduler::new(),
//! 	gsmux::Config::default(),
//! );
//! let task = gsmux_task::make_task(modem, TaskConfig::default()).unwrap();
//! let (user, rx) = make_channel::<Confirm, Indication>();
//! task.send_request(
//! 	ReqOpen {
//! 		channel: 0,
//! 		host: "example.com".to_owned(),
//! 		port: 80,
//! 		security: gsmux::Security::Plain,
//! 		context: Context::default(),
//! 	}.into(),
//! 	&user,
//! );
//! if let Ok(Message::Confirm(Confirm::Open(cfm))) = rx.recv() {
//! 	println!("Opened: {:?}", cfm.result);
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
extern crate gsmux;
#[macro_use]
extern crate log;
extern crate mio;
extern crate mio_more;

// ****************************************************************************
//
// Macros
//
// ****************************************************************************

/// Wrap a message struct into its enum, so users can write `.into()`.
macro_rules! make_wrapper(
	($v:ident, $s:ident, $e:path) => {
		impl From<$v> for $s {
			fn from(msg: $v) -> $s {
				$e(msg)
			}
		}
	}
);

// ****************************************************************************
//
// Sub-modules
//
// ****************************************************************************

pub mod service;

// ****************************************************************************
//
// Imports
//
// ****************************************************************************

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use gsmux::{Error, Modem, Scheduler, Security, SocketHandle, Terminators, Transport};
use service::Context;

// ****************************************************************************
//
// Public Messages
//
// ****************************************************************************

/// Requests that can be sent to the modem task
#[derive(Debug)]
pub enum Request {
	/// Open a TCP connection on a channel
	Open(ReqOpen),
	/// Close an open connection
	Close(ReqClose),
	/// Send something on a connection
	Send(ReqSend),
	/// Pass an AT command straight through
	Command(ReqCommand),
	/// Ask for new-SMS indications
	Subscribe(ReqSubscribe),
}

/// Confirms sent from the modem task in answer to a Request
#[derive(Debug)]
pub enum Confirm {
	Open(CfmOpen),
	Close(CfmClose),
	Send(CfmSend),
	Command(CfmCommand),
	Subscribe(CfmSubscribe),
}

/// Asynchronous indications sent by the modem task
#[derive(Debug)]
pub enum Indication {
	/// Data has arrived on an open socket
	Received(IndReceived),
	/// An open socket has gone away
	Dropped(IndDropped),
	/// A new SMS has been stored
	NewMessage(IndNewMessage),
}

/// Responses to Indications
#[derive(Debug)]
pub enum Response {
	/// Unblocks the socket so more IndReceived can be sent
	Received(RspReceived),
}

/// Open a TCP connection
#[derive(Debug)]
pub struct ReqOpen {
	/// Which of the modem's channels to use
	pub channel: u8,
	pub host: String,
	pub port: u16,
	pub security: Security,
	/// Reflected in the cfm
	pub context: Context,
}

/// Close an open connection
#[derive(Debug)]
pub struct ReqClose {
	/// The handle from a CfmOpen
	pub handle: SocketHandle,
	/// Reflected in the cfm
	pub context: Context,
}

/// Send something on a connection
pub struct ReqSend {
	/// The handle from a CfmOpen
	pub handle: SocketHandle,
	/// Reflected in the cfm
	pub context: Context,
	/// The data to be sent
	pub data: Vec<u8>,
}

/// Send `AT<command>` and wait for one of `terminators` (`OK` or `ERROR` if
/// none are given)
#[derive(Debug)]
pub struct ReqCommand {
	pub command: String,
	pub terminators: Vec<String>,
	pub timeout_ms: u32,
	/// Reflected in the cfm
	pub context: Context,
}

/// Send us an IndNewMessage for every new SMS
#[derive(Debug)]
pub struct ReqSubscribe {
	/// Reflected in the cfm
	pub context: Context,
}

/// Reply to a ReqOpen
#[derive(Debug)]
pub struct CfmOpen {
	/// Either the new socket or an error
	pub result: Result<SocketHandle, Error>,
	/// Reflected from the req
	pub context: Context,
}

/// Reply to a ReqClose
#[derive(Debug)]
pub struct CfmClose {
	/// The handle requested for closing
	pub handle: SocketHandle,
	pub result: Result<(), Error>,
	/// Reflected from the req
	pub context: Context,
}

/// Reply to a ReqSend
#[derive(Debug)]
pub struct CfmSend {
	/// The handle requested for sending
	pub handle: SocketHandle,
	/// How much the modem accepted, or an error
	pub result: Result<usize, Error>,
	/// Reflected from the req
	pub context: Context,
}

/// Reply to a ReqCommand
#[derive(Debug)]
pub struct CfmCommand {
	/// Which terminator matched, from 1. 0 means the command timed out.
	pub index: u8,
	/// What came back before the terminator
	pub text: String,
	/// Reflected from the req
	pub context: Context,
}

/// Reply to a ReqSubscribe
#[derive(Debug)]
pub struct CfmSubscribe {
	/// Reflected from the req
	pub context: Context,
}

/// Data has arrived on a socket. No more will be sent on this handle until
/// RspReceived is sent back.
pub struct IndReceived {
	pub handle: SocketHandle,
	/// No more than `TaskConfig::max_read_len` octets
	pub data: Vec<u8>,
}

/// The socket has closed and everything it received has been passed up. The
/// handle is no longer valid.
#[derive(Debug)]
pub struct IndDropped {
	pub handle: SocketHandle,
}

/// A new SMS has been stored
#[derive(Debug)]
pub struct IndNewMessage {
	/// Where in the SIM's message store
	pub index: u32,
}

/// Tell the task that more data can now be sent
#[derive(Debug)]
pub struct RspReceived {
	/// Which handle is now free to send up more data
	pub handle: SocketHandle,
}

make_wrapper!(ReqOpen, Request, Request::Open);
make_wrapper!(ReqClose, Request, Request::Close);
make_wrapper!(ReqSend, Request, Request::Send);
make_wrapper!(ReqCommand, Request, Request::Command);
make_wrapper!(ReqSubscribe, Request, Request::Subscribe);
make_wrapper!(RspReceived, Response, Response::Received);

// ****************************************************************************
//
// Public Types
//
// ****************************************************************************

/// Users can use this to send us messages.
pub type ServiceProviderHandle =
	service::ServiceProviderHandle<Request, Confirm, Indication, Response>;

/// We use this to talk to our users.
pub type ServiceUserHandle = service::ServiceUserHandle<Confirm, Indication>;

/// Task settings
#[derive(Debug, Clone)]
pub struct TaskConfig {
	/// How often open sockets are checked for data when no messages arrive
	pub service_interval_ms: u64,
	/// Most data carried by one IndReceived
	pub max_read_len: usize,
}

/// Represents something a service user can hold on to to send us messages.
pub struct Handle {
	chan: mio_more::channel::Sender<Incoming>,
}

// ****************************************************************************
//
// Private Types
//
// ****************************************************************************

/// The set of all messages that this task can receive.
enum Incoming {
	/// One of our own requests that has come in
	Request(Request, ServiceUserHandle),
	/// One of our own responses that has come in
	Response(Response),
}

/// Created for every socket opened with a ReqOpen
struct OpenSocket {
	ind_to: ServiceUserHandle,
	/// There's a read the user hasn't processed yet
	outstanding: bool,
}

/// One instance per task. Stores all the task data.
struct TaskContext<T, S> {
	modem: Modem<T, S>,
	config: TaskConfig,
	sockets: HashMap<SocketHandle, OpenSocket>,
	subscribers: Vec<ServiceUserHandle>,
	/// Filled by the modem's new-message callback
	new_messages: mpsc::Receiver<u32>,
	/// The special channel our messages arrive on
	mio_rx: mio_more::channel::Receiver<Incoming>,
	/// The object we poll on
	poll: mio::Poll,
}

// ****************************************************************************
//
// Private Data
//
// ****************************************************************************

const MESSAGE_TOKEN: mio::Token = mio::Token(0);

/// Most the SIM800 accepts in one `AT+CIPSEND`
const MAX_SEND_LEN: usize = 1460;

// ****************************************************************************
//
// Public Functions
//
// ****************************************************************************

/// Creates a new modem task, which takes over `modem`. Returns an object
/// that can be used to send this task messages. The task stops once every
/// copy of that object has been dropped.
pub fn make_task<T, S>(
	mut modem: Modem<T, S>,
	config: TaskConfig,
) -> io::Result<ServiceProviderHandle>
where
	T: Transport + Send + 'static,
	S: Scheduler + Send + 'static,
{
	let (mio_tx, mio_rx) = mio_more::channel::channel();
	let (msg_tx, msg_rx) = mpsc::channel();
	modem.set_new_message_callback(move |index| {
		let _ = msg_tx.send(index);
	});
	let poll = mio::Poll::new()?;
	poll.register(
		&mio_rx,
		MESSAGE_TOKEN,
		mio::Ready::readable(),
		mio::PollOpt::level(),
	)?;
	let task_context = TaskContext {
		modem: modem,
		config: config,
		sockets: HashMap::new(),
		subscribers: Vec::new(),
		new_messages: msg_rx,
		mio_rx: mio_rx,
		poll: poll,
	};
	thread::Builder::new()
		.name("gsmux".to_owned())
		.spawn(move || task_context.run())?;
	Ok(Box::new(Handle { chan: mio_tx }))
}

impl Default for TaskConfig {
	fn default() -> TaskConfig {
		TaskConfig {
			service_interval_ms: 100,
			max_read_len: 256,
		}
	}
}

impl service::ServiceProvider<Request, Confirm, Indication, Response> for Handle {
	fn send_request(&self, req: Request, reply_to: &dyn service::ServiceUser<Confirm, Indication>) {
		if self.chan.send(Incoming::Request(req, reply_to.clone())).is_err() {
			warn!("Request dropped - modem task has gone");
		}
	}

	fn send_response(&self, rsp: Response) {
		if self.chan.send(Incoming::Response(rsp)).is_err() {
			warn!("Response dropped - modem task has gone");
		}
	}

	fn clone(&self) -> ServiceProviderHandle {
		Box::new(Handle {
			chan: self.chan.clone(),
		})
	}
}

/// Don't log the contents of the vector
impl fmt::Debug for IndReceived {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(
			f,
			"IndReceived {{ handle: {}, data.len: {} }}",
			self.handle,
			self.data.len()
		)
	}
}

/// Don't log the contents of the vector
impl fmt::Debug for ReqSend {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(
			f,
			"ReqSend {{ handle: {}, data.len: {} }}",
			self.handle,
			self.data.len()
		)
	}
}

// ****************************************************************************
//
// Private Functions
//
// ****************************************************************************

impl<T, S> TaskContext<T, S>
where
	T: Transport,
	S: Scheduler,
{
	fn run(mut self) {
		info!("Modem task running");
		while self.poll() {}
		for (handle, _) in self.sockets.drain() {
			self.modem.close(handle);
		}
		info!("Modem task stopped");
	}

	/// Wait for messages (or for the service interval to pass), handle
	/// them, then see to the modem. False when there's no one left to talk
	/// to.
	fn poll(&mut self) -> bool {
		let mut events = mio::Events::with_capacity(16);
		let timeout = Duration::from_millis(self.config.service_interval_ms);
		match self.poll.poll(&mut events, Some(timeout)) {
			Ok(num_events) => trace!("Woke up! Handling num_events={}", num_events),
			Err(err) => warn!("Poll failed: {}", err),
		}
		// Empty the whole message queue
		loop {
			match self.mio_rx.try_recv() {
				Ok(msg) => self.handle_message(msg),
				Err(mpsc::TryRecvError::Empty) => break,
				Err(mpsc::TryRecvError::Disconnected) => return false,
			}
		}
		self.modem.maintain();
		let handles: Vec<SocketHandle> = self.sockets.keys().cloned().collect();
		for handle in handles {
			self.read_from_socket(handle);
		}
		self.forward_new_messages();
		true
	}

	/// Called when our task has received a Message
	fn handle_message(&mut self, msg: Incoming) {
		match msg {
			Incoming::Request(msg, reply_to) => {
				debug!("Rx: {:?}", msg);
				self.handle_req(msg, reply_to)
			}
			Incoming::Response(msg) => {
				debug!("Rx: {:?}", msg);
				self.handle_rsp(msg)
			}
		}
	}

	fn handle_req(&mut self, req: Request, reply_to: ServiceUserHandle) {
		match req {
			Request::Open(x) => self.handle_open(x, reply_to),
			Request::Close(x) => self.handle_close(x, reply_to),
			Request::Send(x) => self.handle_send(x, reply_to),
			Request::Command(x) => self.handle_command(x, reply_to),
			Request::Subscribe(x) => self.handle_subscribe(x, reply_to),
		}
	}

	fn handle_rsp(&mut self, rsp: Response) {
		match rsp {
			Response::Received(x) => self.handle_received(x),
		}
	}

	/// Register a socket on the requested channel and connect it.
	fn handle_open(&mut self, req_open: ReqOpen, reply_to: ServiceUserHandle) {
		info!(
			"Opening {}:{} on channel {}...",
			req_open.host, req_open.port, req_open.channel
		);
		let in_use = self
			.sockets
			.keys()
			.any(|h| h.channel() == req_open.channel);
		let result = if in_use {
			Err(Error::ChannelInUse(req_open.channel))
		} else {
			self.open(&req_open)
		};
		if let Ok(handle) = result {
			self.sockets.insert(
				handle,
				OpenSocket {
					// We assume any future indications should be sent to the
					// same place we send the CfmOpen.
					ind_to: reply_to.clone(),
					outstanding: false,
				},
			);
		}
		let cfm = CfmOpen {
			result: result,
			context: req_open.context,
		};
		reply_to.send_confirm(Confirm::Open(cfm));
	}

	fn open(&mut self, req_open: &ReqOpen) -> Result<SocketHandle, Error> {
		let handle = self.modem.socket(req_open.channel, req_open.security)?;
		if self.modem.connect(handle, &req_open.host, req_open.port) {
			Ok(handle)
		} else {
			self.modem.release(handle);
			Err(Error::ConnectFailed)
		}
	}

	fn handle_close(&mut self, req_close: ReqClose, reply_to: ServiceUserHandle) {
		let result = match self.sockets.remove(&req_close.handle) {
			Some(_) => {
				self.modem.release(req_close.handle);
				Ok(())
			}
			None => Err(Error::BadHandle),
		};
		let cfm = CfmClose {
			handle: req_close.handle,
			result: result,
			context: req_close.context,
		};
		reply_to.send_confirm(Confirm::Close(cfm));
	}

	/// Send the data, in as many `AT+CIPSEND`s as it takes.
	fn handle_send(&mut self, req_send: ReqSend, reply_to: ServiceUserHandle) {
		let handle = req_send.handle;
		let result = if !self.sockets.contains_key(&handle) {
			Err(Error::BadHandle)
		} else if !self.modem.is_connected(handle) {
			Err(Error::NotConnected)
		} else {
			let mut sent = 0;
			for chunk in req_send.data.chunks(MAX_SEND_LEN) {
				let len = self.modem.write(handle, chunk);
				sent += len;
				if len < chunk.len() {
					warn!("Sent {} of {} on handle: {}", len, chunk.len(), handle);
					break;
				}
			}
			if sent == 0 && !req_send.data.is_empty() {
				Err(Error::WriteFailed)
			} else {
				debug!("Sent {} on handle: {}", sent, handle);
				Ok(sent)
			}
		};
		let cfm = CfmSend {
			handle: handle,
			result: result,
			context: req_send.context,
		};
		reply_to.send_confirm(Confirm::Send(cfm));
	}

	fn handle_command(&mut self, req_command: ReqCommand, reply_to: ServiceUserHandle) {
		let rsp = {
			let wanted: Vec<&str> = req_command.terminators.iter().map(|t| t.as_str()).collect();
			let terms = if wanted.is_empty() {
				Terminators::default()
			} else {
				Terminators::new(&wanted)
			};
			self.modem
				.execute(&req_command.command, &terms, req_command.timeout_ms)
		};
		let cfm = CfmCommand {
			index: rsp.index,
			text: rsp.text,
			context: req_command.context,
		};
		reply_to.send_confirm(Confirm::Command(cfm));
	}

	fn handle_subscribe(&mut self, req_subscribe: ReqSubscribe, reply_to: ServiceUserHandle) {
		self.subscribers.push(reply_to.clone());
		let cfm = CfmSubscribe {
			context: req_subscribe.context,
		};
		reply_to.send_confirm(Confirm::Subscribe(cfm));
	}

	/// Someone wants more data
	fn handle_received(&mut self, rsp_received: RspReceived) {
		// Might have crossed over with an IndDropped
		if let Some(sock) = self.sockets.get_mut(&rsp_received.handle) {
			sock.outstanding = false;
		} else {
			return;
		}
		self.read_from_socket(rsp_received.handle)
	}

	/// Pass up anything that has arrived on a socket, or tell the user it's
	/// gone.
	fn read_from_socket(&mut self, handle: SocketHandle) {
		match self.sockets.get(&handle) {
			Some(sock) if sock.outstanding => {
				trace!("Not reading - outstanding ind on handle: {}", handle);
				return;
			}
			Some(_) => {}
			None => return,
		}
		let mut buffer = vec![0u8; self.config.max_read_len];
		let len = if self.modem.available(handle) > 0 {
			self.modem.read(handle, &mut buffer)
		} else {
			0
		};
		if len > 0 {
			debug!("Read {} octets on handle: {}", len, handle);
			buffer.truncate(len);
			if let Some(sock) = self.sockets.get_mut(&handle) {
				sock.outstanding = true;
				let ind = IndReceived {
					handle: handle,
					data: buffer,
				};
				sock.ind_to.send_indication(Indication::Received(ind));
			}
		} else if !self.modem.is_connected(handle) {
			self.dropped(handle);
		}
	}

	/// Connection has gone away. Clean up.
	fn dropped(&mut self, handle: SocketHandle) {
		if let Some(sock) = self.sockets.remove(&handle) {
			info!("Dropped handle: {}", handle);
			self.modem.release(handle);
			let ind = IndDropped { handle: handle };
			sock.ind_to.send_indication(Indication::Dropped(ind));
		}
	}

	fn forward_new_messages(&mut self) {
		while let Ok(index) = self.new_messages.try_recv() {
			debug!("New message {} to {} subscribers", index, self.subscribers.len());
			for s in self.subscribers.iter() {
				s.send_indication(Indication::NewMessage(IndNewMessage { index: index }));
			}
		}
	}
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
