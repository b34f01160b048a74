//! # service - Talking to a task by message passing
//!
//! A task which provides a service receives Requests and Responses from its
//! users and sends back Confirms and Indications. Each layer defines its own
//! four message types, typically as enums.
//!
//! The provider end is a `ServiceProvider` and the user end is a
//! `ServiceUser`. Both are used as boxed trait objects so that any sort of
//! queue can sit behind them; `clone` therefore returns a new box rather
//! than `Self`.
//!
//! Applications which just want the messages on a channel can use
//! `make_channel`.

// ****************************************************************************
//
// Imports
//
// ****************************************************************************

use std::fmt;
use std::sync::mpsc;

// ****************************************************************************
//
// Public Types
//
// ****************************************************************************

/// Something we can send requests and responses to.
pub trait ServiceProvider<REQ, CFM, IND, RSP> {
	/// Call this to send a request to this provider.
	fn send_request(&self, req: REQ, reply_to: &dyn ServiceUser<CFM, IND>);
	/// Call this to send a response to this provider.
	fn send_response(&self, rsp: RSP);
	/// Call this to clone this object so another task can use it.
	fn clone(&self) -> ServiceProviderHandle<REQ, CFM, IND, RSP>;
}

/// A boxed `ServiceProvider`, which a user can use to send messages in to a
/// provider.
pub type ServiceProviderHandle<REQ, CFM, IND, RSP> =
	Box<dyn ServiceProvider<REQ, CFM, IND, RSP> + Send>;

/// Something which consumes the service: it is sent confirms and
/// indications.
pub trait ServiceUser<CFM, IND> {
	/// Call this to send a confirmation back to the service user.
	fn send_confirm(&self, cfm: CFM);
	/// Call this to send an indication to the service user.
	fn send_indication(&self, ind: IND);
	/// Call this so we can store this user reference in two places.
	fn clone(&self) -> ServiceUserHandle<CFM, IND>;
}

/// A boxed `ServiceUser`, which the provider can use to send messages back
/// to the user.
pub type ServiceUserHandle<CFM, IND> = Box<dyn ServiceUser<CFM, IND> + Send>;

/// Passed in a request and reflected in the confirm, so the user can match
/// them up.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub struct Context(usize);

/// What arrives on a `make_channel` receiver.
#[derive(Debug)]
pub enum Message<CFM, IND> {
	Confirm(CFM),
	Indication(IND),
}

/// A `ServiceUser` which puts everything on a `mpsc` channel.
pub struct ChannelUser<CFM, IND>(mpsc::Sender<Message<CFM, IND>>);

// ****************************************************************************
//
// Public Functions
//
// ****************************************************************************

/// Make a `ServiceUser` and the receiver its messages turn up on.
pub fn make_channel<CFM, IND>() -> (ChannelUser<CFM, IND>, mpsc::Receiver<Message<CFM, IND>>) {
	let (tx, rx) = mpsc::channel();
	(ChannelUser(tx), rx)
}

impl Context {
	pub fn new(value: usize) -> Context {
		Context(value)
	}

	pub fn as_usize(&self) -> usize {
		self.0
	}

	/// Grab a copy of the current value, while incrementing it ready for
	/// the next use.
	pub fn take(&mut self) -> Context {
		let result = Context(self.0);
		self.0 = self.0.wrapping_add(1);
		result
	}
}

impl fmt::Display for Context {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "Context({})", self.0)
	}
}

impl<CFM, IND> ServiceUser<CFM, IND> for ChannelUser<CFM, IND>
where
	CFM: Send + 'static,
	IND: Send + 'static,
{
	fn send_confirm(&self, cfm: CFM) {
		if self.0.send(Message::Confirm(cfm)).is_err() {
			debug!("Confirm dropped - receiver has gone");
		}
	}

	fn send_indication(&self, ind: IND) {
		if self.0.send(Message::Indication(ind)).is_err() {
			debug!("Indication dropped - receiver has gone");
		}
	}

	fn clone(&self) -> ServiceUserHandle<CFM, IND> {
		Box::new(ChannelUser(self.0.clone()))
	}
}


// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
