//! # http_get - a gsmux-task example
//!
//! Talks to a SIM800 through a serial-to-TCP bridge (e.g. `ser2net`),
//! fetches a page over HTTP and prints it.
//!
//! ```text
//! RUST_LOG=debug cargo run --example http_get -- 127.0.0.1:7000 example.com /
//! ```

// ****************************************************************************
//
// Imports
//
// ****************************************************************************

extern crate env_logger;
extern crate gsmux;
extern crate gsmux_task as task;
#[macro_use]
extern crate log;

use std::env;
use std::io::{self, Write};
use std::net::TcpStream;
use std::process;
use std::time::Duration;

use task::service::{make_channel, Context, Message, ServiceProvider};

// ****************************************************************************
//
// Private Data
//
// ****************************************************************************

const USAGE: &str = "Usage: http_get <bridge-addr> <host> [<path>]";

// ****************************************************************************
//
// Public Functions
//
// ****************************************************************************

/// Start of our example program
fn main() {
	env_logger::init();
	let args: Vec<String> = env::args().skip(1).collect();
	if args.len() < 2 {
		eprintln!("{}", USAGE);
		process::exit(1);
	}
	let bridge = &args[0];
	let host = args[1].clone();
	let path = args.get(2).cloned().unwrap_or_else(|| "/".to_owned());

	info!("Hello, this is the gsmux HTTP example.");
	info!("Modem is at {}", bridge);

	let stream = TcpStream::connect(bridge).unwrap();
	stream
		.set_read_timeout(Some(Duration::from_millis(5)))
		.unwrap();
	let mut modem = gsmux::Modem::new(
		gsmux::IoTransport::new(stream),
		gsmux::StdScheduler::new(),
		gsmux::Config::default(),
	);
	let init_timeout = modem.config().init_timeout_ms;
	if !modem.test_at(init_timeout) {
		error!("Modem isn't answering");
		process::exit(1);
	}

	let modem_task = task::make_task(modem, task::TaskConfig::default()).unwrap();
	let (handle, rx) = make_channel::<task::Confirm, task::Indication>();
	let mut n = Context::default();

	modem_task.send_request(
		task::ReqOpen {
			channel: 0,
			host: host.clone(),
			port: 80,
			security: gsmux::Security::Plain,
			context: n.take(),
		}.into(),
		&handle,
	);

	for msg in rx.iter() {
		match msg {
			Message::Confirm(task::Confirm::Open(cfm)) => match cfm.result {
				Ok(socket) => {
					info!("Connected to {}, handle = {}", host, socket);
					let request = format!(
						"GET {} HTTP/1.0\r\nHost: {}\r\nConnection: close\r\n\r\n",
						path, host
					);
					modem_task.send_request(
						task::ReqSend {
							handle: socket,
							data: request.into_bytes(),
							context: n.take(),
						}.into(),
						&handle,
					);
				}
				Err(e) => {
					error!("Failed to connect to {}: {}", host, e);
					break;
				}
			},
			Message::Confirm(task::Confirm::Send(cfm)) => {
				info!("Sent request: {:?}", cfm.result);
			}
			Message::Indication(task::Indication::Received(ind)) => {
				modem_task.send_response(task::RspReceived { handle: ind.handle }.into());
				io::stdout().write_all(&ind.data).unwrap();
			}
			Message::Indication(task::Indication::Dropped(ind)) => {
				info!("Connection closed, handle = {}", ind.handle);
				break;
			}
			_ => {}
		}
	}
}

// ****************************************************************************
//
// End Of File
//
// ****************************************************************************
