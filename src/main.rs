// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The `openingd` process: wires the channel-opening engine to the three
//! descriptors the supervisor hands us and services exactly one negotiation.
//!
//! Stdin carries supervisor requests, stdout carries our status frames, and
//! fd 3 is the peer stream. Logs go to stderr; stdout must stay clean for
//! the control protocol. On success the peer descriptor travels back over
//! the request socket via `SCM_RIGHTS` before we wait for the exit request;
//! on failure the exit code is the failure's status code.

use std::io::{self, IoSlice};
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};
use std::os::unix::net::UnixStream;
use std::process;
use std::sync::Arc;

use nix::sys::socket::{sendmsg, ControlMessage, MsgFlags};

use lightning_openingd::control;
use lightning_openingd::util::errors::OpeningError;
use lightning_openingd::util::logger::{Logger, Record};

// Stdout == status, stdin == requests, 3 == peer
const REQ_FD: RawFd = 0;
const PEER_FD: RawFd = 3;

struct StderrLogger;

impl Logger for StderrLogger {
	fn log(&self, record: &Record) {
		eprintln!("{} {}: {}", record.level, record.module_path, record.args);
	}
}

/// Passes the peer descriptor back to the supervisor over the request
/// socket. `SCM_RIGHTS` duplicates the descriptor into the receiver, so our
/// copy simply closes when the stream drops.
fn send_peer_fd(stream: UnixStream) -> Result<(), OpeningError> {
	let fds = [stream.as_raw_fd()];
	let iov = [IoSlice::new(&[0xff])];
	let cmsgs = [ControlMessage::ScmRights(&fds)];
	sendmsg::<()>(REQ_FD, &iov, &cmsgs, MsgFlags::empty(), None)
		.map_err(|e| OpeningError::BadCommand(format!("Passing peer fd back: {}", e)))?;
	Ok(())
}

fn main() {
	let mut args = std::env::args();
	args.next();
	if let Some(arg) = args.next() {
		if arg == "--version" {
			println!("{}", env!("CARGO_PKG_VERSION"));
			return;
		}
		eprintln!("Usage: openingd [--version]");
		process::exit(1);
	}

	// The supervisor launched us with the peer stream on fd 3; nothing else
	// in this process has touched it.
	let peer = unsafe { UnixStream::from_raw_fd(PEER_FD) };
	let stdin = io::stdin();
	let stdout = io::stdout();
	let mut req = stdin.lock();
	let mut status = stdout.lock();
	let logger: Arc<dyn Logger> = Arc::new(StderrLogger);

	match control::serve(&mut req, &mut status, peer, logger, send_peer_fd) {
		Ok(()) => {},
		Err(e) => process::exit(e.status_code() as i32),
	}
}
