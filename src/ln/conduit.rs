// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Message framing over the peer stream, and the cipher-state block that
//! travels with it.
//!
//! The transport encryption itself is owned by the supervising node's peer
//! layer: the supervisor completed the handshake, hands us the resulting
//! [`ConduitState`] at init, and takes the (advanced) state back along with
//! the stream once the negotiation succeeds. Inside this daemon the state is
//! an opaque block whose nonces we advance once per frame in each direction,
//! exactly as the cipher consumes them. The conduit is linearly owned: it is
//! constructed once, threaded through the negotiation, and consumed by
//! [`Conduit::into_parts`] when the stream goes back to the supervisor.

use std::io::{Read, Write};

/// The symmetric cipher state for one peer session, as established by the
/// transport handshake. Opaque to this daemon beyond nonce bookkeeping.
#[derive(Clone, Debug, PartialEq)]
pub struct ConduitState {
	/// Key used for messages we send.
	pub sending_key: [u8; 32],
	/// Key used for messages we receive.
	pub receiving_key: [u8; 32],
	/// Chaining key the transport layer rotates the sending key from.
	pub sending_chaining_key: [u8; 32],
	/// Chaining key the transport layer rotates the receiving key from.
	pub receiving_chaining_key: [u8; 32],
	/// Nonce of the next frame we send. Each frame consumes two nonces (one
	/// for the length, one for the body).
	pub sending_nonce: u32,
	/// Nonce of the next frame we receive.
	pub receiving_nonce: u32,
}

impl_writeable!(ConduitState, 32*4+4+4, {
	sending_key,
	receiving_key,
	sending_chaining_key,
	receiving_chaining_key,
	sending_nonce,
	receiving_nonce
});

/// A blocking, length-framed message pipe to the peer, carrying the cipher
/// state alongside the stream it belongs to.
pub struct Conduit<S: Read + Write> {
	stream: S,
	state: ConduitState,
}

impl<S: Read + Write> Conduit<S> {
	/// Wraps a peer stream together with the cipher state the supervisor
	/// established for it.
	pub fn new(stream: S, state: ConduitState) -> Conduit<S> {
		Conduit { stream, state }
	}

	/// Sends one message, framed with a 2-byte big-endian length. Blocks
	/// until the full frame is written.
	pub fn send(&mut self, msg: &[u8]) -> Result<(), ::std::io::Error> {
		if msg.len() > ::std::u16::MAX as usize {
			return Err(::std::io::Error::new(::std::io::ErrorKind::InvalidInput, "message too large for frame"));
		}
		let len = crate::util::byte_utils::be16_to_array(msg.len() as u16);
		self.stream.write_all(&len)?;
		self.stream.write_all(msg)?;
		self.stream.flush()?;
		// One nonce for the length frame, one for the body
		self.state.sending_nonce += 2;
		Ok(())
	}

	/// Receives one message. Blocks until a full frame arrives.
	pub fn recv(&mut self) -> Result<Vec<u8>, ::std::io::Error> {
		let mut len = [0u8; 2];
		self.stream.read_exact(&mut len)?;
		let mut msg = vec![0u8; crate::util::byte_utils::slice_to_be16(&len) as usize];
		self.stream.read_exact(&mut msg)?;
		self.state.receiving_nonce += 2;
		Ok(msg)
	}

	/// The current cipher state.
	pub fn state(&self) -> &ConduitState {
		&self.state
	}

	/// Consumes the conduit, handing back the stream and the advanced cipher
	/// state for the supervisor to resume the session with.
	pub fn into_parts(self) -> (S, ConduitState) {
		(self.stream, self.state)
	}
}
