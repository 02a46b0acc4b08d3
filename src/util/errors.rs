// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Error types live here.

use std::fmt;

/// Why the negotiation died. Every variant is fatal to the daemon; there is
/// no recovery path short of the supervisor spawning a fresh instance.
///
/// The variants split into two disjoint families. Peer faults (the peer
/// violated a protocol MUST, fed us garbage, or its stream failed) owe the
/// peer a best-effort `error` frame before we exit. Local faults (a
/// malformed supervisor command or a key-derivation failure) never touch the
/// peer stream.
#[derive(Clone, Debug, PartialEq)]
pub enum OpeningError {
	/// The supervisor sent something other than the command we were required
	/// to read next, or its channel died under us.
	BadCommand(String),
	/// A scalar expanded from the seed was not a valid secp256k1 key. This is
	/// vanishingly unlikely, but it must kill the process rather than retry.
	KeyDerivationFailed(String),
	/// A locally-supplied parameter was out of protocol bounds.
	BadParam(String),
	/// The handed-in `open_channel` could not be parsed.
	PeerBadInitialMessage(String),
	/// The peer's funding amount, push amount or feerate was unacceptable.
	PeerBadFunding(String),
	/// The peer's channel parameters failed the configured bounds.
	PeerBadConfig(String),
	/// Reading from the peer failed, or what we read was not the message the
	/// protocol calls for here (including a signature that does not verify).
	PeerReadFailed(String),
	/// Writing to the peer failed.
	PeerWriteFailed(String),
}

impl OpeningError {
	/// Whether this failure owes the peer an `error` frame before we exit.
	pub fn sends_peer_error(&self) -> bool {
		match self {
			OpeningError::BadCommand(_) => false,
			OpeningError::KeyDerivationFailed(_) => false,
			OpeningError::BadParam(_) => true,
			OpeningError::PeerBadInitialMessage(_) => true,
			OpeningError::PeerBadFunding(_) => true,
			OpeningError::PeerBadConfig(_) => true,
			OpeningError::PeerReadFailed(_) => true,
			OpeningError::PeerWriteFailed(_) => true,
		}
	}

	/// Stable discriminant carried in the `Failure` status frame and used as
	/// the process exit code.
	pub fn status_code(&self) -> u8 {
		match self {
			OpeningError::BadCommand(_) => 1,
			OpeningError::KeyDerivationFailed(_) => 2,
			OpeningError::BadParam(_) => 3,
			OpeningError::PeerBadInitialMessage(_) => 4,
			OpeningError::PeerBadFunding(_) => 5,
			OpeningError::PeerBadConfig(_) => 6,
			OpeningError::PeerReadFailed(_) => 7,
			OpeningError::PeerWriteFailed(_) => 8,
		}
	}

	/// The human-readable detail attached to this failure.
	pub fn message(&self) -> &str {
		match self {
			OpeningError::BadCommand(ref s) => s,
			OpeningError::KeyDerivationFailed(ref s) => s,
			OpeningError::BadParam(ref s) => s,
			OpeningError::PeerBadInitialMessage(ref s) => s,
			OpeningError::PeerBadFunding(ref s) => s,
			OpeningError::PeerBadConfig(ref s) => s,
			OpeningError::PeerReadFailed(ref s) => s,
			OpeningError::PeerWriteFailed(ref s) => s,
		}
	}
}

impl fmt::Display for OpeningError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		let kind = match self {
			OpeningError::BadCommand(_) => "bad command",
			OpeningError::KeyDerivationFailed(_) => "key derivation failed",
			OpeningError::BadParam(_) => "bad parameter",
			OpeningError::PeerBadInitialMessage(_) => "peer sent bad initial message",
			OpeningError::PeerBadFunding(_) => "peer sent bad funding terms",
			OpeningError::PeerBadConfig(_) => "peer sent bad config",
			OpeningError::PeerReadFailed(_) => "failed reading from peer",
			OpeningError::PeerWriteFailed(_) => "failed writing to peer",
		};
		write!(f, "{}: {}", kind, self.message())
	}
}
