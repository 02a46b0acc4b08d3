// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The framed request/status protocol spoken with the supervising node, and
//! the session loop that services it.
//!
//! Every frame is a 2-byte big-endian length followed by a 2-byte type and
//! the payload. Requests flow supervisor→daemon (init, role selection, the
//! funding outpoint, exit); statuses flow daemon→supervisor (the mid-flow
//! funding-keys reply, the terminal result, or a failure report).
//!
//! The session sequencing is deliberately rigid: init, then exactly one
//! role, then the terminal status, then the peer-descriptor handback, and
//! only then does the daemon wait for `Exit`. Handing the descriptor back
//! before the exit ack means the supervisor can never observe the exit and
//! still find stale frames (or an unclaimed descriptor) in flight.

use std::io::{Read, Write};
use std::sync::Arc;

use bitcoin::secp256k1::{PublicKey, Secp256k1};
use bitcoin::Txid;

use crate::ln::channel_keys::OpeningKeys;
use crate::ln::conduit::{Conduit, ConduitState};
use crate::ln::opening::{NegotiatedChannel, OpeningEngine};
use crate::ln::wire::{self, Encode};
use crate::util::byte_utils;
use crate::util::config::{ChannelConfig, ChannelHandshakeLimits};
use crate::util::errors::OpeningError;
use crate::util::logger::Logger;
use crate::util::ser::{Readable, VecWriter, Writeable, Writer};

/// Hands the daemon everything a negotiation needs: our parameter block,
/// the policy bounds, the peer-stream cipher state, and the key seed.
#[derive(Clone, Debug, PartialEq)]
pub struct Init {
	/// Our side's channel parameters. The reserve field is recomputed from
	/// the funding amount and may be left zero.
	pub localconf: ChannelConfig,
	/// Upper bound on the `to_self_delay` the peer may impose on us.
	pub max_to_self_delay: u32,
	/// Lower bound on the effective HTLC capacity of an acceptable channel.
	pub min_effective_htlc_capacity_msat: u64,
	/// Cipher state of the peer stream, as left by the transport handshake.
	pub conduit_state: ConduitState,
	/// The 256-bit seed every channel key derives from. It never leaves
	/// this process again.
	pub seed: [u8; 32],
}

impl_writeable!(Init, 0, {
	localconf,
	max_to_self_delay,
	min_effective_htlc_capacity_msat,
	conduit_state,
	seed
});

/// Selects the funder role: we send `open_channel` with these terms.
#[derive(Clone, Debug, PartialEq)]
pub struct Fund {
	/// The channel value we are putting up.
	pub funding_satoshis: u64,
	/// Amount gifted to the peer at open, in milli-satoshi.
	pub push_msat: u64,
	/// Feerate for the commitment transactions, in satoshi per 1000-weight.
	pub feerate_per_kw: u32,
	/// Upper bound on the confirmation depth the peer may demand of us.
	pub max_minimum_depth: u32,
}

impl_writeable!(Fund, 8+8+4+4, {
	funding_satoshis,
	push_msat,
	feerate_per_kw,
	max_minimum_depth
});

/// Selects the fundee role, carrying the peer's already-received
/// `open_channel` (the supervisor's handshake layer pulled it off the
/// stream before spawning us).
#[derive(Clone, Debug, PartialEq)]
pub struct Accept {
	/// Lowest commitment feerate we will let the funder dictate.
	pub min_feerate: u32,
	/// Highest commitment feerate we will let the funder dictate.
	pub max_feerate: u32,
	/// The raw `open_channel` message, type prefix included.
	pub open_channel: Vec<u8>,
}

impl_writeable!(Accept, 0, {
	min_feerate,
	max_feerate,
	open_channel
});

/// The funding outpoint, answering a [`FundReply`].
#[derive(Clone, Debug, PartialEq)]
pub struct FundingOutpoint {
	/// Id of the (unbroadcast) funding transaction.
	pub funding_txid: Txid,
	/// Index of the funding output within it.
	pub funding_output_index: u16,
}

impl_writeable!(FundingOutpoint, 32+2, {
	funding_txid,
	funding_output_index
});

/// Clean-shutdown request; the daemon exits 0 once it reads this.
#[derive(Clone, Debug, PartialEq)]
pub struct Exit;

impl Writeable for Exit {
	fn write<W: Writer>(&self, _w: &mut W) -> Result<(), ::std::io::Error> {
		Ok(())
	}
}

impl Readable for Exit {
	fn read<R: Read>(_r: &mut R) -> Result<Self, crate::ln::msgs::DecodeError> {
		Ok(Exit)
	}
}

/// Mid-flow status on the funder path: both funding pubkeys, so the
/// supervisor can construct the funding transaction paying to the 2-of-2.
#[derive(Clone, Debug, PartialEq)]
pub struct FundReply {
	/// Our funding pubkey.
	pub our_funding_pubkey: PublicKey,
	/// The peer's funding pubkey.
	pub their_funding_pubkey: PublicKey,
}

impl_writeable!(FundReply, 33+33, {
	our_funding_pubkey,
	their_funding_pubkey
});

/// Terminal status of a successful funder negotiation.
#[derive(Clone, Debug, PartialEq)]
pub struct FundComplete {
	/// The negotiated channel material.
	pub channel: NegotiatedChannel,
}

impl_writeable!(FundComplete, 0, { channel });

/// Terminal status of a successful fundee negotiation.
#[derive(Clone, Debug, PartialEq)]
pub struct AcceptComplete {
	/// The negotiated channel material.
	pub channel: NegotiatedChannel,
}

impl_writeable!(AcceptComplete, 0, { channel });

/// Terminal status of a failed negotiation; the code doubles as the
/// process exit code.
#[derive(Clone, Debug, PartialEq)]
pub struct Failure {
	/// Stable discriminant of the failure kind.
	pub code: u8,
	/// Human-readable detail.
	pub message: String,
}

impl Writeable for Failure {
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), ::std::io::Error> {
		self.code.write(w)?;
		self.message.write(w)
	}
}

impl Readable for Failure {
	fn read<R: Read>(r: &mut R) -> Result<Self, crate::ln::msgs::DecodeError> {
		Ok(Failure {
			code: Readable::read(r)?,
			message: Readable::read(r)?,
		})
	}
}

impl Encode for Init {
	const TYPE: u16 = 1;
}

impl Encode for Fund {
	const TYPE: u16 = 2;
}

impl Encode for Accept {
	const TYPE: u16 = 3;
}

impl Encode for FundingOutpoint {
	const TYPE: u16 = 4;
}

impl Encode for Exit {
	const TYPE: u16 = 5;
}

impl Encode for FundReply {
	const TYPE: u16 = 101;
}

impl Encode for FundComplete {
	const TYPE: u16 = 102;
}

impl Encode for AcceptComplete {
	const TYPE: u16 = 103;
}

impl Encode for Failure {
	const TYPE: u16 = 104;
}

/// A request frame from the supervisor.
#[allow(missing_docs)]
pub enum Request {
	Init(Init),
	Fund(Fund),
	Accept(Accept),
	FundingOutpoint(FundingOutpoint),
	Exit,
}

/// A status frame from the daemon.
#[allow(missing_docs)]
pub enum Status {
	FundReply(FundReply),
	FundComplete(FundComplete),
	AcceptComplete(AcceptComplete),
	Failure(Failure),
}

fn read_frame<R: Read>(r: &mut R) -> Result<(u16, Vec<u8>), OpeningError> {
	let mut len_bytes = [0u8; 2];
	r.read_exact(&mut len_bytes)
		.map_err(|e| OpeningError::BadCommand(format!("Reading control frame: {}", e)))?;
	let mut buf = vec![0u8; byte_utils::slice_to_be16(&len_bytes) as usize];
	r.read_exact(&mut buf)
		.map_err(|e| OpeningError::BadCommand(format!("Reading control frame: {}", e)))?;
	let mut cursor = &buf[..];
	let msg_type = <u16 as Readable>::read(&mut cursor)
		.map_err(|_| OpeningError::BadCommand("Control frame too short for a type".to_owned()))?;
	Ok((msg_type, cursor.to_vec()))
}

/// Writes one framed, type-tagged message and flushes it.
pub fn write_frame<W: Write, M: Encode + Writeable>(w: &mut W, msg: &M) -> Result<(), OpeningError> {
	let mut buf = VecWriter(Vec::new());
	wire::write(msg, &mut buf).expect("in-memory serialization cannot fail");
	let mut framed = Vec::with_capacity(2 + buf.0.len());
	framed.extend_from_slice(&byte_utils::be16_to_array(buf.0.len() as u16));
	framed.extend_from_slice(&buf.0);
	w.write_all(&framed)
		.and_then(|_| w.flush())
		.map_err(|e| OpeningError::BadCommand(format!("Writing control frame: {}", e)))
}

/// Reads the next request from the supervisor. Any unreadable or unknown
/// frame is fatal.
pub fn read_request<R: Read>(r: &mut R) -> Result<Request, OpeningError> {
	let (msg_type, body) = read_frame(r)?;
	let mut cursor = &body[..];
	macro_rules! parse {
		($variant: ident) => {
			Readable::read(&mut cursor).map(Request::$variant)
				.map_err(|e| OpeningError::BadCommand(format!("Parsing control message type {}: {}", msg_type, e)))
		}
	}
	match msg_type {
		Init::TYPE => parse!(Init),
		Fund::TYPE => parse!(Fund),
		Accept::TYPE => parse!(Accept),
		FundingOutpoint::TYPE => parse!(FundingOutpoint),
		Exit::TYPE => Ok(Request::Exit),
		t => Err(OpeningError::BadCommand(format!("Unknown control message type {}", t))),
	}
}

/// Reads the next status frame; the supervisor side of [`write_frame`].
pub fn read_status<R: Read>(r: &mut R) -> Result<Status, OpeningError> {
	let (msg_type, body) = read_frame(r)?;
	let mut cursor = &body[..];
	macro_rules! parse {
		($variant: ident) => {
			Readable::read(&mut cursor).map(Status::$variant)
				.map_err(|e| OpeningError::BadCommand(format!("Parsing status message type {}: {}", msg_type, e)))
		}
	}
	match msg_type {
		FundReply::TYPE => parse!(FundReply),
		FundComplete::TYPE => parse!(FundComplete),
		AcceptComplete::TYPE => parse!(AcceptComplete),
		Failure::TYPE => parse!(Failure),
		t => Err(OpeningError::BadCommand(format!("Unknown status message type {}", t))),
	}
}

/// Services one complete supervisor session over the given channels: init,
/// one role, terminal status, descriptor handback, exit.
///
/// `handback` receives the peer stream after the terminal status has been
/// written; the binary implements it with an `SCM_RIGHTS` send of the
/// underlying descriptor. Only after it returns do we wait for [`Exit`], so
/// the supervisor always holds the descriptor before it can observe our
/// exit.
///
/// On failure a [`Failure`] status is emitted (best-effort) and the error
/// returned for the caller to turn into an exit code.
pub fn serve<R, W, S, F>(req: &mut R, status: &mut W, peer: S, logger: Arc<dyn Logger>, handback: F)
		-> Result<(), OpeningError>
	where R: Read, W: Write, S: Read + Write, F: FnOnce(S) -> Result<(), OpeningError>
{
	match serve_inner(req, status, peer, logger.clone(), handback) {
		Ok(()) => Ok(()),
		Err(e) => {
			log_error!(logger, "Terminating: {}", e);
			let _ = write_frame(status, &Failure { code: e.status_code(), message: e.message().to_owned() });
			Err(e)
		},
	}
}

fn serve_inner<R, W, S, F>(req: &mut R, status: &mut W, peer: S, logger: Arc<dyn Logger>, handback: F)
		-> Result<(), OpeningError>
	where R: Read, W: Write, S: Read + Write, F: FnOnce(S) -> Result<(), OpeningError>
{
	let init = match read_request(req)? {
		Request::Init(init) => init,
		_ => return Err(OpeningError::BadCommand("Expected init".to_owned())),
	};

	let secp_ctx = Secp256k1::new();
	let keys = OpeningKeys::from_seed(&secp_ctx, &init.seed)?;
	let limits = ChannelHandshakeLimits {
		max_to_self_delay: init.max_to_self_delay,
		min_effective_htlc_capacity_msat: init.min_effective_htlc_capacity_msat,
	};
	let engine = OpeningEngine::new(Conduit::new(peer, init.conduit_state), init.localconf,
		limits, keys, logger.clone());
	log_debug!(logger, "Initialized with funding pubkey {}", log_pubkey!(engine.funding_pubkey()));

	let stream = match read_request(req)? {
		Request::Fund(fund) => {
			let (negotiated, stream) = engine.fund(fund.funding_satoshis, fund.push_msat,
				fund.feerate_per_kw, fund.max_minimum_depth, |ours, theirs| {
					write_frame(status, &FundReply {
						our_funding_pubkey: *ours,
						their_funding_pubkey: *theirs,
					})?;
					match read_request(req)? {
						Request::FundingOutpoint(outpoint) =>
							Ok((outpoint.funding_txid, outpoint.funding_output_index)),
						_ => Err(OpeningError::BadCommand("Expected funding outpoint".to_owned())),
					}
				})?;
			write_frame(status, &FundComplete { channel: negotiated })?;
			stream
		},
		Request::Accept(accept) => {
			let (negotiated, stream) = engine.accept(accept.min_feerate, accept.max_feerate,
				&accept.open_channel)?;
			write_frame(status, &AcceptComplete { channel: negotiated })?;
			stream
		},
		_ => return Err(OpeningError::BadCommand("Expected fund or accept".to_owned())),
	};

	handback(stream)?;

	match read_request(req)? {
		Request::Exit => Ok(()),
		_ => Err(OpeningError::BadCommand("Expected exit request".to_owned())),
	}
}
