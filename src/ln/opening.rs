// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The channel-opening state machines.
//!
//! [`OpeningEngine`] drives exactly one negotiation, as either the funder
//! (we initiate with `open_channel`) or the fundee (we answer one). Both
//! paths run strictly sequentially over blocking I/O: every peer read is a
//! suspension point and there are no timeouts here; a supervisor that loses
//! patience kills the process.
//!
//! Both entry points consume the engine. On success they return the
//! negotiated channel material together with the raw peer stream, whose
//! advanced cipher state rides inside the result; any further use of the
//! peer stream by this process would be a bug, which the move semantics
//! make unrepresentable. On failure the peer is sent a best-effort `error`
//! frame (when the failure is its fault) and the error propagates out for
//! the supervisor to see.

use std::io::{Read, Write};
use std::sync::Arc;

use bitcoin::secp256k1::{All, PublicKey, Secp256k1};
use bitcoin::Txid;

use crate::ln::chan_utils::ChannelPublicKeys;
use crate::ln::channel::{Channel, MAX_FUNDING_SATOSHIS};
use crate::ln::channel_keys::OpeningKeys;
use crate::ln::conduit::{Conduit, ConduitState};
use crate::ln::msgs;
use crate::ln::wire::{self, Encode};
use crate::util::config::{ChannelConfig, ChannelHandshakeLimits};
use crate::util::errors::OpeningError;
use crate::util::logger::Logger;
use crate::util::ser::{VecWriter, Writeable};

/// The reserve each side requires of the other: 1% of the channel value,
/// rounded up.
pub(crate) fn derive_channel_reserve(funding_satoshis: u64) -> u64 {
	(funding_satoshis + 99) / 100
}

/// Everything the supervisor needs to operate the channel once the funding
/// transaction confirms, emitted exactly once on success.
#[derive(Clone, Debug, PartialEq)]
pub struct NegotiatedChannel {
	/// The parameter block the peer negotiated with.
	pub remoteconf: ChannelConfig,
	/// The peer's signature on our first commitment transaction. Holding
	/// this is what makes the channel safe to fund.
	pub remote_signature: bitcoin::secp256k1::ecdsa::Signature,
	/// The peer's funding key and basepoints.
	pub remote_pubkeys: ChannelPublicKeys,
	/// The per-commitment point for the peer's first commitment transaction.
	pub remote_first_per_commitment_point: PublicKey,
	/// The funding transaction id both sides committed to.
	pub funding_txid: Txid,
	/// The funding output index both sides committed to.
	pub funding_output_index: u16,
	/// The peer-stream cipher state, advanced past the handshake traffic,
	/// for the supervisor to resume the session with.
	pub conduit_state: ConduitState,
}

impl_writeable!(NegotiatedChannel, 0, {
	remoteconf,
	remote_signature,
	remote_pubkeys,
	remote_first_per_commitment_point,
	funding_txid,
	funding_output_index,
	conduit_state
});

/// A single-shot channel-opening negotiator, bound to one peer stream and
/// one derived key set.
pub struct OpeningEngine<S: Read + Write> {
	conduit: Conduit<S>,
	localconf: ChannelConfig,
	limits: ChannelHandshakeLimits,
	keys: OpeningKeys,
	secp_ctx: Secp256k1<All>,
	logger: Arc<dyn Logger>,
	temporary_channel_id: [u8; 32],
}

impl<S: Read + Write> OpeningEngine<S> {
	/// Builds an engine around a peer conduit and the key material derived
	/// from the supervisor's seed. `localconf.channel_reserve_satoshis` is
	/// ignored; it is filled in from the funding amount once known.
	pub fn new(conduit: Conduit<S>, localconf: ChannelConfig, limits: ChannelHandshakeLimits,
			keys: OpeningKeys, logger: Arc<dyn Logger>) -> OpeningEngine<S> {
		OpeningEngine {
			conduit,
			localconf,
			limits,
			keys,
			secp_ctx: Secp256k1::new(),
			logger,
			temporary_channel_id: [0; 32],
		}
	}

	/// Our funding pubkey, as it will appear in the 2-of-2 funding output.
	pub fn funding_pubkey(&self) -> &PublicKey {
		&self.keys.pubkeys.funding_pubkey
	}

	/// Runs the funder path: send `open_channel`, take `accept_channel`,
	/// ask the caller for the funding outpoint (handing it both funding
	/// pubkeys so it can build the funding output), exchange
	/// `funding_created`/`funding_signed`, and verify the peer's signature.
	///
	/// `outpoint_source` is invoked exactly once, mid-flow, after the
	/// peer's parameters have been validated.
	pub fn fund<F>(mut self, funding_satoshis: u64, push_msat: u64, feerate_per_kw: u32,
			max_minimum_depth: u32, outpoint_source: F) -> Result<(NegotiatedChannel, S), OpeningError>
		where F: FnOnce(&PublicKey, &PublicKey) -> Result<(Txid, u16), OpeningError>
	{
		// Local bounds come first: nothing has hit the wire yet, so a
		// violation here kills the process without an error frame to a peer
		// which has not heard from us.
		if funding_satoshis >= MAX_FUNDING_SATOSHIS {
			return Err(OpeningError::BadParam(format!(
				"funding_satoshis {} must be < {}", funding_satoshis, MAX_FUNDING_SATOSHIS)));
		}
		if push_msat > 1000 * funding_satoshis {
			return Err(OpeningError::BadParam(format!(
				"push_msat {} too large for funding_satoshis {}", push_msat, funding_satoshis)));
		}
		match self.fund_inner(funding_satoshis, push_msat, feerate_per_kw, max_minimum_depth, outpoint_source) {
			Ok(negotiated) => {
				let (stream, _) = self.conduit.into_parts();
				Ok((negotiated, stream))
			},
			Err(e) => {
				self.fail_channel(&e);
				Err(e)
			},
		}
	}

	fn fund_inner<F>(&mut self, funding_satoshis: u64, push_msat: u64, feerate_per_kw: u32,
			max_minimum_depth: u32, outpoint_source: F) -> Result<NegotiatedChannel, OpeningError>
		where F: FnOnce(&PublicKey, &PublicKey) -> Result<(Txid, u16), OpeningError>
	{
		self.localconf.channel_reserve_satoshis = derive_channel_reserve(funding_satoshis);
		// We serve one negotiation per peer, so a constant all-ones id (MSB
		// set, as the sender must) cannot collide with another channel.
		self.temporary_channel_id = [0xff; 32];

		let open = msgs::OpenChannel {
			temporary_channel_id: self.temporary_channel_id,
			funding_satoshis,
			push_msat,
			dust_limit_satoshis: self.localconf.dust_limit_satoshis,
			max_htlc_value_in_flight_msat: self.localconf.max_htlc_value_in_flight_msat,
			channel_reserve_satoshis: self.localconf.channel_reserve_satoshis,
			htlc_minimum_msat: self.localconf.htlc_minimum_msat,
			feerate_per_kw,
			to_self_delay: self.localconf.to_self_delay,
			max_accepted_htlcs: self.localconf.max_accepted_htlcs,
			funding_pubkey: self.keys.pubkeys.funding_pubkey,
			revocation_basepoint: self.keys.pubkeys.revocation_basepoint,
			payment_basepoint: self.keys.pubkeys.payment_basepoint,
			delayed_payment_basepoint: self.keys.pubkeys.delayed_payment_basepoint,
			first_per_commitment_point: self.keys.first_per_commitment_point,
		};
		self.send_message(&open, "open_channel")?;
		log_info!(self.logger, "Sent open_channel for {} sat (pushing {} msat) at feerate {}",
			funding_satoshis, push_msat, feerate_per_kw);

		let accept = match self.recv_message("accept_channel")? {
			wire::Message::AcceptChannel(msg) => msg,
			wire::Message::Error(msg) =>
				return Err(OpeningError::PeerReadFailed(format!("Peer errored on open_channel: {}", msg.data))),
			msg =>
				return Err(OpeningError::PeerReadFailed(format!("Expected accept_channel, got type {}", msg.type_id()))),
		};

		if accept.temporary_channel_id != self.temporary_channel_id {
			return Err(OpeningError::PeerReadFailed(format!(
				"accept_channel ids don't match: sent {} got {}",
				log_bytes!(self.temporary_channel_id), log_bytes!(accept.temporary_channel_id))));
		}
		if accept.minimum_depth > max_minimum_depth {
			return Err(OpeningError::BadParam(format!(
				"minimum_depth {} larger than {}", accept.minimum_depth, max_minimum_depth)));
		}

		let remoteconf = ChannelConfig {
			dust_limit_satoshis: accept.dust_limit_satoshis,
			max_htlc_value_in_flight_msat: accept.max_htlc_value_in_flight_msat,
			channel_reserve_satoshis: accept.channel_reserve_satoshis,
			htlc_minimum_msat: accept.htlc_minimum_msat,
			to_self_delay: accept.to_self_delay,
			max_accepted_htlcs: accept.max_accepted_htlcs,
			minimum_depth: accept.minimum_depth,
		};
		self.check_remote_config(&remoteconf, funding_satoshis)?;
		let remote_pubkeys = ChannelPublicKeys {
			funding_pubkey: accept.funding_pubkey,
			revocation_basepoint: accept.revocation_basepoint,
			payment_basepoint: accept.payment_basepoint,
			delayed_payment_basepoint: accept.delayed_payment_basepoint,
		};

		// Now the supervisor can build the funding transaction paying to the
		// two funding keys; we block until it hands us the outpoint.
		let (funding_txid, funding_output_index) =
			outpoint_source(&self.keys.pubkeys.funding_pubkey, &remote_pubkeys.funding_pubkey)?;
		log_debug!(self.logger, "Funding outpoint {}:{} received from supervisor",
			funding_txid, funding_output_index);

		let channel = Channel::new(funding_txid, funding_output_index, funding_satoshis, push_msat,
			feerate_per_kw, self.localconf.clone(), remoteconf.clone(),
			self.keys.pubkeys.clone(), remote_pubkeys.clone(),
			self.keys.first_per_commitment_point, accept.first_per_commitment_point, true)?;

		let signature = channel.sign_counterparty_commitment(&self.secp_ctx, &self.keys.secrets.funding_key)?;
		self.send_message(&msgs::FundingCreated {
			temporary_channel_id: self.temporary_channel_id,
			funding_txid,
			funding_output_index,
			signature,
		}, "funding_created")?;

		let funding_signed = match self.recv_message("funding_signed")? {
			wire::Message::FundingSigned(msg) => msg,
			wire::Message::Error(msg) =>
				return Err(OpeningError::PeerReadFailed(format!("Peer errored on funding_created: {}", msg.data))),
			msg =>
				return Err(OpeningError::PeerReadFailed(format!("Expected funding_signed, got type {}", msg.type_id()))),
		};
		if funding_signed.channel_id != self.temporary_channel_id {
			return Err(OpeningError::PeerReadFailed(format!(
				"funding_signed ids don't match: sent {} got {}",
				log_bytes!(self.temporary_channel_id), log_bytes!(funding_signed.channel_id))));
		}

		channel.check_holder_commitment_signature(&self.secp_ctx, &funding_signed.signature)?;
		log_info!(self.logger, "Peer signature on our first commitment verified; channel open negotiated");

		Ok(NegotiatedChannel {
			remoteconf,
			remote_signature: funding_signed.signature,
			remote_pubkeys,
			remote_first_per_commitment_point: accept.first_per_commitment_point,
			funding_txid,
			funding_output_index,
			conduit_state: self.conduit.state().clone(),
		})
	}

	/// Runs the fundee path against an `open_channel` the supervisor's
	/// handshake layer already pulled off the stream: validate it, send
	/// `accept_channel`, take `funding_created`, verify the funder's
	/// signature on our first commitment, and answer `funding_signed`.
	pub fn accept(mut self, min_feerate: u32, max_feerate: u32, open_channel_msg: &[u8])
			-> Result<(NegotiatedChannel, S), OpeningError> {
		match self.accept_inner(min_feerate, max_feerate, open_channel_msg) {
			Ok(negotiated) => {
				let (stream, _) = self.conduit.into_parts();
				Ok((negotiated, stream))
			},
			Err(e) => {
				self.fail_channel(&e);
				Err(e)
			},
		}
	}

	fn accept_inner(&mut self, min_feerate: u32, max_feerate: u32, open_channel_msg: &[u8])
			-> Result<NegotiatedChannel, OpeningError> {
		let open = match wire::read(&mut &open_channel_msg[..]) {
			Ok(wire::Message::OpenChannel(msg)) => msg,
			Ok(msg) => return Err(OpeningError::PeerBadInitialMessage(format!(
				"Expected open_channel, got type {}", msg.type_id()))),
			Err(_) => return Err(OpeningError::PeerBadInitialMessage(format!(
				"Parsing open_channel {}", log_bytes!(open_channel_msg)))),
		};
		self.temporary_channel_id = open.temporary_channel_id;

		if open.funding_satoshis >= MAX_FUNDING_SATOSHIS {
			return Err(OpeningError::PeerBadFunding(format!(
				"funding_satoshis {} too large", open.funding_satoshis)));
		}
		if open.push_msat > open.funding_satoshis * 1000 {
			return Err(OpeningError::PeerBadFunding(format!(
				"push_msat {} too large for funding_satoshis {}", open.push_msat, open.funding_satoshis)));
		}
		if open.feerate_per_kw < min_feerate {
			return Err(OpeningError::PeerBadFunding(format!(
				"feerate_per_kw {} below minimum {}", open.feerate_per_kw, min_feerate)));
		}
		if open.feerate_per_kw > max_feerate {
			return Err(OpeningError::PeerBadFunding(format!(
				"feerate_per_kw {} above maximum {}", open.feerate_per_kw, max_feerate)));
		}

		self.localconf.channel_reserve_satoshis = derive_channel_reserve(open.funding_satoshis);
		let remoteconf = ChannelConfig {
			dust_limit_satoshis: open.dust_limit_satoshis,
			max_htlc_value_in_flight_msat: open.max_htlc_value_in_flight_msat,
			channel_reserve_satoshis: open.channel_reserve_satoshis,
			htlc_minimum_msat: open.htlc_minimum_msat,
			to_self_delay: open.to_self_delay,
			max_accepted_htlcs: open.max_accepted_htlcs,
			// The funder never states a depth; only the fundee's requirement
			// matters
			minimum_depth: 0,
		};
		self.check_remote_config(&remoteconf, open.funding_satoshis)?;
		let remote_pubkeys = ChannelPublicKeys {
			funding_pubkey: open.funding_pubkey,
			revocation_basepoint: open.revocation_basepoint,
			payment_basepoint: open.payment_basepoint,
			delayed_payment_basepoint: open.delayed_payment_basepoint,
		};

		self.send_message(&msgs::AcceptChannel {
			temporary_channel_id: self.temporary_channel_id,
			dust_limit_satoshis: self.localconf.dust_limit_satoshis,
			max_htlc_value_in_flight_msat: self.localconf.max_htlc_value_in_flight_msat,
			channel_reserve_satoshis: self.localconf.channel_reserve_satoshis,
			minimum_depth: self.localconf.minimum_depth,
			htlc_minimum_msat: self.localconf.htlc_minimum_msat,
			to_self_delay: self.localconf.to_self_delay,
			max_accepted_htlcs: self.localconf.max_accepted_htlcs,
			funding_pubkey: self.keys.pubkeys.funding_pubkey,
			revocation_basepoint: self.keys.pubkeys.revocation_basepoint,
			payment_basepoint: self.keys.pubkeys.payment_basepoint,
			delayed_payment_basepoint: self.keys.pubkeys.delayed_payment_basepoint,
			first_per_commitment_point: self.keys.first_per_commitment_point,
		}, "accept_channel")?;
		log_info!(self.logger, "Sent accept_channel for {} sat at feerate {}",
			open.funding_satoshis, open.feerate_per_kw);

		let funding_created = match self.recv_message("funding_created")? {
			wire::Message::FundingCreated(msg) => msg,
			wire::Message::Error(msg) =>
				return Err(OpeningError::PeerReadFailed(format!("Peer errored on accept_channel: {}", msg.data))),
			msg =>
				return Err(OpeningError::PeerReadFailed(format!("Expected funding_created, got type {}", msg.type_id()))),
		};
		if funding_created.temporary_channel_id != self.temporary_channel_id {
			return Err(OpeningError::PeerReadFailed(format!(
				"funding_created ids don't match: sent {} got {}",
				log_bytes!(self.temporary_channel_id), log_bytes!(funding_created.temporary_channel_id))));
		}

		let channel = Channel::new(funding_created.funding_txid, funding_created.funding_output_index,
			open.funding_satoshis, open.push_msat, open.feerate_per_kw,
			self.localconf.clone(), remoteconf.clone(),
			self.keys.pubkeys.clone(), remote_pubkeys.clone(),
			self.keys.first_per_commitment_point, open.first_per_commitment_point, false)?;

		channel.check_holder_commitment_signature(&self.secp_ctx, &funding_created.signature)?;

		let signature = channel.sign_counterparty_commitment(&self.secp_ctx, &self.keys.secrets.funding_key)?;
		self.send_message(&msgs::FundingSigned {
			channel_id: self.temporary_channel_id,
			signature,
		}, "funding_signed")?;
		log_info!(self.logger, "Funder signature on our first commitment verified; channel open negotiated");

		Ok(NegotiatedChannel {
			remoteconf,
			remote_signature: funding_created.signature,
			remote_pubkeys,
			remote_first_per_commitment_point: open.first_per_commitment_point,
			funding_txid: funding_created.funding_txid,
			funding_output_index: funding_created.funding_output_index,
			conduit_state: self.conduit.state().clone(),
		})
	}

	/// Enforces the configured bounds on the parameter block the peer sent.
	/// Check order matters only for which complaint the peer hears first.
	fn check_remote_config(&self, remoteconf: &ChannelConfig, funding_satoshis: u64) -> Result<(), OpeningError> {
		if remoteconf.to_self_delay as u32 > self.limits.max_to_self_delay {
			return Err(OpeningError::PeerBadConfig(format!(
				"to_self_delay {} larger than {}", remoteconf.to_self_delay, self.limits.max_to_self_delay)));
		}

		// Overflow check before the capacity math below.
		if remoteconf.channel_reserve_satoshis > funding_satoshis {
			return Err(OpeningError::PeerBadConfig(format!(
				"Invalid channel_reserve_satoshis {} for funding_satoshis {}",
				remoteconf.channel_reserve_satoshis, funding_satoshis)));
		}

		// Whichever reserve is higher binds the spendable balance.
		let reserve_msat = ::std::cmp::max(remoteconf.channel_reserve_satoshis,
			self.localconf.channel_reserve_satoshis) * 1000;

		let mut capacity_msat = funding_satoshis * 1000 - reserve_msat;
		if remoteconf.max_htlc_value_in_flight_msat < capacity_msat {
			capacity_msat = remoteconf.max_htlc_value_in_flight_msat;
		}

		// TODO: htlc_minimum_msat is already in msat, so the extra factor of
		// 1000 here looks like a unit mixup carried over from the first
		// deployment; cross-check against the BOLT 2 text before changing
		// which channels we accept.
		if remoteconf.htlc_minimum_msat as u64 * 1000 > capacity_msat {
			return Err(OpeningError::PeerBadConfig(format!(
				"Invalid htlc_minimum_msat {} for funding_satoshis {} capacity_msat {}",
				remoteconf.htlc_minimum_msat, funding_satoshis, capacity_msat)));
		}

		if capacity_msat < self.limits.min_effective_htlc_capacity_msat {
			return Err(OpeningError::PeerBadConfig(format!(
				"Channel capacity with funding {} msat, reserves {}/{} msat, max_htlc_value_in_flight_msat {} is {} msat, which is below {} msat",
				funding_satoshis * 1000, remoteconf.channel_reserve_satoshis * 1000,
				self.localconf.channel_reserve_satoshis * 1000, remoteconf.max_htlc_value_in_flight_msat,
				capacity_msat, self.limits.min_effective_htlc_capacity_msat)));
		}

		// We don't worry about how many HTLCs they accept, as long as > 0!
		if remoteconf.max_accepted_htlcs == 0 {
			return Err(OpeningError::PeerBadConfig(format!(
				"max_accepted_htlcs {} invalid", remoteconf.max_accepted_htlcs)));
		}
		if remoteconf.max_accepted_htlcs > 511 {
			return Err(OpeningError::PeerBadConfig(format!(
				"max_accepted_htlcs {} too large", remoteconf.max_accepted_htlcs)));
		}

		Ok(())
	}

	fn send_message<M: Encode + Writeable>(&mut self, msg: &M, desc: &str) -> Result<(), OpeningError> {
		let mut buf = VecWriter(Vec::new());
		wire::write(msg, &mut buf).expect("in-memory serialization cannot fail");
		log_trace!(self.logger, "Sending {} ({} bytes)", desc, buf.0.len());
		self.conduit.send(&buf.0)
			.map_err(|e| OpeningError::PeerWriteFailed(format!("Writing {}: {}", desc, e)))
	}

	fn recv_message(&mut self, expecting: &str) -> Result<wire::Message, OpeningError> {
		let bytes = self.conduit.recv()
			.map_err(|e| OpeningError::PeerReadFailed(format!("Reading {}: {}", expecting, e)))?;
		log_trace!(self.logger, "Received {} bytes while expecting {}", bytes.len(), expecting);
		wire::read(&mut &bytes[..])
			.map_err(|_| OpeningError::PeerReadFailed(format!("Parsing {}", expecting)))
	}

	/// Tells the peer why its channel died, when the failure was its fault.
	/// The write is best-effort: the peer may be the reason we are failing.
	fn fail_channel(&mut self, err: &OpeningError) {
		log_error!(self.logger, "Failing channel: {}", err);
		if !err.sends_peer_error() {
			return;
		}
		let msg = msgs::ErrorMessage {
			channel_id: self.temporary_channel_id,
			data: err.message().to_owned(),
		};
		let mut buf = VecWriter(Vec::new());
		wire::write(&msg, &mut buf).expect("in-memory serialization cannot fail");
		if let Err(e) = self.conduit.send(&buf.0) {
			log_warn!(self.logger, "Failed to send error to peer: {}", e);
		}
	}
}

#[cfg(test)]
mod tests {
	use std::io::Read;
	use std::os::unix::net::UnixStream;
	use std::sync::Arc;
	use std::thread;

	use bitcoin::hashes::Hash;
	use bitcoin::secp256k1::{Secp256k1, SecretKey};
	use bitcoin::Txid;

	use super::{derive_channel_reserve, NegotiatedChannel, OpeningEngine};
	use crate::ln::channel::Channel;
	use crate::ln::channel_keys::OpeningKeys;
	use crate::ln::conduit::{Conduit, ConduitState};
	use crate::ln::msgs;
	use crate::ln::wire;
	use crate::util::config::{ChannelConfig, ChannelHandshakeLimits};
	use crate::util::errors::OpeningError;
	use crate::util::ser::{Readable, VecWriter, Writeable};
	use crate::util::test_utils::TestLogger;

	fn conduit_state() -> ConduitState {
		ConduitState {
			sending_key: [1; 32],
			receiving_key: [2; 32],
			sending_chaining_key: [3; 32],
			receiving_chaining_key: [4; 32],
			sending_nonce: 0,
			receiving_nonce: 0,
		}
	}

	fn localconf(to_self_delay: u16, minimum_depth: u32) -> ChannelConfig {
		ChannelConfig {
			dust_limit_satoshis: 546,
			max_htlc_value_in_flight_msat: 5_000_000_000,
			channel_reserve_satoshis: 0,
			htlc_minimum_msat: 0,
			to_self_delay,
			max_accepted_htlcs: 483,
			minimum_depth,
		}
	}

	fn limits() -> ChannelHandshakeLimits {
		ChannelHandshakeLimits {
			max_to_self_delay: 1008,
			min_effective_htlc_capacity_msat: 10_000,
		}
	}

	fn engine(stream: UnixStream, seed: u8, localconf: ChannelConfig) -> OpeningEngine<UnixStream> {
		let secp_ctx = Secp256k1::new();
		let keys = OpeningKeys::from_seed(&secp_ctx, &[seed; 32]).unwrap();
		OpeningEngine::new(Conduit::new(stream, conduit_state()), localconf, limits(), keys,
			Arc::new(TestLogger::new()))
	}

	fn wire_encode<M: wire::Encode + Writeable>(msg: &M) -> Vec<u8> {
		let mut buf = VecWriter(Vec::new());
		wire::write(msg, &mut buf).unwrap();
		buf.0
	}

	fn valid_open_channel(keys: &OpeningKeys) -> msgs::OpenChannel {
		msgs::OpenChannel {
			temporary_channel_id: [0xff; 32],
			funding_satoshis: 500_000,
			push_msat: 100_000_000,
			dust_limit_satoshis: 546,
			max_htlc_value_in_flight_msat: 5_000_000_000,
			channel_reserve_satoshis: 5_000,
			htlc_minimum_msat: 0,
			feerate_per_kw: 15_000,
			to_self_delay: 144,
			max_accepted_htlcs: 483,
			funding_pubkey: keys.pubkeys.funding_pubkey,
			revocation_basepoint: keys.pubkeys.revocation_basepoint,
			payment_basepoint: keys.pubkeys.payment_basepoint,
			delayed_payment_basepoint: keys.pubkeys.delayed_payment_basepoint,
			first_per_commitment_point: keys.first_per_commitment_point,
		}
	}

	fn fundee_keys() -> OpeningKeys {
		OpeningKeys::from_seed(&Secp256k1::new(), &[0x99; 32]).unwrap()
	}

	#[test]
	fn reserve_is_one_percent_rounded_up() {
		assert_eq!(derive_channel_reserve(99), 1);
		assert_eq!(derive_channel_reserve(100), 1);
		assert_eq!(derive_channel_reserve(101), 2);
		assert_eq!(derive_channel_reserve(200), 2);
		assert_eq!(derive_channel_reserve(1_000_000), 10_000);
	}

	#[test]
	fn happy_path_funder_and_fundee() {
		let (funder_stream, fundee_stream) = UnixStream::pair().unwrap();
		let funding_txid = Txid::from_byte_array([0xbe; 32]);

		let funder_thread = thread::spawn(move || {
			let funder = engine(funder_stream, 0x41, localconf(144, 0));
			funder.fund(1_000_000, 0, 15_000, 10, |ours, theirs| {
				assert_ne!(ours, theirs);
				Ok((funding_txid, 0))
			})
		});
		let fundee_thread = thread::spawn(move || {
			// The handshake layer reads the opener's first message before the
			// engine is spun up; mirror that here.
			let mut conduit = Conduit::new(fundee_stream, conduit_state());
			let open_bytes = conduit.recv().unwrap();
			let secp_ctx = Secp256k1::new();
			let keys = OpeningKeys::from_seed(&secp_ctx, &[0x42; 32]).unwrap();
			let fundee = OpeningEngine::new(conduit, localconf(72, 3), limits(), keys,
				Arc::new(TestLogger::new()));
			fundee.accept(1_000, 20_000, &open_bytes)
		});

		let (funder_result, _funder_stream) = funder_thread.join().unwrap().unwrap();
		let (fundee_result, _fundee_stream) = fundee_thread.join().unwrap().unwrap();

		// Both sides ended up committed to the same channel.
		assert_eq!(funder_result.funding_txid, funding_txid);
		assert_eq!(fundee_result.funding_txid, funding_txid);
		assert_eq!(funder_result.funding_output_index, 0);
		assert_eq!(fundee_result.funding_output_index, 0);

		// The funder sees the fundee's parameters, reserve filled in at 1%.
		assert_eq!(funder_result.remoteconf.channel_reserve_satoshis, 10_000);
		assert_eq!(funder_result.remoteconf.minimum_depth, 3);
		assert_eq!(funder_result.remoteconf.to_self_delay, 72);
		assert_eq!(fundee_result.remoteconf.to_self_delay, 144);

		// Each side's stored signature verifies against its own first
		// commitment, rebuilt from scratch here.
		let secp_ctx = Secp256k1::new();
		let funder_keys = OpeningKeys::from_seed(&secp_ctx, &[0x41; 32]).unwrap();
		let mut funder_conf = localconf(144, 0);
		funder_conf.channel_reserve_satoshis = derive_channel_reserve(1_000_000);
		let funder_chan = Channel::new(funding_txid, 0, 1_000_000, 0, 15_000,
			funder_conf, funder_result.remoteconf.clone(),
			funder_keys.pubkeys.clone(), funder_result.remote_pubkeys.clone(),
			funder_keys.first_per_commitment_point, funder_result.remote_first_per_commitment_point,
			true).unwrap();
		funder_chan.check_holder_commitment_signature(&secp_ctx, &funder_result.remote_signature).unwrap();

		// The conduit state each side hands back reflects the two frames it
		// sent and the two it received (two nonces per frame). The fundee's
		// receiving count includes the open_channel its handshake layer ate.
		assert_eq!(funder_result.conduit_state.sending_nonce, 4);
		assert_eq!(funder_result.conduit_state.receiving_nonce, 4);
		assert_eq!(fundee_result.conduit_state.sending_nonce, 4);
		assert_eq!(fundee_result.conduit_state.receiving_nonce, 4);

		// And the serialized result round-trips, since the supervisor reads
		// it off a frame.
		let encoded = funder_result.encode();
		let decoded: NegotiatedChannel = Readable::read(&mut &encoded[..]).unwrap();
		assert_eq!(decoded, funder_result);
	}

	#[test]
	fn funder_rejects_bad_push_before_any_peer_io() {
		let (funder_stream, peer_stream) = UnixStream::pair().unwrap();
		let funder = engine(funder_stream, 0x41, localconf(144, 0));
		match funder.fund(1_000, 1_000_001, 253, 10, |_, _| panic!("must not request an outpoint")) {
			Err(OpeningError::BadParam(_)) => {},
			v => panic!("unexpected result {:?}", v.map(|_| ())),
		}
		// The engine died without writing anything: the peer sees EOF, not
		// an error frame.
		let mut buf = [0u8; 1];
		assert_eq!((&peer_stream).read(&mut buf).unwrap(), 0);
	}

	#[test]
	fn funder_rejects_oversize_funding() {
		let (funder_stream, _peer_stream) = UnixStream::pair().unwrap();
		let funder = engine(funder_stream, 0x41, localconf(144, 0));
		match funder.fund(1 << 24, 0, 253, 10, |_, _| panic!("must not request an outpoint")) {
			Err(OpeningError::BadParam(_)) => {},
			v => panic!("unexpected result {:?}", v.map(|_| ())),
		}
	}

	#[test]
	fn fundee_rejects_oversize_funding() {
		let (fundee_stream, _peer_stream) = UnixStream::pair().unwrap();
		let mut open = valid_open_channel(&fundee_keys());
		open.funding_satoshis = 1 << 24;
		let fundee = engine(fundee_stream, 0x42, localconf(72, 3));
		match fundee.accept(1_000, 20_000, &wire_encode(&open)) {
			Err(OpeningError::PeerBadFunding(_)) => {},
			v => panic!("unexpected result {:?}", v.map(|_| ())),
		}
	}

	#[test]
	fn fundee_rejects_excess_push() {
		let (fundee_stream, _peer_stream) = UnixStream::pair().unwrap();
		let mut open = valid_open_channel(&fundee_keys());
		open.funding_satoshis = 1_000;
		open.push_msat = 1_000_001;
		let fundee = engine(fundee_stream, 0x42, localconf(72, 3));
		match fundee.accept(1_000, 20_000, &wire_encode(&open)) {
			Err(OpeningError::PeerBadFunding(_)) => {},
			v => panic!("unexpected result {:?}", v.map(|_| ())),
		}
	}

	#[test]
	fn fundee_rejects_feerate_out_of_range() {
		let (fundee_stream, _peer_stream) = UnixStream::pair().unwrap();
		let mut open = valid_open_channel(&fundee_keys());
		open.feerate_per_kw = 999;
		let fundee = engine(fundee_stream, 0x42, localconf(72, 3));
		match fundee.accept(1_000, 20_000, &wire_encode(&open)) {
			Err(OpeningError::PeerBadFunding(_)) => {},
			v => panic!("unexpected result {:?}", v.map(|_| ())),
		}

		let (fundee_stream, _peer_stream) = UnixStream::pair().unwrap();
		let mut open = valid_open_channel(&fundee_keys());
		open.feerate_per_kw = 20_001;
		let fundee = engine(fundee_stream, 0x42, localconf(72, 3));
		match fundee.accept(1_000, 20_000, &wire_encode(&open)) {
			Err(OpeningError::PeerBadFunding(_)) => {},
			v => panic!("unexpected result {:?}", v.map(|_| ())),
		}
	}

	#[test]
	fn fundee_rejects_excessive_to_self_delay_and_tells_the_peer() {
		let (fundee_stream, peer_stream) = UnixStream::pair().unwrap();
		let mut open = valid_open_channel(&fundee_keys());
		open.to_self_delay = 1009;
		let fundee = engine(fundee_stream, 0x42, localconf(72, 3));
		match fundee.accept(1_000, 20_000, &wire_encode(&open)) {
			Err(OpeningError::PeerBadConfig(_)) => {},
			v => panic!("unexpected result {:?}", v.map(|_| ())),
		}

		// A protocol failure owes the peer an error frame.
		let mut conduit = Conduit::new(peer_stream, conduit_state());
		let frame = conduit.recv().unwrap();
		match wire::read(&mut &frame[..]).unwrap() {
			wire::Message::Error(msg) => {
				assert_eq!(msg.channel_id, [0xff; 32]);
				assert!(msg.data.contains("to_self_delay"));
			},
			_ => panic!("expected an error frame"),
		}
	}

	#[test]
	fn fundee_rejects_bad_max_accepted_htlcs() {
		for bad in [0u16, 512] {
			let (fundee_stream, _peer_stream) = UnixStream::pair().unwrap();
			let mut open = valid_open_channel(&fundee_keys());
			open.max_accepted_htlcs = bad;
			let fundee = engine(fundee_stream, 0x42, localconf(72, 3));
			match fundee.accept(1_000, 20_000, &wire_encode(&open)) {
				Err(OpeningError::PeerBadConfig(_)) => {},
				v => panic!("unexpected result {:?}", v.map(|_| ())),
			}
		}
	}

	#[test]
	fn fundee_rejects_garbage_initial_message() {
		let (fundee_stream, _peer_stream) = UnixStream::pair().unwrap();
		let fundee = engine(fundee_stream, 0x42, localconf(72, 3));
		match fundee.accept(1_000, 20_000, &[0x00, 0x20, 0xde, 0xad]) {
			Err(OpeningError::PeerBadInitialMessage(_)) => {},
			v => panic!("unexpected result {:?}", v.map(|_| ())),
		}
	}

	#[test]
	fn fundee_rejects_funding_created_id_mismatch() {
		let (fundee_stream, peer_stream) = UnixStream::pair().unwrap();
		let open = valid_open_channel(&fundee_keys());
		let open_bytes = wire_encode(&open);

		let fundee_thread = thread::spawn(move || {
			let fundee = engine(fundee_stream, 0x42, localconf(72, 3));
			fundee.accept(1_000, 20_000, &open_bytes)
		});

		let mut conduit = Conduit::new(peer_stream, conduit_state());
		let accept_frame = conduit.recv().unwrap();
		match wire::read(&mut &accept_frame[..]).unwrap() {
			wire::Message::AcceptChannel(msg) => assert_eq!(msg.temporary_channel_id, [0xff; 32]),
			_ => panic!("expected accept_channel"),
		}
		let secp_ctx = Secp256k1::new();
		let dummy_sig = secp_ctx.sign_ecdsa(&bitcoin::secp256k1::Message::from_digest([1; 32]),
			&SecretKey::from_slice(&[9; 32]).unwrap());
		conduit.send(&wire_encode(&msgs::FundingCreated {
			temporary_channel_id: [0xee; 32],
			funding_txid: Txid::from_byte_array([0xbe; 32]),
			funding_output_index: 0,
			signature: dummy_sig,
		})).unwrap();

		match fundee_thread.join().unwrap() {
			Err(OpeningError::PeerReadFailed(msg)) => assert!(msg.contains("ids don't match")),
			v => panic!("unexpected result {:?}", v.map(|_| ())),
		}
	}

	#[test]
	fn funder_rejects_accept_channel_id_mismatch() {
		let (funder_stream, peer_stream) = UnixStream::pair().unwrap();

		let funder_thread = thread::spawn(move || {
			let funder = engine(funder_stream, 0x41, localconf(144, 0));
			funder.fund(1_000_000, 0, 15_000, 10, |_, _| panic!("must not request an outpoint"))
		});

		let mut conduit = Conduit::new(peer_stream, conduit_state());
		let _open_frame = conduit.recv().unwrap();
		let keys = fundee_keys();
		conduit.send(&wire_encode(&msgs::AcceptChannel {
			temporary_channel_id: [0xee; 32],
			dust_limit_satoshis: 546,
			max_htlc_value_in_flight_msat: 5_000_000_000,
			channel_reserve_satoshis: 10_000,
			minimum_depth: 3,
			htlc_minimum_msat: 0,
			to_self_delay: 72,
			max_accepted_htlcs: 483,
			funding_pubkey: keys.pubkeys.funding_pubkey,
			revocation_basepoint: keys.pubkeys.revocation_basepoint,
			payment_basepoint: keys.pubkeys.payment_basepoint,
			delayed_payment_basepoint: keys.pubkeys.delayed_payment_basepoint,
			first_per_commitment_point: keys.first_per_commitment_point,
		})).unwrap();

		match funder_thread.join().unwrap() {
			Err(OpeningError::PeerReadFailed(msg)) => assert!(msg.contains("ids don't match")),
			v => panic!("unexpected result {:?}", v.map(|_| ())),
		}
	}

	#[test]
	fn funder_rejects_excessive_minimum_depth() {
		let (funder_stream, peer_stream) = UnixStream::pair().unwrap();

		let funder_thread = thread::spawn(move || {
			let funder = engine(funder_stream, 0x41, localconf(144, 0));
			funder.fund(1_000_000, 0, 15_000, 10, |_, _| panic!("must not request an outpoint"))
		});

		let mut conduit = Conduit::new(peer_stream, conduit_state());
		let _open_frame = conduit.recv().unwrap();
		let keys = fundee_keys();
		conduit.send(&wire_encode(&msgs::AcceptChannel {
			temporary_channel_id: [0xff; 32],
			dust_limit_satoshis: 546,
			max_htlc_value_in_flight_msat: 5_000_000_000,
			channel_reserve_satoshis: 10_000,
			minimum_depth: 11,
			htlc_minimum_msat: 0,
			to_self_delay: 72,
			max_accepted_htlcs: 483,
			funding_pubkey: keys.pubkeys.funding_pubkey,
			revocation_basepoint: keys.pubkeys.revocation_basepoint,
			payment_basepoint: keys.pubkeys.payment_basepoint,
			delayed_payment_basepoint: keys.pubkeys.delayed_payment_basepoint,
			first_per_commitment_point: keys.first_per_commitment_point,
		})).unwrap();

		match funder_thread.join().unwrap() {
			Err(OpeningError::BadParam(msg)) => assert!(msg.contains("minimum_depth")),
			v => panic!("unexpected result {:?}", v.map(|_| ())),
		}
	}

	#[test]
	fn funder_rejects_corrupted_funding_signed_signature() {
		let (funder_stream, peer_stream) = UnixStream::pair().unwrap();
		let funding_txid = Txid::from_byte_array([0xbe; 32]);

		let funder_thread = thread::spawn(move || {
			let funder = engine(funder_stream, 0x41, localconf(144, 0));
			funder.fund(1_000_000, 0, 15_000, 10, move |_, _| Ok((funding_txid, 0)))
		});

		// Play a well-behaved fundee by hand, then flip one byte of the
		// final signature.
		let secp_ctx = Secp256k1::new();
		let keys = fundee_keys();
		let mut conduit = Conduit::new(peer_stream, conduit_state());
		let open_frame = conduit.recv().unwrap();
		let open = match wire::read(&mut &open_frame[..]).unwrap() {
			wire::Message::OpenChannel(msg) => msg,
			_ => panic!("expected open_channel"),
		};

		let mut fundee_conf = localconf(72, 3);
		fundee_conf.channel_reserve_satoshis = derive_channel_reserve(open.funding_satoshis);
		conduit.send(&wire_encode(&msgs::AcceptChannel {
			temporary_channel_id: open.temporary_channel_id,
			dust_limit_satoshis: fundee_conf.dust_limit_satoshis,
			max_htlc_value_in_flight_msat: fundee_conf.max_htlc_value_in_flight_msat,
			channel_reserve_satoshis: fundee_conf.channel_reserve_satoshis,
			minimum_depth: fundee_conf.minimum_depth,
			htlc_minimum_msat: fundee_conf.htlc_minimum_msat,
			to_self_delay: fundee_conf.to_self_delay,
			max_accepted_htlcs: fundee_conf.max_accepted_htlcs,
			funding_pubkey: keys.pubkeys.funding_pubkey,
			revocation_basepoint: keys.pubkeys.revocation_basepoint,
			payment_basepoint: keys.pubkeys.payment_basepoint,
			delayed_payment_basepoint: keys.pubkeys.delayed_payment_basepoint,
			first_per_commitment_point: keys.first_per_commitment_point,
		})).unwrap();

		let fc_frame = conduit.recv().unwrap();
		let funding_created = match wire::read(&mut &fc_frame[..]).unwrap() {
			wire::Message::FundingCreated(msg) => msg,
			_ => panic!("expected funding_created"),
		};

		let remoteconf = ChannelConfig {
			dust_limit_satoshis: open.dust_limit_satoshis,
			max_htlc_value_in_flight_msat: open.max_htlc_value_in_flight_msat,
			channel_reserve_satoshis: open.channel_reserve_satoshis,
			htlc_minimum_msat: open.htlc_minimum_msat,
			to_self_delay: open.to_self_delay,
			max_accepted_htlcs: open.max_accepted_htlcs,
			minimum_depth: 0,
		};
		let remote_pubkeys = crate::ln::chan_utils::ChannelPublicKeys {
			funding_pubkey: open.funding_pubkey,
			revocation_basepoint: open.revocation_basepoint,
			payment_basepoint: open.payment_basepoint,
			delayed_payment_basepoint: open.delayed_payment_basepoint,
		};
		let channel = Channel::new(funding_created.funding_txid, funding_created.funding_output_index,
			open.funding_satoshis, open.push_msat, open.feerate_per_kw,
			fundee_conf, remoteconf, keys.pubkeys.clone(), remote_pubkeys,
			keys.first_per_commitment_point, open.first_per_commitment_point, false).unwrap();
		let good_sig = channel.sign_counterparty_commitment(&secp_ctx, &keys.secrets.funding_key).unwrap();

		let mut bad_sig_bytes = good_sig.serialize_compact();
		bad_sig_bytes[20] ^= 0x01;
		conduit.send(&wire_encode(&msgs::FundingSigned {
			channel_id: open.temporary_channel_id,
			signature: bitcoin::secp256k1::ecdsa::Signature::from_compact(&bad_sig_bytes).unwrap(),
		})).unwrap();

		match funder_thread.join().unwrap() {
			Err(OpeningError::PeerReadFailed(msg)) => assert!(msg.contains("Bad signature")),
			v => panic!("unexpected result {:?}", v.map(|_| ())),
		}
	}
}
