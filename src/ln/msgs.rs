// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The peer wire messages this daemon speaks, and their codecs.
//!
//! The dialect is deliberately narrow: the four messages of the funding
//! handshake plus the `error` frame we emit when failing a channel. All
//! integers are big-endian, public keys are 33-byte compressed secp256k1
//! points, and signatures travel in 64-byte compact form.

use std::fmt;
use std::io::Read;

use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::secp256k1::PublicKey;
use bitcoin::Txid;

use crate::util::ser::{Readable, Writeable, Writer};

/// An error in decoding a message or struct.
#[derive(Clone, Debug)]
pub enum DecodeError {
	/// Value was invalid, eg a public key or signature that failed to parse
	InvalidValue,
	/// Buffer too short
	ShortRead,
	/// A length descriptor in the packet didn't describe the later data
	/// correctly
	BadLengthDescriptor,
	/// Error from std::io
	Io(::std::io::ErrorKind),
}

impl fmt::Display for DecodeError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			DecodeError::InvalidValue => f.write_str("Nonsense bytes didn't map to the type they were interpreted as"),
			DecodeError::ShortRead => f.write_str("Packet extended beyond the provided bytes"),
			DecodeError::BadLengthDescriptor => f.write_str("A length descriptor in the packet didn't describe the later data correctly"),
			DecodeError::Io(ref e) => fmt::Debug::fmt(e, f),
		}
	}
}

impl From<::std::io::Error> for DecodeError {
	fn from(e: ::std::io::Error) -> Self {
		if e.kind() == ::std::io::ErrorKind::UnexpectedEof {
			DecodeError::ShortRead
		} else {
			DecodeError::Io(e.kind())
		}
	}
}

/// An open_channel message to be sent to or received from a peer.
///
/// Note that this dialect predates `chain_hash` and HTLC basepoints; the
/// four basepoints below plus the funding key are the complete key set.
#[derive(Clone, Debug, PartialEq)]
pub struct OpenChannel {
	/// A temporary channel ID, until the funding outpoint is announced
	pub temporary_channel_id: [u8; 32],
	/// The channel value
	pub funding_satoshis: u64,
	/// The amount to push to the counterparty as part of the open, in
	/// milli-satoshi
	pub push_msat: u64,
	/// The threshold below which outputs on transactions broadcast by sender
	/// will be omitted
	pub dust_limit_satoshis: u64,
	/// The maximum inbound HTLC value in flight towards sender, in
	/// milli-satoshi
	pub max_htlc_value_in_flight_msat: u64,
	/// The minimum value unencumbered by HTLCs for the counterparty to keep
	/// in the channel
	pub channel_reserve_satoshis: u64,
	/// The minimum HTLC size incoming to sender, in milli-satoshi
	pub htlc_minimum_msat: u32,
	/// The feerate per 1000-weight of sender generated transactions, until
	/// updated by update_fee
	pub feerate_per_kw: u32,
	/// The number of blocks which the counterparty will have to wait to claim
	/// on-chain funds if they broadcast a commitment transaction
	pub to_self_delay: u16,
	/// The maximum number of inbound HTLCs towards sender
	pub max_accepted_htlcs: u16,
	/// The sender's key controlling the funding transaction
	pub funding_pubkey: PublicKey,
	/// Used to derive a revocation key for transactions broadcast by
	/// counterparty
	pub revocation_basepoint: PublicKey,
	/// Used to derive a payment key to sender for transactions broadcast by
	/// counterparty
	pub payment_basepoint: PublicKey,
	/// Used to derive a payment key to sender for transactions broadcast by
	/// sender
	pub delayed_payment_basepoint: PublicKey,
	/// The first to-be-broadcast-by-sender transaction's per commitment point
	pub first_per_commitment_point: PublicKey,
}

/// An accept_channel message to be sent to or received from a peer.
#[derive(Clone, Debug, PartialEq)]
pub struct AcceptChannel {
	/// The same temporary channel ID as given in the open_channel
	pub temporary_channel_id: [u8; 32],
	/// The threshold below which outputs on transactions broadcast by sender
	/// will be omitted
	pub dust_limit_satoshis: u64,
	/// The maximum inbound HTLC value in flight towards sender, in
	/// milli-satoshi
	pub max_htlc_value_in_flight_msat: u64,
	/// The minimum value unencumbered by HTLCs for the counterparty to keep
	/// in the channel
	pub channel_reserve_satoshis: u64,
	/// The number of confirmations the sender requires before considering the
	/// channel locked in
	pub minimum_depth: u32,
	/// The minimum HTLC size incoming to sender, in milli-satoshi
	pub htlc_minimum_msat: u32,
	/// The number of blocks which the counterparty will have to wait to claim
	/// on-chain funds if they broadcast a commitment transaction
	pub to_self_delay: u16,
	/// The maximum number of inbound HTLCs towards sender
	pub max_accepted_htlcs: u16,
	/// The sender's key controlling the funding transaction
	pub funding_pubkey: PublicKey,
	/// Used to derive a revocation key for transactions broadcast by
	/// counterparty
	pub revocation_basepoint: PublicKey,
	/// Used to derive a payment key to sender for transactions broadcast by
	/// counterparty
	pub payment_basepoint: PublicKey,
	/// Used to derive a payment key to sender for transactions broadcast by
	/// sender
	pub delayed_payment_basepoint: PublicKey,
	/// The first to-be-broadcast-by-sender transaction's per commitment point
	pub first_per_commitment_point: PublicKey,
}

/// A funding_created message to be sent to or received from a peer.
#[derive(Clone, Debug, PartialEq)]
pub struct FundingCreated {
	/// The same temporary channel ID as given in the open_channel
	pub temporary_channel_id: [u8; 32],
	/// The funding transaction ID
	pub funding_txid: Txid,
	/// The specific output index funding this channel
	pub funding_output_index: u16,
	/// The signature of the channel initiator on the initial commitment
	/// transaction to be broadcast by the channel acceptor
	pub signature: Signature,
}

/// A funding_signed message to be sent to or received from a peer.
#[derive(Clone, Debug, PartialEq)]
pub struct FundingSigned {
	/// The channel ID (still the temporary one at this stage of the handshake)
	pub channel_id: [u8; 32],
	/// The signature of the channel acceptor on the initial commitment
	/// transaction to be broadcast by the channel initiator
	pub signature: Signature,
}

/// An error message to be sent to a peer when failing the channel.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorMessage {
	/// The channel ID involved in the error
	pub channel_id: [u8; 32],
	/// A possibly human-readable error description
	pub data: String,
}

impl_writeable!(OpenChannel, 32+8*5+4+4+2+2+33*5, {
	temporary_channel_id,
	funding_satoshis,
	push_msat,
	dust_limit_satoshis,
	max_htlc_value_in_flight_msat,
	channel_reserve_satoshis,
	htlc_minimum_msat,
	feerate_per_kw,
	to_self_delay,
	max_accepted_htlcs,
	funding_pubkey,
	revocation_basepoint,
	payment_basepoint,
	delayed_payment_basepoint,
	first_per_commitment_point
});

impl_writeable!(AcceptChannel, 32+8*3+4+4+2+2+33*5, {
	temporary_channel_id,
	dust_limit_satoshis,
	max_htlc_value_in_flight_msat,
	channel_reserve_satoshis,
	minimum_depth,
	htlc_minimum_msat,
	to_self_delay,
	max_accepted_htlcs,
	funding_pubkey,
	revocation_basepoint,
	payment_basepoint,
	delayed_payment_basepoint,
	first_per_commitment_point
});

impl_writeable!(FundingCreated, 32+32+2+64, {
	temporary_channel_id,
	funding_txid,
	funding_output_index,
	signature
});

impl_writeable!(FundingSigned, 32+64, {
	channel_id,
	signature
});

impl Writeable for ErrorMessage {
	fn write<W: Writer>(&self, w: &mut W) -> Result<(), ::std::io::Error> {
		w.size_hint(32 + 2 + self.data.len());
		self.channel_id.write(w)?;
		self.data.write(w)?;
		Ok(())
	}
}

impl Readable for ErrorMessage {
	fn read<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
		Ok(ErrorMessage {
			channel_id: Readable::read(r)?,
			data: Readable::read(r)?,
		})
	}
}

#[cfg(test)]
mod tests {
	use bitcoin::hashes::Hash;
	use bitcoin::secp256k1::ecdsa::Signature;
	use bitcoin::secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
	use bitcoin::Txid;

	use super::{AcceptChannel, ErrorMessage, FundingCreated, FundingSigned, OpenChannel};
	use crate::util::ser::{Readable, Writeable};

	fn keys() -> Vec<PublicKey> {
		let secp_ctx = Secp256k1::new();
		(1u8..=5).map(|i| PublicKey::from_secret_key(&secp_ctx, &SecretKey::from_slice(&[i; 32]).unwrap())).collect()
	}

	fn dummy_sig() -> Signature {
		let secp_ctx = Secp256k1::new();
		let sk = SecretKey::from_slice(&[42; 32]).unwrap();
		secp_ctx.sign_ecdsa(&Message::from_digest([7; 32]), &sk)
	}

	#[test]
	fn open_channel_round_trip() {
		let k = keys();
		let msg = OpenChannel {
			temporary_channel_id: [0xff; 32],
			funding_satoshis: 1_000_000,
			push_msat: 250_000,
			dust_limit_satoshis: 546,
			max_htlc_value_in_flight_msat: 100_000_000,
			channel_reserve_satoshis: 10_000,
			htlc_minimum_msat: 1000,
			feerate_per_kw: 15_000,
			to_self_delay: 144,
			max_accepted_htlcs: 483,
			funding_pubkey: k[0],
			revocation_basepoint: k[1],
			payment_basepoint: k[2],
			delayed_payment_basepoint: k[3],
			first_per_commitment_point: k[4],
		};
		let encoded = msg.encode();
		assert_eq!(encoded.len(), 249);
		let decoded: OpenChannel = Readable::read(&mut &encoded[..]).unwrap();
		assert_eq!(decoded, msg);
	}

	#[test]
	fn accept_channel_round_trip() {
		let k = keys();
		let msg = AcceptChannel {
			temporary_channel_id: [0xff; 32],
			dust_limit_satoshis: 546,
			max_htlc_value_in_flight_msat: 100_000_000,
			channel_reserve_satoshis: 10_000,
			minimum_depth: 3,
			htlc_minimum_msat: 1000,
			to_self_delay: 144,
			max_accepted_htlcs: 483,
			funding_pubkey: k[0],
			revocation_basepoint: k[1],
			payment_basepoint: k[2],
			delayed_payment_basepoint: k[3],
			first_per_commitment_point: k[4],
		};
		let encoded = msg.encode();
		assert_eq!(encoded.len(), 233);
		let decoded: AcceptChannel = Readable::read(&mut &encoded[..]).unwrap();
		assert_eq!(decoded, msg);
	}

	#[test]
	fn funding_created_round_trip() {
		let msg = FundingCreated {
			temporary_channel_id: [0xff; 32],
			funding_txid: Txid::from_byte_array([3; 32]),
			funding_output_index: 1,
			signature: dummy_sig(),
		};
		let encoded = msg.encode();
		assert_eq!(encoded.len(), 130);
		let decoded: FundingCreated = Readable::read(&mut &encoded[..]).unwrap();
		assert_eq!(decoded, msg);
	}

	#[test]
	fn funding_signed_round_trip() {
		let msg = FundingSigned {
			channel_id: [0xff; 32],
			signature: dummy_sig(),
		};
		let encoded = msg.encode();
		assert_eq!(encoded.len(), 96);
		let decoded: FundingSigned = Readable::read(&mut &encoded[..]).unwrap();
		assert_eq!(decoded, msg);
	}

	#[test]
	fn error_message_round_trip() {
		let msg = ErrorMessage {
			channel_id: [0; 32],
			data: "funding_satoshis 16777216 too large".to_owned(),
		};
		let encoded = msg.encode();
		let decoded: ErrorMessage = Readable::read(&mut &encoded[..]).unwrap();
		assert_eq!(decoded, msg);
	}

	#[test]
	fn truncated_open_channel_is_a_short_read() {
		let k = keys();
		let msg = OpenChannel {
			temporary_channel_id: [0xff; 32],
			funding_satoshis: 1,
			push_msat: 0,
			dust_limit_satoshis: 546,
			max_htlc_value_in_flight_msat: 1000,
			channel_reserve_satoshis: 1,
			htlc_minimum_msat: 0,
			feerate_per_kw: 253,
			to_self_delay: 6,
			max_accepted_htlcs: 1,
			funding_pubkey: k[0],
			revocation_basepoint: k[1],
			payment_basepoint: k[2],
			delayed_payment_basepoint: k[3],
			first_per_commitment_point: k[4],
		};
		let encoded = msg.encode();
		match <OpenChannel as Readable>::read(&mut &encoded[..encoded.len() - 1]) {
			Err(super::DecodeError::ShortRead) => {},
			v => panic!("unexpected result {:?}", v.map(|_| ())),
		}
	}
}
