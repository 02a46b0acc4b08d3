// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Various utilities for building scripts and deriving keys related to
//! channels. These are the deterministic pieces both peers must agree on
//! bit-for-bit for the initial commitment transactions to cross-verify.

use bitcoin::hashes::sha256::Hash as Sha256;
use bitcoin::hashes::{Hash, HashEngine};
use bitcoin::opcodes;
use bitcoin::script::Builder;
use bitcoin::secp256k1::Error as SecpError;
use bitcoin::secp256k1::{self, PublicKey, Scalar, Secp256k1, SecretKey};
use bitcoin::{ScriptBuf, TxOut};

use crate::util::byte_utils;

/// The weight of a commitment transaction with no HTLC outputs, used to
/// compute the base fee the funder owes on every commitment.
pub(crate) const COMMITMENT_TX_BASE_WEIGHT: u64 = 724;

/// Build the commitment secret from the seed and the commitment number
pub fn build_commitment_secret(commitment_seed: &[u8; 32], idx: u64) -> [u8; 32] {
	let mut res: [u8; 32] = commitment_seed.clone();
	for i in 0..48 {
		let bitpos = 47 - i;
		if idx & (1 << bitpos) == (1 << bitpos) {
			res[bitpos / 8] ^= 1 << (bitpos & 7);
			res = Sha256::hash(&res).to_byte_array();
		}
	}
	res
}

/// Derives a per-commitment-transaction public key (eg a delayed_payment key
/// or the key the counterparty's main balance pays to) from the base point
/// and the per_commitment_point.
///
/// Note that this is infallible iff we trust that at least one of the two
/// input keys are randomly generated (ie our own).
pub fn derive_public_key<T: secp256k1::Signing>(secp_ctx: &Secp256k1<T>, per_commitment_point: &PublicKey, base_point: &PublicKey) -> Result<PublicKey, SecpError> {
	let mut sha = Sha256::engine();
	sha.input(&per_commitment_point.serialize());
	sha.input(&base_point.serialize());
	let res = Sha256::from_engine(sha).to_byte_array();

	let hashkey = PublicKey::from_secret_key(&secp_ctx, &SecretKey::from_slice(&res)?);
	base_point.combine(&hashkey)
}

/// Derives a per-commitment-transaction revocation public key from the
/// broadcaster's per-commitment point and the countersignatory's revocation
/// basepoint.
///
/// The resulting key appears in the broadcaster's `to_local` output: only
/// someone who later learns both constituent secrets (ie the
/// countersignatory, once the broadcaster revokes this commitment) can spend
/// through it.
pub fn derive_public_revocation_key<T: secp256k1::Verification>(secp_ctx: &Secp256k1<T>, per_commitment_point: &PublicKey, countersignatory_revocation_base_point: &PublicKey) -> Result<PublicKey, SecpError> {
	let rev_append_commit_hash_key = {
		let mut sha = Sha256::engine();
		sha.input(&countersignatory_revocation_base_point.serialize());
		sha.input(&per_commitment_point.serialize());

		Sha256::from_engine(sha).to_byte_array()
	};
	let commit_append_rev_hash_key = {
		let mut sha = Sha256::engine();
		sha.input(&per_commitment_point.serialize());
		sha.input(&countersignatory_revocation_base_point.serialize());

		Sha256::from_engine(sha).to_byte_array()
	};

	let countersignatory_contrib = countersignatory_revocation_base_point.mul_tweak(secp_ctx,
		&Scalar::from_be_bytes(rev_append_commit_hash_key).map_err(|_| SecpError::InvalidTweak)?)?;
	let broadcaster_contrib = per_commitment_point.mul_tweak(secp_ctx,
		&Scalar::from_be_bytes(commit_append_rev_hash_key).map_err(|_| SecpError::InvalidTweak)?)?;
	countersignatory_contrib.combine(&broadcaster_contrib)
}

/// One side's public keys which do not change over the life of a channel, as
/// sent in `open_channel`/`accept_channel`.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelPublicKeys {
	/// The public key which is used to sign all commitment transactions, as
	/// it appears in the on-chain channel lock-in 2-of-2 multisig output.
	pub funding_pubkey: PublicKey,
	/// The base point which is used (with derive_public_revocation_key) to
	/// derive per-commitment revocation keys.
	pub revocation_basepoint: PublicKey,
	/// The base point which is used (with derive_public_key) to derive the
	/// key this side's main balance pays to on the other side's commitment
	/// transactions.
	pub payment_basepoint: PublicKey,
	/// The base point which is used (with derive_public_key) to derive the
	/// delayed key this side's main balance pays to on its own commitment
	/// transactions.
	pub delayed_payment_basepoint: PublicKey,
}

impl_writeable!(ChannelPublicKeys, 33*4, {
	funding_pubkey,
	revocation_basepoint,
	payment_basepoint,
	delayed_payment_basepoint
});

/// The set of public keys which appear in one commitment transaction. These
/// are derived from the channel basepoints and the broadcaster's
/// per-commitment point.
#[derive(Clone, Debug, PartialEq)]
pub struct TxCreationKeys {
	/// The broadcaster's per-commitment public key which was used to derive
	/// the other keys.
	pub per_commitment_point: PublicKey,
	/// The revocation key which lets the countersignatory punish the
	/// broadcaster for broadcasting this commitment once it is revoked.
	pub revocation_key: PublicKey,
	/// The broadcaster's main-balance key, spendable only after the contest
	/// delay (or immediately via the revocation path).
	pub broadcaster_delayed_payment_key: PublicKey,
	/// The key the countersignatory's main balance pays to, spendable
	/// immediately.
	pub countersignatory_payment_key: PublicKey,
}

impl TxCreationKeys {
	/// Create a new TxCreationKeys from channel basepoints and the
	/// broadcaster's per-commitment point
	pub fn derive_new<T: secp256k1::Signing + secp256k1::Verification>(secp_ctx: &Secp256k1<T>, per_commitment_point: &PublicKey, broadcaster_delayed_payment_base: &PublicKey, countersignatory_revocation_base: &PublicKey, countersignatory_payment_base: &PublicKey) -> Result<TxCreationKeys, SecpError> {
		Ok(TxCreationKeys {
			per_commitment_point: per_commitment_point.clone(),
			revocation_key: derive_public_revocation_key(&secp_ctx, &per_commitment_point, &countersignatory_revocation_base)?,
			broadcaster_delayed_payment_key: derive_public_key(&secp_ctx, &per_commitment_point, &broadcaster_delayed_payment_base)?,
			countersignatory_payment_key: derive_public_key(&secp_ctx, &per_commitment_point, &countersignatory_payment_base)?,
		})
	}
}

/// A script either spendable by the revocation key or the
/// broadcaster_delayed_payment_key after the relative-locktime OP_CSV
/// constraint is satisfied, encumbering the `to_local` output on a
/// commitment transaction.
pub fn get_revokeable_redeemscript(revocation_key: &PublicKey, contest_delay: u16, broadcaster_delayed_payment_key: &PublicKey) -> ScriptBuf {
	Builder::new().push_opcode(opcodes::all::OP_IF)
	              .push_slice(&revocation_key.serialize())
	              .push_opcode(opcodes::all::OP_ELSE)
	              .push_int(contest_delay as i64)
	              .push_opcode(opcodes::all::OP_CSV)
	              .push_opcode(opcodes::all::OP_DROP)
	              .push_slice(&broadcaster_delayed_payment_key.serialize())
	              .push_opcode(opcodes::all::OP_ENDIF)
	              .push_opcode(opcodes::all::OP_CHECKSIG)
	              .into_script()
}

/// Gets the redeemscript for a funding output from the two funding public
/// keys, with the keys in lexicographic order as the multisig convention
/// requires. Note that the order of funding public keys does not matter.
pub fn make_funding_redeemscript(broadcaster: &PublicKey, countersignatory: &PublicKey) -> ScriptBuf {
	let broadcaster_funding_key = broadcaster.serialize();
	let countersignatory_funding_key = countersignatory.serialize();

	let builder = Builder::new().push_opcode(opcodes::all::OP_PUSHNUM_2);
	if broadcaster_funding_key[..] < countersignatory_funding_key[..] {
		builder.push_slice(&broadcaster_funding_key)
			.push_slice(&countersignatory_funding_key)
	} else {
		builder.push_slice(&countersignatory_funding_key)
			.push_slice(&broadcaster_funding_key)
	}.push_opcode(opcodes::all::OP_PUSHNUM_2).push_opcode(opcodes::all::OP_CHECKMULTISIG).into_script()
}

/// Computes the 48-bit value every commitment transaction number is XORed
/// with before being split across the locktime and the funding input's
/// sequence. Both sides compute it from the same two payment basepoints, in
/// funder-then-fundee order, so it never needs to cross the wire.
pub fn get_commitment_transaction_number_obscure_factor(funder_payment_basepoint: &PublicKey, fundee_payment_basepoint: &PublicKey) -> u64 {
	let mut sha = Sha256::engine();
	sha.input(&funder_payment_basepoint.serialize());
	sha.input(&fundee_payment_basepoint.serialize());
	let res = Sha256::from_engine(sha).to_byte_array();

	byte_utils::slice_to_be48(&res[26..])
}

/// Sorts transaction outputs into the canonical order (value ascending,
/// then scriptpubkey lexicographically) so both peers materialize identical
/// commitment transactions.
pub(crate) fn sort_outputs(outputs: &mut Vec<TxOut>) {
	outputs.sort_unstable_by(|a, b| {
		a.value.cmp(&b.value).then_with(|| a.script_pubkey.as_bytes().cmp(b.script_pubkey.as_bytes()))
	});
}
