// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The channel handle: once both sides' parameters and the funding outpoint
//! are known, a [`Channel`] can materialize either side's initial commitment
//! transaction, sign the counterparty's, and verify the counterparty's
//! signature on ours.
//!
//! Construction is deterministic: a funder and a fundee who exchanged the
//! same handshake build byte-identical transactions for each side, which is
//! what makes the exchanged signatures verify.

use bitcoin::absolute::LockTime;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::secp256k1::{Message, PublicKey, Secp256k1, SecretKey, Signing, Verification};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};

use crate::ln::chan_utils::{self, ChannelPublicKeys, TxCreationKeys, COMMITMENT_TX_BASE_WEIGHT};
use crate::util::config::ChannelConfig;
use crate::util::errors::OpeningError;

/// Commitment transaction numbers count down from here; the first commitment
/// uses this value as its per-commitment-secret index and zero as its
/// (obscured) transaction number.
pub(crate) const INITIAL_COMMITMENT_NUMBER: u64 = (1 << 48) - 1;

/// The protocol caps channel values below 2^24 satoshis.
pub const MAX_FUNDING_SATOSHIS: u64 = 1 << 24;

/// A channel whose handshake parameters are fully known, able to build the
/// initial commitment transactions for both sides.
pub struct Channel {
	funding_txid: Txid,
	funding_output_index: u16,
	funding_satoshis: u64,
	push_msat: u64,
	feerate_per_kw: u32,
	holder_config: ChannelConfig,
	counterparty_config: ChannelConfig,
	holder_pubkeys: ChannelPublicKeys,
	counterparty_pubkeys: ChannelPublicKeys,
	holder_first_per_commitment_point: PublicKey,
	counterparty_first_per_commitment_point: PublicKey,
	holder_is_funder: bool,
}

impl Channel {
	/// Assembles a channel handle from the negotiated parameters.
	///
	/// Fails if the funder's starting balance cannot cover the commitment
	/// fee at the negotiated feerate: such a channel could never produce a
	/// valid first commitment.
	pub fn new(funding_txid: Txid, funding_output_index: u16, funding_satoshis: u64, push_msat: u64,
			feerate_per_kw: u32, holder_config: ChannelConfig, counterparty_config: ChannelConfig,
			holder_pubkeys: ChannelPublicKeys, counterparty_pubkeys: ChannelPublicKeys,
			holder_first_per_commitment_point: PublicKey, counterparty_first_per_commitment_point: PublicKey,
			holder_is_funder: bool) -> Result<Channel, OpeningError> {
		let commit_fee_satoshis = feerate_per_kw as u64 * COMMITMENT_TX_BASE_WEIGHT / 1000;
		let funder_balance_satoshis = (funding_satoshis * 1000 - push_msat) / 1000;
		if funder_balance_satoshis < commit_fee_satoshis {
			return Err(OpeningError::BadParam(format!(
				"Funder balance {} cannot cover commitment fee {} at feerate {}",
				funder_balance_satoshis, commit_fee_satoshis, feerate_per_kw)));
		}
		Ok(Channel {
			funding_txid,
			funding_output_index,
			funding_satoshis,
			push_msat,
			feerate_per_kw,
			holder_config,
			counterparty_config,
			holder_pubkeys,
			counterparty_pubkeys,
			holder_first_per_commitment_point,
			counterparty_first_per_commitment_point,
			holder_is_funder,
		})
	}

	/// The 2-of-2 multisig script the funding output is locked to.
	pub fn get_funding_redeemscript(&self) -> ScriptBuf {
		chan_utils::make_funding_redeemscript(&self.holder_pubkeys.funding_pubkey, &self.counterparty_pubkeys.funding_pubkey)
	}

	fn get_commitment_transaction_number_obscure_factor(&self) -> u64 {
		let (funder_payment_basepoint, fundee_payment_basepoint) = if self.holder_is_funder {
			(&self.holder_pubkeys.payment_basepoint, &self.counterparty_pubkeys.payment_basepoint)
		} else {
			(&self.counterparty_pubkeys.payment_basepoint, &self.holder_pubkeys.payment_basepoint)
		};
		chan_utils::get_commitment_transaction_number_obscure_factor(funder_payment_basepoint, fundee_payment_basepoint)
	}

	/// Builds the first commitment transaction broadcastable by `local`
	/// (true: us, false: the counterparty).
	///
	/// Balance split is the opening one: the funder has the channel value
	/// minus the pushed amount and pays the commitment fee, the fundee has
	/// the pushed amount. Outputs below the broadcaster's dust limit are
	/// omitted.
	pub fn build_commitment_transaction<T: Signing + Verification>(&self, secp_ctx: &Secp256k1<T>, local: bool) -> Result<Transaction, OpeningError> {
		let (broadcaster_pubkeys, countersignatory_pubkeys, per_commitment_point) = if local {
			(&self.holder_pubkeys, &self.counterparty_pubkeys, &self.holder_first_per_commitment_point)
		} else {
			(&self.counterparty_pubkeys, &self.holder_pubkeys, &self.counterparty_first_per_commitment_point)
		};
		let keys = TxCreationKeys::derive_new(secp_ctx, per_commitment_point,
				&broadcaster_pubkeys.delayed_payment_basepoint,
				&countersignatory_pubkeys.revocation_basepoint,
				&countersignatory_pubkeys.payment_basepoint)
			.map_err(|_| OpeningError::BadParam("Peer basepoints do not admit key derivation".to_owned()))?;

		// The contest delay on the broadcaster's own output is whatever the
		// other side demanded of it; the dust floor is the broadcaster's own.
		let contest_delay = if local { self.counterparty_config.to_self_delay } else { self.holder_config.to_self_delay };
		let broadcaster_dust_limit_satoshis = if local { self.holder_config.dust_limit_satoshis } else { self.counterparty_config.dust_limit_satoshis };

		let funder_msat = self.funding_satoshis * 1000 - self.push_msat;
		let fundee_msat = self.push_msat;
		let broadcaster_is_funder = local == self.holder_is_funder;
		let (broadcaster_msat, countersignatory_msat) = if broadcaster_is_funder {
			(funder_msat, fundee_msat)
		} else {
			(fundee_msat, funder_msat)
		};

		let commit_fee_satoshis = self.feerate_per_kw as u64 * COMMITMENT_TX_BASE_WEIGHT / 1000;
		let mut to_broadcaster_satoshis = broadcaster_msat / 1000;
		let mut to_countersignatory_satoshis = countersignatory_msat / 1000;
		if broadcaster_is_funder {
			to_broadcaster_satoshis -= commit_fee_satoshis;
		} else {
			to_countersignatory_satoshis -= commit_fee_satoshis;
		}

		let mut txouts: Vec<TxOut> = Vec::with_capacity(2);
		if to_broadcaster_satoshis >= broadcaster_dust_limit_satoshis {
			txouts.push(TxOut {
				script_pubkey: chan_utils::get_revokeable_redeemscript(&keys.revocation_key, contest_delay, &keys.broadcaster_delayed_payment_key).to_p2wsh(),
				value: Amount::from_sat(to_broadcaster_satoshis),
			});
		}
		if to_countersignatory_satoshis >= broadcaster_dust_limit_satoshis {
			txouts.push(TxOut {
				script_pubkey: ScriptBuf::new_p2wpkh(&bitcoin::WPubkeyHash::hash(&keys.countersignatory_payment_key.serialize())),
				value: Amount::from_sat(to_countersignatory_satoshis),
			});
		}
		chan_utils::sort_outputs(&mut txouts);

		// The first commitment is number zero; the obscured number lands in
		// the locktime's lower 24 bits and the sequence's lower 24 bits.
		let obscured_commitment_transaction_number = 0 ^ self.get_commitment_transaction_number_obscure_factor();

		Ok(Transaction {
			version: Version(2),
			lock_time: LockTime::from_consensus(((0x20 as u32) << 8 * 3) | ((obscured_commitment_transaction_number & 0xffffff) as u32)),
			input: vec![TxIn {
				previous_output: OutPoint {
					txid: self.funding_txid,
					vout: self.funding_output_index as u32,
				},
				script_sig: ScriptBuf::new(),
				sequence: Sequence(((0x80 as u32) << 8 * 3) | ((obscured_commitment_transaction_number >> 3 * 8) as u32)),
				witness: Witness::new(),
			}],
			output: txouts,
		})
	}

	fn initial_commitment_sighash<T: Signing + Verification>(&self, secp_ctx: &Secp256k1<T>, local: bool) -> Result<Message, OpeningError> {
		let tx = self.build_commitment_transaction(secp_ctx, local)?;
		let funding_redeemscript = self.get_funding_redeemscript();
		let sighash = SighashCache::new(&tx)
			.p2wsh_signature_hash(0, &funding_redeemscript, Amount::from_sat(self.funding_satoshis), EcdsaSighashType::All)
			.expect("commitment tx has exactly one input");
		Ok(Message::from_digest(sighash.to_byte_array()))
	}

	/// Signs the counterparty's initial commitment transaction with our
	/// funding key, producing the signature carried in `funding_created` (as
	/// funder) or `funding_signed` (as fundee).
	pub fn sign_counterparty_commitment<T: Signing + Verification>(&self, secp_ctx: &Secp256k1<T>, funding_key: &SecretKey) -> Result<Signature, OpeningError> {
		let sighash = self.initial_commitment_sighash(secp_ctx, false)?;
		Ok(secp_ctx.sign_ecdsa(&sighash, funding_key))
	}

	/// Checks the peer's signature against our initial commitment
	/// transaction and their funding pubkey.
	pub fn check_holder_commitment_signature<T: Signing + Verification>(&self, secp_ctx: &Secp256k1<T>, sig: &Signature) -> Result<(), OpeningError> {
		let sighash = self.initial_commitment_sighash(secp_ctx, true)?;
		secp_ctx.verify_ecdsa(&sighash, sig, &self.counterparty_pubkeys.funding_pubkey)
			.map_err(|_| OpeningError::PeerReadFailed(format!(
				"Bad signature {} using key {}",
				log_bytes!(sig.serialize_compact()), log_pubkey!(self.counterparty_pubkeys.funding_pubkey))))
	}
}
