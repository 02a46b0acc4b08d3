// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Deterministic derivation of all channel key material from the one 256-bit
//! seed the supervisor hands us at init.
//!
//! The seed expands, via HKDF-SHA256 with an empty salt and a fixed info
//! label, into four secp256k1 scalars (funding key plus the revocation,
//! payment and delayed-payment basepoint secrets) and the 32-byte commitment
//! seed from which the per-commitment secret chain hangs. Identical seeds
//! always yield identical key material; the derivation takes no other input.
//!
//! Neither the seed, the derived scalars, nor the commitment seed implement
//! any serialization trait: only public keys leave this process.

use bitcoin::hashes::hmac::{Hmac, HmacEngine};
use bitcoin::hashes::sha256::Hash as Sha256;
use bitcoin::hashes::{Hash, HashEngine};
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey, Signing};

use crate::ln::chan_utils::{build_commitment_secret, ChannelPublicKeys};
use crate::ln::channel::INITIAL_COMMITMENT_NUMBER;
use crate::util::errors::OpeningError;

// Fixed expansion label; changing it would silently re-key every deployed
// node derived from the same seeds.
const SEED_EXPANSION_INFO: &[u8] = b"c-lightning";

/// The four private keys backing one side of a channel.
pub struct OpeningSecrets {
	/// Key signing commitment transactions, matching the funding pubkey in
	/// the 2-of-2 funding output.
	pub funding_key: SecretKey,
	/// Secret behind the revocation basepoint.
	pub revocation_base_key: SecretKey,
	/// Secret behind the payment basepoint.
	pub payment_base_key: SecretKey,
	/// Secret behind the delayed-payment basepoint.
	pub delayed_payment_base_key: SecretKey,
}

/// Everything derived from the supervisor's seed: the secrets, their public
/// counterparts, the commitment seed, and the first per-commitment point.
pub struct OpeningKeys {
	/// The private half of the key set.
	pub secrets: OpeningSecrets,
	/// The public half, as it appears in our `open_channel`/`accept_channel`.
	pub pubkeys: ChannelPublicKeys,
	/// The per-commitment point for our first commitment transaction.
	pub first_per_commitment_point: PublicKey,
	commitment_seed: [u8; 32],
}

impl OpeningKeys {
	/// Derives the full key set from a 32-byte seed.
	///
	/// Fails with [`OpeningError::KeyDerivationFailed`] if any expanded
	/// scalar is not a valid secp256k1 key. That is vanishingly unlikely, but
	/// it must kill the process rather than be silently retried: retrying
	/// would make the derivation seed-dependent in a way no other
	/// implementation of this expansion shares.
	pub fn from_seed<C: Signing>(secp_ctx: &Secp256k1<C>, seed: &[u8; 32]) -> Result<OpeningKeys, OpeningError> {
		let mut keys = [0u8; 32 * 5];
		hkdf_sha256(&mut keys, &[], seed, SEED_EXPANSION_INFO);

		let scalar = |off: usize| {
			SecretKey::from_slice(&keys[off * 32..(off + 1) * 32])
				.map_err(|_| OpeningError::KeyDerivationFailed(format!("Scalar {} expanded from seed is invalid", off)))
		};
		let secrets = OpeningSecrets {
			funding_key: scalar(0)?,
			revocation_base_key: scalar(1)?,
			payment_base_key: scalar(2)?,
			delayed_payment_base_key: scalar(3)?,
		};
		let mut commitment_seed = [0u8; 32];
		commitment_seed.copy_from_slice(&keys[32 * 4..]);

		let pubkeys = ChannelPublicKeys {
			funding_pubkey: PublicKey::from_secret_key(secp_ctx, &secrets.funding_key),
			revocation_basepoint: PublicKey::from_secret_key(secp_ctx, &secrets.revocation_base_key),
			payment_basepoint: PublicKey::from_secret_key(secp_ctx, &secrets.payment_base_key),
			delayed_payment_basepoint: PublicKey::from_secret_key(secp_ctx, &secrets.delayed_payment_base_key),
		};

		let first_secret = build_commitment_secret(&commitment_seed, INITIAL_COMMITMENT_NUMBER);
		let first_per_commitment_point = match SecretKey::from_slice(&first_secret) {
			Ok(key) => PublicKey::from_secret_key(secp_ctx, &key),
			Err(_) => return Err(OpeningError::KeyDerivationFailed("First per-commitment secret is invalid".to_owned())),
		};

		Ok(OpeningKeys {
			secrets,
			pubkeys,
			first_per_commitment_point,
			commitment_seed,
		})
	}

	/// The root of the per-commitment secret chain. This daemon only ever
	/// consumes the first index itself; the rest belongs to the
	/// channel-operation stage, and the seed never leaves the process.
	pub fn commitment_seed(&self) -> &[u8; 32] {
		&self.commitment_seed
	}
}

/// RFC 5869 HKDF-SHA256, filling `output` from the given input key material,
/// salt and info.
pub(crate) fn hkdf_sha256(output: &mut [u8], salt: &[u8], ikm: &[u8], info: &[u8]) {
	assert!(output.len() <= 255 * 32);

	let mut hmac = HmacEngine::<Sha256>::new(salt);
	hmac.input(ikm);
	let prk = Hmac::from_engine(hmac).to_byte_array();

	let mut t = [0u8; 32];
	let mut n: u8 = 0;
	for chunk in output.chunks_mut(32) {
		let mut hmac = HmacEngine::<Sha256>::new(&prk[..]);
		if n != 0 {
			hmac.input(&t);
		}
		hmac.input(info);
		n += 1;
		hmac.input(&[n]);
		t = Hmac::from_engine(hmac).to_byte_array();
		chunk.copy_from_slice(&t[..chunk.len()]);
	}
}
