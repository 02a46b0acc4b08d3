// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The per-side channel parameter block and the policy bounds the supervisor
//! hands us at init time.

/// One side's channel parameters, as exchanged in `open_channel` /
/// `accept_channel`. Each side of a channel carries its own copy: ours is
/// supplied by the supervisor at init (with the reserve filled in once the
/// funding amount is known), the peer's arrives over the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelConfig {
	/// Outputs below this value are uneconomical and omitted from commitment
	/// transactions this side broadcasts.
	pub dust_limit_satoshis: u64,
	/// Cap on the total value of HTLCs in flight toward this side.
	pub max_htlc_value_in_flight_msat: u64,
	/// Balance the other side must keep untouched as misbehavior collateral.
	/// Set to 1% of the funding amount (rounded up) for the local side once
	/// the funding amount is known.
	pub channel_reserve_satoshis: u64,
	/// Floor on the value of a single HTLC offered to this side.
	pub htlc_minimum_msat: u32,
	/// Blocks the *other* side must wait, after broadcasting its commitment
	/// transaction, before it can claim its own main output.
	pub to_self_delay: u16,
	/// Cap on concurrent incoming HTLCs. The protocol limits this to 511.
	pub max_accepted_htlcs: u16,
	/// Confirmations the funder must see before this side considers the
	/// channel locked in. Only meaningful on the fundee's config.
	pub minimum_depth: u32,
}

impl_writeable!(ChannelConfig, 8+8+8+4+2+2+4, {
	dust_limit_satoshis,
	max_htlc_value_in_flight_msat,
	channel_reserve_satoshis,
	htlc_minimum_msat,
	to_self_delay,
	max_accepted_htlcs,
	minimum_depth
});

/// Bounds on what we will tolerate from the remote side's parameters,
/// fixed by the supervisor for the lifetime of the negotiation.
#[derive(Clone, Copy, Debug)]
pub struct ChannelHandshakeLimits {
	/// Upper bound on the `to_self_delay` the peer may impose on us. Funds we
	/// unilaterally close with are frozen this long, so there is a real cost
	/// to accepting large values.
	pub max_to_self_delay: u32,
	/// Lower bound on the effective HTLC capacity (channel value net of
	/// reserves, capped by the peer's in-flight maximum) for the channel to
	/// be worth having.
	pub min_effective_htlc_capacity_msat: u64,
}

impl Default for ChannelHandshakeLimits {
	fn default() -> Self {
		ChannelHandshakeLimits {
			max_to_self_delay: 2016,
			min_effective_htlc_capacity_msat: 1_000_000,
		}
	}
}
