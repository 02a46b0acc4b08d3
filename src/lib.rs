// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! A single-purpose channel-opening daemon, in library form.
//!
//! The library holds everything needed to negotiate one BOLT-2 channel open
//! against a remote peer: the wire messages and their codecs, deterministic
//! channel-key derivation from a supervisor-provided seed, construction and
//! cross-signing of the initial commitment transactions, the funder and
//! fundee state machines, and the framed control protocol spoken with the
//! supervising node. The `openingd` binary wires these pieces to the three
//! process endpoints (stdin, stdout, and the peer stream on fd 3).
//!
//! Nothing here persists: all state lives for the lifetime of one
//! negotiation and is either handed back to the supervisor on success or
//! discarded when the process dies.

#![deny(missing_docs)]
#![forbid(unsafe_code)]

extern crate bitcoin;

#[macro_use]
pub mod util;
pub mod ln;
pub mod control;
