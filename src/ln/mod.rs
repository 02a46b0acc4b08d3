// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Implementations of the pieces of the channel-opening protocol live here.

pub mod chan_utils;
pub mod channel;
pub mod channel_keys;
pub mod conduit;
pub mod msgs;
pub mod opening;
pub mod wire;
