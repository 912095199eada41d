// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire protocol of Niko Home Control I controllers.
//!
//! The controller listens on a plain TCP port (8000 by default) and speaks
//! newline-delimited JSON. This module holds the pieces below the
//! [`Controller`](crate::controller::Controller):
//!
//! - the line [`codec`](decode), public so that applications can inspect raw traffic
//! - the command/reply correlator, which allows one unanswered command per socket
//! - the TCP session that ties both to a socket and a listener task

mod codec;
pub(crate) mod connection;
mod correlator;

pub use codec::{DataMap, Message, Payload, Tag, decode, encode};
