// commwatch: Tracking BGP Communities that Annotate Interdomain Links
// Copyright (C) 2024-2025 Roland Schmid <roschmi@ethz.ch> and Tibor Schneider <sctibor@ethz.ch>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//! End-to-end measurements on recorded `bgpreader` output.

use std::collections::BTreeSet;

use crate::{
    config::{FacilityFilter, MeasurementParams},
    source::Window,
};


/// 2018-01-24 01:27:00 UTC
pub const START: i64 = 1_516_757_220;
/// Start of the monitor phase.
pub const MONITOR: i64 = START + 3600;
pub const END: i64 = START + 3 * 3600;
pub const BIN: i64 = 900;

pub const PEER: &str = "192.0.2.1";
pub const PEER_ASN: &str = "1";

pub fn params(communities: &[&str], facilities: FacilityFilter) -> MeasurementParams {
    MeasurementParams::new(
        Window::new(START, END),
        communities.iter().map(|c| c.to_string()).collect(),
        BTreeSet::new(),
        facilities,
        1,
        BIN,
    )
    .unwrap()
}

/// RIB entry seen by `rrc00`.
pub fn rib(ts: i64, prefix: &str, path: &str, communities: &str) -> String {
    format!("R|R|{ts}.000000|ris|rrc00|||{PEER_ASN}|{PEER}|{prefix}|{PEER}|{path}|3|{communities}||")
}

pub fn announce(ts: i64, peer: &str, prefix: &str, path: &str, communities: &str) -> String {
    format!("U|A|{ts}.000000|ris|rrc00|||{PEER_ASN}|{peer}|{prefix}|{peer}|{path}|3|{communities}||")
}

pub fn withdraw(ts: i64, peer: &str, prefix: &str) -> String {
    format!("U|W|{ts}.000000|ris|rrc00|||{PEER_ASN}|{peer}|{prefix}")
}
