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
//! Map a community to the AS link it annotates.
//!
//! By convention, the top 16 bits of a community are the ASN that defines it, and the community
//! annotates the link between that AS and its next hop in the AS path. Route servers at IXPs are
//! the exception: their ASN usually does not show up in the path (or does so between the two
//! peering members), so the link must be inferred from IXP membership.

use std::collections::HashSet;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::topology::{Asn, Relationships, TopologyStore};

/// The AS link annotated by a community.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnnotatedLink {
    pub near_end: Asn,
    /// `None` if the community annotates the origin of the prefix rather than a link.
    pub far_end: Option<Asn>,
}

impl AnnotatedLink {
    pub fn new(near_end: impl Into<Asn>, far_end: Option<impl Into<Asn>>) -> Self {
        Self {
            near_end: near_end.into(),
            far_end: far_end.map(Into::into),
        }
    }
}

impl std::fmt::Display for AnnotatedLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.far_end {
            Some(far_end) => write!(f, "AS{} -> AS{}", self.near_end, far_end),
            None => write!(f, "AS{} (origin)", self.near_end),
        }
    }
}

/// Remove path prepending, i.e., collapse consecutive duplicates into their first occurrence.
/// Non-consecutive repetitions are kept.
pub fn normalize_path<S: AsRef<str>>(path: &[S]) -> Vec<Asn> {
    path.iter()
        .map(|hop| hop.as_ref())
        .dedup()
        .map(str::to_string)
        .collect()
}

/// Resolves communities to AS links using the (immutable) topology.
#[derive(Debug, Clone, Copy)]
pub struct LinkResolver<'a> {
    topo: &'a TopologyStore,
}

impl<'a> LinkResolver<'a> {
    pub fn new(topo: &'a TopologyStore) -> Self {
        Self { topo }
    }

    /// Find the link in the (normalized) `path` that is annotated by a community whose top 16 bits
    /// are `top16`. Returns `None` if no link could be identified.
    pub fn resolve(&self, path: &[Asn], top16: &str) -> Option<AnnotatedLink> {
        let hop_index = path.iter().position(|hop| hop == top16);

        if let Some(exchange) = self.topo.route_servers.exchange(top16) {
            // the route server sits between the two peering members
            if let Some(i) = hop_index.filter(|i| *i > 0 && *i + 1 < path.len()) {
                return Some(AnnotatedLink::new(
                    path[i - 1].clone(),
                    Some(path[i + 1].clone()),
                ));
            }
            // otherwise, infer the link from the members of the exchange
            let members = self.topo.colocation.exchange_members(exchange)?;
            return infer_exchange_link(path, members, &self.topo.relationships);
        }

        let i = hop_index?;
        Some(AnnotatedLink::new(path[i].clone(), path.get(i + 1).cloned()))
    }
}

/// Scan the path for consecutive members of the exchange. If more than two members appear
/// consecutively, the first peer-to-peer (or unknown) link between them is preferred over a
/// provider/customer link.
fn infer_exchange_link(
    path: &[Asn],
    members: &HashSet<Asn>,
    relationships: &Relationships,
) -> Option<AnnotatedLink> {
    let mut near: Option<(usize, &Asn)> = None;
    let mut far: Option<(usize, &Asn)> = None;

    for (index, hop) in path.iter().enumerate() {
        if !members.contains(hop) {
            continue;
        }
        match (near, far) {
            (None, _) => near = Some((index, hop)),
            (Some((near_index, near_hop)), None) => {
                if index == near_index + 1 {
                    far = Some((index, hop));
                    if !relationships.is_hierarchical(near_hop, hop) {
                        break;
                    }
                } else {
                    // not consecutive, start over from this member
                    near = Some((index, hop));
                }
            }
            (Some(_), Some((far_index, far_hop))) => {
                if index == far_index + 1 && !relationships.is_hierarchical(far_hop, hop) {
                    near = far;
                    far = Some((index, hop));
                    break;
                }
            }
        }
    }

    near.map(|(_, near_hop)| AnnotatedLink::new(near_hop.clone(), far.map(|(_, x)| x.clone())))
}
