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
//! Module defining the tracked routes and their activation/withdrawal history.
use std::{collections::HashMap, net::IpAddr};

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::{resolver::AnnotatedLink, topology::Asn};

/// Routes are identified by the peer that announced them and their prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteKey {
    pub peer_ip: IpAddr,
    pub prefix: IpNet,
}

impl RouteKey {
    pub fn new(peer_ip: IpAddr, prefix: IpNet) -> Self {
        Self { peer_ip, prefix }
    }
}

impl std::fmt::Display for RouteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} via {}", self.prefix, self.peer_ip)
    }
}

/// The set of all tracked routes.
pub type TrackedRoutes = HashMap<RouteKey, Route>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteStatus {
    /// The route is announced and carries the target community.
    Active,
    /// The route is withdrawn or lost the target community.
    #[default]
    Withdrawn,
}

impl RouteStatus {
    pub fn from_active(active: bool) -> Self {
        if active {
            Self::Active
        } else {
            Self::Withdrawn
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// A route annotated with a target community.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    target_community: String,
    communities: Vec<String>,
    link: AnnotatedLink,
    key: RouteKey,
    status: RouteStatus,
    activations: Vec<i64>,
    withdrawals: Vec<i64>,
}

impl Route {
    /// Create a new route in the withdrawn state, without any recorded events.
    pub fn new(
        target_community: impl Into<String>,
        communities: Vec<String>,
        link: AnnotatedLink,
        key: RouteKey,
    ) -> Self {
        Self {
            target_community: target_community.into(),
            communities,
            link,
            key,
            status: RouteStatus::default(),
            activations: Vec::new(),
            withdrawals: Vec::new(),
        }
    }

    /// Update the status of the route at `timestamp`. Nothing is recorded if the status does not
    /// change; otherwise, `timestamp` is appended to the activations or withdrawals.
    pub fn update(&mut self, active: bool, timestamp: i64) {
        let status = RouteStatus::from_active(active);
        if status == self.status {
            return;
        }
        self.status = status;
        match status {
            RouteStatus::Active => self.activations.push(timestamp),
            RouteStatus::Withdrawn => self.withdrawals.push(timestamp),
        }
    }

    pub fn target_community(&self) -> &str {
        &self.target_community
    }

    /// All communities attached to the route when it was discovered.
    pub fn communities(&self) -> &[String] {
        &self.communities
    }

    pub fn link(&self) -> &AnnotatedLink {
        &self.link
    }

    pub fn near_end(&self) -> &Asn {
        &self.link.near_end
    }

    pub fn far_end(&self) -> Option<&Asn> {
        self.link.far_end.as_ref()
    }

    pub fn key(&self) -> RouteKey {
        self.key
    }

    pub fn peer_ip(&self) -> IpAddr {
        self.key.peer_ip
    }

    pub fn prefix(&self) -> IpNet {
        self.key.prefix
    }

    pub fn status(&self) -> RouteStatus {
        self.status
    }

    pub fn activations(&self) -> &[i64] {
        &self.activations
    }

    pub fn withdrawals(&self) -> &[i64] {
        &self.withdrawals
    }
}

#[cfg(test)]
mod test {
    use std::net::Ipv4Addr;

    use pretty_assertions::assert_eq;

    use super::*;

    fn route() -> Route {
        Route::new(
            "2:100",
            vec!["2:100".into(), "3:5".into()],
            AnnotatedLink::new("2", Some("3")),
            RouteKey::new(
                IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)),
                "10.0.0.0/24".parse().unwrap(),
            ),
        )
    }

    #[test]
    fn starts_withdrawn() {
        let r = route();
        assert_eq!(r.status(), RouteStatus::Withdrawn);
        assert!(r.activations().is_empty());
        assert!(r.withdrawals().is_empty());
        assert_eq!(r.near_end(), "2");
        assert_eq!(r.far_end().map(String::as_str), Some("3"));
        assert_eq!(r.key().to_string(), "10.0.0.0/24 via 192.0.2.1");
    }

    #[test]
    fn same_status_is_ignored() {
        let mut r = route();
        r.update(false, 10);
        assert!(r.withdrawals().is_empty());
        r.update(true, 20);
        r.update(true, 30);
        r.update(true, 40);
        assert_eq!(r.activations(), &[20]);
        assert!(r.withdrawals().is_empty());
        assert!(r.status().is_active());
    }

    #[test]
    fn alternating_updates() {
        let mut r = route();
        for (i, ts) in [100, 200, 300, 400, 500].into_iter().enumerate() {
            r.update(i % 2 == 0, ts);
        }
        assert_eq!(r.activations(), &[100, 300, 500]);
        assert_eq!(r.withdrawals(), &[200, 400]);
        assert_eq!(r.status(), RouteStatus::Active);
    }
}
