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
//! Read-only lookup structures describing the interdomain topology: AS relationships, IXP route
//! servers and the colocation map (facilities, exchanges and their members).
//!
//! All structures are built once by the [`crate::registry`] loaders and only read afterwards.

use std::collections::{HashMap, HashSet};

/// AS identifier, exactly as it appears in AS paths and in the registry data.
pub type Asn = String;

/// AS relationships. Every link is stored in both directions: loading `provider|customer|code`
/// stores `code` for `(provider, customer)` and `-code` for `(customer, provider)`. A code of `0`
/// denotes a peer-to-peer link.
#[derive(Debug, Clone, Default)]
pub struct Relationships {
    links: HashMap<(Asn, Asn), i8>,
}

impl Relationships {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert the link between `provider` and `customer` in both directions.
    pub fn insert(&mut self, provider: impl Into<Asn>, customer: impl Into<Asn>, code: i8) {
        let provider = provider.into();
        let customer = customer.into();
        self.links
            .insert((customer.clone(), provider.clone()), code.saturating_neg());
        self.links.insert((provider, customer), code);
    }

    /// Parse a line of the form `provider|customer|code|source` and insert it. Comments (starting
    /// with `#`) and malformed lines are ignored. Returns `true` if a link was inserted.
    pub fn insert_line(&mut self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return false;
        }
        let mut fields = line.split('|');
        let (Some(provider), Some(customer), Some(code)) =
            (fields.next(), fields.next(), fields.next())
        else {
            log::trace!("Ignoring malformed relationship {line:?}");
            return false;
        };
        let Ok(code) = code.trim().parse::<i8>() else {
            log::trace!("Ignoring relationship with invalid code {line:?}");
            return false;
        };
        self.insert(provider.trim(), customer.trim(), code);
        true
    }

    /// Relationship code of the directed link `a -> b`, if known.
    pub fn get(&self, a: &str, b: &str) -> Option<i8> {
        self.links.get(&(a.to_string(), b.to_string())).copied()
    }

    /// `true` if the link between `a` and `b` is known to be a provider/customer link. Unknown and
    /// peer-to-peer links are not hierarchical.
    pub fn is_hierarchical(&self, a: &str, b: &str) -> bool {
        self.get(a, b).is_some_and(|code| code != 0)
    }

    /// Number of directed links (twice the number of loaded lines).
    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Mapping from route server ASNs to the name of the exchange they operate at.
#[derive(Debug, Clone, Default)]
pub struct RouteServers {
    exchanges: HashMap<Asn, String>,
}

impl RouteServers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, asn: impl Into<Asn>, exchange: impl Into<String>) {
        self.exchanges.insert(asn.into(), exchange.into());
    }

    /// The exchange at which `asn` operates a route server, if `asn` is a route server.
    pub fn exchange(&self, asn: &str) -> Option<&str> {
        self.exchanges.get(asn).map(String::as_str)
    }

    pub fn is_route_server(&self, asn: &str) -> bool {
        self.exchanges.contains_key(asn)
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }
}

impl IntoIterator for RouteServers {
    type Item = (Asn, String);
    type IntoIter = std::collections::hash_map::IntoIter<Asn, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.exchanges.into_iter()
    }
}

impl Extend<(Asn, String)> for RouteServers {
    fn extend<T: IntoIterator<Item = (Asn, String)>>(&mut self, iter: T) {
        self.exchanges.extend(iter)
    }
}

/// Colocation map: which AS is present at which facility and exchange, and where the facilities
/// are located. Locations are formatted as `city:country`.
#[derive(Debug, Clone, Default)]
pub struct ColocationMap {
    facility_members: HashMap<String, HashSet<Asn>>,
    exchange_members: HashMap<String, HashSet<Asn>>,
    location_facilities: HashMap<String, Vec<String>>,
    facility_location: HashMap<String, String>,
    as_facilities: HashMap<Asn, HashMap<String, Vec<String>>>,
}

impl ColocationMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `asn` is present at `facility`, which is located at `location`.
    pub fn add_facility_presence(
        &mut self,
        asn: impl Into<Asn>,
        facility: impl Into<String>,
        location: impl Into<String>,
    ) {
        let asn = asn.into();
        let facility = facility.into();
        let location = location.into();

        self.facility_members
            .entry(facility.clone())
            .or_default()
            .insert(asn.clone());
        push_unique(
            self.location_facilities.entry(location.clone()).or_default(),
            &facility,
        );
        push_unique(
            self.as_facilities
                .entry(asn)
                .or_default()
                .entry(location.clone())
                .or_default(),
            &facility,
        );
        self.facility_location.insert(facility, location);
    }

    /// Register an exchange (possibly without any members).
    pub fn add_exchange(&mut self, exchange: impl Into<String>) {
        self.exchange_members.entry(exchange.into()).or_default();
    }

    pub fn add_exchange_member(&mut self, exchange: impl Into<String>, asn: impl Into<Asn>) {
        self.exchange_members
            .entry(exchange.into())
            .or_default()
            .insert(asn.into());
    }

    /// Members of an exchange, or `None` if the exchange is unknown.
    pub fn exchange_members(&self, exchange: &str) -> Option<&HashSet<Asn>> {
        self.exchange_members.get(exchange)
    }

    pub fn is_facility_member(&self, facility: &str, asn: &str) -> bool {
        self.facility_members
            .get(facility)
            .is_some_and(|members| members.contains(asn))
    }

    /// Location (`city:country`) of a facility.
    pub fn facility_location(&self, facility: &str) -> Option<&str> {
        self.facility_location.get(facility).map(String::as_str)
    }

    /// All facilities at a location.
    pub fn location_facilities(&self, location: &str) -> &[String] {
        self.location_facilities
            .get(location)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Number of facilities in the city of `facility` at which `asn` is present. Returns `None` if
    /// `asn` is not a member of `facility`.
    pub fn facility_overlap(&self, asn: &str, facility: &str) -> Option<usize> {
        if !self.is_facility_member(facility, asn) {
            return None;
        }
        let location = self.facility_location(facility)?;
        Some(
            self.as_facilities
                .get(asn)
                .and_then(|locations| locations.get(location))
                .map(Vec::len)
                .unwrap_or_default(),
        )
    }

    pub fn num_facilities(&self) -> usize {
        self.facility_members.len()
    }

    pub fn num_exchanges(&self) -> usize {
        self.exchange_members.len()
    }

    /// Merge the exchanges of `other` into `self`.
    pub fn merge_exchanges(&mut self, other: ColocationMap) {
        for (exchange, members) in other.exchange_members {
            self.exchange_members
                .entry(exchange)
                .or_default()
                .extend(members);
        }
    }
}

fn push_unique(list: &mut Vec<String>, item: &str) {
    if !list.iter().any(|x| x == item) {
        list.push(item.to_string());
    }
}

/// All lookup structures consumed by the [`crate::resolver::LinkResolver`] and the pipeline.
#[derive(Debug, Clone, Default)]
pub struct TopologyStore {
    pub relationships: Relationships,
    pub route_servers: RouteServers,
    pub colocation: ColocationMap,
}

impl TopologyStore {
    pub fn new(
        relationships: Relationships,
        route_servers: RouteServers,
        colocation: ColocationMap,
    ) -> Self {
        Self {
            relationships,
            route_servers,
            colocation,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn relationships_are_symmetric() {
        let mut rels = Relationships::new();
        assert!(rels.insert_line("1|2|1|source"));
        assert_eq!(rels.get("1", "2"), Some(1));
        assert_eq!(rels.get("2", "1"), Some(-1));
        assert_eq!(rels.len(), 2);

        assert!(rels.insert_line("3|4|-1|bgp"));
        assert_eq!(rels.get("3", "4"), Some(-1));
        assert_eq!(rels.get("4", "3"), Some(1));

        assert!(rels.insert_line("5|6|0|mlp"));
        assert_eq!(rels.get("6", "5"), Some(0));
        assert!(!rels.is_hierarchical("5", "6"));
        assert!(rels.is_hierarchical("2", "1"));
        assert!(!rels.is_hierarchical("1", "5"));
    }

    #[test]
    fn relationships_ignore_garbage() {
        let mut rels = Relationships::new();
        assert!(!rels.insert_line("# source:topology|BGP"));
        assert!(!rels.insert_line(""));
        assert!(!rels.insert_line("1|2"));
        assert!(!rels.insert_line("1|2|x|bgp"));
        assert!(rels.is_empty());
    }

    #[test]
    fn facility_overlap() {
        let mut colo = ColocationMap::new();
        colo.add_facility_presence("10", "Equinix FR5", "Frankfurt:DE");
        colo.add_facility_presence("10", "Interxion FRA1", "Frankfurt:DE");
        colo.add_facility_presence("10", "Telehouse North", "London:GB");
        colo.add_facility_presence("20", "Equinix FR5", "Frankfurt:DE");
        // duplicate rows are counted once
        colo.add_facility_presence("20", "Equinix FR5", "Frankfurt:DE");

        assert_eq!(colo.facility_overlap("10", "Equinix FR5"), Some(2));
        assert_eq!(colo.facility_overlap("10", "Telehouse North"), Some(1));
        assert_eq!(colo.facility_overlap("20", "Equinix FR5"), Some(1));
        assert_eq!(colo.facility_overlap("20", "Telehouse North"), None);
        assert_eq!(colo.facility_overlap("10", "Unknown"), None);
        assert_eq!(
            colo.location_facilities("Frankfurt:DE"),
            &["Equinix FR5".to_string(), "Interxion FRA1".to_string()]
        );
        assert!(colo.location_facilities("Paris:FR").is_empty());
        assert_eq!(colo.num_facilities(), 3);
    }

    #[test]
    fn exchanges() {
        let mut colo = ColocationMap::new();
        colo.add_exchange("DE-CIX Frankfurt");
        assert!(colo.exchange_members("DE-CIX Frankfurt").unwrap().is_empty());

        let mut other = ColocationMap::new();
        other.add_exchange_member("DE-CIX Frankfurt", "10");
        other.add_exchange_member("AMS-IX", "20");
        colo.merge_exchanges(other);

        assert!(colo.exchange_members("DE-CIX Frankfurt").unwrap().contains("10"));
        assert!(colo.exchange_members("AMS-IX").unwrap().contains("20"));
        assert!(colo.exchange_members("LINX").is_none());
        assert_eq!(colo.num_exchanges(), 2);
    }
}
