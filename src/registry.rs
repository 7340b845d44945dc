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
//! Loaders that build the [`TopologyStore`] from the public registry datasets:
//!
//! - CAIDA AS relationships (`provider|customer|code|source`, possibly gzipped),
//! - PeeringDB facility presence (`netfac`) and route server networks (`net`),
//! - CAIDA IXP and IXP membership datasets (JSON lines),
//! - the Euro-IX route server list (CSV).
//!
//! A dataset that cannot be loaded is replaced by an empty one, and the measurement continues.
use std::{
    collections::HashMap,
    io::{BufRead, Read},
    path::Path,
};

use serde::Deserialize;

use commwatch_utils::other::open_lines;

use crate::{
    config::Config,
    topology::{ColocationMap, Relationships, RouteServers, TopologyStore},
};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP Error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid CSV: {0}")]
    Csv(#[from] csv::Error),
}

/// All PeeringDB API responses wrap the objects in `data`.
#[derive(Debug, Deserialize)]
struct PdbResponse<T> {
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct PdbNetFac {
    local_asn: u64,
    name: String,
    #[serde(default)]
    city: String,
    #[serde(default)]
    country: String,
}

#[derive(Debug, Deserialize)]
struct PdbNet {
    asn: u64,
    #[serde(default)]
    aka: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CaidaIx {
    ix_id: u64,
    name: String,
}

#[derive(Debug, Deserialize)]
struct CaidaIxAsn {
    ix_id: u64,
    asn: u64,
}

/// Read a dataset either from a URL (`http://` or `https://`) or from a local file. Local files
/// ending in `.gz` are decompressed.
pub async fn fetch(location: &str) -> Result<String, RegistryError> {
    if location.starts_with("http://") || location.starts_with("https://") {
        log::debug!("Downloading {location}");
        let response = reqwest::get(location).await?.error_for_status()?;
        Ok(response.text().await?)
    } else {
        let mut s = String::new();
        open_lines(location)?.read_to_string(&mut s)?;
        Ok(s)
    }
}

/// Load the CAIDA AS relationships.
pub fn load_relationships(path: impl AsRef<Path>) -> Result<Relationships, RegistryError> {
    let mut rels = Relationships::new();
    for line in open_lines(path)?.lines() {
        rels.insert_line(&line?);
    }
    Ok(rels)
}

/// Parse the PeeringDB `netfac` response into the facility part of the colocation map.
pub fn parse_netfac(s: &str) -> Result<ColocationMap, RegistryError> {
    let response: PdbResponse<PdbNetFac> = serde_json::from_str(s)?;
    let mut colo = ColocationMap::new();
    for netfac in response.data {
        colo.add_facility_presence(
            netfac.local_asn.to_string(),
            netfac.name,
            format!("{}:{}", netfac.city, netfac.country),
        );
    }
    Ok(colo)
}

/// Parse the CAIDA IXP dataset (`ix_id`, `name`) and the IXP membership dataset (`ix_id`, `asn`)
/// into the exchange part of the colocation map. Both are JSON lines with `#` comments. Lines
/// that cannot be parsed and members of unknown IXPs are skipped.
pub fn parse_ix_members(ixs: &str, ix_asns: &str) -> ColocationMap {
    let mut colo = ColocationMap::new();
    let mut names: HashMap<u64, String> = HashMap::new();
    for ix in json_lines::<CaidaIx>(ixs) {
        colo.add_exchange(ix.name.clone());
        names.insert(ix.ix_id, ix.name);
    }
    for member in json_lines::<CaidaIxAsn>(ix_asns) {
        match names.get(&member.ix_id) {
            Some(name) => colo.add_exchange_member(name.clone(), member.asn.to_string()),
            None => log::trace!("Member AS{} of unknown IXP {}", member.asn, member.ix_id),
        }
    }
    colo
}

fn json_lines<'a, T: serde::de::DeserializeOwned + 'a>(s: &'a str) -> impl Iterator<Item = T> + 'a {
    s.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| match serde_json::from_str(l) {
            Ok(x) => Some(x),
            Err(e) => {
                log::trace!("Skipping line {l:?}: {e}");
                None
            }
        })
}

/// Parse the PeeringDB `net` response for networks of type route server. The exchange name is
/// taken from `aka`.
pub fn parse_pdb_route_servers(s: &str) -> Result<RouteServers, RegistryError> {
    let response: PdbResponse<PdbNet> = serde_json::from_str(s)?;
    let mut rs = RouteServers::new();
    for net in response.data {
        rs.insert(net.asn.to_string(), net.aka.unwrap_or_default());
    }
    Ok(rs)
}

/// Parse the Euro-IX CSV. The first column holds the IXP name, the third and fourth column its
/// route server ASNs (`AS<number>`). Empty, non-numeric and non-positive ASNs are skipped.
pub fn parse_euroix(s: &str) -> Result<RouteServers, RegistryError> {
    let mut rs = RouteServers::new();
    let mut csv = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(s.as_bytes());
    for record in csv.records() {
        let record = record?;
        let Some(name) = record.get(0) else { continue };
        for field in [2, 3].into_iter().filter_map(|i| record.get(i)) {
            let asn = field.trim().trim_start_matches("AS");
            if asn.parse::<i64>().is_ok_and(|x| x > 0) {
                rs.insert(asn, name);
            }
        }
    }
    Ok(rs)
}

/// Replace a failed or missing dataset by an empty one.
fn or_empty<T: Default>(what: &str, result: Option<Result<T, RegistryError>>) -> T {
    match result {
        Some(Ok(x)) => x,
        Some(Err(e)) => {
            log::warn!("Cannot load the {what}: {e}");
            T::default()
        }
        None => {
            log::warn!("No location configured for the {what}");
            T::default()
        }
    }
}

async fn fetch_and_parse<T>(
    location: Option<&str>,
    parse: impl FnOnce(&str) -> Result<T, RegistryError>,
) -> Option<Result<T, RegistryError>> {
    let location = location?;
    Some(match fetch(location).await {
        Ok(s) => parse(&s),
        Err(e) => Err(e),
    })
}

async fn load_exchanges(config: &Config) -> Option<Result<ColocationMap, RegistryError>> {
    let (Some(ix), Some(ix_asn)) = (&config.ix_dataset, &config.ix_asn_dataset) else {
        return None;
    };
    Some(match tokio::join!(fetch(ix), fetch(ix_asn)) {
        (Ok(ixs), Ok(ix_asns)) => Ok(parse_ix_members(&ixs, &ix_asns)),
        (Err(e), _) | (_, Err(e)) => Err(e),
    })
}

/// Load all datasets configured in `config` concurrently and build the topology.
pub async fn build_topology(config: &Config) -> TopologyStore {
    let relationships = async {
        config
            .relationships_file
            .as_ref()
            .map(load_relationships)
    };
    let (relationships, facilities, exchanges, pdb_rs, euroix_rs) = tokio::join!(
        relationships,
        fetch_and_parse(config.pdb_netfac_url.as_deref(), parse_netfac),
        load_exchanges(config),
        fetch_and_parse(config.pdb_rsasn_url.as_deref(), parse_pdb_route_servers),
        fetch_and_parse(config.euroix_url.as_deref(), parse_euroix),
    );

    let relationships = or_empty("AS relationships", relationships);
    let mut colocation = or_empty("facility presence", facilities);
    colocation.merge_exchanges(or_empty("IXP members", exchanges));
    let mut route_servers = or_empty("PeeringDB route servers", pdb_rs);
    route_servers.extend(or_empty("Euro-IX route servers", euroix_rs));

    log::info!(
        "Loaded {} relationships, {} facilities, {} exchanges and {} route servers",
        relationships.len() / 2,
        colocation.num_facilities(),
        colocation.num_exchanges(),
        route_servers.len()
    );

    TopologyStore::new(relationships, route_servers, colocation)
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn netfac() {
        let colo = parse_netfac(
            r#"{"data": [
                {"local_asn": 3356, "name": "Equinix FR5", "city": "Frankfurt", "country": "DE", "id": 1},
                {"local_asn": 3356, "name": "Interxion FRA1", "city": "Frankfurt", "country": "DE"},
                {"local_asn": 6939, "name": "Equinix FR5", "city": "Frankfurt", "country": "DE"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(colo.facility_location("Equinix FR5"), Some("Frankfurt:DE"));
        assert_eq!(colo.facility_overlap("3356", "Equinix FR5"), Some(2));
        assert_eq!(colo.facility_overlap("6939", "Equinix FR5"), Some(1));
        assert_eq!(colo.location_facilities("Frankfurt:DE").len(), 2);
        assert!(parse_netfac("{\"meta\": {}}").is_err());
    }

    #[test]
    fn ix_members() {
        let colo = parse_ix_members(
            "# ixs\n{\"ix_id\": 1, \"name\": \"DE-CIX Frankfurt\"}\n{\"ix_id\": 2, \"name\": \"AMS-IX\"}\nnot json\n",
            "# members\n{\"ix_id\": 1, \"asn\": 3356}\n{\"ix_id\": 1, \"asn\": 6939}\n{\"ix_id\": 7, \"asn\": 1}\n",
        );
        let decix = colo.exchange_members("DE-CIX Frankfurt").unwrap();
        assert!(decix.contains("3356") && decix.contains("6939"));
        assert_eq!(decix.len(), 2);
        assert!(colo.exchange_members("AMS-IX").unwrap().is_empty());
        assert_eq!(colo.num_exchanges(), 2);
    }

    #[test]
    fn route_servers() {
        let rs = parse_pdb_route_servers(
            r#"{"data": [{"asn": 6695, "aka": "DE-CIX Frankfurt"}, {"asn": 6777, "aka": null}]}"#,
        )
        .unwrap();
        assert_eq!(rs.exchange("6695"), Some("DE-CIX Frankfurt"));
        assert!(rs.is_route_server("6777"));

        let rs = parse_euroix(
            "AMS-IX,Amsterdam,AS6777,AS6778\nLINX,London,AS8714,\nFoo,Bar,ASx,AS0\nshort\n",
        )
        .unwrap();
        assert_eq!(rs.exchange("6777"), Some("AMS-IX"));
        assert_eq!(rs.exchange("6778"), Some("AMS-IX"));
        assert_eq!(rs.exchange("8714"), Some("LINX"));
        assert_eq!(rs.len(), 3);
    }

    #[tokio::test]
    async fn build_from_files() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, content: &str| {
            let path = dir.path().join(name);
            std::fs::File::create(&path)
                .unwrap()
                .write_all(content.as_bytes())
                .unwrap();
            path.display().to_string()
        };
        let config = Config {
            relationships_file: Some(write("rels.txt", "# comment\n1|2|-1|bgp\n2|3|0|bgp\n").into()),
            ix_dataset: Some(write("ix.jsonl", "{\"ix_id\": 1, \"name\": \"DE-CIX\"}\n")),
            ix_asn_dataset: Some(write("ixasn.jsonl", "{\"ix_id\": 1, \"asn\": 10}\n")),
            euroix_url: Some(write("euroix.csv", "DE-CIX,Frankfurt,AS6695,\n")),
            pdb_netfac_url: Some(dir.path().join("missing.json").display().to_string()),
            ..Default::default()
        };
        let topo = build_topology(&config).await;
        assert_eq!(topo.relationships.get("2", "1"), Some(1));
        assert_eq!(topo.relationships.get("3", "2"), Some(0));
        assert_eq!(topo.route_servers.exchange("6695"), Some("DE-CIX"));
        assert!(topo.colocation.exchange_members("DE-CIX").unwrap().contains("10"));
        assert_eq!(topo.colocation.num_facilities(), 0);
    }
}
