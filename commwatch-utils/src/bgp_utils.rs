//! Module to handle the routing elements emitted by `bgpreader`.
//!
//! Every line of `bgpreader` output has the following layout:
//!
//! ```text
//! <rec-type>|<elem-type>|<rec-ts-sec>.<rec-ts-usec>|<project>|<collector>|<router>|<router-ip>|
//! <peer-ASN>|<peer-IP>|<prefix>|<next-hop-IP>|<AS-path>|<origin-AS>|<communities>|<old-state>|<new-state>
//! ```

use std::{net::IpAddr, str::FromStr};

use ipnet::IpNet;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Minimum number of fields of a RIB entry or an announcement (up to the communities).
pub const ANNOUNCEMENT_FIELDS: usize = 14;
/// Minimum number of fields of a withdrawal (up to the prefix).
pub const WITHDRAWAL_FIELDS: usize = 10;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Deserialize,
    Serialize,
    strum::Display,
    strum::EnumString,
)]
/// Kind of an element, as given in the second field of every line.
pub enum ElemKind {
    /// Entry of a RIB dump, i.e., part of a full-table snapshot.
    #[strum(serialize = "R")]
    Rib,
    /// Announcement of an update dump.
    #[strum(serialize = "A")]
    Announcement,
    /// Explicit withdrawal of an update dump.
    #[strum(serialize = "W")]
    Withdrawal,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ElemParseError {
    #[error("Unknown element kind {0:?}")]
    UnknownKind(String),
    #[error("Expected at least {expected} fields, but got {got}")]
    MissingFields { expected: usize, got: usize },
    #[error("Invalid timestamp {0:?}")]
    Timestamp(String),
    #[error("Invalid peer address {0:?}")]
    PeerIp(String),
    #[error("Invalid prefix {0:?}")]
    Prefix(String),
}

/// Parsed routing element in a usable format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BgpElem {
    pub kind: ElemKind,
    /// Seconds since the epoch (the microseconds are dropped).
    pub timestamp: i64,
    pub collector: String,
    pub peer_asn: String,
    pub peer_ip: IpAddr,
    pub prefix: IpNet,
    /// AS path as announced, possibly prepended. Empty for withdrawals.
    pub as_path: Vec<String>,
    /// Attached communities. Empty for withdrawals.
    pub communities: Vec<String>,
}

impl BgpElem {
    /// Check if `community` is attached to the element.
    pub fn has_community(&self, community: &str) -> bool {
        self.communities.iter().any(|c| c == community)
    }
}

/// Parse a single line of `bgpreader` output.
pub fn parse_elem(line: &str) -> Result<BgpElem, ElemParseError> {
    parse_elem_fields(&line.trim_end_matches(['\r', '\n']).split('|').collect_vec())
}

/// Parse the already split fields of a single line.
pub fn parse_elem_fields(fields: &[&str]) -> Result<BgpElem, ElemParseError> {
    let Some(kind) = fields.get(1) else {
        return Err(ElemParseError::MissingFields {
            expected: WITHDRAWAL_FIELDS,
            got: fields.len(),
        });
    };
    let kind =
        ElemKind::from_str(kind).map_err(|_| ElemParseError::UnknownKind(kind.to_string()))?;

    let expected = match kind {
        ElemKind::Withdrawal => WITHDRAWAL_FIELDS,
        ElemKind::Rib | ElemKind::Announcement => ANNOUNCEMENT_FIELDS,
    };
    if fields.len() < expected {
        return Err(ElemParseError::MissingFields {
            expected,
            got: fields.len(),
        });
    }

    let timestamp =
        parse_timestamp(fields[2]).ok_or_else(|| ElemParseError::Timestamp(fields[2].into()))?;
    let peer_ip =
        IpAddr::from_str(fields[8]).map_err(|_| ElemParseError::PeerIp(fields[8].into()))?;
    let prefix =
        IpNet::from_str(fields[9]).map_err(|_| ElemParseError::Prefix(fields[9].into()))?;

    let (as_path, communities) = match kind {
        ElemKind::Withdrawal => (Vec::new(), Vec::new()),
        ElemKind::Rib | ElemKind::Announcement => (words(fields[11]), words(fields[13])),
    };

    Ok(BgpElem {
        kind,
        timestamp,
        collector: fields[4].to_string(),
        peer_asn: fields[7].to_string(),
        peer_ip,
        prefix,
        as_path,
        communities,
    })
}

/// Parse a `<sec>.<usec>` timestamp, keeping only the seconds.
pub fn parse_timestamp(ts: impl AsRef<str>) -> Option<i64> {
    ts.as_ref().split('.').next()?.parse().ok()
}

/// The top 16 bits of a community, i.e., the ASN that (by convention) defines its meaning.
pub fn community_top16(community: &str) -> &str {
    community.split(':').next().unwrap_or(community)
}

fn words(s: &str) -> Vec<String> {
    s.split_whitespace().map(str::to_string).collect()
}
