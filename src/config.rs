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
//! This module contains the code for reading the configuration file and validating the
//! measurement parameters.
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use chrono::{NaiveDateTime, TimeZone, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;

use crate::{source::Window, timeline::DEFAULT_BIN_SECONDS, topology::ColocationMap};

/// Length of the discovery window before the start of the period.
pub const DISCOVERY_SECONDS: i64 = 24 * 3600;
/// Format of each end of the measurement period, e.g., `20180124.0127`.
pub const PERIOD_FORMAT: &str = "%Y%m%d.%H%M";
/// Keyword to disable the collector or facility restriction.
pub const ALL: &str = "all";
/// Keyword to disable the facility restriction or the overlap requirement.
pub const ANY: &str = "any";

lazy_static! {
    static ref COMMUNITY: Regex = Regex::new(r"^\d+:\d+(:\d+)?$").unwrap();
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read {0:?}: {1}")]
    Io(PathBuf, std::io::Error),
    #[error("Cannot parse {0:?}: {1}")]
    Toml(PathBuf, toml::de::Error),
    #[error("Malformed period {0:?}, expected YYYYMMDD.hhmm,YYYYMMDD.hhmm")]
    Period(String),
    #[error("The period must start before it ends")]
    EmptyPeriod,
    #[error("The stability window of {0} hours does not end before the end of the period")]
    StabilityTooLong(i64),
    #[error("Malformed community {0:?}")]
    Community(String),
    #[error("No target communities given")]
    NoCommunities,
    #[error("Malformed overlap {0:?}, expected a number or `any`")]
    Overlap(String),
    #[error("The bin size must be positive, but it is {0}")]
    BinSize(i64),
}

/// Contents of the configuration file. Every registry location is optional; a missing location
/// disables that dataset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path or name of the `bgpreader` binary.
    pub bgpreader_bin: PathBuf,
    /// CAIDA AS relationships (`serial-2`), plain or gzipped.
    pub relationships_file: Option<PathBuf>,
    /// PeeringDB `netfac` dump
    pub pdb_netfac_url: Option<String>,
    /// PeeringDB `net` dump, used to find route servers
    pub pdb_rsasn_url: Option<String>,
    /// Euro-IX route server list (CSV)
    pub euroix_url: Option<String>,
    /// CAIDA IXP dataset (JSON lines)
    pub ix_dataset: Option<String>,
    /// CAIDA IXP membership dataset (JSON lines)
    pub ix_asn_dataset: Option<String>,
    pub stability_hours: i64,
    pub bin_seconds: i64,
    /// Kill `bgpreader` if a single phase takes longer than this.
    pub phase_timeout_secs: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bgpreader_bin: PathBuf::from("bgpreader"),
            relationships_file: None,
            pdb_netfac_url: None,
            pdb_rsasn_url: None,
            euroix_url: None,
            ix_dataset: None,
            ix_asn_dataset: None,
            stability_hours: 24,
            bin_seconds: DEFAULT_BIN_SECONDS,
            phase_timeout_secs: None,
        }
    }
}

impl Config {
    /// Read the configuration file. If it does not exist, the defaults are used.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            log::warn!(
                "Config file {} does not exist, using the defaults",
                path.display()
            );
            return Ok(Self::default());
        }
        let s = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        toml::from_str(&s).map_err(|e| ConfigError::Toml(path.to_path_buf(), e))
    }

    pub fn phase_timeout(&self) -> Option<Duration> {
        self.phase_timeout_secs.map(Duration::from_secs)
    }
}

/// Parse a period of the form `YYYYMMDD.hhmm,YYYYMMDD.hhmm` (UTC) into a window.
pub fn parse_period(s: &str) -> Result<Window, ConfigError> {
    let err = || ConfigError::Period(s.to_string());
    let (start, end) = s.split_once(',').ok_or_else(err)?;
    let parse = |x: &str| {
        NaiveDateTime::parse_from_str(x.trim(), PERIOD_FORMAT)
            .map(|dt| Utc.from_utc_datetime(&dt).timestamp())
            .map_err(|_| err())
    };
    let window = Window::new(parse(start)?, parse(end)?);
    if window.start >= window.end {
        return Err(ConfigError::EmptyPeriod);
    }
    Ok(window)
}

/// Parse a comma-separated list of communities (`A:B` or `A:B:C`).
pub fn parse_communities(s: &str) -> Result<BTreeSet<String>, ConfigError> {
    let communities = split_list(s)
        .map(|c| {
            if COMMUNITY.is_match(&c) {
                Ok(c)
            } else {
                Err(ConfigError::Community(c))
            }
        })
        .collect::<Result<BTreeSet<_>, _>>()?;
    if communities.is_empty() {
        return Err(ConfigError::NoCommunities);
    }
    Ok(communities)
}

/// Parse a comma-separated list of collectors. `all` (or nothing) means no restriction, which is
/// represented as an empty set.
pub fn parse_collectors(s: &str) -> BTreeSet<String> {
    if s.trim().eq_ignore_ascii_case(ALL) {
        return BTreeSet::new();
    }
    split_list(s).collect()
}

fn split_list(s: &str) -> impl Iterator<Item = String> + '_ {
    s.split(',')
        .map(str::trim)
        .filter(|x| !x.is_empty())
        .map(str::to_string)
}

/// Number of facilities that the far end must have in the city of a requested facility.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Overlap {
    #[default]
    Any,
    Exactly(usize),
}

impl Overlap {
    pub fn matches(&self, overlap: usize) -> bool {
        match self {
            Self::Any => true,
            Self::Exactly(x) => *x == overlap,
        }
    }
}

impl FromStr for Overlap {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case(ANY) || s == "-1" {
            return Ok(Self::Any);
        }
        s.parse()
            .map(Self::Exactly)
            .map_err(|_| ConfigError::Overlap(s.to_string()))
    }
}

impl std::fmt::Display for Overlap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => f.write_str(ANY),
            Self::Exactly(x) => write!(f, "{x}"),
        }
    }
}

/// Restrict the tracked links to those whose far end is colocated at one of the requested
/// facilities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FacilityFilter {
    /// Requested facilities. Empty if there is no restriction.
    pub facilities: Vec<String>,
    pub overlap: Overlap,
}

impl FacilityFilter {
    /// Parse a comma-separated list of facility names. `all` and `any` disable the filter.
    pub fn new(facilities: &str, overlap: Overlap) -> Self {
        let trimmed = facilities.trim();
        let facilities = if trimmed.eq_ignore_ascii_case(ALL) || trimmed.eq_ignore_ascii_case(ANY)
        {
            Vec::new()
        } else {
            split_list(facilities).collect()
        };
        Self {
            facilities,
            overlap,
        }
    }

    pub fn is_active(&self) -> bool {
        !self.facilities.is_empty()
    }

    /// Check whether a link with the given far end passes the filter. A link without far end never
    /// passes an active filter.
    pub fn accepts(&self, colocation: &ColocationMap, far_end: Option<&str>) -> bool {
        if !self.is_active() {
            return true;
        }
        let Some(far_end) = far_end else {
            return false;
        };
        self.facilities.iter().any(|facility| {
            colocation
                .facility_overlap(far_end, facility)
                .is_some_and(|overlap| self.overlap.matches(overlap))
        })
    }

    /// Log the location of each requested facility, and warn about unknown ones.
    pub fn log_facilities(&self, colocation: &ColocationMap) {
        for facility in &self.facilities {
            match colocation.facility_location(facility) {
                Some(location) => log::info!(
                    "Facility {facility:?} is located in {location} ({} facilities in the same city)",
                    colocation.location_facilities(location).len()
                ),
                None => log::warn!("Unknown facility {facility:?}"),
            }
        }
    }
}

/// Validated parameters of a single measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasurementParams {
    /// Requested period.
    pub period: Window,
    pub communities: BTreeSet<String>,
    /// Collectors to use. Empty means all collectors.
    pub collectors: BTreeSet<String>,
    pub facilities: FacilityFilter,
    /// Stability window in seconds.
    pub stability: i64,
    pub bin_seconds: i64,
}

impl MeasurementParams {
    pub fn new(
        period: Window,
        communities: BTreeSet<String>,
        collectors: BTreeSet<String>,
        facilities: FacilityFilter,
        stability_hours: i64,
        bin_seconds: i64,
    ) -> Result<Self, ConfigError> {
        if period.start >= period.end {
            return Err(ConfigError::EmptyPeriod);
        }
        if communities.is_empty() {
            return Err(ConfigError::NoCommunities);
        }
        let stability = match stability_hours.checked_mul(3600) {
            Some(stability) if stability >= 0 => stability,
            _ => return Err(ConfigError::StabilityTooLong(stability_hours)),
        };
        if period.start.checked_add(stability).map_or(true, |end| end >= period.end) {
            return Err(ConfigError::StabilityTooLong(stability_hours));
        }
        if bin_seconds <= 0 {
            return Err(ConfigError::BinSize(bin_seconds));
        }
        Ok(Self {
            period,
            communities,
            collectors,
            facilities,
            stability,
            bin_seconds,
        })
    }

    /// One day before the start of the period.
    pub fn discover_window(&self) -> Window {
        Window::new(self.period.start - DISCOVERY_SECONDS, self.period.start)
    }

    pub fn stabilize_window(&self) -> Window {
        Window::new(self.period.start, self.period.start + self.stability)
    }

    /// From the end of the stability window until the end of the period.
    pub fn monitor_window(&self) -> Window {
        Window::new(self.period.start + self.stability, self.period.end)
    }
}

#[cfg(test)]
mod test {
    use maplit::btreeset;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn period() {
        assert_eq!(
            parse_period("20180124.0127,20180126.0000").unwrap(),
            Window::new(1516757220, 1516924800)
        );
        assert!(matches!(
            parse_period("20180126.0000,20180124.0127"),
            Err(ConfigError::EmptyPeriod)
        ));
        assert!(matches!(
            parse_period("20180124.0127"),
            Err(ConfigError::Period(_))
        ));
        assert!(matches!(
            parse_period("2018-01-24,20180126.0000"),
            Err(ConfigError::Period(_))
        ));
    }

    #[test]
    fn communities() {
        assert_eq!(
            parse_communities("2:100, 3356:22,1:2:3").unwrap(),
            btreeset! {"2:100".to_string(), "3356:22".to_string(), "1:2:3".to_string()}
        );
        assert!(matches!(
            parse_communities("2:100,foo"),
            Err(ConfigError::Community(c)) if c == "foo"
        ));
        assert!(matches!(
            parse_communities(" , "),
            Err(ConfigError::NoCommunities)
        ));
    }

    #[test]
    fn collectors() {
        assert!(parse_collectors("all").is_empty());
        assert_eq!(
            parse_collectors("rrc00,route-views2"),
            btreeset! {"rrc00".to_string(), "route-views2".to_string()}
        );
    }

    #[test]
    fn overlap() {
        assert_eq!("any".parse::<Overlap>().unwrap(), Overlap::Any);
        assert_eq!("-1".parse::<Overlap>().unwrap(), Overlap::Any);
        assert_eq!("2".parse::<Overlap>().unwrap(), Overlap::Exactly(2));
        assert!("two".parse::<Overlap>().is_err());
        assert_eq!(Overlap::Exactly(3).to_string(), "3");
    }

    #[test]
    fn facility_filter() {
        let mut colo = ColocationMap::new();
        colo.add_facility_presence("3", "Equinix FR5", "Frankfurt:DE");
        colo.add_facility_presence("3", "Interxion FRA1", "Frankfurt:DE");
        colo.add_facility_presence("4", "Equinix FR5", "Frankfurt:DE");

        let all = FacilityFilter::new("all", Overlap::Exactly(5));
        assert!(!all.is_active());
        assert!(all.accepts(&colo, None));

        let any = FacilityFilter::new("Equinix FR5", Overlap::Any);
        assert!(any.accepts(&colo, Some("3")));
        assert!(any.accepts(&colo, Some("4")));
        assert!(!any.accepts(&colo, Some("5")));
        assert!(!any.accepts(&colo, None));

        let two = FacilityFilter::new("Equinix FR5,Unknown", Overlap::Exactly(2));
        assert_eq!(two.facilities.len(), 2);
        assert!(two.accepts(&colo, Some("3")));
        assert!(!two.accepts(&colo, Some("4")));
    }

    #[test]
    fn windows() {
        let params = MeasurementParams::new(
            Window::new(100_000, 200_000),
            btreeset! {"2:100".to_string()},
            BTreeSet::new(),
            FacilityFilter::default(),
            1,
            180,
        )
        .unwrap();
        assert_eq!(params.discover_window(), Window::new(13_600, 100_000));
        assert_eq!(params.stabilize_window(), Window::new(100_000, 103_600));
        assert_eq!(params.monitor_window(), Window::new(103_600, 200_000));
    }

    #[test]
    fn invalid_params() {
        let communities = btreeset! {"2:100".to_string()};
        let new = |period, stability, bin| {
            MeasurementParams::new(
                period,
                communities.clone(),
                BTreeSet::new(),
                FacilityFilter::default(),
                stability,
                bin,
            )
        };
        assert!(matches!(
            new(Window::new(0, 3600), 1, 180),
            Err(ConfigError::StabilityTooLong(1))
        ));
        assert!(matches!(
            new(Window::new(0, 0), 0, 180),
            Err(ConfigError::EmptyPeriod)
        ));
        assert!(matches!(
            new(Window::new(0, 7200), 1, 0),
            Err(ConfigError::BinSize(0))
        ));
        assert!(new(Window::new(0, 7200), 1, 180).is_ok());
    }

    #[test]
    fn huge_stability_is_rejected() {
        let new = |period, stability| {
            MeasurementParams::new(
                period,
                btreeset! {"2:100".to_string()},
                BTreeSet::new(),
                FacilityFilter::default(),
                stability,
                180,
            )
        };
        assert!(matches!(
            new(Window::new(0, 7200), i64::MAX),
            Err(ConfigError::StabilityTooLong(i64::MAX))
        ));
        assert!(matches!(
            new(Window::new(0, 7200), -1),
            Err(ConfigError::StabilityTooLong(-1))
        ));
        // fits into an i64, but the window end does not
        assert!(matches!(
            new(Window::new(i64::MAX - 3600, i64::MAX), 2),
            Err(ConfigError::StabilityTooLong(2))
        ));
    }

    #[test]
    fn config_file() {
        let config: Config = toml::from_str(
            r#"
            bgpreader_bin = "/usr/local/bin/bgpreader"
            relationships_file = "20180101.as-rel2.txt.gz"
            ix_dataset = "https://example.org/ixs.jsonl"
            stability_hours = 12
            phase_timeout_secs = 600
            "#,
        )
        .unwrap();
        assert_eq!(config.bgpreader_bin, PathBuf::from("/usr/local/bin/bgpreader"));
        assert_eq!(config.stability_hours, 12);
        assert_eq!(config.bin_seconds, DEFAULT_BIN_SECONDS);
        assert_eq!(config.phase_timeout(), Some(Duration::from_secs(600)));
        assert_eq!(config.euroix_url, None);

        let missing = Config::load("/nonexistent/commwatch.toml").unwrap();
        assert_eq!(missing, Config::default());
    }
}
