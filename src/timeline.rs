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
//! Aggregate the activations and withdrawals of all tracked routes into a binned time series of
//! active routes per community.
use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
};

use rayon::prelude::*;

use crate::{records::TrackedRoutes, source::Window, util::PathBufExt};

/// Default bin size in seconds.
pub const DEFAULT_BIN_SECONDS: i64 = 180;

/// Number of routes that changed state at each timestamp (positive for activations, negative for
/// withdrawals).
pub type Deltas = BTreeMap<i64, i64>;

/// Deltas for every target community that has at least one event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timelines {
    tags: BTreeMap<String, Deltas>,
}

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("IO Error: {0}")]
    Io(#[from] io::Error),
    #[error("CSV Error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Cannot write {0:?}: {1}")]
    Persist(PathBuf, io::Error),
}

impl Timelines {
    /// Collect the events of all routes.
    pub fn from_routes(routes: &TrackedRoutes) -> Self {
        let mut tags: BTreeMap<String, Deltas> = BTreeMap::new();
        for route in routes.values() {
            if route.activations().is_empty() && route.withdrawals().is_empty() {
                continue;
            }
            let deltas = tags.entry(route.target_community().to_string()).or_default();
            for ts in route.activations() {
                *deltas.entry(*ts).or_default() += 1;
            }
            for ts in route.withdrawals() {
                *deltas.entry(*ts).or_default() -= 1;
            }
        }
        Self { tags }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn get(&self, tag: &str) -> Option<&Deltas> {
        self.tags.get(tag)
    }

    /// Write one file `<tag>-results.txt` per community into `outdir`, in parallel. Each line holds
    /// the start of a bin and the number of active routes, separated by a tab. Files are written to
    /// a temporary file first, such that a file either exists completely or not at all.
    pub fn write_results(
        &self,
        outdir: impl AsRef<Path>,
        window: Window,
        bin: i64,
    ) -> Result<Vec<PathBuf>, OutputError> {
        let outdir = outdir.as_ref();
        self.tags
            .par_iter()
            .map(|(tag, deltas)| {
                let path = outdir.then_results(tag);
                write_series(&path, &binned_counts(deltas, window, bin))?;
                log::info!("Wrote {}", path.display());
                Ok(path)
            })
            .collect()
    }
}

/// Running total of active routes for every bin in `window`. Each bin `[s, s + bin)` is reported
/// as `(s, n)`, where `n` is the sum of all deltas before `s + bin`. Events before the start of
/// the window are part of the first count.
pub fn binned_counts(deltas: &Deltas, window: Window, bin: i64) -> Vec<(i64, i64)> {
    let mut result = Vec::new();
    if bin <= 0 {
        return result;
    }
    let mut events = deltas.iter().peekable();
    let mut count = 0;
    let mut bin_start = window.start;
    while bin_start < window.end {
        let boundary = bin_start + bin;
        while let Some((_, delta)) = events.next_if(|(ts, _)| **ts < boundary) {
            count += delta;
        }
        result.push((bin_start, count));
        bin_start = boundary;
    }
    result
}

fn write_series(path: &Path, series: &[(i64, i64)]) -> Result<(), OutputError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let tmp = tempfile::NamedTempFile::new_in(dir)?;
    let mut csv = csv::WriterBuilder::new()
        .has_headers(false)
        .delimiter(b'\t')
        .from_writer(tmp);
    for row in series {
        csv.serialize(row)?;
    }
    let tmp = csv.into_inner().map_err(|e| e.into_error())?;
    tmp.persist(path)
        .map_err(|e| OutputError::Persist(path.to_path_buf(), e.error))?;
    Ok(())
}

#[cfg(test)]
mod test {
    use std::net::{IpAddr, Ipv4Addr};

    use maplit::btreemap;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        records::{Route, RouteKey},
        resolver::AnnotatedLink,
    };

    fn route(tag: &str, prefix: &str, events: &[(bool, i64)]) -> (RouteKey, Route) {
        let key = RouteKey::new(
            IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)),
            prefix.parse().unwrap(),
        );
        let mut route = Route::new(
            tag,
            vec![tag.to_string()],
            AnnotatedLink::new("2", Some("3")),
            key,
        );
        for (active, ts) in events {
            route.update(*active, *ts);
        }
        (key, route)
    }

    #[test]
    fn deltas_are_summed() {
        let routes: TrackedRoutes = [
            route("2:100", "10.0.0.0/24", &[(true, 10), (false, 50)]),
            route("2:100", "10.0.1.0/24", &[(true, 10), (false, 70), (true, 90)]),
            route("3:200", "10.0.2.0/24", &[(true, 20)]),
            route("4:300", "10.0.3.0/24", &[]),
        ]
        .into_iter()
        .collect();
        let timelines = Timelines::from_routes(&routes);
        assert_eq!(timelines.len(), 2);
        assert_eq!(
            timelines.get("2:100"),
            Some(&btreemap! {10 => 2, 50 => -1, 70 => -1, 90 => 1})
        );
        assert_eq!(timelines.get("3:200"), Some(&btreemap! {20 => 1}));
        assert_eq!(timelines.get("4:300"), None);
    }

    #[test]
    fn activation_then_withdrawal() {
        let deltas = btreemap! {100 => 1, 200 => -1};
        let series = binned_counts(&deltas, Window::new(0, 300), 50);
        assert_eq!(
            series,
            vec![(0, 0), (50, 0), (100, 1), (150, 1), (200, 0), (250, 0)]
        );
    }

    #[test]
    fn earlier_events_are_folded_in() {
        let deltas = btreemap! {-500 => 1, 3 => 1, 1000 => -1};
        let series = binned_counts(&deltas, Window::new(0, 540), DEFAULT_BIN_SECONDS);
        assert_eq!(series, vec![(0, 2), (180, 2), (360, 2)]);
        assert!(binned_counts(&deltas, Window::new(0, 0), 180).is_empty());
        assert!(binned_counts(&deltas, Window::new(0, 100), 0).is_empty());
    }

    #[test]
    fn write_one_file_per_tag() {
        let dir = tempfile::tempdir().unwrap();
        let routes: TrackedRoutes = [
            route("2:100", "10.0.0.0/24", &[(true, 10), (false, 200)]),
            route("3:200", "10.0.2.0/24", &[(true, 20)]),
        ]
        .into_iter()
        .collect();
        let timelines = Timelines::from_routes(&routes);
        let mut files = timelines
            .write_results(dir.path(), Window::new(100, 400), 100)
            .unwrap();
        files.sort();
        assert_eq!(
            files,
            vec![
                dir.path().join("2:100-results.txt"),
                dir.path().join("3:200-results.txt")
            ]
        );
        assert_eq!(files[0], dir.path().then_results("2:100"));
        assert_eq!(
            std::fs::read_to_string(&files[0]).unwrap(),
            "100\t1\n200\t0\n300\t0\n"
        );
        assert_eq!(
            std::fs::read_to_string(&files[1]).unwrap(),
            "100\t1\n200\t1\n300\t1\n"
        );
        // no temporary files are left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }
}
