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
//! The measurement pipeline.
//!
//! A measurement runs three phases over consecutive time windows:
//!
//! 1. **discover** (one day before the period): find all routes in the RIB dumps that carry one of
//!    the target communities, and resolve the link each community annotates.
//! 2. **stabilize** (the first `stability_hours` of the period): drop every route that shows up in
//!    a RIB dump without its target community.
//! 3. **monitor** (until the end of the period): follow the updates of the remaining routes and
//!    record when they gain or lose their target community.
//!
//! If a phase leaves no route to track, the measurement stops early.
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

use commwatch_utils::bgp_utils::{community_top16, BgpElem, ElemKind};

use crate::{
    config::{MeasurementParams, DISCOVERY_SECONDS},
    records::{Route, RouteKey, TrackedRoutes},
    resolver::{normalize_path, LinkResolver},
    source::{DumpKind, RecordSource, StreamQuery, StreamSummary, Window},
    timeline::{OutputError, Timelines},
    topology::TopologyStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum Phase {
    Discover,
    Stabilize,
    Monitor,
}

/// Collectors, peers and prefixes of the discovered routes. Later phases only request these.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scope {
    pub collectors: BTreeSet<String>,
    /// Peer ASNs
    pub peers: BTreeSet<String>,
    pub prefixes: BTreeSet<String>,
}

impl Scope {
    fn add(&mut self, elem: &BgpElem) {
        self.collectors.insert(elem.collector.clone());
        self.peers.insert(elem.peer_asn.clone());
        self.prefixes.insert(elem.prefix.to_string());
    }

    fn query(&self, window: Window, dump: DumpKind) -> StreamQuery {
        let mut query = StreamQuery::new(window, dump);
        query.collectors = self.collectors.clone();
        query.peers = self.peers.clone();
        query.prefixes = self.prefixes.clone();
        query
    }
}

/// Result of a measurement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// No route was left to track after the given phase.
    Terminated(Phase),
    /// All phases ran; these are the monitored routes.
    Completed(TrackedRoutes),
}

impl Outcome {
    pub fn routes(&self) -> Option<&TrackedRoutes> {
        match self {
            Self::Terminated(_) => None,
            Self::Completed(routes) => Some(routes),
        }
    }

    /// Write the time series of every community, binned from the end of the stability window
    /// until the end of the period. Nothing is written if the measurement terminated early.
    pub fn write_results(
        &self,
        outdir: impl AsRef<Path>,
        params: &MeasurementParams,
    ) -> Result<Vec<PathBuf>, OutputError> {
        let Some(routes) = self.routes() else {
            return Ok(Vec::new());
        };
        Timelines::from_routes(routes).write_results(
            outdir,
            params.monitor_window(),
            params.bin_seconds,
        )
    }
}

/// Drives the three phases of a single measurement.
pub struct Measurement<'a> {
    params: &'a MeasurementParams,
    topo: &'a TopologyStore,
    source: &'a dyn RecordSource,
}

impl<'a> Measurement<'a> {
    pub fn new(
        params: &'a MeasurementParams,
        topo: &'a TopologyStore,
        source: &'a dyn RecordSource,
    ) -> Self {
        Self {
            params,
            topo,
            source,
        }
    }

    /// Run all phases.
    pub async fn run(&self) -> Outcome {
        let (routes, scope) = self.discover().await;
        if routes.is_empty() {
            return self.terminate(Phase::Discover);
        }
        let routes = self.stabilize(routes, &scope).await;
        if routes.is_empty() {
            return self.terminate(Phase::Stabilize);
        }
        let routes = self.monitor(routes, &scope).await;
        if routes.is_empty() {
            return self.terminate(Phase::Monitor);
        }
        Outcome::Completed(routes)
    }

    fn terminate(&self, phase: Phase) -> Outcome {
        log::info!("No annotated routes left after the {phase} phase, stopping.");
        Outcome::Terminated(phase)
    }

    /// Find all routes carrying a target community in the RIB dumps of the day before the period.
    /// A later entry for the same peer and prefix replaces the earlier one.
    pub async fn discover(&self) -> (TrackedRoutes, Scope) {
        let mut query = StreamQuery::new(self.params.discover_window(), DumpKind::Ribs);
        query.rib_period = Some(DISCOVERY_SECONDS);
        query.collectors = self.params.collectors.clone();
        query.communities = self.params.communities.clone();

        self.params.facilities.log_facilities(&self.topo.colocation);

        let resolver = LinkResolver::new(self.topo);
        let params = self.params;
        let colocation = &self.topo.colocation;
        let mut routes = TrackedRoutes::new();
        let mut scope = Scope::default();

        self.stream(Phase::Discover, &query, &mut |elem: BgpElem| {
            if elem.kind != ElemKind::Rib {
                return;
            }
            let mut path = None;
            for community in elem
                .communities
                .iter()
                .filter(|c| params.communities.contains(*c))
            {
                let path = path.get_or_insert_with(|| normalize_path(&elem.as_path));
                let Some(link) = resolver.resolve(path, community_top16(community)) else {
                    log::trace!("Cannot resolve {community} on path {}", path.join(" "));
                    continue;
                };
                if !params
                    .facilities
                    .accepts(colocation, link.far_end.as_deref())
                {
                    continue;
                }
                let key = RouteKey::new(elem.peer_ip, elem.prefix);
                let mut route = Route::new(community.clone(), elem.communities.clone(), link, key);
                route.update(true, elem.timestamp);
                routes.insert(key, route);
                scope.add(&elem);
            }
        })
        .await;

        log::info!("Annotated routes after the discover phase: {}", routes.len());
        log::debug!(
            "Scope: {} collectors, {} peers, {} prefixes",
            scope.collectors.len(),
            scope.peers.len(),
            scope.prefixes.len()
        );
        (routes, scope)
    }

    /// Drop every route that appears in a RIB dump of the stability window without its target
    /// community.
    pub async fn stabilize(&self, mut routes: TrackedRoutes, scope: &Scope) -> TrackedRoutes {
        let query = scope.query(self.params.stabilize_window(), DumpKind::Ribs);
        let before = routes.len();

        self.stream(Phase::Stabilize, &query, &mut |elem: BgpElem| {
            if elem.kind != ElemKind::Rib {
                return;
            }
            let key = RouteKey::new(elem.peer_ip, elem.prefix);
            if routes
                .get(&key)
                .is_some_and(|r| !elem.has_community(r.target_community()))
            {
                log::trace!("Unstable route {key} at {}", elem.timestamp);
                routes.remove(&key);
            }
        })
        .await;

        log::info!(
            "Annotated routes after the stabilize phase: {} ({} unstable)",
            routes.len(),
            before - routes.len()
        );
        routes
    }

    /// Record every change of the tracked routes during the monitoring window.
    pub async fn monitor(&self, mut routes: TrackedRoutes, scope: &Scope) -> TrackedRoutes {
        let query = scope.query(self.params.monitor_window(), DumpKind::Updates);
        let mut changes = 0usize;

        self.stream(Phase::Monitor, &query, &mut |elem: BgpElem| {
            let key = RouteKey::new(elem.peer_ip, elem.prefix);
            let Some(route) = routes.get_mut(&key) else {
                return;
            };
            let active = match elem.kind {
                ElemKind::Announcement => elem.has_community(route.target_community()),
                ElemKind::Withdrawal => false,
                ElemKind::Rib => return,
            };
            if active != route.status().is_active() {
                changes += 1;
            }
            route.update(active, elem.timestamp);
        })
        .await;

        log::info!(
            "Recorded {changes} changes of {} annotated routes during the monitor phase",
            routes.len()
        );
        routes
    }

    /// Stream all elements of `query`. If the source fails, the phase continues with the elements
    /// received so far.
    async fn stream(
        &self,
        phase: Phase,
        query: &StreamQuery,
        f: &mut (dyn FnMut(BgpElem) + Send),
    ) -> StreamSummary {
        log::info!("Starting the {phase} phase {}", query.window);
        match self.source.for_each_elem(query, f).await {
            Ok(summary) => {
                log::info!(
                    "{phase}: processed {} elements ({} lines skipped)",
                    summary.elems,
                    summary.skipped()
                );
                summary
            }
            Err(e) => {
                log::warn!(
                    "{phase}: cannot read from {}: {e}. Continuing with the elements received so far.",
                    self.source.description()
                );
                StreamSummary::default()
            }
        }
    }
}
