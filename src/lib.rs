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
//! Library for tracking the links annotated by BGP communities over time.
//!
//! Given a set of target communities and a measurement period, [`pipeline::Measurement`] discovers
//! the routes that carry them, resolves each community to the AS link it annotates
//! ([`resolver::LinkResolver`]), drops routes whose annotation is not stable, and records every
//! activation and withdrawal of the remaining routes ([`records::Route`]). Finally,
//! [`timeline::Timelines`] turns these events into a binned count of active routes per community.

pub mod config;
pub mod pipeline;
pub mod records;
pub mod registry;
pub mod resolver;
pub mod source;
pub mod timeline;
pub mod topology;
pub mod util;

#[cfg(test)]
mod test;

pub mod prelude {
    pub use super::{
        config::{Config, FacilityFilter, MeasurementParams, Overlap},
        pipeline::{Measurement, Outcome, Phase},
        records::{Route, RouteKey, RouteStatus, TrackedRoutes},
        resolver::{AnnotatedLink, LinkResolver},
        source::{BgpReader, RecordSource, ReplaySource, StreamQuery, Window},
        timeline::Timelines,
        topology::{Asn, TopologyStore},
    };
}
