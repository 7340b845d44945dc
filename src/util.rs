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
//! Utility module collection of functions

use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use crate::records::TrackedRoutes;

/// Configuration file of the loggers.
pub const LOG_CONFIG: &str = "log4rs.yml";

/// Initialize the loggers from `log4rs.yml`. If that file is missing or invalid, fall back to
/// `pretty_env_logger` (configured with `RUST_LOG`).
pub fn init_logging() {
    if Path::new(LOG_CONFIG).exists() {
        match log4rs::init_file(LOG_CONFIG, Default::default()) {
            Ok(()) => return,
            Err(e) => eprintln!("Cannot initialize log4rs from {LOG_CONFIG}: {e}"),
        }
    }
    pretty_env_logger::init();
}

pub trait PathBufExt: Sized {
    fn then(self, p: impl AsRef<Path>) -> PathBuf;

    /// Append the per-community result file name.
    fn then_results(self, community: impl AsRef<str>) -> PathBuf {
        self.then(format!("{}-results.txt", community.as_ref()))
    }
}

impl PathBufExt for PathBuf {
    fn then(mut self, p: impl AsRef<Path>) -> PathBuf {
        self.push(p);
        self
    }
}

impl PathBufExt for &Path {
    fn then(self, p: impl AsRef<Path>) -> PathBuf {
        let mut path = self.to_path_buf();
        path.push(p);
        path
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct RoutesFile {
    #[serde(with = "commwatch_utils::serde::entries")]
    routes: TrackedRoutes,
}

/// Write all tracked routes (with their history) as JSON.
pub fn dump_routes(routes: &TrackedRoutes, path: impl AsRef<Path>) -> io::Result<()> {
    let file = RoutesFile {
        routes: routes.clone(),
    };
    fs::write(path, serde_json::to_string_pretty(&file)?)
}

/// Read routes written by [`dump_routes`].
pub fn load_routes(path: impl AsRef<Path>) -> io::Result<TrackedRoutes> {
    let file: RoutesFile = serde_json::from_str(&fs::read_to_string(path)?)?;
    Ok(file.routes)
}
