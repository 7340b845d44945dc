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
//! Sources of routing elements.
//!
//! The pipeline never talks to `bgpreader` directly. It asks a [`RecordSource`] for all elements
//! matching a [`StreamQuery`], and the source hands them over one by one, in order.
use std::{
    collections::BTreeSet,
    io::BufRead,
    path::{Path, PathBuf},
    process::Stdio,
    time::Duration,
};

use itertools::Itertools;
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines},
    process::{ChildStdout, Command},
    time::Instant,
};

use commwatch_utils::{
    bgp_utils::{parse_elem, BgpElem, ElemKind},
    other::open_lines,
};

/// Prefix filters longer than this are not passed to `bgpreader`.
const MAX_PREFIX_FILTER_LEN: usize = 1000;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not start {0:?}: {1}")]
    Spawn(PathBuf, std::io::Error),
    #[error("The process has no stdout")]
    NoStdout,
}

/// Time window `[start, end)` in seconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Window {
    pub start: i64,
    pub end: i64,
}

impl Window {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, ts: i64) -> bool {
        self.start <= ts && ts < self.end
    }
}

impl std::fmt::Display for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use commwatch_utils::other::format_epoch;
        write!(f, "[{} - {})", format_epoch(self.start), format_epoch(self.end))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum DumpKind {
    /// Full-table snapshots (elements of kind `R`).
    Ribs,
    /// Incremental updates (elements of kind `A` and `W`).
    Updates,
}

impl DumpKind {
    pub fn matches(&self, kind: ElemKind) -> bool {
        match self {
            Self::Ribs => kind == ElemKind::Rib,
            Self::Updates => matches!(kind, ElemKind::Announcement | ElemKind::Withdrawal),
        }
    }
}

/// Description of the elements requested from a [`RecordSource`]. Empty filters match everything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamQuery {
    pub window: Window,
    pub dump: DumpKind,
    /// Only process one RIB dump per collector within this many seconds.
    pub rib_period: Option<i64>,
    pub collectors: BTreeSet<String>,
    pub communities: BTreeSet<String>,
    /// Peer ASNs
    pub peers: BTreeSet<String>,
    pub prefixes: BTreeSet<String>,
}

impl StreamQuery {
    pub fn new(window: Window, dump: DumpKind) -> Self {
        Self {
            window,
            dump,
            rib_period: None,
            collectors: Default::default(),
            communities: Default::default(),
            peers: Default::default(),
            prefixes: Default::default(),
        }
    }

    /// Arguments for `bgpreader` that implement this query.
    pub fn bgpreader_args(&self) -> Vec<String> {
        let mut args = vec![
            "-w".to_string(),
            format!("{},{}", self.window.start, self.window.end),
            "-t".to_string(),
            self.dump.to_string(),
        ];
        if let Some(period) = self.rib_period {
            args.extend(["-P".to_string(), period.to_string()]);
        }
        let mut push = |flag: &str, values: &BTreeSet<String>| {
            for v in values {
                args.extend([flag.to_string(), v.clone()]);
            }
        };
        push("-c", &self.collectors);
        push("-y", &self.communities);
        push("-j", &self.peers);
        if self.prefixes.iter().join(",").len() < MAX_PREFIX_FILTER_LEN {
            push("-k", &self.prefixes);
        } else {
            log::debug!(
                "Not filtering on {} prefixes, the filter would be too long",
                self.prefixes.len()
            );
        }
        args
    }

    /// Check if an element satisfies the query. The prefix filter is only applied if it would be
    /// passed on to `bgpreader`.
    pub fn matches(&self, elem: &BgpElem) -> bool {
        let prefix_filter = self.prefixes.iter().join(",").len() < MAX_PREFIX_FILTER_LEN;
        self.dump.matches(elem.kind)
            && self.window.contains(elem.timestamp)
            && (self.collectors.is_empty() || self.collectors.contains(&elem.collector))
            && (self.peers.is_empty() || self.peers.contains(&elem.peer_asn))
            && (!prefix_filter
                || self.prefixes.is_empty()
                || self.prefixes.contains(&elem.prefix.to_string()))
            && (self.communities.is_empty()
                || elem.communities.iter().any(|c| self.communities.contains(c)))
    }
}

/// Statistics of a single streaming call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Number of lines read
    pub lines: usize,
    /// Number of elements handed to the callback
    pub elems: usize,
    /// Set if the deadline was hit before the stream ended.
    pub timed_out: bool,
}

impl StreamSummary {
    pub fn skipped(&self) -> usize {
        self.lines - self.elems
    }
}

#[async_trait::async_trait]
pub trait RecordSource: Send + Sync {
    /// Stream all elements that match `query` and call `f` for each of them, in the order they are
    /// produced. Lines that cannot be parsed are skipped. On error, all elements received so far
    /// have already been handed to `f`.
    async fn for_each_elem(
        &self,
        query: &StreamQuery,
        f: &mut (dyn FnMut(BgpElem) + Send),
    ) -> Result<StreamSummary, SourceError>;

    /// Return a description of the source
    fn description(&self) -> String;
}

/// Parse a line, logging why it was skipped.
fn parse_line(line: &str) -> Option<BgpElem> {
    match parse_elem(line) {
        Ok(elem) => Some(elem),
        Err(e) => {
            log::trace!("Skipping line {line:?}: {e}");
            None
        }
    }
}

/// Runs `bgpreader` for every query and parses its output line by line.
#[derive(Debug, Clone)]
pub struct BgpReader {
    bin: PathBuf,
    timeout: Option<Duration>,
}

impl BgpReader {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self {
            bin: bin.into(),
            timeout: None,
        }
    }

    /// Kill the process if it did not finish within `timeout`. The elements received until then
    /// are kept.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    async fn read_lines(
        lines: &mut Lines<BufReader<ChildStdout>>,
        deadline: Option<Instant>,
        f: &mut (dyn FnMut(BgpElem) + Send),
        summary: &mut StreamSummary,
    ) -> Result<(), SourceError> {
        loop {
            // a busy pipe always has a line ready, so `timeout_at` alone never fires
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                summary.timed_out = true;
                return Ok(());
            }
            let line = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, lines.next_line()).await
                {
                    Ok(line) => line?,
                    Err(_) => {
                        summary.timed_out = true;
                        return Ok(());
                    }
                },
                None => lines.next_line().await?,
            };
            let Some(line) = line else {
                return Ok(());
            };
            summary.lines += 1;
            if let Some(elem) = parse_line(&line) {
                summary.elems += 1;
                f(elem);
            }
        }
    }
}

#[async_trait::async_trait]
impl RecordSource for BgpReader {
    async fn for_each_elem(
        &self,
        query: &StreamQuery,
        f: &mut (dyn FnMut(BgpElem) + Send),
    ) -> Result<StreamSummary, SourceError> {
        let args = query.bgpreader_args();
        log::info!("{} {}", self.bin.display(), args.join(" "));

        let mut child = Command::new(&self.bin)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SourceError::Spawn(self.bin.clone(), e))?;
        let Some(stdout) = child.stdout.take() else {
            let _ = child.start_kill();
            child.wait().await?;
            return Err(SourceError::NoStdout);
        };
        let mut lines = BufReader::new(stdout).lines();

        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut summary = StreamSummary::default();
        let result = Self::read_lines(&mut lines, deadline, f, &mut summary).await;

        // close the stream, then make sure the process is gone before returning
        drop(lines);
        if !matches!(child.try_wait(), Ok(Some(_))) {
            let _ = child.start_kill();
        }
        let status = child.wait().await?;

        if summary.timed_out {
            log::warn!(
                "{} did not finish within {:?}, killed it after {} lines",
                self.bin.display(),
                self.timeout.unwrap_or_default(),
                summary.lines
            );
        } else if !status.success() {
            log::warn!("{} exited with {status}", self.bin.display());
        }

        result.map(|_| summary)
    }

    fn description(&self) -> String {
        format!("bgpreader ({})", self.bin.display())
    }
}

/// Replays recorded `bgpreader` output, applying the window, dump kind and filters of each query
/// the way `bgpreader` would.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    name: String,
    lines: Vec<String>,
}

impl ReplaySource {
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: "memory".to_string(),
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }

    /// Load the recorded output from a file (possibly gzip-compressed).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let lines = open_lines(path)?.lines().collect::<Result<Vec<_>, _>>()?;
        log::debug!("Loaded {} lines from {}", lines.len(), path.display());
        Ok(Self {
            name: path.display().to_string(),
            lines,
        })
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[async_trait::async_trait]
impl RecordSource for ReplaySource {
    async fn for_each_elem(
        &self,
        query: &StreamQuery,
        f: &mut (dyn FnMut(BgpElem) + Send),
    ) -> Result<StreamSummary, SourceError> {
        let mut summary = StreamSummary::default();
        for line in &self.lines {
            summary.lines += 1;
            let Some(elem) = parse_line(line) else {
                continue;
            };
            if query.matches(&elem) {
                summary.elems += 1;
                f(elem);
            }
        }
        Ok(summary)
    }

    fn description(&self) -> String {
        format!("replay of {}", self.name)
    }
}
