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
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use commwatch::{
    config::{
        parse_collectors, parse_communities, parse_period, Config, FacilityFilter,
        MeasurementParams, Overlap,
    },
    pipeline::{Measurement, Outcome},
    registry::build_topology,
    source::{BgpReader, RecordSource, ReplaySource},
    util::{self, PathBufExt},
};
use commwatch_utils::other::{format_epoch, get_timestamp};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Measurement period in UTC, formatted as `YYYYMMDD.hhmm,YYYYMMDD.hhmm`.
    #[arg(short, long)]
    period: String,
    /// Comma-separated list of target communities.
    #[arg(short = 'm', long)]
    communities: String,
    /// Comma-separated list of collectors, or `all`.
    #[arg(short, long, default_value = "all")]
    collectors: String,
    /// Comma-separated list of facility names at which the far end must be present, or `all`.
    #[arg(short, long, default_value = "all")]
    facilities: String,
    /// Number of facilities the far end must have in the city of a requested facility, or `any`.
    #[arg(short, long, default_value = "any")]
    overlap: String,
    /// Directory for the result files.
    #[arg(short = 'd', long, default_value = ".")]
    outdir: PathBuf,
    /// Configuration file.
    #[arg(long, default_value = "commwatch.toml")]
    config: PathBuf,
    /// Replay recorded `bgpreader` output (possibly gzipped) instead of running `bgpreader`.
    #[arg(long)]
    replay: Option<PathBuf>,
    /// Also write all tracked routes to `tracked-routes.json`.
    #[arg(long)]
    dump_routes: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    util::init_logging();

    let args = Args::parse();
    let config = Config::load(&args.config)?;

    let params = MeasurementParams::new(
        parse_period(&args.period)?,
        parse_communities(&args.communities)?,
        parse_collectors(&args.collectors),
        FacilityFilter::new(&args.facilities, args.overlap.parse::<Overlap>()?),
        config.stability_hours,
        config.bin_seconds,
    )?;

    log::info!(
        "Run {}: tracking {} communities from {} to {}",
        get_timestamp(),
        params.communities.len(),
        format_epoch(params.period.start),
        format_epoch(params.period.end)
    );

    let topo = build_topology(&config).await;

    let source: Box<dyn RecordSource> = match &args.replay {
        Some(path) => Box::new(
            ReplaySource::from_file(path)
                .with_context(|| format!("Cannot read {}", path.display()))?,
        ),
        None => Box::new(
            BgpReader::new(&config.bgpreader_bin).with_timeout(config.phase_timeout()),
        ),
    };
    log::info!("Reading routing data from {}", source.description());

    let outcome = Measurement::new(&params, &topo, source.as_ref()).run().await;

    std::fs::create_dir_all(&args.outdir)
        .with_context(|| format!("Cannot create {}", args.outdir.display()))?;
    let files = outcome.write_results(&args.outdir, &params)?;

    if let (true, Outcome::Completed(routes)) = (args.dump_routes, &outcome) {
        let path = args.outdir.as_path().then("tracked-routes.json");
        util::dump_routes(routes, &path)?;
        log::info!("Wrote {}", path.display());
    }

    log::info!("Done, wrote {} result files", files.len());
    Ok(())
}
