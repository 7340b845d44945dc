//! Module containing some utility functions that didn't fit anywhere else.

use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use flate2::bufread::GzDecoder;
use time::{format_description, OffsetDateTime};

/// Produces a timestamp `String` of the current time in YYYY-MM-DD_HH-mm-SS format.
pub fn get_timestamp() -> String {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .format(
            &format_description::parse("[year]-[month]-[day]_[hour]-[minute]-[second]").unwrap(),
        )
        .unwrap()
}

/// Format an epoch timestamp (in seconds) as a human-readable UTC date, e.g. `2018-01-24 01:27:00`.
/// Falls back to the plain number if the timestamp is out of range.
pub fn format_epoch(ts: i64) -> String {
    let Ok(dt) = OffsetDateTime::from_unix_timestamp(ts) else {
        return ts.to_string();
    };
    format_description::parse("[year]-[month]-[day] [hour]:[minute]:[second]")
        .ok()
        .and_then(|fmt| dt.format(&fmt).ok())
        .unwrap_or_else(|| ts.to_string())
}

/// Open a text file for reading line by line. Files ending in `.gz` are decompressed on the fly.
pub fn open_lines(path: impl AsRef<Path>) -> io::Result<Box<dyn BufRead + Send>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(BufReader::new(GzDecoder::new(reader))))
    } else {
        Ok(Box::new(reader))
    }
}
