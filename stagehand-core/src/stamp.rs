//! Staleness stamps: a fixed-format UTC timestamp, or an uppercase MD5 digest
//! for files whose mtimes do not survive copying.

use crate::error::{IoContext, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use md5::{Digest, Md5};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// `yyyy-MM-ddTHH:mm:ss.fffZ`
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub fn format_timestamp(t: DateTime<Utc>) -> String {
    t.format(TIMESTAMP_FORMAT).to_string()
}

/// Strict parse of [`TIMESTAMP_FORMAT`]; anything else is `None`.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let body = s.strip_suffix('Z')?;
    let naive = NaiveDateTime::parse_from_str(body, "%Y-%m-%dT%H:%M:%S%.3f").ok()?;
    Some(naive.and_utc())
}

/// Last-write time of `path` as a stamp.
pub fn mtime_stamp(path: &Path) -> Result<String> {
    let modified = std::fs::metadata(path).and_then(|m| m.modified()).at(path)?;
    Ok(format_timestamp(DateTime::<Utc>::from(modified)))
}

/// Uppercase hex MD5 of the file bytes.
pub fn content_stamp(path: &Path) -> Result<String> {
    let f = File::open(path).at(path)?;
    let len = f.metadata().at(path)?.len();
    let digest = if len == 0 {
        Md5::digest(b"")
    } else {
        let map = unsafe { Mmap::map(&f) }.at(path)?;
        Md5::digest(&map[..])
    };
    Ok(format!("{digest:X}"))
}

/// How two stamps for one path are compared.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StampKind {
    Timestamp,
    ContentHash,
}

impl StampKind {
    pub fn for_crc(crc_significant: bool) -> Self {
        if crc_significant {
            StampKind::ContentHash
        } else {
            StampKind::Timestamp
        }
    }

    /// `Some(true)` when `candidate` should replace `current`:
    /// hashes replace on any difference, timestamps only when strictly newer.
    /// `None` when a timestamp does not parse.
    pub fn supersedes(self, candidate: &str, current: &str) -> Option<bool> {
        match self {
            StampKind::ContentHash => Some(candidate != current),
            StampKind::Timestamp => {
                let c = parse_timestamp(candidate)?;
                let p = parse_timestamp(current)?;
                Some(c > p)
            }
        }
    }
}
