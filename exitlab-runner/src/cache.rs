//! CSV candle cache.
//!
//! One file per (chain, instrument, interval):
//! ```text
//! <root>/chain=<chain>-<hash>/<instrument>-<hash>_<interval>.csv
//! ```
//! Each name part is the id with unsafe characters replaced, followed by a
//! BLAKE3 prefix of the raw id, so distinct ids never share a file.
//! Files are rewritten whole on every store (merge with existing rows, sort,
//! dedupe by timestamp) through a temp file and rename, so a crash never
//! leaves a half-written cache file behind.

use std::fs;
use std::path::{Path, PathBuf};

use exitlab_core::data::{CandleRequest, DataError, Interval};
use exitlab_core::domain::Candle;

use crate::source::canonicalize;

#[derive(Debug, Clone)]
pub struct CsvCandleCache {
    root: PathBuf,
}

impl CsvCandleCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding every cached candle for this key.
    pub fn path_for(&self, chain: &str, instrument_id: &str, interval: Interval) -> PathBuf {
        self.root
            .join(format!("chain={}", file_key(chain)))
            .join(format!("{}_{}.csv", file_key(instrument_id), interval))
    }

    fn request_path(&self, request: &CandleRequest) -> PathBuf {
        self.path_for(&request.chain, &request.instrument_id, request.interval)
    }

    /// All cached candles for the request's key, ignoring its range.
    /// `None` when nothing has been cached yet.
    pub fn load_all(&self, request: &CandleRequest) -> Result<Option<Vec<Candle>>, DataError> {
        let path = self.request_path(request);
        if !path.exists() {
            return Ok(None);
        }
        read_csv(&path).map(Some)
    }

    /// Cached candles inside `[from, to]`.
    pub fn load(&self, request: &CandleRequest) -> Result<Option<Vec<Candle>>, DataError> {
        Ok(self.load_all(request)?.map(|candles| {
            candles
                .into_iter()
                .filter(|c| c.timestamp >= request.from && c.timestamp <= request.to)
                .collect()
        }))
    }

    /// Whether the cache spans the whole requested range (to within one
    /// interval at the far end).
    pub fn covers(&self, request: &CandleRequest) -> Result<bool, DataError> {
        let Some(candles) = self.load_all(request)? else {
            return Ok(false);
        };
        let (Some(first), Some(last)) = (candles.first(), candles.last()) else {
            return Ok(false);
        };
        Ok(first.timestamp <= request.from
            && last.timestamp + request.interval.seconds() > request.to)
    }

    /// Merge `candles` into the cache file for the request's key. Returns the
    /// number of candles stored after merging.
    pub fn store(&self, request: &CandleRequest, candles: &[Candle]) -> Result<usize, DataError> {
        let path = self.request_path(request);
        let mut merged = match self.load_all(request)? {
            Some(existing) => existing,
            None => Vec::new(),
        };
        // New rows go last so they win the dedupe.
        merged.extend_from_slice(candles);
        let (merged, _dropped) = canonicalize(merged);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| cache_err(&path, e))?;
        }
        let tmp = path.with_extension("csv.tmp");
        write_csv(&tmp, &merged)?;
        fs::rename(&tmp, &path).map_err(|e| cache_err(&path, e))?;
        Ok(merged.len())
    }

    /// Remove the cache file for the request's key, if any.
    pub fn evict(&self, request: &CandleRequest) -> Result<bool, DataError> {
        let path = self.request_path(request);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).map_err(|e| cache_err(&path, e))?;
        Ok(true)
    }
}

fn file_key(raw: &str) -> String {
    let digest = blake3::hash(raw.as_bytes()).to_hex();
    format!("{}-{}", sanitize(raw), &digest.as_str()[..16])
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn cache_err(path: &Path, e: impl std::fmt::Display) -> DataError {
    DataError::Cache(format!("{}: {e}", path.display()))
}

fn read_csv(path: &Path) -> Result<Vec<Candle>, DataError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| cache_err(path, e))?;
    reader
        .deserialize()
        .map(|row| row.map_err(|e| cache_err(path, e)))
        .collect()
}

fn write_csv(path: &Path, candles: &[Candle]) -> Result<(), DataError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| cache_err(path, e))?;
    for candle in candles {
        writer.serialize(candle).map_err(|e| cache_err(path, e))?;
    }
    writer.flush().map_err(|e| cache_err(path, e))
}
