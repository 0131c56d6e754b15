//! Candle sources used by the driver.
//!
//! - [`CachedCandleSource`]: CSV cache first, remote fallback, offline mode
//! - [`SyntheticCandleSource`]: seeded random walk for dry runs and tests
//!
//! Everything handed back to the engine goes through [`canonicalize`], so the
//! core only ever sees sorted, deduplicated, internally consistent candles.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use exitlab_core::data::{CandleRequest, CandleSource, DataError};
use exitlab_core::domain::Candle;

use crate::cache::CsvCandleCache;

/// Upper bound on candles generated for one synthetic request.
const MAX_SYNTHETIC_CANDLES: i64 = 1_000_000;

/// Drop inconsistent candles, sort by timestamp and keep the last candle seen
/// for each timestamp. Returns the cleaned candles and how many were dropped.
pub fn canonicalize(candles: Vec<Candle>) -> (Vec<Candle>, usize) {
    let total = candles.len();
    let mut sane: Vec<Candle> = candles.into_iter().filter(Candle::is_sane).collect();
    // Stable sort: among equal timestamps, later input stays later.
    sane.sort_by_key(|c| c.timestamp);

    let mut out: Vec<Candle> = Vec::with_capacity(sane.len());
    for candle in sane {
        match out.last_mut() {
            Some(last) if last.timestamp == candle.timestamp => *last = candle,
            _ => out.push(candle),
        }
    }
    let dropped = total - out.len();
    (out, dropped)
}

fn in_range(candles: Vec<Candle>, request: &CandleRequest) -> Vec<Candle> {
    candles
        .into_iter()
        .filter(|c| c.timestamp >= request.from && c.timestamp <= request.to)
        .collect()
}

/// Cache-first candle source with an optional remote fallback.
pub struct CachedCandleSource {
    cache: CsvCandleCache,
    remote: Option<Box<dyn CandleSource>>,
    offline: bool,
}

impl CachedCandleSource {
    pub fn new(cache: CsvCandleCache, remote: Option<Box<dyn CandleSource>>) -> Self {
        Self {
            cache,
            remote,
            offline: false,
        }
    }

    /// Never touch the network; serve whatever the cache holds.
    pub fn offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    pub fn cache(&self) -> &CsvCandleCache {
        &self.cache
    }

    fn cached_or(
        &self,
        request: &CandleRequest,
        cached: Option<Vec<Candle>>,
        err: DataError,
    ) -> Result<Vec<Candle>, DataError> {
        match cached {
            Some(candles) if !candles.is_empty() => {
                warn!(
                    instrument = %request.instrument_id,
                    chain = %request.chain,
                    reason = %err,
                    count = candles.len(),
                    "using partial cache"
                );
                Ok(canonicalize(candles).0)
            }
            _ => Err(err),
        }
    }
}

impl CandleSource for CachedCandleSource {
    fn name(&self) -> &str {
        "cached"
    }

    fn fetch(&self, request: &CandleRequest) -> Result<Vec<Candle>, DataError> {
        request.validate()?;

        if self.cache.covers(request)? {
            let cached = self.cache.load(request)?.unwrap_or_default();
            debug!(instrument = %request.instrument_id, count = cached.len(), "cache hit");
            return Ok(canonicalize(cached).0);
        }
        let cached = self.cache.load(request)?;

        let remote = match &self.remote {
            Some(remote) if !self.offline => remote,
            _ => {
                return self.cached_or(
                    request,
                    cached,
                    DataError::NoCachedData {
                        label: request.label(),
                    },
                )
            }
        };
        if !remote.is_available() {
            return self.cached_or(request, cached, DataError::CircuitBreakerTripped);
        }

        match remote.fetch(request) {
            Ok(fetched) => {
                let (clean, dropped) = canonicalize(fetched);
                if dropped > 0 {
                    warn!(
                        instrument = %request.instrument_id,
                        dropped,
                        "dropped inconsistent or duplicate candles"
                    );
                }
                match self.cache.store(request, &clean) {
                    Ok(stored) => debug!(instrument = %request.instrument_id, stored, "cache updated"),
                    Err(e) => warn!(instrument = %request.instrument_id, reason = %e, "cache write failed"),
                }
                info!(
                    instrument = %request.instrument_id,
                    chain = %request.chain,
                    source = remote.name(),
                    count = clean.len(),
                    "fetched candles"
                );
                Ok(in_range(clean, request))
            }
            Err(e) => self.cached_or(request, cached, e),
        }
    }

    fn is_available(&self) -> bool {
        true
    }
}

/// Deterministic random-walk candles.
///
/// The walk for a request depends only on the seed, the instrument, the chain
/// and the request itself, so repeated dry runs are reproducible.
#[derive(Debug, Clone)]
pub struct SyntheticCandleSource {
    seed: u64,
    start_price: f64,
    volatility: f64,
    drift: f64,
}

impl SyntheticCandleSource {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            start_price: 1.0,
            volatility: 0.03,
            drift: 0.0005,
        }
    }

    pub fn with_start_price(mut self, price: f64) -> Self {
        self.start_price = price;
        self
    }

    /// Per-candle return range is `drift ± volatility`.
    pub fn with_volatility(mut self, volatility: f64, drift: f64) -> Self {
        self.volatility = volatility;
        self.drift = drift;
        self
    }

    fn rng_for(&self, request: &CandleRequest) -> StdRng {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.seed.to_le_bytes());
        hasher.update(request.chain.as_bytes());
        hasher.update(b"/");
        hasher.update(request.instrument_id.as_bytes());
        StdRng::from_seed(*hasher.finalize().as_bytes())
    }
}

impl CandleSource for SyntheticCandleSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn fetch(&self, request: &CandleRequest) -> Result<Vec<Candle>, DataError> {
        request.validate()?;
        if !(self.start_price.is_finite() && self.start_price > 0.0) {
            return Err(DataError::InvalidRequest(format!(
                "synthetic start price must be positive, got {}",
                self.start_price
            )));
        }
        let step = request.interval.seconds();
        let first = request.from.div_euclid(step) * step;
        let count = (request.to - first) / step + 1;
        if count > MAX_SYNTHETIC_CANDLES {
            return Err(DataError::InvalidRequest(format!(
                "{count} synthetic candles requested for {}",
                request.label()
            )));
        }

        let mut rng = self.rng_for(request);
        let mut price = self.start_price;
        let vol = self.volatility.abs();
        let mut candles = Vec::with_capacity(count.max(0) as usize);
        let mut ts = first;
        while ts <= request.to {
            let ret: f64 = self.drift + rng.gen_range(-vol..=vol);
            let open = price;
            let close = (open * (1.0 + ret)).max(open * 0.01);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..=vol));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..=vol.min(0.5)));
            let volume = rng.gen_range(100.0..10_000.0);
            if ts >= request.from {
                candles.push(Candle::new(ts, open, high, low, close, volume));
            }
            price = close;
            ts += step;
        }
        Ok(candles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exitlab_core::data::Interval;
    use exitlab_core::domain::validate_candles;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn c(ts: i64, close: f64) -> Candle {
        Candle::new(ts, close, close * 1.1, close * 0.9, close, 1.0)
    }

    fn request(from: i64, to: i64) -> CandleRequest {
        CandleRequest::new("PEPE", "ethereum", Interval::OneMinute, from, to)
    }

    /// Fixed candles that counts how often it is called.
    struct Scripted {
        candles: Result<Vec<Candle>, ()>,
        calls: Arc<AtomicUsize>,
    }

    impl CandleSource for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn fetch(&self, _request: &CandleRequest) -> Result<Vec<Candle>, DataError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.candles
                .clone()
                .map_err(|_| DataError::Network("connection reset".into()))
        }
    }

    fn scripted(candles: Result<Vec<Candle>, ()>) -> (Box<dyn CandleSource>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Box::new(Scripted {
                candles,
                calls: Arc::clone(&calls),
            }),
            calls,
        )
    }

    // ── canonicalize ─────────────────────────────────────────────────

    #[test]
    fn canonicalize_sorts_dedupes_and_drops() {
        let mut broken = c(60, 1.0);
        broken.low = 2.0;
        let input = vec![c(120, 1.2), c(0, 1.0), broken, c(60, 1.1), c(60, 1.15)];
        let (out, dropped) = canonicalize(input);
        let ts: Vec<i64> = out.iter().map(|c| c.timestamp).collect();
        assert_eq!(ts, vec![0, 60, 120]);
        assert_eq!(out[1].close, 1.15);
        assert_eq!(dropped, 2);
        assert!(validate_candles(&out).is_ok());
    }

    // ── CachedCandleSource ───────────────────────────────────────────

    #[test]
    fn covered_range_never_hits_remote() {
        let dir = TempDir::new().unwrap();
        let cache = CsvCandleCache::new(dir.path());
        cache
            .store(&request(0, 0), &[c(0, 1.0), c(60, 1.1), c(120, 1.2)])
            .unwrap();
        let (remote, calls) = scripted(Ok(vec![]));
        let source = CachedCandleSource::new(cache, Some(remote));

        let candles = source.fetch(&request(0, 120)).unwrap();
        assert_eq!(candles.len(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn miss_fetches_cleans_and_stores() {
        let dir = TempDir::new().unwrap();
        let cache = CsvCandleCache::new(dir.path());
        let (remote, calls) = scripted(Ok(vec![c(120, 1.2), c(0, 1.0), c(60, 1.1), c(600, 2.0)]));
        let source = CachedCandleSource::new(cache, Some(remote));

        let candles = source.fetch(&request(0, 120)).unwrap();
        let ts: Vec<i64> = candles.iter().map(|c| c.timestamp).collect();
        assert_eq!(ts, vec![0, 60, 120]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Second call is served from the cache.
        source.fetch(&request(0, 120)).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn offline_without_cache_is_an_error() {
        let dir = TempDir::new().unwrap();
        let (remote, calls) = scripted(Ok(vec![c(0, 1.0)]));
        let source = CachedCandleSource::new(CsvCandleCache::new(dir.path()), Some(remote))
            .offline(true);
        assert!(matches!(
            source.fetch(&request(0, 60)),
            Err(DataError::NoCachedData { .. })
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn remote_failure_falls_back_to_partial_cache() {
        let dir = TempDir::new().unwrap();
        let cache = CsvCandleCache::new(dir.path());
        cache.store(&request(0, 0), &[c(0, 1.0), c(60, 1.1)]).unwrap();
        let (remote, _) = scripted(Err(()));
        let source = CachedCandleSource::new(cache, Some(remote));

        let candles = source.fetch(&request(0, 600)).unwrap();
        assert_eq!(candles.len(), 2);
    }

    #[test]
    fn remote_failure_without_cache_propagates() {
        let dir = TempDir::new().unwrap();
        let (remote, _) = scripted(Err(()));
        let source = CachedCandleSource::new(CsvCandleCache::new(dir.path()), Some(remote));
        assert!(matches!(
            source.fetch(&request(0, 600)),
            Err(DataError::Network(_))
        ));
    }

    // ── SyntheticCandleSource ────────────────────────────────────────

    #[test]
    fn synthetic_is_deterministic_and_valid() {
        let source = SyntheticCandleSource::new(7);
        let req = request(30, 60 * 500);
        let a = source.fetch(&req).unwrap();
        let b = source.fetch(&req).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.first().unwrap().timestamp, 60);
        assert_eq!(a.last().unwrap().timestamp, 60 * 500);
        assert!(validate_candles(&a).is_ok());
    }

    #[test]
    fn synthetic_differs_by_instrument() {
        let source = SyntheticCandleSource::new(7);
        let a = source.fetch(&request(0, 6_000)).unwrap();
        let other = CandleRequest::new("SHIB", "ethereum", Interval::OneMinute, 0, 6_000);
        let b = source.fetch(&other).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn synthetic_rejects_huge_requests() {
        let source = SyntheticCandleSource::new(1);
        assert!(source.fetch(&request(0, 60 * 2_000_000)).is_err());
    }
}
