//! Remote candle provider over a JSON HTTP API.
//!
//! `GET {base_url}/candles?instrument=..&chain=..&interval=..&from=..&to=..`
//! returning `{"candles": [{"t":..,"o":..,"h":..,"l":..,"c":..,"v":..}]}`.
//!
//! Calls are spaced at least `min_spacing` apart across all threads sharing
//! the source. Transient failures are retried with linear backoff; repeated
//! failures trip the circuit breaker.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::{debug, warn};

use exitlab_core::data::{CandleRequest, CandleSource, DataError};
use exitlab_core::domain::Candle;

use crate::circuit_breaker::CircuitBreaker;

#[derive(Debug, Deserialize)]
struct CandleResponse {
    #[serde(default)]
    candles: Option<Vec<WireCandle>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireCandle {
    #[serde(alias = "timestamp", alias = "unixTime")]
    t: i64,
    #[serde(alias = "open")]
    o: f64,
    #[serde(alias = "high")]
    h: f64,
    #[serde(alias = "low")]
    l: f64,
    #[serde(alias = "close")]
    c: f64,
    #[serde(default, alias = "volume")]
    v: f64,
}

impl From<WireCandle> for Candle {
    fn from(w: WireCandle) -> Self {
        Candle::new(w.t, w.o, w.h, w.l, w.c, w.v)
    }
}

/// Connection and politeness settings for [`HttpCandleSource`].
#[derive(Debug, Clone)]
pub struct HttpOptions {
    pub base_url: String,
    pub api_key: Option<String>,
    pub min_spacing: Duration,
    pub max_retries: u32,
    pub backoff: Duration,
    pub timeout: Duration,
}

impl HttpOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            min_spacing: Duration::from_millis(250),
            max_retries: 3,
            backoff: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct HttpCandleSource {
    client: reqwest::blocking::Client,
    options: HttpOptions,
    circuit_breaker: Arc<CircuitBreaker>,
    last_call: Mutex<Option<Instant>>,
}

impl HttpCandleSource {
    pub fn new(
        options: HttpOptions,
        circuit_breaker: Arc<CircuitBreaker>,
    ) -> Result<Self, DataError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(options.timeout)
            .user_agent(concat!("exitlab/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DataError::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            options,
            circuit_breaker,
            last_call: Mutex::new(None),
        })
    }

    pub fn candles_url(&self, request: &CandleRequest) -> String {
        format!(
            "{}/candles?instrument={}&chain={}&interval={}&from={}&to={}",
            self.options.base_url.trim_end_matches('/'),
            request.instrument_id,
            request.chain,
            request.interval,
            request.from,
            request.to
        )
    }

    /// Block until `min_spacing` has passed since the previous call.
    fn throttle(&self) {
        let mut last = self
            .last_call
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = *last {
            let wait = self.options.min_spacing.saturating_sub(previous.elapsed());
            if !wait.is_zero() {
                std::thread::sleep(wait);
            }
        }
        *last = Some(Instant::now());
    }

    fn fetch_with_retry(&self, request: &CandleRequest) -> Result<Vec<Candle>, DataError> {
        let url = self.candles_url(request);
        let mut last_error = None;

        for attempt in 0..=self.options.max_retries {
            if attempt > 0 {
                std::thread::sleep(self.options.backoff * attempt);
            }
            if !self.circuit_breaker.is_allowed() {
                return Err(DataError::CircuitBreakerTripped);
            }
            self.throttle();
            debug!(
                instrument = %request.instrument_id,
                chain = %request.chain,
                attempt,
                "requesting candles"
            );

            let mut builder = self.client.get(&url);
            if let Some(key) = &self.options.api_key {
                builder = builder.header("X-API-KEY", key);
            }

            let resp = match builder.send() {
                Ok(resp) => resp,
                Err(e) => {
                    self.circuit_breaker.record_failure();
                    let err = DataError::Network(e.to_string());
                    warn!(
                        instrument = %request.instrument_id,
                        attempt,
                        reason = %err,
                        "candle request failed"
                    );
                    if e.is_connect() || e.is_timeout() {
                        last_error = Some(err);
                        continue;
                    }
                    return Err(err);
                }
            };

            let status = resp.status();
            if status == reqwest::StatusCode::FORBIDDEN {
                self.circuit_breaker.trip();
                warn!(instrument = %request.instrument_id, "provider refused access, circuit opened");
                return Err(DataError::CircuitBreakerTripped);
            }
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(DataError::InstrumentNotFound {
                    instrument: request.instrument_id.clone(),
                });
            }
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                self.circuit_breaker.record_failure();
                let retry_after = resp
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(60);
                warn!(instrument = %request.instrument_id, attempt, retry_after, "rate limited");
                last_error = Some(DataError::RateLimited {
                    retry_after_secs: retry_after,
                });
                continue;
            }
            if status.is_server_error() {
                self.circuit_breaker.record_failure();
                last_error = Some(DataError::Network(format!(
                    "HTTP {status} for {}",
                    request.label()
                )));
                continue;
            }
            if !status.is_success() {
                return Err(DataError::Other(format!(
                    "HTTP {status} for {}",
                    request.label()
                )));
            }

            let body: CandleResponse = resp.json().map_err(|e| {
                DataError::ResponseFormat(format!("{}: {e}", request.label()))
            })?;
            let candles = parse_response(request, body)?;
            self.circuit_breaker.record_success();
            debug!(
                instrument = %request.instrument_id,
                count = candles.len(),
                "candles received"
            );
            return Ok(candles);
        }

        Err(last_error.unwrap_or_else(|| DataError::Other("max retries exceeded".into())))
    }
}

fn parse_response(request: &CandleRequest, body: CandleResponse) -> Result<Vec<Candle>, DataError> {
    match (body.candles, body.error) {
        (Some(candles), _) => Ok(candles.into_iter().map(Candle::from).collect()),
        (None, Some(message)) if message.to_ascii_lowercase().contains("not found") => {
            Err(DataError::InstrumentNotFound {
                instrument: request.instrument_id.clone(),
            })
        }
        (None, Some(message)) => Err(DataError::ResponseFormat(message)),
        (None, None) => Err(DataError::ResponseFormat(
            "response has neither candles nor error".into(),
        )),
    }
}

impl CandleSource for HttpCandleSource {
    fn name(&self) -> &str {
        "http"
    }

    fn fetch(&self, request: &CandleRequest) -> Result<Vec<Candle>, DataError> {
        request.validate()?;
        self.fetch_with_retry(request)
    }

    fn is_available(&self) -> bool {
        self.circuit_breaker.is_allowed()
    }
}
