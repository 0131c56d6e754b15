//! Candle supply port.

pub mod source;

pub use source::{CandleRequest, CandleSource, DataError, Interval};
