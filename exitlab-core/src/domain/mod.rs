//! Domain types for exitlab

pub mod candle;
pub mod event;
pub mod ids;
pub mod position;
pub mod ratchet;

pub use candle::{validate_candles, Candle, CandleError};
pub use event::{EventKind, SimulationEvent};
pub use ids::ConfigId;
pub use position::{Position, FRACTION_EPSILON};
pub use ratchet::RatchetState;
