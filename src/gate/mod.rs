//! Rate limiting gate logic and request descriptors.

mod key;
mod limiter;
mod request;

pub use key::CounterKey;
pub use limiter::{Decision, RateGate, RateGateBuilder};
pub use request::{ClientRequest, GateResponse, UNKNOWN_ADDRESS};
