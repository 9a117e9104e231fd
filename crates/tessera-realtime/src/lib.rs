//! Per-user realtime push for the messaging core.

pub mod hub;
pub mod update;

pub use hub::Hub;
pub use update::RealtimeUpdate;
