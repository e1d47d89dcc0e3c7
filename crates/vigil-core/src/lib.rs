//! vigil-core — shared vocabulary for the Vigil monitoring engine.
//!
//! Holds the persisted domain records (operation statistics, security
//! events, alerts), the clock used to stamp and expire them, and the
//! `vigil.toml` configuration model.

pub mod clock;
pub mod config;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::VigilConfig;
pub use types::*;
