#![cfg_attr(test, recursion_limit = "256")]

mod auth;
mod cache;
mod client;
mod decode;
mod diff;
mod entity;
mod error;
mod logger;
mod protocol;
mod transport;
mod types;

pub use client::{ConfirmPolicy, DaikinOne, DaikinOneBuilder};
pub use entity::{ThermostatEntity, WriteOutcome};
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use protocol::DEFAULT_BASE_URL;
pub use types::*;
