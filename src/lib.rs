// Library surface shared by the monitor and sentinel binaries.
pub mod classifier;
pub mod config;
pub mod cycle;
pub mod data_model;
pub mod detectors;
pub mod error;
pub mod escalation;
pub mod executor;
pub mod pipeline;
pub mod publisher;
pub mod server;
pub mod storage;
pub mod telemetry;
pub mod utils;

pub use error::{MonitError, Result};
