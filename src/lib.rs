#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod checkpoint;
pub mod clock;
pub mod config;
#[doc(hidden)]
pub mod diagnostics;
pub mod error;
pub mod gate;
pub mod housekeeping;
pub mod persist;
pub mod stores;
pub mod tasks;

pub use checkpoint::{AutoSaveMetrics, CheckpointIdentity, CheckpointLayout, CheckpointManager};
pub use config::Config;
pub use error::{CofferError, Result};
pub use gate::OperationsGate;
pub use housekeeping::HousekeepingManager;
