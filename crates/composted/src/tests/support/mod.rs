//! Test harness utilities shared by the behavioural suites.

mod client;
mod config_loader;
mod process_world;
mod reporter;
mod session_world;
mod world;

pub use client::{Subscriber, round_trip, send_command};
pub use config_loader::{FailingConfigLoader, OccupiedSocketLoader, TestConfigLoader};
pub use process_world::{ProcessTestWorld, process_world};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use session_world::{PROJECT_ID, SessionWorld, session_world};
pub use world::{TestWorld, world};

/// Result type returned by fallible steps.
pub type StepResult = Result<(), String>;
