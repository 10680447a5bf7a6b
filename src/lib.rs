pub mod config;
pub mod contract_vm;
pub mod error;

pub use crate::config::SimulationConfig;
pub use crate::error::{HarnessError, HarnessResult};
