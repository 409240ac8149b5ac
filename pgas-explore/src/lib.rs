#![forbid(unsafe_code)]

mod error;
mod explorer;
pub mod scenario;

pub use error::ScenarioError;
pub use explorer::{violation_sites, ExplorationReport, Explorer, Finding, PathReport};
pub use scenario::{Program, Scenario};
