pub mod adapter;
pub mod config;
pub mod simulated;
pub mod types;

pub use adapter::TestRunner;
pub use config::SimulatedRunnerConfig;
pub use simulated::SimulatedRunner;
pub use types::{
    DiscoveredIssue, IssueSeverity, JsonMap, RunOutcome, RunRequest, TestType, UnknownTestType,
};

pub mod prelude {
    pub use crate::adapter::*;
    pub use crate::config::*;
    pub use crate::simulated::*;
    pub use crate::types::*;
}
