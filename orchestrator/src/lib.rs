pub mod config;
pub mod dispatch;
pub mod record;
pub mod service;
pub mod state;
pub mod stats;
pub mod store;

pub use config::OrchestratorConfig;
pub use dispatch::{DispatchError, DispatchResult, Dispatcher, TestEvent};
pub use record::{
    IssueDraft, IssueRecord, IssueStatus, ManualSubmission, ManualTestRecord, ProjectRecord,
    ProjectStatus, TestRecord, TestStatus, TestSubmission,
};
pub use service::{ServiceError, ServiceResult, TestService};
pub use state::{Transition, TransitionError};
pub use stats::{summarize, ProjectSummary, ProjectWithStats};
pub use store::{InMemoryStore, ProjectSnapshot, StoreError, StoreResult, TestStore};
