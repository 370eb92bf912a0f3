// Scheduled Transitions - deferred workflow state changes for revisioned content
// Locks, queues, executes and retires time-triggered moderation transitions.

pub mod access;
pub mod clock;
pub mod config;
pub mod content;
pub mod daemon;
#[cfg(feature = "database")]
pub mod database;
pub mod error;
pub mod jobs;
pub mod observability;
pub mod queue;
pub mod runner;
pub mod shutdown;
pub mod store;
pub mod telemetry;
pub mod transition;
pub mod worker;

// Re-export key types for easy access
pub use access::{check_access, AccessResult, TransitionOperation};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigProvider, SchedulerConfig};
pub use content::{
    ContentRegistry, ContentStore, MemoryContentStore, ModerationInformation, Revision,
    RevisionDraft, Workflow, WorkflowRegistry, WorkflowState,
};
pub use daemon::{SchedulerDaemon, TickSummary};
#[cfg(feature = "database")]
pub use database::{init_database, DatabaseManager, SqliteJobQueue, SqliteTransitionStore};
pub use error::{MissingEntityReason, StorageError, TransitionError};
pub use jobs::{CronHook, CronSummary, JobCreatorSummary, ScheduledTransitionsJobs, TransitionJobs};
pub use observability::{OperationTimer, SchedulerMetrics, SchedulerStats};
pub use queue::{JobPayload, JobQueue, MemoryJobQueue, QueueItem};
pub use runner::{
    DefaultRevisionResolver, RevisionResolver, TokenReplacements, TransitionOutcome,
    TransitionRunner,
};
pub use shutdown::{ShutdownCoordinator, ShutdownSignal};
pub use store::{MemoryTransitionStore, TransitionStore};
pub use telemetry::{create_transition_span, generate_correlation_id, init_telemetry};
pub use transition::{
    EntityRef, NewTransition, RevisionId, ScheduledTransition, TransitionId, TransitionOptions,
    UserId, LOCK_DURATION,
};
pub use worker::{DrainSummary, JobOutcome, QueueRunner, ScheduledTransitionJob};
