// Scheduled transition records and their lifecycle predicates.

pub mod model;
pub mod options;

pub use model::{
    EntityRef, NewTransition, ProcessedState, RevisionId, ScheduledTransition, TransitionId,
    UserId, LOCK_DURATION,
};
pub use options::{TransitionOptions, OPTION_LATEST_REVISION, OPTION_RECREATE_NON_DEFAULT_HEAD};
