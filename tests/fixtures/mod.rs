/// Shared fixtures for scheduled transition integration tests
pub mod scheduler_harness;

#[allow(unused_imports)]
pub use scheduler_harness::{at, SchedulerHarness};
