//! # Runtime Constants
//!
//! Monitor event names and default tuning values shared by the interpreter,
//! configuration and monitor.

/// Lifecycle events broadcast by [`crate::monitor::SagaMonitor`]
pub mod events {
    // Task lifecycle events
    pub const TASK_STARTED: &str = "task.started";
    pub const TASK_DONE: &str = "task.done";
    pub const TASK_ERRORED: &str = "task.errored";
    pub const TASK_CANCELLED: &str = "task.cancelled";
    pub const TASK_RECLAIMED: &str = "task.reclaimed";

    // Effect lifecycle events
    pub const EFFECT_TRIGGERED: &str = "effect.triggered";
    pub const EFFECT_RESOLVED: &str = "effect.resolved";
    pub const EFFECT_REJECTED: &str = "effect.rejected";
    pub const EFFECT_CANCELLED: &str = "effect.cancelled";

    // Bus and root events
    pub const ACTION_DISPATCHED: &str = "action.dispatched";
    pub const ROOT_UNCAUGHT_ERROR: &str = "root.uncaught_error";
}

/// Default tuning values
pub mod defaults {
    /// Advances allowed in one `run_until_idle` before it gives up
    pub const MAX_STEPS_PER_RUN: usize = 100_000;
    /// Buffered monitor events per subscriber
    pub const MONITOR_CAPACITY: usize = 1024;
    /// Reclaimed tasks whose outcome stays queryable
    pub const TOMBSTONE_CAPACITY: usize = 1024;
    pub const ENVIRONMENT: &str = "development";
    /// Prefix for environment variable overrides, e.g. `SAGA_MAX_STEPS_PER_RUN`
    pub const ENV_PREFIX: &str = "SAGA";
    /// Base name of the optional config file (`saga.toml`, `saga.yaml`, ...)
    pub const CONFIG_FILE_STEM: &str = "saga";
}
