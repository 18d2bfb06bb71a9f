//! Request orchestration.
//!
//! ## Flow of `execute(key, producer, options)`
//!
//! 1. Fresh cache entry (memory, then the persistent store for persistent
//!    calls): return it. No throttling, no producer call.
//! 2. Request for `key` already in flight: await the same shared future.
//! 3. Otherwise start a flight: wait out the per-key minimum interval, run
//!    the producer under the rate-limit retry policy, cache the result, then
//!    drop the in-flight record (on failure too).
//!
//! Producer calls for one key are strictly serialized; different keys are
//! independent.

mod engine;
mod flight;
mod options;
mod retry;
mod stats;
mod throttle;


pub use engine::{Orchestrator, Outcome};
pub use options::ExecuteOptions;
pub use retry::{RetryPolicy, is_rate_limited};
pub use stats::OrchestratorStats;
pub use throttle::DispatchThrottle;
