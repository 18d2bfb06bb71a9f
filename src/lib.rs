//! Flightdeck - key-addressed request orchestration.
//!
//! Sits between application call sites and remote calls. Every request is
//! addressed by a string key and goes through one engine that provides:
//!
//! - single-flight deduplication of concurrent identical requests
//! - tiered TTL caching, optionally persisted across restarts
//! - per-key request pacing
//! - exponential backoff on rate limiting
//! - exact and prefix cache invalidation
//!
//! ## Architecture
//!
//! - `config` - Tunables with defaults and environment loading
//! - `cache` - TTL tiers, cache entries and the bounded in-memory cache
//! - `store` - Persistent store trait with in-memory and JSON file adapters
//! - `orchestrator` - The engine: flights, throttling, retry, invalidation
//! - `keys` - Structured request key helpers
//! - `error` - Error types
//!
//! ## Usage
//!
//! ```rust
//! use flightdeck::{CacheTier, ExecuteOptions, Orchestrator, OrchestratorConfig};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> flightdeck::Result<()> {
//! let orchestrator = Orchestrator::new(OrchestratorConfig::default());
//!
//! let names: Vec<String> = orchestrator
//!     .execute(
//!         "companies:page=1",
//!         || async { Ok::<_, anyhow::Error>(vec!["Acme".to_string()]) },
//!         ExecuteOptions::with_tier(CacheTier::Medium),
//!     )
//!     .await?;
//! assert_eq!(names, ["Acme"]);
//!
//! orchestrator.invalidate_by_prefix("companies:").await;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod keys;
pub mod orchestrator;
pub mod store;

pub use cache::{CacheEntry, CacheTier, SerializedEntry};
pub use config::OrchestratorConfig;
pub use error::{OrchestratorError, Result, StatusError, StoreError};
pub use keys::{key_prefix, request_key};
pub use orchestrator::{ExecuteOptions, Orchestrator, OrchestratorStats, Outcome};
pub use store::{JsonFileStore, MemoryStore, PersistentStore};
