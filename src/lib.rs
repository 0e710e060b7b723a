//! Feature flag evaluation service.
//!
//! - `evaluation` - pure decision function and percentage bucketing
//! - `engine` - store + cache backed evaluation, single and batch
//! - `store` - flag definitions and their Postgres / in-memory accessors
//! - `cache` - short-TTL cache of definitions
//! - `connection` - lazily shared and dedicated connections (Postgres, Redis)
//! - `queue` - cache invalidation fan-out over Redis pub/sub
//! - `routes` - HTTP surface

pub mod cache;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod queue;
pub mod routes;
pub mod state;
pub mod store;

pub use cache::{CachedFlag, FlagCache};
pub use config::Config;
pub use engine::FlagEngine;
pub use error::{ConfigError, ConnectionError, StoreError};
pub use evaluation::{evaluate_flag, EvaluationContext, EvaluationReason, FlagEvaluation};
pub use store::{FlagDefinition, FlagStore, MemoryFlagStore, PgFlagStore, RolloutPercentage};
