//! # tweet-pulse
//!
//! A running sentiment aggregate for tweets matching an operator-chosen topic.
//!
//! Two independent workers move items through a transactional durable store:
//! the fetch worker turns the pending topic into queued tweet texts, and the
//! score worker turns queued texts into entries of a score map. Topic changes
//! and aggregate reads run concurrently with both, isolated by store
//! transactions. The store is Postgres (pgmq + a table) or an in-memory
//! snapshot store with an optional journal.

pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod model;
pub mod search;
pub mod sentiment;
pub mod store;
pub mod telemetry;
