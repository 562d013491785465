//! feedflow: a durable, SQLite-backed job queue and worker pool for
//! asynchronous feed ingestion.
//!
//! Producers persist payload batches with [`jobs::JobsRepo::enqueue`];
//! workers ([`jobs::Worker`]) claim jobs exclusively through an atomic
//! read-modify-write against the shared store, validate and upsert the
//! payload into the product catalog, and record success, whole-batch
//! validation failure, or a backoff-scheduled retry. The store is the only
//! synchronization point between workers; the in-memory
//! [`jobs::Metrics`] counters are the only shared process state.

pub mod catalog;
pub mod config;
pub mod db;
pub mod feed;
pub mod jobs;
