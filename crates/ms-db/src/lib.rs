//! ms-db: persistence layer for mediascan.
//!
//! This crate provides SQLite-backed storage with connection pooling,
//! introspective schema migration, the generic [`RecordStore`], and the
//! three components built on it: [`TimestampStore`], [`MetadataCache`] and
//! [`EvictionEngine`].

pub mod eviction;
pub mod metadata;
pub mod migrations;
pub mod models;
pub mod namespace;
pub mod pool;
pub mod queries;
pub mod store;
pub mod timestamps;

pub use eviction::{EvictionEngine, EvictionMode, EvictionOutcome};
pub use metadata::MetadataCache;
pub use models::{NewRecord, Record, RecordKey};
pub use namespace::Namespace;
pub use store::RecordStore;
pub use timestamps::{TimestampEntry, TimestampStore};
