//! This crate implements the low level storage engine of the percom
//! persistence stack.
//!
//! # File format
//!
//! A database is a single regular file: a one-page header, a chain of
//! fixed-capacity hash tables and a region of fixed-size record slots.
//! Each slot stores one key together with *two* checksummed copies of
//! its value; the copies are written with a durability barrier between
//! them, so a crash can tear at most one copy and a record always reads
//! back as either its old or its new value. Slots freed by deletes chain
//! into a free list anchored in the header and are reused before the
//! file grows.
//!
//! The hash tables resolve collisions by linear probing. When a table
//! reaches its fill limit, insertion appends a fresh table at
//! end-of-file and links it to the chain; lookups walk the chain.
//!
//! # Multi-process coordination
//!
//! Several processes may open the same database file concurrently. They
//! coordinate through a small shared memory header (one per database
//! path, named after a stable hash of the path) containing the current
//! chain length and an attach count behind a process-shared mutex. Every
//! operation touching the chain takes that mutex; a closing handle holds
//! it across the whole flush, so other processes observe either the full
//! pre-close or the full post-close state, never a mix.
//!
//! # Caching
//!
//! Writes and deletes stay in a per-handle write-back cache and reach
//! the file only when the handle closes. Reads consult the cache first
//! and populate it on miss, so a handle always observes its own writes
//! immediately.

pub mod cache;
pub mod database;
pub mod file_format;
pub mod hash_index;
pub mod shared_header;
pub mod slot_file;

pub use cache::{CacheEntry, WriteCache};
pub use database::Database;
pub use hash_index::{key_hash, TableChain};
pub use shared_header::CoordHeader;
pub use slot_file::{SlotFile, SyncLevel};
