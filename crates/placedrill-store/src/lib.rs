//! placedrill-store: durable state behind the `StateStore` trait.
//!
//! `SqliteStore` is the production backend; `MemoryStore` backs tests
//! and the simulator. Both uphold the ticket coalescing invariant: at
//! most one pending ticket per (learner, rule, kind).

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
