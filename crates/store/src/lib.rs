//! Durable record stores.
//!
//! Five logical tables (orders, inventory, products, idempotency, sessions)
//! behind async traits whose correctness rests on a conditional-write
//! primitive rather than in-process locks: inserts precondition on absence,
//! updates precondition on the stored status or version. Two backends are
//! provided — an in-memory backend for tests and local runs, and a
//! PostgreSQL backend where the conditions become `WHERE` clauses and the
//! affected-row count discriminates the failure.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod records;
pub mod retry;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::MemoryBackend;
pub use postgres::PgBackend;
pub use records::{IdempotencyRecord, IdempotencyStatus, InventoryLevel, SessionRecord};
pub use retry::{Backoff, with_backoff};
pub use store::{IdempotencyStore, InventoryStore, OrderStore, ProductStore, SessionStore};
