//! Record persistence via sqlx
//!
//! This module upserts normalized records into Postgres, one transaction per
//! batch, and owns the bootstrap schema for the record and checkpoint tables.

mod memory;
mod postgres;
mod schema;
mod writer;

pub use memory::MemoryWriter;
pub use postgres::{connect, PostgresWriter};
pub use schema::ensure_schema;
pub use writer::{CommitResult, RecordWriter};
