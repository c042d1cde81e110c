//! Persistence layer: libSQL-backed storage for students and goal history.

mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::RecordStore;
