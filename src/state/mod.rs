pub mod sqlite;

pub use sqlite::SqliteStateStore;
