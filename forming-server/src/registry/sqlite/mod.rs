mod record;

pub use record::{SqliteRecordError, SqliteRecordRegistry};
