mod record;

pub use record::InMemoryRecordRegistry;
