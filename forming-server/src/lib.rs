pub mod aggregate;
pub mod api;
pub mod config;
pub mod ingest;
pub mod mqtt;
pub mod query;
pub mod registry;
pub mod reporting;

use aggregate::Aggregator;
use query::QueryService;

// AppState must be defined in lib.rs to be visible to all modules
#[derive(Clone)]
pub struct AppState<R> {
    pub query: QueryService<R>,
    pub aggregator: Aggregator<R>,
}
