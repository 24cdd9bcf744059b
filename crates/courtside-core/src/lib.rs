// Shared foundation: configuration, relational schema, persistence, and the
// typed records passed between the stats engine and the load pipelines.

pub mod config;
pub mod db;
pub mod records;
pub mod schema;
