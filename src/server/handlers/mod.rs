pub mod evaluate;
pub mod health;
pub mod ingest;
pub mod orders;
pub mod query;
