// fee-seeder
// Connects to the tuition-fee SQL Server database with a driver fallback
// chain, seeds reference and demo rows idempotently, inspects the schema and
// edits single rows

pub mod commands;
pub mod config;
pub mod db;
pub mod edit;
pub mod error;
pub mod seed;

pub use error::SeedError;
