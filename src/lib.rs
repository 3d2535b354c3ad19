pub mod cli;
pub mod config;
pub mod error;
pub mod ingest;
pub mod plot;
pub mod reconcile;
pub mod scanner;
pub mod scratch;
pub mod transfer;
