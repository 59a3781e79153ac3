pub mod config;
pub mod error_log;
pub mod fetch;
pub mod harvest;
pub mod schedule;
