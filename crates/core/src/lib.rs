pub mod channel;
pub mod config;
pub mod payload;
pub mod types;
