pub mod api;
pub mod config;
pub mod handlers;
pub mod parser;
pub mod payload;
pub mod prometheus;
pub mod records;
pub mod router;
pub mod server;
pub mod sinks;
pub mod time;
