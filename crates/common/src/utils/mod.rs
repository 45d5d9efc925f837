pub mod config;
pub mod error_handler;
pub mod logging;
