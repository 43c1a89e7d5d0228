pub mod auth;
pub mod config;
pub mod sync;
pub mod timer;

pub type CliResult = Result<(), Box<dyn std::error::Error>>;
