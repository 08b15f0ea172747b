pub mod config;
pub mod credits;
pub mod serve;
