pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;

pub use gentask_core as core;
pub use gentask_core::model;

pub use gentask_core::AppConfig;
