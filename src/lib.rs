pub use gentask_cli::cli;
pub use gentask_cli::commands;
pub use gentask_cli::config;
pub use gentask_cli::logging;
pub use gentask_cli::AppConfig;

pub use gentask_core as core;
pub use gentask_core::database as db;
pub use gentask_core::model;
pub use gentask_core::parser;
pub use gentask_core::services::TaskStore;
