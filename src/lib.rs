// Library exports for integration tests and the daemon binary

pub mod album;
pub mod assembler;
pub mod config;
pub mod convert;
pub mod cue;
pub mod ledger;
pub mod metadata;
pub mod processor;
pub mod scheduler;
pub mod stability;
pub mod textio;
pub mod watcher;
