pub mod cli;
pub mod config;
pub mod conflicts;
pub mod counters;
pub mod error;
pub mod filters;
pub mod logging;
pub mod plugin;
pub mod session;
pub mod snapshot;
pub mod sync;
pub mod ui;
