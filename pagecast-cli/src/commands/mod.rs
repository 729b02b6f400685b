//! CLI command implementations

mod check;
mod config;
mod run;

pub use check::{check, CheckArgs};
pub use config::{config, ConfigArgs};
pub use run::{run, RunArgs};
