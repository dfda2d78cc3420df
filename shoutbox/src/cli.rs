use std::fmt;
use std::path::PathBuf;

use clap::Parser;
use serde::Serialize;

/// Runtime configuration, read from flags or `SHOUT_*` environment variables.
#[derive(Parser, Debug, Clone, Serialize)]
#[command(author, version, about = "Minimal message board service", long_about = None)]
pub struct Config {
    /// Address/port to bind to.
    #[arg(long, env = "SHOUT_LISTENER", default_value = "0.0.0.0:8080")]
    pub listener: String,

    /// Base URL where the API is publicly reachable.
    #[arg(long, env = "SHOUT_API", default_value = "http://127.0.0.1:8080/api/")]
    pub api: String,

    /// Path to the database file.
    #[arg(long, env = "SHOUT_DB", default_value = "./shouts.db")]
    pub db: PathBuf,
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}
