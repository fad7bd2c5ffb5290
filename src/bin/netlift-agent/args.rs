use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(about, long_about = None, version)]
pub(crate) struct Args {
    /// YAML config file. Built-in defaults are used when omitted.
    #[arg(short, long, env = "NETLIFT_CONFIG")]
    pub(crate) config: Option<PathBuf>,
    /// Overrides the unit this agent serves.
    #[arg(short, long, env = "NETLIFT_UNIT_ID")]
    pub(crate) unit_id: Option<i64>,
    /// Overrides the job queue base URL.
    #[arg(short, long, env = "NETLIFT_QUEUE_URL")]
    pub(crate) queue_url: Option<String>,
    /// Overrides the media ingest URL.
    #[arg(short, long, env = "NETLIFT_MEDIA_INGEST_URL")]
    pub(crate) media_ingest_url: Option<String>,
    /// Uses the simulated motor and sensor instead of GPIO and the ADC.
    #[arg(short, long, default_value_t)]
    pub(crate) simulate: bool,
    /// Enables human-friendly logging.
    #[arg(short, long, default_value_t)]
    pub(crate) debug: bool,
}
