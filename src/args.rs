use clap::Parser;

/// Command-line options for the emissions forecasting server.
#[derive(Parser, Debug)]
#[command(name = "emicast", about = "Emissions forecasting API server")]
pub struct Args {
    /// Path to the YAML configuration file
    #[clap(short, long, default_value = "config.yml")]
    pub config: String,
    /// Override the port from the configuration file
    #[clap(short, long)]
    pub port: Option<u16>,
    /// Directory for log files
    #[clap(long, default_value = "logs")]
    pub log_dir: String,
}
