use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tmq")]
#[command(about = "Translation memory suggestions from local corpora and remote tmservers.")]
#[command(version)]
pub struct Cli {
    /// JSON file of translation units to match against
    #[arg(short = 'c', long)]
    pub corpus: Option<PathBuf>,

    /// Source language code
    #[arg(short = 's', long)]
    pub source: Option<String>,

    /// Target language code
    #[arg(short = 't', long)]
    pub target: Option<String>,

    /// Remote tmserver as HOST:PORT
    #[arg(short = 'r', long)]
    pub remote: Option<String>,

    /// Don't match against the local corpus
    #[arg(long)]
    pub no_local: bool,

    /// Output as JSON lines
    #[arg(long)]
    pub json: bool,

    /// Choose color theme
    #[arg(short = 'T', long)]
    pub theme: Option<String>,

    /// Generate config sample
    #[arg(long)]
    pub generate_config: bool,

    /// Show status
    #[arg(long)]
    pub status: bool,

    /// Query text; read one query per line from stdin when omitted
    #[arg(num_args = 1..)]
    pub query: Vec<String>,
}

/// Split `HOST:PORT`.
pub fn parse_endpoint(value: &str) -> Option<(String, u16)> {
    let (host, port) = value.rsplit_once(':')?;
    if host.is_empty() {
        return None;
    }
    Some((host.to_string(), port.parse().ok()?))
}
