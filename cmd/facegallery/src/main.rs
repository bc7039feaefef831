//! facegallery - inspect and edit face galleries.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;
mod output;

/// facegallery - inspect and edit face galleries.
///
/// A gallery holds one embedding vector per identity for a single embedding
/// model. Galleries live in `<data-dir>/gallery_<model>.json`; the metric
/// and threshold for each model come from the config file.
///
/// Configuration defaults to ~/.facekit/facegallery/config.yaml when present.
#[derive(Parser)]
#[command(name = "facegallery")]
#[command(about = "Face gallery maintenance tool")]
#[command(version)]
pub struct Cli {
    /// Config file (YAML or JSON)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding gallery files (default is ~/.facekit/facegallery/data)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Embedding model whose gallery to use
    #[arg(short = 'm', long, global = true, default_value = "default")]
    pub model: String,

    /// Embedding length; required unless the config sets it
    #[arg(long, global = true)]
    pub dim: Option<usize>,

    /// Distance metric, overriding the config (euclidean, euclidean-norm, cosine)
    #[arg(long, global = true)]
    pub metric: Option<facekit_gallery::Metric>,

    /// Match threshold, overriding the config
    #[arg(long, global = true)]
    pub threshold: Option<f64>,

    /// Output as JSON (for piping)
    #[arg(long, global = true)]
    pub json: bool,

    /// Verbose output
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show gallery settings and size
    Info,
    /// List enrolled names
    List,
    /// Show one identity
    Show { name: String },
    /// Enroll a vector, merging into an existing identity
    Add {
        name: String,
        /// Comma-separated floats
        #[arg(allow_hyphen_values = true)]
        vector: String,
    },
    /// Enroll a vector, replacing an existing identity
    ForceAdd {
        name: String,
        /// Comma-separated floats
        #[arg(allow_hyphen_values = true)]
        vector: String,
    },
    /// Remove an identity
    Remove { name: String },
    /// Identify a vector
    Query {
        /// Comma-separated floats
        #[arg(allow_hyphen_values = true)]
        vector: String,
    },
    /// Replace the gallery with the contents of a gallery file
    Import { file: PathBuf },
    /// Write the gallery file to FILE, or stdout with `-`
    Export {
        #[arg(default_value = "-")]
        file: PathBuf,
    },
    /// Delete every identity and the gallery file
    Clear,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    } else {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    commands::run(&cli)
}
