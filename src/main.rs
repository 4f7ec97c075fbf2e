use clap::{Parser, Subcommand};
use std::path::PathBuf;

use audio_annotator::config::Config;
use audio_annotator::exporter::FfmpegExporter;
use audio_annotator::serve;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Upload audio, mark time regions in the browser, export each region as a clip"
)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the annotation web server
    Serve {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Command::Serve { config, port } => run_serve(config, port),
    }
}

fn run_serve(
    config_path: Option<PathBuf>,
    port_override: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match config_path {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    if let Some(port) = port_override {
        config.port = port;
    }

    config.ensure_directories()?;

    // Fail at startup rather than on the first export
    let exporter = FfmpegExporter::new(config.ffmpeg_path.clone());
    exporter.check()?;

    serve::serve(config, Box::new(exporter))
}
