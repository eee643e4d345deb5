use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "zipstream")]
#[command(version)]
#[command(about = "Serve directories as zip archives streamed while they are built", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipstream -l                       serve ./test_photos on port 8080 with logging\n  \
  zipstream -f /srv/photos -d 0.5    serve /srv/photos, pausing 0.5s before every chunk")]
pub struct Cli {
    /// Enable logging
    #[arg(short = 'l', long = "logging")]
    pub logging: bool,

    /// Delay in seconds before sending each archive chunk
    #[arg(short = 'd', long = "delay", value_name = "SECONDS")]
    pub delay: Option<f64>,

    /// Path to the photo directory
    #[arg(short = 'f', long = "folder", value_name = "PATH", default_value = "test_photos")]
    pub folder: PathBuf,

    /// Address to listen on
    #[arg(long = "host", value_name = "ADDR", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(short = 'p', long = "port", default_value_t = 8080)]
    pub port: u16,

    /// Static page served at `/`
    #[arg(long = "index", value_name = "PATH", default_value = "index.html")]
    pub index: PathBuf,

    /// Maximum bytes forwarded per chunk
    #[arg(long = "chunk-size", value_name = "BYTES", default_value_t = crate::config::DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Archiving program to run
    #[arg(long = "zip-program", value_name = "PATH", default_value = "zip")]
    pub zip_program: PathBuf,
}
