use std::{net::SocketAddr, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::{client::ClientConfig, framing::DEFAULT_MAX_REQUEST_BYTES, server::ServerConfig};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the metrics server.
    Serve(ServeArgs),
    /// Store one sample on a running server.
    Put(PutArgs),
    /// Fetch the samples of one metric, or of every metric with `*`.
    Get(GetArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Socket address to bind. Use port 0 for an ephemeral port.
    #[arg(long, default_value = "127.0.0.1:8888")]
    pub listen: SocketAddr,

    /// Largest request, in bytes, the server buffers before answering with an error.
    #[arg(long, default_value_t = DEFAULT_MAX_REQUEST_BYTES)]
    pub max_request_bytes: usize,
}

impl ServeArgs {
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig {
            max_request_bytes: self.max_request_bytes,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ConnectArgs {
    /// Address of the metrics server.
    #[arg(long, default_value = "127.0.0.1:8888")]
    pub server: String,

    /// Connect and per-read timeout in milliseconds.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout_ms: Option<u64>,
}

impl ConnectArgs {
    pub fn client_config(&self) -> ClientConfig {
        let config = ClientConfig::new(self.server.clone());
        match self.timeout_ms {
            Some(ms) => config.with_timeout(Duration::from_millis(ms)),
            None => config,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct PutArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,

    pub metric: String,

    #[arg(allow_negative_numbers = true)]
    pub value: f64,

    /// Unix timestamp in seconds; defaults to now.
    #[arg(allow_negative_numbers = true)]
    pub timestamp: Option<i64>,
}

#[derive(Args, Debug, Clone)]
pub struct GetArgs {
    #[command(flatten)]
    pub connect: ConnectArgs,

    pub metric: String,

    /// Print the result as a JSON object instead of protocol lines.
    #[arg(long)]
    pub json: bool,
}
