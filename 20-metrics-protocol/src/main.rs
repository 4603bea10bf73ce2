use std::collections::BTreeMap;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{info, warn};

use metrics_protocol::{
    cli::{Cli, Command, GetArgs, PutArgs},
    client::MetricsClient,
    protocol::format_value,
    server::Server,
};

#[derive(Serialize)]
struct JsonSample {
    timestamp: i64,
    value: f64,
}

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            let listener = TcpListener::bind(args.listen)
                .await
                .with_context(|| format!("failed to bind {}", args.listen))?;
            let server = Server::with_config(listener, args.server_config());
            let addr = server.local_addr()?;
            info!("metrics server listening on {}", addr);
            if let Err(err) = server.run_until_ctrl_c().await {
                warn!("metrics server exited with error: {err:?}");
                return Err(err);
            }
        }
        Command::Put(args) => tokio::task::spawn_blocking(move || put(args)).await??,
        Command::Get(args) => tokio::task::spawn_blocking(move || get(args)).await??,
    }

    Ok(())
}

fn put(args: PutArgs) -> Result<()> {
    MetricsClient::scoped(&args.connect.client_config(), |client| {
        client.put(&args.metric, args.value, args.timestamp)
    })?;
    println!("ok");
    Ok(())
}

fn get(args: GetArgs) -> Result<()> {
    let samples = MetricsClient::scoped(&args.connect.client_config(), |client| {
        client.get(&args.metric)
    })?;

    if args.json {
        let json: BTreeMap<&str, Vec<JsonSample>> = samples
            .iter()
            .map(|(name, series)| {
                let series = series
                    .iter()
                    .map(|&(timestamp, value)| JsonSample { timestamp, value })
                    .collect();
                (name.as_str(), series)
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    for (name, series) in &samples {
        for (timestamp, value) in series {
            println!("{name} {} {timestamp}", format_value(*value));
        }
    }
    Ok(())
}
