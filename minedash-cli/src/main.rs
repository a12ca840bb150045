//! minedash-cli — publish sensor readings to the MineDash analysis handler
//!
//! Builds the same envelope Pub/Sub would push and POSTs it to the handler, so a
//! deployment can be exercised without publishing to a topic.
//!
//! # Subcommands
//! - `send --sensor-id S1 --value 65 [--type temp] [--timestamp ..] [--direct]`
//! - `envelope ...same flags...` — print the envelope JSON without sending

use clap::{Args, Parser, Subcommand};
use minedash_core::envelope::{encode_direct_envelope, encode_push_envelope};
use serde::Serialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8080";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "minedash-cli",
    version,
    about = "Send mining sensor readings to the MineDash analysis handler"
)]
struct Cli {
    /// Handler base URL (overrides MINEDASH_HTTP_URL env var)
    #[arg(long, env = "MINEDASH_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// POST a reading to the handler and print the verdict
    Send(ReadingArgs),

    /// Print the envelope that `send` would POST
    Envelope(ReadingArgs),
}

#[derive(Debug, Args)]
struct ReadingArgs {
    #[arg(long)]
    sensor_id: String,

    /// Sensor type
    #[arg(long = "type", default_value = "temp")]
    sensor_type: String,

    /// Reading value (°C for temperature sensors)
    #[arg(long)]
    value: f64,

    /// RFC 3339 timestamp; omitted from the payload when not given
    #[arg(long)]
    timestamp: Option<String>,

    /// Use the direct `{"data": ...}` form instead of a base64 push message
    #[arg(long)]
    direct: bool,
}

// ============================================================================
// Payload
// ============================================================================

#[derive(Debug, Serialize)]
struct ReadingPayload<'a> {
    sensor_id: &'a str,
    #[serde(rename = "type")]
    sensor_type: &'a str,
    value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<&'a str>,
}

fn build_envelope(args: &ReadingArgs) -> anyhow::Result<serde_json::Value> {
    let payload = ReadingPayload {
        sensor_id: &args.sensor_id,
        sensor_type: &args.sensor_type,
        value: args.value,
        timestamp: args.timestamp.as_deref(),
    };
    let data = serde_json::to_string(&payload)?;

    Ok(if args.direct {
        encode_direct_envelope(&data)
    } else {
        encode_push_envelope(&data)
    })
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn do_send(server: &str, args: &ReadingArgs) -> anyhow::Result<()> {
    let envelope = build_envelope(args)?;

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(120))
        .build()?;

    let url = format!("{}/", server.trim_end_matches('/'));
    let resp = match client.post(&url).json(&envelope).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("minedash-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let status = resp.status();
    let body = resp.text().unwrap_or_default();
    if !status.is_success() {
        eprintln!("minedash-cli: handler returned {}: {}", status, body);
        std::process::exit(1);
    }

    println!("{}", body);
    Ok(())
}

fn do_envelope(args: &ReadingArgs) -> anyhow::Result<()> {
    let envelope = build_envelope(args)?;
    println!("{}", serde_json::to_string_pretty(&envelope)?);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Send(args) => do_send(&cli.server, args),
        Commands::Envelope(args) => do_envelope(args),
    }
}

// ============================================================================
// Tests
// ============================================================================
