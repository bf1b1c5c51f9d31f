use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lineup_imaging::NormalizeOptions;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "lineup", about = "Lineup face-recognition service CLI")]
struct Cli {
    /// Base URL of the lineupd service.
    #[arg(long, default_value = "http://127.0.0.1:8187")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a face descriptor from an image file
    Enroll {
        /// Owner id the descriptor belongs to
        #[arg(short, long)]
        owner: String,
        /// Path to the face image
        image: PathBuf,
        /// Deactivate the owner's previous descriptors first
        #[arg(long)]
        replace: bool,
    },
    /// Verify a face against the enrolled roster
    Verify {
        image: PathBuf,
        /// Override the sign-in threshold
        #[arg(long)]
        threshold: Option<f32>,
    },
    /// Rank watchlist candidates for a face
    Identify {
        image: PathBuf,
        /// Override the watchlist threshold
        #[arg(long)]
        threshold: Option<f32>,
        /// Maximum candidates to return
        #[arg(long)]
        limit: Option<usize>,
    },
    /// List active descriptors
    List,
    /// Deactivate an owner's descriptors
    Deactivate {
        /// Owner id to deactivate
        owner: String,
    },
    /// Show service status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Enroll {
            owner,
            image,
            replace,
        } => {
            let body = json!({
                "owner_id": owner,
                "image": image_payload(&image)?,
                "replace": replace,
                "source_ref": image.display().to_string(),
            });
            let response = post(&client, &cli.url, "/v1/enroll", &body).await?;
            println!(
                "enrolled descriptor {} for {} ({} previous deactivated)",
                field_str(&response, "descriptor_id"),
                field_str(&response, "owner_id"),
                response["deactivated"].as_u64().unwrap_or(0),
            );
        }
        Commands::Verify { image, threshold } => {
            let body = json!({ "image": image_payload(&image)?, "threshold": threshold });
            let response = post(&client, &cli.url, "/v1/verify", &body).await?;
            if response["accepted"].as_bool().unwrap_or(false) {
                println!(
                    "accepted: {} (similarity {:.3})",
                    field_str(&response, "matched_owner"),
                    response["similarity"].as_f64().unwrap_or(0.0),
                );
            } else {
                println!("rejected: {}", field_str(&response, "message"));
            }
        }
        Commands::Identify {
            image,
            threshold,
            limit,
        } => {
            let body = json!({
                "image": image_payload(&image)?,
                "threshold": threshold,
                "limit": limit,
            });
            let response = post(&client, &cli.url, "/v1/identify", &body).await?;
            let candidates = response["candidates"].as_array().cloned().unwrap_or_default();
            if candidates.is_empty() {
                println!("no candidates above threshold");
            } else {
                for candidate in candidates {
                    println!(
                        "{}. {} (similarity {:.3})",
                        candidate["rank"].as_u64().unwrap_or(0),
                        field_str(&candidate, "owner_id"),
                        candidate["similarity"].as_f64().unwrap_or(0.0),
                    );
                }
            }
        }
        Commands::List => {
            let response = get(&client, &cli.url, "/v1/descriptors").await?;
            let rows = response.as_array().cloned().unwrap_or_default();
            if rows.is_empty() {
                println!("no active descriptors");
            }
            for row in rows {
                println!(
                    "{}  {}  {}",
                    field_str(&row, "id"),
                    field_str(&row, "owner_id"),
                    field_str(&row, "captured_at"),
                );
            }
        }
        Commands::Deactivate { owner } => {
            let body = json!({ "owner_id": owner });
            let response = post(&client, &cli.url, "/v1/deactivate", &body).await?;
            println!(
                "deactivated {} descriptor(s)",
                response["deactivated"].as_u64().unwrap_or(0)
            );
        }
        Commands::Status => {
            let response = get(&client, &cli.url, "/v1/status").await?;
            println!(
                "lineupd {} — {} active descriptor(s)",
                field_str(&response, "version"),
                response["active_descriptors"].as_u64().unwrap_or(0),
            );
        }
    }

    Ok(())
}

/// Read, normalize and base64-encode an image file, exactly as the web
/// clients compress captures before upload.
fn image_payload(path: &Path) -> Result<String> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let normalized = lineup_imaging::normalize(&bytes, NormalizeOptions::default())
        .with_context(|| format!("normalizing {}", path.display()))?;
    Ok(normalized.to_base64())
}

fn field_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value[key].as_str().unwrap_or("?")
}

async fn post(client: &reqwest::Client, base: &str, path: &str, body: &Value) -> Result<Value> {
    let response = client
        .post(format!("{base}{path}"))
        .json(body)
        .send()
        .await
        .with_context(|| format!("POST {path}"))?;
    into_value(path, response).await
}

async fn get(client: &reqwest::Client, base: &str, path: &str) -> Result<Value> {
    let response = client
        .get(format!("{base}{path}"))
        .send()
        .await
        .with_context(|| format!("GET {path}"))?;
    into_value(path, response).await
}

async fn into_value(path: &str, response: reqwest::Response) -> Result<Value> {
    let status = response.status();
    let value: Value = response.json().await.unwrap_or_else(|_| json!({}));
    if !status.is_success() {
        bail!(
            "{path} failed ({}): {}",
            status.as_u16(),
            value["error"].as_str().unwrap_or("request failed"),
        );
    }
    Ok(value)
}
