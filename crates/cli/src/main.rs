//! QueueUp CLI - Command-line client for the QueueUp daemon

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9630";

#[derive(Parser)]
#[command(name = "queueup-cli")]
#[command(about = "QueueUp office-hours queue CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "QUEUEUP_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Join a professor's queue
    Join {
        /// Professor ID
        professor_id: String,

        /// Student name
        #[arg(short, long)]
        name: String,

        /// Contact email
        #[arg(short, long)]
        contact: String,
    },

    /// Leave a queue
    Leave {
        /// Entry ID returned by `join`
        entry_id: String,
    },

    /// Show where a student stands
    Position {
        /// Entry ID returned by `join`
        entry_id: String,
    },

    /// Show a professor's queue
    Queue {
        /// Professor ID
        professor_id: String,

        /// Keep printing the queue whenever it changes
        #[arg(short, long)]
        watch: bool,

        /// Poll interval in seconds for --watch
        #[arg(long, default_value = "2")]
        interval: u64,
    },

    /// Call the next student (professor)
    CallNext {
        /// Professor ID
        professor_id: String,
    },

    /// Remove every waiting student (professor)
    Clear {
        /// Professor ID
        professor_id: String,
    },

    /// Log in as a professor (creates the account on first login)
    Register {
        #[arg(short, long)]
        name: String,

        #[arg(short, long)]
        email: String,

        /// Office location
        #[arg(short, long)]
        office: Option<String>,
    },

    /// List professors holding office hours
    Professors,

    /// Switch between available and busy
    Toggle {
        /// Professor ID
        professor_id: String,
    },

    /// End office hours
    End {
        /// Professor ID
        professor_id: String,
    },

    /// Show daemon statistics
    Stats,
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize, Tabled)]
struct JoinResult {
    entry_id: String,
    position: i64,
    #[tabled(rename = "est. wait (min)")]
    estimated_wait_minutes: i64,
}

#[derive(Deserialize)]
struct Snapshot {
    revision: u64,
    entries: Vec<SnapshotRow>,
}

#[derive(Deserialize, Tabled)]
struct SnapshotRow {
    position: i64,
    student_name: String,
    id: String,
}

#[derive(Deserialize, Tabled)]
struct ProfessorRow {
    id: String,
    name: String,
    office: String,
    availability: String,
    #[tabled(rename = "waiting")]
    queue_length: usize,
}

#[derive(Deserialize)]
struct ProfessorList {
    professors: Vec<ProfessorRow>,
}

async fn call_rpc(url: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

fn print_queue(professor_id: &str, snapshot: Snapshot) {
    println!(
        "{}",
        format!("Queue for {} (revision {})", professor_id, snapshot.revision)
            .cyan()
            .bold()
    );
    if snapshot.entries.is_empty() {
        println!("{}", "No students waiting".yellow());
    } else {
        println!("{}", Table::new(snapshot.entries));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Join {
            professor_id,
            name,
            contact,
        } => {
            let params = json!({
                "professor_id": professor_id,
                "student_name": name,
                "student_contact": contact,
            });

            let result = call_rpc(&cli.rpc_url, "queue.join.v1", params).await?;
            let join_result: JoinResult = serde_json::from_value(result)?;

            println!("{}", "✓ Joined the queue".green().bold());
            println!();
            println!("{}", Table::new(vec![join_result]));
            println!("Keep the entry ID to check your position or leave.");
        }

        Commands::Leave { entry_id } => {
            let params = json!({ "entry_id": entry_id });
            let result = call_rpc(&cli.rpc_url, "queue.leave.v1", params).await?;

            match result["outcome"].as_str() {
                Some("LEFT") => println!("{}", "✓ Left the queue".green().bold()),
                _ => println!("{}", "Not in the queue anymore".yellow()),
            }
        }

        Commands::Position { entry_id } => {
            let params = json!({ "entry_id": entry_id });
            let result = call_rpc(&cli.rpc_url, "queue.status.v1", params).await?;
            let status = &result["status"];

            match status["state"].as_str() {
                Some("WAITING") => {
                    if status["is_next"].as_bool().unwrap_or(false) {
                        println!("{}", "You're next!".green().bold());
                    }
                    println!(
                        "  {} {} of {}",
                        "Position:".bold(),
                        status["position"],
                        status["queue_length"]
                    );
                    println!(
                        "  {} ~{} minutes",
                        "Estimated wait:".bold(),
                        status["estimated_wait_minutes"]
                    );
                }
                _ => println!("{}", "No longer waiting (called or removed)".yellow()),
            }
        }

        Commands::Queue {
            professor_id,
            watch,
            interval,
        } => {
            let params = json!({ "professor_id": professor_id });
            let mut last_revision = None;

            loop {
                let result = call_rpc(&cli.rpc_url, "queue.snapshot.v1", params.clone()).await?;
                let snapshot: Snapshot = serde_json::from_value(result)?;

                if last_revision != Some(snapshot.revision) {
                    last_revision = Some(snapshot.revision);
                    print_queue(&professor_id, snapshot);
                    println!();
                }

                if !watch {
                    break;
                }
                tokio::time::sleep(Duration::from_secs(interval.max(1))).await;
            }
        }

        Commands::CallNext { professor_id } => {
            let params = json!({ "professor_id": professor_id });
            let result = call_rpc(&cli.rpc_url, "queue.call_next.v1", params).await?;

            let called = &result["called"];
            if called.is_null() {
                println!("{}", "Queue is empty".yellow());
            } else {
                println!("{}", "✓ Next student".green().bold());
                println!("  {} {}", "Name:".bold(), called["student_name"].as_str().unwrap_or("?"));
                println!(
                    "  {} {}",
                    "Contact:".bold(),
                    called["student_contact"].as_str().unwrap_or("?")
                );
            }
        }

        Commands::Clear { professor_id } => {
            let params = json!({ "professor_id": professor_id });
            let result = call_rpc(&cli.rpc_url, "queue.clear.v1", params).await?;
            println!(
                "{}",
                format!("✓ Removed {} waiting students", result["removed"]).green().bold()
            );
        }

        Commands::Register {
            name,
            email,
            office,
        } => {
            let params = json!({ "name": name, "email": email, "office": office });
            let result = call_rpc(&cli.rpc_url, "professor.register.v1", params).await?;

            println!("{}", "✓ Logged in".green().bold());
            println!("  {} {}", "Professor ID:".bold(), result["id"].as_str().unwrap_or("?"));
            println!("  {} {}", "Office:".bold(), result["office"].as_str().unwrap_or("?"));
            println!(
                "  {} {}",
                "Availability:".bold(),
                result["availability"].as_str().unwrap_or("?")
            );
        }

        Commands::Professors => {
            let result = call_rpc(&cli.rpc_url, "professor.list.v1", json!({})).await?;
            let list: ProfessorList = serde_json::from_value(result)?;

            if list.professors.is_empty() {
                println!("{}", "No office hours right now".yellow());
            } else {
                println!("{}", Table::new(list.professors));
            }
        }

        Commands::Toggle { professor_id } => {
            let params = json!({ "professor_id": professor_id });
            let result = call_rpc(&cli.rpc_url, "professor.toggle.v1", params).await?;
            println!(
                "{} {}",
                "✓ Now".green().bold(),
                result["availability"].as_str().unwrap_or("?")
            );
        }

        Commands::End { professor_id } => {
            let params = json!({ "professor_id": professor_id });
            call_rpc(&cli.rpc_url, "professor.end.v1", params).await?;
            println!("{}", "✓ Office hours ended".green().bold());
        }

        Commands::Stats => {
            println!("{}", "System Status".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "admin.stats.v1", json!({})).await {
                Ok(stats) => {
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!();
                    println!("  {} {}", "Open professors:".bold(), stats["open_professors"]);
                    println!("  {} {}", "Waiting:".bold(), stats["waiting_entries"]);
                    println!("  {} {}", "Called:".bold(), stats["called_entries"]);
                    println!("  {} {} seconds", "Uptime:".bold(), stats["uptime_seconds"]);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }
    }

    Ok(())
}
