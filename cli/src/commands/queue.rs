//! QUEUE command - Inspect and drive the export queue.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand, ValueEnum};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use super::{HumanReadable, format_timestamp, make_empty_request, make_request, output};

/// Arguments for the queue command.
#[derive(Args)]
pub struct QueueArgs {
    #[command(subcommand)]
    pub command: QueueCommand,
}

/// Job status filter and transition target.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Status {
    Queued,
    Running,
    Done,
    Failed,
}

impl Status {
    fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

#[derive(Subcommand)]
pub enum QueueCommand {
    /// List export jobs
    List {
        /// Only jobs in this status
        #[arg(long, short = 's', value_enum)]
        status: Option<Status>,
    },

    /// Queue an export (suppressed if the same content was already delivered)
    Submit {
        /// Bundle identifier
        bundle_id: String,

        /// Destination notebook
        notebook_ref: String,

        /// Source page URL
        #[arg(long, default_value = "")]
        page_url: String,

        /// Exported passage
        #[arg(long, short = 't', default_value = "")]
        text: String,

        /// Mark the export as user-initiated
        #[arg(long)]
        manual: bool,
    },

    /// Set a job's status
    Status {
        job_id: Uuid,

        #[arg(value_enum)]
        status: Status,

        /// Error message to record
        #[arg(long)]
        error: Option<String>,
    },

    /// Record a failed delivery and schedule the next attempt
    Retry {
        job_id: Uuid,

        /// What went wrong
        #[arg(long, short = 'e', default_value = "manual retry")]
        error: String,
    },

    /// Cancel a job
    Remove { job_id: Uuid },
}

/// One export job.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportJob {
    pub job_id: Uuid,
    pub bundle_id: String,
    pub notebook_ref: String,
    pub dedupe_key: String,
    #[serde(default)]
    pub mode: String,
    pub status: String,
    #[serde(default)]
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub next_attempt_at: DateTime<Utc>,
    #[serde(default)]
    pub last_error: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl HumanReadable for ExportJob {
    fn print_human(&self) {
        let status = match self.status.as_str() {
            "done" => self.status.green(),
            "failed" => self.status.red(),
            "running" => self.status.yellow(),
            _ => self.status.cyan(),
        };
        println!(
            "  {} {} {}",
            format!("[{}]", status),
            self.job_id.to_string().bold(),
            format!("→ {}", self.notebook_ref).dimmed()
        );
        println!("    {} {}", "Bundle:".cyan(), self.bundle_id);
        println!(
            "    {} {} (next {})",
            "Attempts:".cyan(),
            self.attempts,
            format_timestamp(&self.next_attempt_at)
        );
        if let Some(error) = &self.last_error {
            println!("    {} {}", "Last error:".cyan(), error.red());
        }
        println!();
    }
}

/// Response from `POST /queue`.
#[derive(Debug, Deserialize, Serialize)]
pub struct SubmitResponse {
    pub outcome: String,
    #[serde(default)]
    pub job: Option<ExportJob>,
    #[serde(default)]
    pub evicted: Vec<Uuid>,
    #[serde(default, rename = "existingJobId")]
    pub existing_job_id: Option<Uuid>,
}

impl HumanReadable for SubmitResponse {
    fn print_human(&self) {
        match &self.job {
            Some(job) => {
                println!("{}", "Export queued".green().bold());
                job.print_human();
                for id in &self.evicted {
                    println!("  {} {}", "Evicted:".yellow(), id);
                }
            }
            None => {
                print!("{}", "Duplicate export suppressed".yellow().bold());
                match self.existing_job_id {
                    Some(id) => println!(" (job {} is still active)", id),
                    None => println!(" (already delivered)"),
                }
            }
        }
    }
}

/// Confirmation printed after a removal.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Removed {
    pub job_id: Uuid,
    pub removed: bool,
}

impl HumanReadable for Removed {
    fn print_human(&self) {
        println!("{} {}", "Removed".green().bold(), self.job_id);
    }
}

/// Execute the queue command.
pub async fn execute(
    client: &reqwest::Client,
    base_url: &str,
    human: bool,
    args: QueueArgs,
) -> Result<()> {
    match args.command {
        QueueCommand::List { status } => {
            let url = format!("{}/queue", base_url);
            let mut request = client.get(&url);
            if let Some(status) = status {
                request = request.query(&[("status", status.as_str())]);
            }
            let jobs: Vec<ExportJob> = make_request(request).await?;
            if human && jobs.is_empty() {
                println!("  {}", "(Queue is empty)".dimmed());
            }
            output(&jobs, human)
        }
        QueueCommand::Submit {
            bundle_id,
            notebook_ref,
            page_url,
            text,
            manual,
        } => {
            let url = format!("{}/queue", base_url);
            let body = json!({
                "bundleId": bundle_id,
                "notebookRef": notebook_ref,
                "url": page_url,
                "selectedText": text,
                "mode": if manual { "manual" } else { "auto" },
            });
            let response: SubmitResponse = make_request(client.post(&url).json(&body)).await?;
            output(&response, human)
        }
        QueueCommand::Status {
            job_id,
            status,
            error,
        } => {
            let url = format!("{}/queue/{}/status", base_url, job_id);
            let mut body = json!({ "status": status.as_str() });
            if let Some(error) = error {
                body["lastError"] = Value::String(error);
            }
            let job: ExportJob = make_request(client.post(&url).json(&body)).await?;
            output(&job, human)
        }
        QueueCommand::Retry { job_id, error } => {
            let url = format!("{}/queue/{}/retry", base_url, job_id);
            let job: ExportJob =
                make_request(client.post(&url).json(&json!({ "error": error }))).await?;
            output(&job, human)
        }
        QueueCommand::Remove { job_id } => {
            let url = format!("{}/queue/{}", base_url, job_id);
            make_empty_request(client.delete(&url)).await?;
            output(
                &Removed {
                    job_id,
                    removed: true,
                },
                human,
            )
        }
    }
}
