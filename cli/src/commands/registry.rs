//! REGISTRY command - Inspect and edit topic → notebook mappings.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{HumanReadable, format_timestamp, make_empty_request, make_request, output, truncate};

/// Arguments for the registry command.
#[derive(Args)]
pub struct RegistryArgs {
    #[command(subcommand)]
    pub command: RegistryCommand,
}

#[derive(Subcommand)]
pub enum RegistryCommand {
    /// List every mapping
    List,

    /// Delete a mapping
    Delete {
        /// Topic key to remove (e.g. tag:rust)
        topic_key: String,
    },

    /// Learn the pending topic from an export you made by hand
    Observe {
        /// Notebook the capture was exported to
        notebook_ref: String,

        /// Notebook URL
        #[arg(long, default_value = "")]
        notebook_url: String,
    },
}

/// One registry mapping.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub topic_key: String,
    #[serde(default)]
    pub display_title: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub notebook_ref: String,
    #[serde(default)]
    pub notebook_url: String,
    #[serde(default)]
    pub usage_count: u64,
    pub last_used_at: DateTime<Utc>,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl HumanReadable for RegistryEntry {
    fn print_human(&self) {
        println!(
            "  {} {} {}",
            self.topic_key.bold(),
            format!("→ {}", self.notebook_ref).green(),
            format!("[{}]", self.source).dimmed()
        );
        if !self.display_title.is_empty() {
            println!("    {} {}", "Title:".cyan(), truncate(&self.display_title, 60));
        }
        if !self.keywords.is_empty() {
            println!("    {} {}", "Keywords:".cyan(), self.keywords.join(", "));
        }
        println!(
            "    {} {} uses, last {}",
            "Usage:".cyan(),
            self.usage_count,
            format_timestamp(&self.last_used_at)
        );
        println!();
    }
}

/// Response from `POST /registry/observe`.
#[derive(Debug, Deserialize, Serialize)]
pub struct ObserveResponse {
    pub entry: Option<RegistryEntry>,
}

impl HumanReadable for ObserveResponse {
    fn print_human(&self) {
        match &self.entry {
            Some(entry) => {
                println!("{}", "Learned mapping".green().bold());
                entry.print_human();
            }
            None => println!("{}", "No pending topic to learn".dimmed()),
        }
    }
}

/// Confirmation printed after a delete.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Deleted {
    pub topic_key: String,
    pub deleted: bool,
}

impl HumanReadable for Deleted {
    fn print_human(&self) {
        println!("{} {}", "Deleted".green().bold(), self.topic_key);
    }
}

/// Execute the registry command.
pub async fn execute(
    client: &reqwest::Client,
    base_url: &str,
    human: bool,
    args: RegistryArgs,
) -> Result<()> {
    match args.command {
        RegistryCommand::List => {
            let url = format!("{}/registry", base_url);
            let entries: Vec<RegistryEntry> = make_request(client.get(&url)).await?;
            if human {
                println!("{}", "Topic Registry".green().bold());
                println!("{}", "=".repeat(80));
                if entries.is_empty() {
                    println!("  {}", "(No mappings yet)".dimmed());
                }
            }
            output(&entries, human)
        }
        RegistryCommand::Delete { topic_key } => {
            let url = format!("{}/registry/{}", base_url, topic_key);
            make_empty_request(client.delete(&url)).await?;
            output(
                &Deleted {
                    topic_key,
                    deleted: true,
                },
                human,
            )
        }
        RegistryCommand::Observe {
            notebook_ref,
            notebook_url,
        } => {
            let url = format!("{}/registry/observe", base_url);
            let body = json!({ "notebookRef": notebook_ref, "notebookUrl": notebook_url });
            let response: ObserveResponse = make_request(client.post(&url).json(&body)).await?;
            output(&response, human)
        }
    }
}
