//! ACT command - Answer a routing decision.

use anyhow::Result;
use clap::{Args, ValueEnum};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use super::{HumanReadable, make_request, output};

/// The routing actions the server understands.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Action {
    /// Route to an existing mapping and count the use
    Use,
    /// Resolve a notebook to open; nothing is recorded
    Open,
    /// Stage a new notebook proposal
    Create,
    /// Confirm a mapping into the registry
    Save,
    /// Drop the pending topic
    Skip,
}

impl Action {
    fn as_str(self) -> &'static str {
        match self {
            Self::Use => "use",
            Self::Open => "open",
            Self::Create => "create",
            Self::Save => "save",
            Self::Skip => "skip",
        }
    }
}

/// Arguments for the act command.
#[derive(Args)]
pub struct ActArgs {
    /// Action to apply
    #[arg(value_enum)]
    pub action: Action,

    /// Topic key the action refers to (defaults to the pending topic)
    #[arg(long, short = 'k')]
    pub topic_key: Option<String>,

    /// Notebook reference (required for save)
    #[arg(long, short = 'n')]
    pub notebook_ref: Option<String>,

    /// Notebook URL
    #[arg(long)]
    pub notebook_url: Option<String>,

    /// Display title for a new mapping
    #[arg(long, short = 't')]
    pub title: Option<String>,

    /// Keyword for a new mapping (repeatable)
    #[arg(long = "keyword")]
    pub keywords: Vec<String>,
}

/// Response from applying an action.
#[derive(Debug, Deserialize, Serialize)]
pub struct ActionResponse {
    pub outcome: String,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl ActionResponse {
    fn entry_field(&self, field: &str) -> Option<&str> {
        self.details.get("entry")?.get(field)?.as_str()
    }
}

impl HumanReadable for ActionResponse {
    fn print_human(&self) {
        match self.outcome.as_str() {
            "usage_recorded" => match self.entry_field("topicKey") {
                Some(key) => {
                    let count = self
                        .details
                        .get("entry")
                        .and_then(|e| e.get("usageCount"))
                        .and_then(Value::as_u64)
                        .unwrap_or_default();
                    println!("{} {} (used {} times)", "Used".green().bold(), key, count);
                }
                None => println!("{}", "Topic not in the registry; nothing recorded".yellow()),
            },
            "opened" => match self.details.get("notebookUrl").and_then(Value::as_str) {
                Some(url) => println!("{} {}", "Open".green().bold(), url),
                None => println!("{}", "No notebook URL known".yellow()),
            },
            "pending_staged" => {
                let key = self
                    .details
                    .get("pending")
                    .and_then(|p| p.get("topicKey"))
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                println!("{} {}", "Pending topic staged:".cyan().bold(), key);
            }
            "saved" => {
                println!(
                    "{} {} → {}",
                    "Saved".green().bold(),
                    self.entry_field("topicKey").unwrap_or_default(),
                    self.entry_field("notebookRef").unwrap_or_default()
                );
                if self.details.get("completedPending") == Some(&Value::Bool(true)) {
                    println!("  {}", "(completed the pending topic)".dimmed());
                }
            }
            "skipped" => {
                if self.details.get("cleared") == Some(&Value::Bool(true)) {
                    println!("{}", "Pending topic cleared".green().bold());
                } else {
                    println!("{}", "Nothing was pending".dimmed());
                }
            }
            other => println!("{} {}", "Outcome:".bold(), other),
        }
    }
}

/// Execute the act command.
pub async fn execute(
    client: &reqwest::Client,
    base_url: &str,
    human: bool,
    args: ActArgs,
) -> Result<()> {
    let url = format!("{}/actions", base_url);
    let body = json!({
        "action": args.action.as_str(),
        "data": {
            "topicKey": args.topic_key,
            "notebookRef": args.notebook_ref,
            "notebookUrl": args.notebook_url,
            "displayTitle": args.title,
            "keywords": args.keywords,
        }
    });

    let response: ActionResponse = make_request(client.post(&url).json(&body)).await?;
    output(&response, human)
}
