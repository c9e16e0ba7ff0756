//! IDEAS command - Notebook suggestions and cooldowns.

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Args, Subcommand, ValueEnum};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use super::{HumanReadable, format_timestamp, make_request, output, truncate};

/// Arguments for the ideas command.
#[derive(Args)]
pub struct IdeasArgs {
    #[command(subcommand)]
    pub command: IdeasCommand,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SuggestionStatus {
    Open,
    Accepted,
    Dismissed,
}

impl SuggestionStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Accepted => "accepted",
            Self::Dismissed => "dismissed",
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DismissKind {
    /// Snooze for a week (a month after repeated dismissals)
    NotNow,
    /// Stop suggesting this topic for 90 days
    DontAsk,
}

impl DismissKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::NotNow => "not_now",
            Self::DontAsk => "dont_ask",
        }
    }
}

#[derive(Subcommand)]
pub enum IdeasCommand {
    /// List suggestions
    List {
        #[arg(long, short = 's', value_enum)]
        status: Option<SuggestionStatus>,
    },

    /// Snooze or silence suggestions for a topic
    Dismiss {
        topic_key: String,

        #[arg(value_enum, default_value = "not-now")]
        kind: DismissKind,
    },

    /// Accept or dismiss one suggestion
    Status {
        id: Uuid,

        #[arg(value_enum)]
        status: SuggestionStatus,
    },

    /// Lift "don't ask again" for a topic
    Reset { topic_key: String },
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionReason {
    pub total_bundles: usize,
    pub deep_count: usize,
    pub engagement_score: u32,
    #[serde(default)]
    pub selection_repeat: usize,
}

/// One notebook suggestion.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeaSuggestion {
    pub id: Uuid,
    pub topic_key: String,
    #[serde(default)]
    pub display_title: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub suggested_at: DateTime<Utc>,
    pub status: String,
    pub reason: SuggestionReason,
}

impl HumanReadable for IdeaSuggestion {
    fn print_human(&self) {
        let status = match self.status.as_str() {
            "open" => self.status.magenta(),
            "accepted" => self.status.green(),
            _ => self.status.dimmed(),
        };
        println!(
            "  {} {} {}",
            format!("[{}]", status),
            truncate(&self.display_title, 50).bold(),
            self.topic_key.dimmed()
        );
        println!("    {} {}", "ID:".cyan(), self.id);
        println!(
            "    {} {} captures, {} deep, score {}",
            "Engagement:".cyan(),
            self.reason.total_bundles,
            self.reason.deep_count,
            self.reason.engagement_score
        );
        println!("    {} {}", "Suggested:".cyan(), format_timestamp(&self.suggested_at));
        println!();
    }
}

/// Suppression state for a topic.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cooldown {
    #[serde(default)]
    pub dismiss_count: u32,
    #[serde(default)]
    pub last_dismiss_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub hard_until: Option<DateTime<Utc>>,
}

impl HumanReadable for Cooldown {
    fn print_human(&self) {
        println!("{}", "Cooldown".bold());
        println!("  {} {}", "Dismissals:".cyan(), self.dismiss_count);
        if let Some(until) = &self.until {
            println!("  {} {}", "Snoozed until:".cyan(), format_timestamp(until));
        }
        if let Some(hard) = &self.hard_until {
            println!("  {} {}", "Silenced until:".cyan(), format_timestamp(hard));
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ResetResponse {
    pub reset: bool,
}

impl HumanReadable for ResetResponse {
    fn print_human(&self) {
        if self.reset {
            println!("{}", "Suggestions re-enabled".green().bold());
        } else {
            println!("{}", "Topic was not silenced".dimmed());
        }
    }
}

/// Execute the ideas command.
pub async fn execute(
    client: &reqwest::Client,
    base_url: &str,
    human: bool,
    args: IdeasArgs,
) -> Result<()> {
    match args.command {
        IdeasCommand::List { status } => {
            let url = format!("{}/ideas", base_url);
            let mut request = client.get(&url);
            if let Some(status) = status {
                request = request.query(&[("status", status.as_str())]);
            }
            let suggestions: Vec<IdeaSuggestion> = make_request(request).await?;
            if human && suggestions.is_empty() {
                println!("  {}", "(No suggestions)".dimmed());
            }
            output(&suggestions, human)
        }
        IdeasCommand::Dismiss { topic_key, kind } => {
            let url = format!("{}/ideas/dismiss", base_url);
            let body = json!({ "topicKey": topic_key, "type": kind.as_str() });
            let cooldown: Cooldown = make_request(client.post(&url).json(&body)).await?;
            output(&cooldown, human)
        }
        IdeasCommand::Status { id, status } => {
            let url = format!("{}/ideas/{}", base_url, id);
            let body = json!({ "status": status.as_str() });
            let suggestion: IdeaSuggestion = make_request(client.patch(&url).json(&body)).await?;
            output(&suggestion, human)
        }
        IdeasCommand::Reset { topic_key } => {
            let url = format!("{}/ideas/cooldowns/{}", base_url, topic_key);
            let response: ResetResponse = make_request(client.delete(&url)).await?;
            output(&response, human)
        }
    }
}
