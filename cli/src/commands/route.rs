//! ROUTE and CAPTURE commands - Decide where a capture belongs.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{HumanReadable, make_request, output, truncate};

/// Arguments shared by the route and capture commands.
#[derive(Args)]
pub struct RouteArgs {
    /// Page title
    #[arg(long, short = 't', default_value = "")]
    pub title: String,

    /// Page URL
    #[arg(long, short = 'u', default_value = "")]
    pub page_url: String,

    /// Page domain (derived from the URL when omitted)
    #[arg(long, short = 'd', default_value = "")]
    pub domain: String,

    /// Highlighted passage
    #[arg(long, short = 's', default_value = "")]
    pub selection: String,

    /// User-confirmed tag (repeatable)
    #[arg(long = "tag")]
    pub tags: Vec<String>,

    /// A one-line note written with the capture
    #[arg(long)]
    pub thought: Option<String>,

    /// Reading mode: skim or deep
    #[arg(long)]
    pub mode: Option<String>,

    /// Do not stage a pending topic when asking or creating
    #[arg(long)]
    pub no_save_pending: bool,

    /// Number of runners-up to return
    #[arg(long, short = 'a')]
    pub alternatives: Option<usize>,
}

impl RouteArgs {
    fn body(&self) -> Value {
        let mut body = json!({
            "capture": {
                "title": self.title,
                "url": self.page_url,
                "domain": self.domain,
                "selectedText": self.selection,
                "tags": self.tags,
                "atomicThought": self.thought,
                "readingMode": self.mode,
            }
        });
        if self.no_save_pending || self.alternatives.is_some() {
            let mut options = json!({ "savePending": !self.no_save_pending });
            if let Some(n) = self.alternatives {
                options["maxAlternatives"] = json!(n);
            }
            body["options"] = options;
        }
        body
    }
}

/// A candidate notebook.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BestMatch {
    pub notebook_ref: String,
    #[serde(default)]
    pub notebook_url: String,
    pub score: f64,
    #[serde(default)]
    pub display_title: String,
    pub topic_key: String,
    #[serde(default)]
    pub reasons: Vec<Value>,
}

/// Response from routing a capture.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResponse {
    pub decision: String,
    pub best_match: Option<BestMatch>,
    #[serde(default)]
    pub alternatives: Vec<BestMatch>,
    pub topic_key: String,
    #[serde(default)]
    pub topic_source: String,
    #[serde(default)]
    pub topic_label: String,
    #[serde(default)]
    pub display_title: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub reason: String,
}

impl HumanReadable for RouteResponse {
    fn print_human(&self) {
        let decision = match self.decision.as_str() {
            "use_existing" => self.decision.green().bold(),
            "ask" => self.decision.yellow().bold(),
            _ => self.decision.cyan().bold(),
        };
        println!("{} {}", "Decision:".bold(), decision);
        println!();
        println!("  {} {}", "Topic:".cyan(), self.topic_label);
        println!("  {} {}", "Key:".cyan(), self.topic_key.dimmed());
        if !self.keywords.is_empty() {
            println!("  {} {}", "Keywords:".cyan(), self.keywords.join(", "));
        }
        println!("  {} {:.2}", "Confidence:".cyan(), self.confidence);
        println!("  {} {}", "Reason:".cyan(), self.reason);

        if let Some(best) = &self.best_match {
            println!();
            println!("{}", "Best match".green().bold());
            print_match(best);
        }

        if !self.alternatives.is_empty() {
            println!();
            println!("{}", "Alternatives".bold());
            for alt in &self.alternatives {
                print_match(alt);
            }
        }
    }
}

fn print_match(m: &BestMatch) {
    let title = if m.display_title.is_empty() {
        &m.topic_key
    } else {
        &m.display_title
    };
    println!(
        "  {} {} {}",
        format!("{:.2}", m.score).yellow(),
        truncate(title, 48).bold(),
        format!("→ {}", m.notebook_ref).dimmed()
    );
}

/// Suggestion shown when a topic deserves its own notebook.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionSummary {
    pub id: String,
    pub topic_key: String,
    #[serde(default)]
    pub display_title: String,
}

/// Incubator verdict for a capture.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IdeaEvaluation {
    pub suggestion: Option<SuggestionSummary>,
    #[serde(default)]
    pub should_prompt: bool,
}

/// Response from the capture command.
#[derive(Debug, Deserialize, Serialize)]
pub struct CaptureResponse {
    pub route: RouteResponse,
    pub idea: IdeaEvaluation,
}

impl HumanReadable for CaptureResponse {
    fn print_human(&self) {
        self.route.print_human();
        if let Some(suggestion) = &self.idea.suggestion {
            println!();
            println!(
                "{} {}",
                "Idea:".magenta().bold(),
                format!("\"{}\" looks like it deserves its own notebook", suggestion.display_title)
                    .magenta()
            );
            println!("  {} {}", "Suggestion:".cyan(), suggestion.id.dimmed());
        }
    }
}

/// Execute the route command.
pub async fn route(
    client: &reqwest::Client,
    base_url: &str,
    human: bool,
    args: RouteArgs,
) -> Result<()> {
    let url = format!("{}/route", base_url);
    let response: RouteResponse = make_request(client.post(&url).json(&args.body())).await?;
    output(&response, human)
}

/// Execute the capture command.
pub async fn capture(
    client: &reqwest::Client,
    base_url: &str,
    human: bool,
    args: RouteArgs,
) -> Result<()> {
    let url = format!("{}/capture", base_url);
    let response: CaptureResponse = make_request(client.post(&url).json(&args.body())).await?;
    output(&response, human)
}
