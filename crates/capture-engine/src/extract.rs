//! Topic extraction: capture context → canonical [`Topic`].
//!
//! Three tiers are tried in order and the first that applies wins:
//!
//! 1. **Tag**: the first user-confirmed tag, canonicalized through an
//!    alias table into a slug (`tag:ml`)
//! 2. **Domain**: the registrable domain of the page, unless it is a broad
//!    aggregator such as a search engine or social feed (`dom:example.com`)
//! 3. **Keyword**: a fingerprint of the top content words of the title and
//!    selection (`kw:1f0c…`, or `kw:yt:1f0c…` for video platforms)
//!
//! The topic key depends only on the capture content. Nothing here reads
//! the clock or any random source.

use std::net::IpAddr;

use capture_core::identity::keyword_fingerprint;
use capture_core::{CaptureContext, Topic, TopicSource};
use url::Url;

use crate::tokenize::top_keywords;

/// Confidence of a tag-tier topic.
pub const TAG_CONFIDENCE: f64 = 0.95;

/// Confidence of a domain-tier topic.
pub const DOMAIN_CONFIDENCE: f64 = 0.75;

/// Keyword-tier confidence: base plus a step per keyword, capped.
const KEYWORD_BASE_CONFIDENCE: f64 = 0.30;
const KEYWORD_STEP_CONFIDENCE: f64 = 0.05;
const KEYWORD_MAX_CONFIDENCE: f64 = 0.55;

/// Confidence when nothing at all could be extracted.
const EMPTY_CONFIDENCE: f64 = 0.10;

/// Default number of keywords kept per topic.
pub const DEFAULT_MAX_KEYWORDS: usize = 5;

/// Longest display title derived from a page title, in characters.
const MAX_TITLE_CHARS: usize = 80;

/// Label used when a capture carries no usable text.
pub const UNTITLED_TOPIC: &str = "Untitled topic";

/// Multi-word or variant tags mapped onto one canonical slug.
const TAG_ALIASES: &[(&str, &str)] = &[
    ("machine learning", "ml"),
    ("artificial intelligence", "ai"),
    ("deep learning", "dl"),
    ("natural language processing", "nlp"),
    ("large language models", "llm"),
    ("large language model", "llm"),
    ("rust lang", "rust"),
    ("rustlang", "rust"),
    ("golang", "go"),
    ("javascript", "js"),
    ("typescript", "ts"),
    ("k8s", "kubernetes"),
];

/// Registrable domains too broad to identify a topic on their own.
const BROAD_DOMAINS: &[&str] = &[
    "bing.com",
    "duckduckgo.com",
    "facebook.com",
    "github.com",
    "gitlab.com",
    "instagram.com",
    "linkedin.com",
    "medium.com",
    "reddit.com",
    "stackoverflow.com",
    "t.co",
    "tiktok.com",
    "twitter.com",
    "vimeo.com",
    "wikipedia.org",
    "x.com",
    "youtu.be",
    "youtube.com",
];

/// Search engines are broad under every country TLD.
const SEARCH_ENGINE_LABELS: &[&str] = &["google", "bing", "yahoo", "duckduckgo", "baidu", "yandex"];

/// Video platforms whose keyword topics carry a short prefix.
const VIDEO_PREFIXES: &[(&str, &str)] = &[
    ("youtube.com", "yt"),
    ("youtu.be", "yt"),
    ("vimeo.com", "vimeo"),
];

/// Second-level labels that sit under a two-letter country TLD
/// (`example.co.uk`, `example.com.vn`).
const COUNTRY_SECOND_LEVELS: &[&str] = &["co", "com", "org", "net", "ac", "gov", "edu"];

/// Extracts canonical topics from capture contexts.
#[derive(Debug, Clone)]
pub struct TopicExtractor {
    max_keywords: usize,
}

impl Default for TopicExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_KEYWORDS)
    }
}

impl TopicExtractor {
    /// Creates an extractor that keeps at most `max_keywords` keywords.
    pub fn new(max_keywords: usize) -> Self {
        Self {
            max_keywords: max_keywords.max(1),
        }
    }

    /// Extracts the topic of a capture.
    ///
    /// Never fails: a capture with no usable signal still yields a
    /// low-confidence keyword topic.
    pub fn extract(&self, ctx: &CaptureContext) -> Topic {
        let keywords = top_keywords(
            &format!("{} {}", ctx.title, ctx.selected_text),
            self.max_keywords,
        );

        // First tag with a canonical form; noise like "!!!" is skipped
        let tagged = ctx.tags.iter().find_map(|t| {
            let t = t.trim();
            canonical_tag(t).map(|slug| (slug, t))
        });
        if let Some((slug, label)) = tagged {
            return Topic {
                topic_key: format!("{}{}", TopicSource::Tag.key_prefix(), slug),
                topic_source: TopicSource::Tag,
                display_title: label.trim_start_matches('#').trim().to_string(),
                keywords,
                confidence: TAG_CONFIDENCE,
            };
        }

        let host = capture_host(ctx);
        let domain = host.as_deref().map(registrable_domain);

        if let Some(domain) = domain.as_deref().filter(|d| !is_broad_domain(d)) {
            return Topic {
                topic_key: format!("{}{}", TopicSource::Domain.key_prefix(), domain),
                topic_source: TopicSource::Domain,
                display_title: domain.to_string(),
                keywords,
                confidence: DOMAIN_CONFIDENCE,
            };
        }

        let prefix = domain.as_deref().and_then(video_prefix);
        let fingerprint = keyword_fingerprint(&keywords);
        let topic_key = match prefix {
            Some(p) => format!("{}{}:{}", TopicSource::Keyword.key_prefix(), p, fingerprint),
            None => format!("{}{}", TopicSource::Keyword.key_prefix(), fingerprint),
        };

        let confidence = if keywords.is_empty() {
            EMPTY_CONFIDENCE
        } else {
            (KEYWORD_BASE_CONFIDENCE + KEYWORD_STEP_CONFIDENCE * keywords.len() as f64)
                .min(KEYWORD_MAX_CONFIDENCE)
        };

        Topic {
            topic_key,
            topic_source: TopicSource::Keyword,
            display_title: keyword_display_title(&ctx.title, &keywords),
            keywords,
            confidence,
        }
    }
}

/// Canonicalizes a user tag into a slug, or `None` if it is blank.
///
/// Case, a leading `#` and separator style do not matter:
/// `"#Machine-Learning"`, `"machine_learning"` and `"ML"` all become `"ml"`.
pub fn canonical_tag(tag: &str) -> Option<String> {
    let words: Vec<String> = tag
        .trim()
        .trim_start_matches('#')
        .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|w| !w.is_empty())
        .map(|w| w.to_lowercase())
        .collect();
    if words.is_empty() {
        return None;
    }

    let spaced = words.join(" ");
    if let Some((_, slug)) = TAG_ALIASES.iter().find(|(alias, _)| *alias == spaced) {
        return Some((*slug).to_string());
    }

    let slug = words
        .iter()
        .map(|w| w.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() { None } else { Some(slug) }
}

/// Returns the normalized host of a capture: the explicit domain if given,
/// otherwise the URL host. Lowercased, without `www.` or a port.
pub fn capture_host(ctx: &CaptureContext) -> Option<String> {
    let raw = if ctx.domain.trim().is_empty() {
        ctx.url.trim()
    } else {
        ctx.domain.trim()
    };
    normalize_host(raw)
}

fn normalize_host(raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }

    let host = if raw.contains("://") {
        Url::parse(raw).ok()?.host_str()?.to_string()
    } else {
        // Bare domain, possibly with a path or port
        let end = raw.find(['/', '?', '#']).unwrap_or(raw.len());
        let authority = &raw[..end];
        let authority = authority.rsplit('@').next().unwrap_or(authority);
        match authority.rsplit_once(':') {
            Some((h, port)) if port.chars().all(|c| c.is_ascii_digit()) => h.to_string(),
            _ => authority.to_string(),
        }
    };

    let host = host.trim_end_matches('.').to_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if host.is_empty() { None } else { Some(host) }
}

/// Reduces a host to its registrable domain.
///
/// `blog.example.com` → `example.com`; `news.bbc.co.uk` → `bbc.co.uk`.
/// IP addresses and single-label hosts are returned unchanged.
pub fn registrable_domain(host: &str) -> String {
    if host.parse::<IpAddr>().is_ok() {
        return host.to_string();
    }

    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() <= 2 {
        return labels.join(".");
    }

    let n = labels.len();
    let keep = if labels[n - 1].len() == 2 && COUNTRY_SECOND_LEVELS.contains(&labels[n - 2]) {
        3
    } else {
        2
    };
    labels[n - keep..].join(".")
}

/// Returns true if the registrable domain is a broad aggregator.
pub fn is_broad_domain(domain: &str) -> bool {
    if BROAD_DOMAINS.contains(&domain) {
        return true;
    }
    domain
        .split('.')
        .next()
        .is_some_and(|label| SEARCH_ENGINE_LABELS.contains(&label))
}

fn video_prefix(domain: &str) -> Option<&'static str> {
    VIDEO_PREFIXES
        .iter()
        .find(|(d, _)| *d == domain)
        .map(|(_, p)| *p)
}

fn keyword_display_title(title: &str, keywords: &[String]) -> String {
    let title = title.split_whitespace().collect::<Vec<_>>().join(" ");
    if !title.is_empty() {
        if title.chars().count() > MAX_TITLE_CHARS {
            let cut: String = title.chars().take(MAX_TITLE_CHARS - 1).collect();
            return format!("{}…", cut.trim_end());
        }
        return title;
    }
    if !keywords.is_empty() {
        return keywords.iter().take(3).cloned().collect::<Vec<_>>().join(" ");
    }
    UNTITLED_TOPIC.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(title: &str, selection: &str, domain: &str, tags: &[&str]) -> CaptureContext {
        CaptureContext {
            title: title.to_string(),
            selected_text: selection.to_string(),
            domain: domain.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_tag_tier_wins() {
        let topic = TopicExtractor::default().extract(&ctx(
            "Intro to Rust",
            "ownership",
            "blog.example.com",
            &["#Rust"],
        ));
        assert_eq!(topic.topic_key, "tag:rust");
        assert_eq!(topic.topic_source, TopicSource::Tag);
        assert_eq!(topic.display_title, "Rust");
        assert_eq!(topic.confidence, TAG_CONFIDENCE);
        assert_eq!(topic.keywords, vec!["intro", "rust", "ownership"]);
    }

    #[test]
    fn test_unusable_tags_are_skipped() {
        let topic = TopicExtractor::default().extract(&ctx(
            "Intro to Rust",
            "ownership",
            "blog.example.com",
            &["!!!", "  ", "#", " Machine Learning "],
        ));
        assert_eq!(topic.topic_key, "tag:ml");
        assert_eq!(topic.topic_source, TopicSource::Tag);
        assert_eq!(topic.display_title, "Machine Learning");

        let topic = TopicExtractor::default().extract(&ctx(
            "Intro to Rust",
            "ownership",
            "blog.example.com",
            &["!!!"],
        ));
        assert_eq!(topic.topic_key, "dom:example.com");
    }

    #[test]
    fn test_tag_aliases() {
        assert_eq!(canonical_tag("Machine Learning").as_deref(), Some("ml"));
        assert_eq!(canonical_tag("#machine-learning").as_deref(), Some("ml"));
        assert_eq!(canonical_tag("machine_learning").as_deref(), Some("ml"));
        assert_eq!(canonical_tag("Distributed  Systems").as_deref(), Some("distributed-systems"));
        assert_eq!(canonical_tag("  #  "), None);
        assert_eq!(canonical_tag("!!!"), None);
    }

    #[test]
    fn test_domain_tier() {
        let topic = TopicExtractor::default().extract(&ctx(
            "Intro to Rust",
            "ownership and borrowing",
            "blog.example.com",
            &[],
        ));
        assert_eq!(topic.topic_key, "dom:example.com");
        assert_eq!(topic.topic_source, TopicSource::Domain);
        assert_eq!(topic.confidence, DOMAIN_CONFIDENCE);
    }

    #[test]
    fn test_domain_from_url() {
        let c = CaptureContext {
            url: "https://WWW.Example.co.uk:8443/post?id=1".to_string(),
            ..Default::default()
        };
        assert_eq!(capture_host(&c).as_deref(), Some("example.co.uk"));
        assert_eq!(
            TopicExtractor::default().extract(&c).topic_key,
            "dom:example.co.uk"
        );
    }

    #[test]
    fn test_registrable_domain() {
        assert_eq!(registrable_domain("blog.example.com"), "example.com");
        assert_eq!(registrable_domain("news.bbc.co.uk"), "bbc.co.uk");
        assert_eq!(registrable_domain("vnexpress.net"), "vnexpress.net");
        assert_eq!(registrable_domain("a.b.example.com.vn"), "example.com.vn");
        assert_eq!(registrable_domain("localhost"), "localhost");
        assert_eq!(registrable_domain("127.0.0.1"), "127.0.0.1");
    }

    #[test]
    fn test_broad_domains_fall_through_to_keywords() {
        let topic = TopicExtractor::default().extract(&ctx(
            "Intro to Rust",
            "ownership and borrowing",
            "en.wikipedia.org",
            &[],
        ));
        assert!(topic.topic_key.starts_with("kw:"));
        assert!(is_broad_domain("google.com.vn"));
        assert!(is_broad_domain("google.de"));
        assert!(!is_broad_domain("example.com"));
    }

    #[test]
    fn test_video_platform_prefix() {
        let topic = TopicExtractor::default().extract(&ctx(
            "Intro to Rust",
            "ownership and borrowing",
            "youtube.com",
            &[],
        ));
        assert!(topic.topic_key.starts_with("kw:yt:"));
        assert_eq!(topic.topic_source, TopicSource::Keyword);
        assert_eq!(topic.display_title, "Intro to Rust");
        assert_eq!(topic.keywords, vec!["intro", "rust", "ownership", "borrowing"]);
        assert!((topic.confidence - 0.50).abs() < 1e-9);
    }

    #[test]
    fn test_deterministic_key() {
        let extractor = TopicExtractor::default();
        let a = ctx("Lifetimes explained", "borrowing rules", "youtube.com", &[]);
        let b = a.clone();
        assert_eq!(extractor.extract(&a).topic_key, extractor.extract(&b).topic_key);
    }

    #[test]
    fn test_empty_capture() {
        let topic = TopicExtractor::default().extract(&CaptureContext::default());
        assert!(topic.topic_key.starts_with("kw:"));
        assert!(topic.keywords.is_empty());
        assert_eq!(topic.display_title, UNTITLED_TOPIC);
        assert_eq!(topic.confidence, EMPTY_CONFIDENCE);
    }

    #[test]
    fn test_keyword_confidence_caps() {
        let topic = TopicExtractor::new(10).extract(&ctx(
            "",
            "alpha bravo charlie delta echo foxtrot golf hotel",
            "",
            &[],
        ));
        assert_eq!(topic.confidence, KEYWORD_MAX_CONFIDENCE);
        assert_eq!(topic.display_title, "alpha bravo charlie");
    }

    #[test]
    fn test_long_titles_truncated() {
        let title = "word ".repeat(40);
        let label = keyword_display_title(&title, &[]);
        assert!(label.chars().count() <= MAX_TITLE_CHARS);
        assert!(label.ends_with('…'));
    }
}
