//! Scoring of extracted topics against learned registry entries.
//!
//! The score is additive over independent signals and capped at 1.0:
//!
//! | Signal | Contribution |
//! |--------|--------------|
//! | Exact topic key | +1.0 |
//! | Keyword overlap | +0.25 per exact pair, +0.10 per containment pair, max 0.6 |
//! | Title similarity | similarity × 0.3, only when similarity > 0.5 |
//! | Usage | log10(usage + 1) × 0.05, max 0.15 |
//! | Recency | 0.10 within 7 days, 0.05 within 30, 0.02 within 90 |
//!
//! [`get_decision`] turns the best score into a routing decision. The
//! thresholds are the only decision boundary in the router.

use std::cmp::Ordering;
use std::collections::HashSet;

use capture_core::{MatchReason, MatchResult, RegistryEntry, RouteDecision, Topic};
use chrono::{DateTime, Duration, Utc};

/// Weight of an exact topic-key match.
pub const EXACT_KEY_WEIGHT: f64 = 1.0;

/// Weight of one exact keyword pair.
pub const KEYWORD_EXACT_WEIGHT: f64 = 0.25;

/// Weight of one containment keyword pair.
pub const KEYWORD_PARTIAL_WEIGHT: f64 = 0.10;

/// Cap on the total keyword contribution.
pub const KEYWORD_MAX_WEIGHT: f64 = 0.6;

/// Multiplier applied to title similarity.
pub const TITLE_WEIGHT: f64 = 0.3;

/// Title similarity must exceed this to count.
pub const TITLE_MIN_SIMILARITY: f64 = 0.5;

/// Multiplier applied to `log10(usage + 1)`.
pub const USAGE_FACTOR: f64 = 0.05;

/// Cap on the usage contribution.
pub const USAGE_MAX_WEIGHT: f64 = 0.15;

/// Recency steps: (max age in days, weight).
const RECENCY_STEPS: &[(i64, f64)] = &[(7, 0.10), (30, 0.05), (90, 0.02)];

/// Scores at or above this route without asking.
pub const USE_EXISTING_THRESHOLD: f64 = 0.70;

/// Scores at or above this (and below [`USE_EXISTING_THRESHOLD`]) ask the user.
pub const ASK_THRESHOLD: f64 = 0.45;

/// Maps a score onto a routing decision.
pub fn get_decision(score: f64) -> RouteDecision {
    if score >= USE_EXISTING_THRESHOLD {
        RouteDecision::UseExisting
    } else if score >= ASK_THRESHOLD {
        RouteDecision::Ask
    } else {
        RouteDecision::Create
    }
}

/// Scores one registry entry against one topic.
pub fn score_topic_match(topic: &Topic, entry: &RegistryEntry, now: DateTime<Utc>) -> MatchResult {
    let mut reasons = Vec::new();

    if topic.topic_key == entry.topic_key {
        reasons.push(MatchReason::ExactKey {
            weight: EXACT_KEY_WEIGHT,
        });
    }

    let (exact, partial) = keyword_overlap(&topic.keywords, &entry.keywords);
    if exact + partial > 0 {
        let weight = (exact as f64 * KEYWORD_EXACT_WEIGHT + partial as f64 * KEYWORD_PARTIAL_WEIGHT)
            .min(KEYWORD_MAX_WEIGHT);
        reasons.push(MatchReason::KeywordOverlap {
            exact,
            partial,
            weight,
        });
    }

    let similarity = title_similarity(&topic.display_title, &entry.display_title);
    if similarity > TITLE_MIN_SIMILARITY {
        reasons.push(MatchReason::TitleSimilarity {
            similarity,
            weight: similarity * TITLE_WEIGHT,
        });
    }

    if entry.usage_count > 0 {
        let weight = ((entry.usage_count as f64 + 1.0).log10() * USAGE_FACTOR).min(USAGE_MAX_WEIGHT);
        reasons.push(MatchReason::Usage {
            usage_count: entry.usage_count,
            weight,
        });
    }

    let age = (now - entry.last_used_at).max(Duration::zero());
    if let Some(&(_, weight)) = RECENCY_STEPS
        .iter()
        .find(|(days, _)| age <= Duration::days(*days))
    {
        reasons.push(MatchReason::Recency {
            days: age.num_days(),
            weight,
        });
    }

    let score = reasons.iter().map(MatchReason::weight).sum::<f64>().min(1.0);

    MatchResult {
        entry: entry.clone(),
        score,
        reasons,
    }
}

/// Scores every entry and returns the top `limit`, best first.
///
/// Equal scores are ordered by usage count, then most recent use, then
/// topic key, so the ranking is stable for a given registry.
pub fn find_best_matches(
    topic: &Topic,
    registry: &[RegistryEntry],
    limit: usize,
    now: DateTime<Utc>,
) -> Vec<MatchResult> {
    let mut matches: Vec<MatchResult> = registry
        .iter()
        .map(|entry| score_topic_match(topic, entry, now))
        .collect();
    matches.sort_by(compare_matches);
    matches.truncate(limit);
    matches
}

fn compare_matches(a: &MatchResult, b: &MatchResult) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.entry.usage_count.cmp(&a.entry.usage_count))
        .then_with(|| b.entry.last_used_at.cmp(&a.entry.last_used_at))
        .then_with(|| a.entry.topic_key.cmp(&b.entry.topic_key))
}

/// Counts exact and containment keyword pairs between two keyword lists.
///
/// Both lists are lowercased and de-duplicated. Exact pairs are matched
/// first; containment is only tried among the keywords left over, and each
/// keyword takes part in at most one pair.
pub fn keyword_overlap(left: &[String], right: &[String]) -> (usize, usize) {
    let left = normalized_set(left);
    let right = normalized_set(right);

    let mut left_used = vec![false; left.len()];
    let mut right_used = vec![false; right.len()];
    let mut exact = 0;
    let mut partial = 0;

    for (i, l) in left.iter().enumerate() {
        if let Some(j) = (0..right.len()).find(|&j| !right_used[j] && right[j] == *l) {
            left_used[i] = true;
            right_used[j] = true;
            exact += 1;
        }
    }

    for (i, l) in left.iter().enumerate() {
        if left_used[i] {
            continue;
        }
        if let Some(j) = (0..right.len())
            .find(|&j| !right_used[j] && (right[j].contains(l.as_str()) || l.contains(right[j].as_str())))
        {
            left_used[i] = true;
            right_used[j] = true;
            partial += 1;
        }
    }

    (exact, partial)
}

fn normalized_set(keywords: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty() && seen.insert(k.clone()))
        .collect()
}

/// Case-insensitive title similarity in `[0, 1]`.
///
/// Containment scores `shorter / longer`; otherwise the normalized
/// Levenshtein similarity `1 - distance / longer` is used.
pub fn title_similarity(a: &str, b: &str) -> f64 {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let len_a = a.chars().count();
    let len_b = b.chars().count();
    let longer = len_a.max(len_b) as f64;

    if a.contains(b.as_str()) || b.contains(a.as_str()) {
        return len_a.min(len_b) as f64 / longer;
    }

    1.0 - levenshtein(&a, &b) as f64 / longer
}

/// Levenshtein edit distance over characters.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// A pluggable way of ranking registry entries against a topic.
///
/// The router and the registry share one strategy so every feature ranks
/// destinations the same way.
pub trait ScoringStrategy: Send + Sync {
    /// Scores one entry.
    fn score(&self, topic: &Topic, entry: &RegistryEntry, now: DateTime<Utc>) -> MatchResult;

    /// Maps a best score onto a decision.
    fn decide(&self, score: f64) -> RouteDecision {
        get_decision(score)
    }

    /// Scores all entries and returns the top `limit`, best first.
    fn rank(
        &self,
        topic: &Topic,
        registry: &[RegistryEntry],
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<MatchResult> {
        let mut matches: Vec<MatchResult> = registry
            .iter()
            .map(|entry| self.score(topic, entry, now))
            .collect();
        matches.sort_by(compare_matches);
        matches.truncate(limit);
        matches
    }
}

/// The lexical (keyword, title, usage, recency) scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalScorer;

impl ScoringStrategy for LexicalScorer {
    fn score(&self, topic: &Topic, entry: &RegistryEntry, now: DateTime<Utc>) -> MatchResult {
        score_topic_match(topic, entry, now)
    }
}
