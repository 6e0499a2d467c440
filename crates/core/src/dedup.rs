//! Near-duplicate removal for weapon records.
//!
//! Every pass keeps the earliest record of a duplicate group untouched and
//! drops the later ones, so the output is always an order-preserving
//! subsequence of the input.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::WeaponRecord;

pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.85;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DedupError {
    #[error("unknown deduplication strategy '{0}' (expected exact, fuzzy or comprehensive)")]
    UnknownStrategy(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DedupStrategy {
    Exact,
    Fuzzy,
    #[default]
    Comprehensive,
}

impl fmt::Display for DedupStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DedupStrategy::Exact => write!(f, "exact"),
            DedupStrategy::Fuzzy => write!(f, "fuzzy"),
            DedupStrategy::Comprehensive => write!(f, "comprehensive"),
        }
    }
}

impl FromStr for DedupStrategy {
    type Err = DedupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(DedupStrategy::Exact),
            "fuzzy" => Ok(DedupStrategy::Fuzzy),
            "comprehensive" => Ok(DedupStrategy::Comprehensive),
            _ => Err(DedupError::UnknownStrategy(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DedupOptions {
    pub strategy: DedupStrategy,
    /// Minimum similarity for the fuzzy pass, in [0, 1].
    pub threshold: f64,
}

impl Default for DedupOptions {
    fn default() -> Self {
        Self {
            strategy: DedupStrategy::default(),
            threshold: DEFAULT_SIMILARITY_THRESHOLD,
        }
    }
}

impl DedupOptions {
    pub fn new(strategy: DedupStrategy, threshold: f64) -> Self {
        Self {
            strategy,
            threshold: threshold.clamp(0.0, 1.0),
        }
    }
}

/// Removal counts accumulated pass by pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassCounts {
    pub exact: usize,
    pub fuzzy: usize,
    pub hash: usize,
}

impl PassCounts {
    pub fn total(&self) -> usize {
        self.exact + self.fuzzy + self.hash
    }
}

/// Outcome of one deduplication run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeduplicationStats {
    pub strategy: DedupStrategy,
    pub original_count: usize,
    pub final_count: usize,
    pub exact_removed: usize,
    pub fuzzy_removed: usize,
    pub hash_removed: usize,
    /// Retained records per game.
    pub by_game: BTreeMap<String, usize>,
}

impl DeduplicationStats {
    fn finish(
        strategy: DedupStrategy,
        original_count: usize,
        counts: PassCounts,
        retained: &[WeaponRecord],
    ) -> Self {
        let mut by_game = BTreeMap::new();
        for r in retained {
            *by_game.entry(r.game.clone()).or_insert(0) += 1;
        }
        Self {
            strategy,
            original_count,
            final_count: retained.len(),
            exact_removed: counts.exact,
            fuzzy_removed: counts.fuzzy,
            hash_removed: counts.hash,
            by_game,
        }
    }

    pub fn duplicates_removed(&self) -> usize {
        self.exact_removed + self.fuzzy_removed + self.hash_removed
    }

    pub fn reduction_percent(&self) -> f64 {
        if self.original_count == 0 {
            0.0
        } else {
            self.duplicates_removed() as f64 / self.original_count as f64 * 100.0
        }
    }
}

/// Lowercase, drop everything but alphanumerics and whitespace, collapse runs.
pub fn normalize_name(name: &str) -> String {
    let kept: String = name
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn game_key(game: &str) -> String {
    game.trim().to_lowercase()
}

/// Ratcliff/Obershelp ratio: twice the matched characters over the total length.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_chars(&a, &b) as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (i, j, k) = longest_match(a, b);
    if k == 0 {
        return 0;
    }
    k + matching_chars(&a[..i], &b[..j]) + matching_chars(&a[i + k..], &b[j + k..])
}

/// Longest common block as `(start_a, start_b, len)`, earliest in `a` on ties.
fn longest_match(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for i in 0..a.len() {
        for j in 0..b.len() {
            curr[j + 1] = if a[i] == b[j] { prev[j] + 1 } else { 0 };
            let k = curr[j + 1];
            if k > best.2 {
                best = (i + 1 - k, j + 1 - k, k);
            }
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    best
}

fn normalized_names(record: &WeaponRecord) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(3);
    for name in record.names() {
        let n = normalize_name(name);
        if !n.is_empty() && !names.contains(&n) {
            names.push(n);
        }
    }
    names
}

/// Highest similarity between any name of `a` and any name of `b`.
/// Records from different games never match.
pub fn record_similarity(a: &WeaponRecord, b: &WeaponRecord) -> f64 {
    if game_key(&a.game) != game_key(&b.game) {
        return 0.0;
    }
    let names_a = normalized_names(a);
    let names_b = normalized_names(b);
    names_a
        .iter()
        .flat_map(|x| names_b.iter().map(move |y| similarity(x, y)))
        .fold(0.0, f64::max)
}

/// Pass 1: same game and same normalized toc name.
pub fn exact_pass(records: Vec<WeaponRecord>, mut counts: PassCounts) -> (Vec<WeaponRecord>, PassCounts) {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(records.len());
    for record in records {
        let key = (game_key(&record.game), normalize_name(&record.toc_name));
        if seen.insert(key) {
            kept.push(record);
        } else {
            counts.exact += 1;
            debug!(pass = "exact", toc_name = %record.toc_name, game = %record.game, "duplicate removed");
        }
    }
    (kept, counts)
}

/// Pass 2: name similarity at or above `threshold` within the same game.
pub fn fuzzy_pass(
    records: Vec<WeaponRecord>,
    mut counts: PassCounts,
    threshold: f64,
) -> (Vec<WeaponRecord>, PassCounts) {
    let mut kept: Vec<WeaponRecord> = Vec::with_capacity(records.len());
    for record in records {
        let earlier = kept
            .iter()
            .find(|k| record_similarity(k, &record) >= threshold);
        match earlier {
            Some(k) => {
                counts.fuzzy += 1;
                debug!(
                    pass = "fuzzy",
                    toc_name = %record.toc_name,
                    kept = %k.toc_name,
                    game = %record.game,
                    "duplicate removed"
                );
            }
            None => kept.push(record),
        }
    }
    (kept, counts)
}

fn content_key(record: &WeaponRecord) -> String {
    let mut names: Vec<String> = record
        .names()
        .iter()
        .map(|n| normalize_name(n))
        .filter(|n| !n.is_empty())
        .collect();
    names.sort();
    format!("{}|{}", game_key(&record.game), names.join("|"))
}

/// Pass 3: same set of names regardless of which field holds which.
pub fn hash_pass(records: Vec<WeaponRecord>, mut counts: PassCounts) -> (Vec<WeaponRecord>, PassCounts) {
    let mut seen = HashSet::new();
    let mut kept = Vec::with_capacity(records.len());
    for record in records {
        if seen.insert(content_key(&record)) {
            kept.push(record);
        } else {
            counts.hash += 1;
            debug!(pass = "hash", toc_name = %record.toc_name, game = %record.game, "duplicate removed");
        }
    }
    (kept, counts)
}

/// Deduplicate `records` with the configured strategy.
pub fn deduplicate(
    records: &[WeaponRecord],
    options: &DedupOptions,
) -> (Vec<WeaponRecord>, DeduplicationStats) {
    info!(
        records = records.len(),
        strategy = %options.strategy,
        "starting deduplication"
    );
    let input = records.to_vec();
    let counts = PassCounts::default();
    let (kept, counts) = match options.strategy {
        DedupStrategy::Exact => exact_pass(input, counts),
        DedupStrategy::Fuzzy => fuzzy_pass(input, counts, options.threshold),
        DedupStrategy::Comprehensive => {
            let (after_exact, counts) = exact_pass(input, counts);
            let (after_fuzzy, counts) = fuzzy_pass(after_exact, counts, options.threshold);
            hash_pass(after_fuzzy, counts)
        }
    };
    let stats = DeduplicationStats::finish(options.strategy, records.len(), counts, &kept);
    info!(
        original = stats.original_count,
        unique = stats.final_count,
        removed = stats.duplicates_removed(),
        "deduplication complete"
    );
    (kept, stats)
}

/// Like [`deduplicate`], with the strategy given by name.
pub fn deduplicate_named(
    records: &[WeaponRecord],
    strategy: &str,
    threshold: f64,
) -> Result<(Vec<WeaponRecord>, DeduplicationStats), DedupError> {
    let strategy = strategy.parse::<DedupStrategy>()?;
    Ok(deduplicate(records, &DedupOptions::new(strategy, threshold)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rec(game: &str, toc: &str, real: &str, in_game: &str) -> WeaponRecord {
        WeaponRecord::new(game, "Rifles", toc, real, in_game)
    }

    fn is_subsequence(sub: &[WeaponRecord], full: &[WeaponRecord]) -> bool {
        let mut it = full.iter();
        sub.iter().all(|s| it.any(|f| f == s))
    }

    fn sample() -> Vec<WeaponRecord> {
        vec![
            rec("G", "M4A1", "Colt M4A1 Carbine", ""),
            rec("G", "m4a1!", "", "M4"),
            rec("G", "M4A1 Carbine", "Colt M4A1 Carbine", "M4"),
            rec("G", "AK-47", "", "AK-47"),
            rec("H", "AK-47", "", "AK-47"),
            rec("G", "Kastov 762", "Kalashnikov AKM", "Kastov"),
            rec("G", "Kalashnikov AKM", "Kastov", "Kastov 762"),
            rec("G", "Glock 17", "", "Glock 17"),
        ]
    }

    #[test]
    fn normalize_strips_punctuation_and_case() {
        assert_eq!(normalize_name("  Colt M4A1-Carbine™  (Mk. II) "), "colt m4a1carbine mk ii");
        assert_eq!(normalize_name("AK-47"), "ak47");
        assert_eq!(normalize_name("!!!"), "");
    }

    #[test]
    fn exact_merges_names_differing_only_in_punctuation() {
        let input = vec![rec("G", "AK-47", "", "AK-47"), rec("G", "AK47", "", "AK47")];
        let (out, stats) = deduplicate(&input, &DedupOptions::new(DedupStrategy::Exact, 0.85));
        assert_eq!(out, vec![input[0].clone()]);
        assert_eq!(stats.exact_removed, 1);
    }

    #[test]
    fn similarity_matches_sequence_ratio() {
        assert_eq!(similarity("abcd", "abcd"), 1.0);
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", ""), 0.0);
        assert_eq!(similarity("m4a1", "m4a1 carbine"), 0.5);
        // "abxcd" vs "abcd": blocks "ab" + "cd"
        assert!((similarity("abxcd", "abcd") - 8.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn strategy_parsing() {
        assert_eq!("Exact".parse::<DedupStrategy>(), Ok(DedupStrategy::Exact));
        assert_eq!(" fuzzy ".parse::<DedupStrategy>(), Ok(DedupStrategy::Fuzzy));
        assert_eq!(
            "bogus".parse::<DedupStrategy>(),
            Err(DedupError::UnknownStrategy("bogus".into()))
        );
    }

    #[test]
    fn unknown_strategy_is_an_error() {
        let err = deduplicate_named(&sample(), "bogus", 0.85).unwrap_err();
        assert_eq!(err, DedupError::UnknownStrategy("bogus".into()));
    }

    #[test]
    fn empty_input_gives_zero_stats() {
        for strategy in [DedupStrategy::Exact, DedupStrategy::Fuzzy, DedupStrategy::Comprehensive] {
            let (out, stats) = deduplicate(&[], &DedupOptions::new(strategy, 0.85));
            assert!(out.is_empty());
            assert_eq!(stats.original_count, 0);
            assert_eq!(stats.final_count, 0);
            assert_eq!(stats.duplicates_removed(), 0);
            assert!(stats.by_game.is_empty());
            assert_eq!(stats.reduction_percent(), 0.0);
        }
    }

    #[test]
    fn exact_keeps_first_per_game_and_toc() {
        let (out, stats) = deduplicate(&sample(), &DedupOptions::new(DedupStrategy::Exact, 0.85));
        assert_eq!(stats.exact_removed, 1);
        assert_eq!(out.len(), 7);
        assert_eq!(out[0], sample()[0]);
        assert!(out.iter().any(|r| r.game == "H"));
    }

    #[test]
    fn exact_is_idempotent() {
        let opts = DedupOptions::new(DedupStrategy::Exact, 0.85);
        let (once, _) = deduplicate(&sample(), &opts);
        let (twice, stats) = deduplicate(&once, &opts);
        assert_eq!(once, twice);
        assert_eq!(stats.duplicates_removed(), 0);
    }

    #[test]
    fn fuzzy_merges_later_into_earlier() {
        let input = vec![
            rec("G", "M4A1", "Colt M4A1 Carbine", ""),
            rec("G", "M4A1 Carbine", "Colt M4A1 Carbine", "M4"),
        ];
        let (out, stats) = deduplicate(&input, &DedupOptions::new(DedupStrategy::Fuzzy, 0.85));
        assert_eq!(out, vec![input[0].clone()]);
        assert_eq!(stats.fuzzy_removed, 1);
    }

    #[test]
    fn fuzzy_never_crosses_games() {
        let input = vec![rec("G", "AK-47", "", ""), rec("H", "AK-47", "", "")];
        let (out, _) = deduplicate(&input, &DedupOptions::new(DedupStrategy::Fuzzy, 0.85));
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn fuzzy_respects_threshold() {
        let input = vec![rec("G", "M4A1", "", ""), rec("G", "M4A1 Carbine", "", "")];
        let (out, _) = deduplicate(&input, &DedupOptions::new(DedupStrategy::Fuzzy, 0.85));
        assert_eq!(out.len(), 2);
        let (out, _) = deduplicate(&input, &DedupOptions::new(DedupStrategy::Fuzzy, 0.5));
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn hash_pass_catches_field_transpositions() {
        let input = vec![
            rec("G", "Alpha Rifle", "Bravo Carbine", "Charlie"),
            rec("G", "Charlie", "Alpha Rifle", "Bravo Carbine"),
        ];
        let (out, counts) = hash_pass(input.clone(), PassCounts::default());
        assert_eq!(out, vec![input[0].clone()]);
        assert_eq!(counts.hash, 1);
    }

    #[test]
    fn comprehensive_counts_each_pass() {
        let input = sample();
        let (out, stats) = deduplicate(&input, &DedupOptions::default());
        assert_eq!(stats.strategy, DedupStrategy::Comprehensive);
        assert_eq!(stats.original_count - stats.final_count, stats.duplicates_removed());
        assert_eq!(stats.exact_removed, 1);
        assert!(stats.fuzzy_removed >= 1);
        assert_eq!(out.len(), stats.final_count);
        assert_eq!(stats.by_game.get("H"), Some(&1));
        assert_eq!(stats.by_game.values().sum::<usize>(), stats.final_count);
    }

    #[test]
    fn comprehensive_removes_at_least_as_many_as_exact() {
        let input = sample();
        let (exact, _) = deduplicate(&input, &DedupOptions::new(DedupStrategy::Exact, 0.85));
        let (full, _) = deduplicate(&input, &DedupOptions::default());
        assert!(full.len() <= exact.len());
    }

    #[test]
    fn output_is_ordered_subsequence_of_input() {
        let input = sample();
        for strategy in [DedupStrategy::Exact, DedupStrategy::Fuzzy, DedupStrategy::Comprehensive] {
            let (out, stats) = deduplicate(&input, &DedupOptions::new(strategy, 0.85));
            assert!(out.len() <= input.len());
            assert!(is_subsequence(&out, &input), "{strategy} reordered records");
            assert_eq!(stats.original_count - stats.final_count, stats.duplicates_removed());
        }
    }

    #[test]
    fn distinct_records_are_untouched() {
        let input = vec![
            rec("G", "Glock 17", "", "Glock 17"),
            rec("G", "Remington 870", "", "Remington 870"),
        ];
        let (out, stats) = deduplicate(&input, &DedupOptions::default());
        assert_eq!(out, input);
        assert_eq!(stats.duplicates_removed(), 0);
    }

    #[test]
    fn threshold_is_clamped() {
        assert_eq!(DedupOptions::new(DedupStrategy::Fuzzy, 3.0).threshold, 1.0);
        assert_eq!(DedupOptions::new(DedupStrategy::Fuzzy, -1.0).threshold, 0.0);
    }
}
