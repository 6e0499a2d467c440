use std::fmt::Write;

use crate::dedup::{DedupStrategy, DeduplicationStats};

const RULE_WIDTH: usize = 60;

/// Human-readable summary of a deduplication run.
pub fn render_report(stats: &DeduplicationStats) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out, "DEDUPLICATION REPORT");
    let _ = writeln!(out, "{rule}");
    let _ = writeln!(out);
    let _ = writeln!(out, "Strategy: {}", stats.strategy);
    let _ = writeln!(out, "Original weapons: {}", stats.original_count);
    let _ = writeln!(out, "Unique weapons: {}", stats.final_count);
    let _ = writeln!(out, "Duplicates removed: {}", stats.duplicates_removed());
    let _ = writeln!(out, "Reduction: {:.1}%", stats.reduction_percent());

    if stats.strategy == DedupStrategy::Comprehensive {
        let _ = writeln!(out);
        let _ = writeln!(out, "Pass breakdown:");
        let _ = writeln!(out, "  - Exact matching: {} duplicates", stats.exact_removed);
        let _ = writeln!(out, "  - Fuzzy matching: {} duplicates", stats.fuzzy_removed);
        let _ = writeln!(out, "  - Hash detection: {} duplicates", stats.hash_removed);
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Weapons by game:");
    for (game, count) in &stats.by_game {
        let _ = writeln!(out, "  - {game}: {count} weapons");
    }
    let _ = writeln!(out, "{rule}");
    out
}
