use colored_json::ToColoredJson;
use std::collections::BTreeMap;
use std::fmt;
use tabled::{Table, Tabled, settings::Style};
use terminal_size::{Width as TWidth, terminal_size};
use textwrap::fill as tw_fill;

use crate::models::WeaponRecord;

const TOP_CATEGORIES: usize = 10;
const SAMPLE_ROWS: usize = 5;

/// What the CLI prints to stdout once files are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrintMode {
    #[default]
    Summary,
    Table,
    Json,
    None,
}

impl fmt::Display for PrintMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PrintMode::Summary => "summary",
            PrintMode::Table => "table",
            PrintMode::Json => "json",
            PrintMode::None => "none",
        };
        f.write_str(s)
    }
}

pub fn calc_name_wrap_columns() -> usize {
    let term_cols = match terminal_size().map(|(w, _)| w) {
        Some(TWidth(n)) if n > 20 => n as usize,
        _ => 100usize,
    };
    // three name columns share what is left after the category column
    (term_cols.saturating_sub(30) / 3).max(16)
}

pub fn print_pretty_json(records: &[WeaponRecord]) {
    match serde_json::to_string_pretty(records) {
        Ok(s) => match s.to_colored_json_auto() {
            Ok(cs) => println!("{cs}"),
            Err(_) => println!("{s}"),
        },
        Err(e) => eprintln!("failed to serialize weapons: {e}"),
    }
}

#[derive(Clone, Tabled)]
struct DisplayRow {
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "TOC Name")]
    toc_name: String,
    #[tabled(rename = "Real-World Name")]
    real_world_name: String,
    #[tabled(rename = "In-Game Name")]
    in_game_name: String,
}

impl From<&WeaponRecord> for DisplayRow {
    fn from(r: &WeaponRecord) -> Self {
        Self {
            category: r.category.clone(),
            toc_name: r.toc_name.clone(),
            real_world_name: r.real_world_name.clone(),
            in_game_name: r.in_game_name.clone(),
        }
    }
}

pub fn print_weapon_table(records: &[WeaponRecord]) {
    if records.is_empty() {
        println!("No weapons.");
        return;
    }
    // Group by game, keeping the order games first appear in
    let mut order: Vec<&str> = Vec::new();
    let mut grouped: BTreeMap<&str, Vec<DisplayRow>> = BTreeMap::new();
    for r in records {
        if !grouped.contains_key(r.game.as_str()) {
            order.push(&r.game);
        }
        grouped.entry(&r.game).or_default().push(DisplayRow::from(r));
    }
    let wrap = calc_name_wrap_columns();
    let plain = std::env::var("NO_TABLE").ok().as_deref() == Some("1");

    for game in order {
        let Some(rows) = grouped.get_mut(game) else {
            continue;
        };
        println!("{game}:");
        if plain {
            for r in rows.iter() {
                println!("  - {} [{}]", r.toc_name, r.category);
            }
            println!();
            continue;
        }
        for r in rows.iter_mut() {
            for cell in [&mut r.toc_name, &mut r.real_world_name, &mut r.in_game_name] {
                if cell.len() > wrap {
                    *cell = tw_fill(cell, wrap);
                }
            }
        }
        let mut table = Table::new(rows.clone());
        table.with(Style::rounded());
        println!("{table}\n");
    }
}

/// Aggregate figures for a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct WeaponSummary {
    pub total: usize,
    /// Records per game, most first; ties by name.
    pub per_game: Vec<(String, usize)>,
    /// Records per category, most first; ties by name.
    pub per_category: Vec<(String, usize)>,
    pub real_names_found: usize,
    pub in_game_differs: usize,
}

fn ranked(counts: BTreeMap<String, usize>) -> Vec<(String, usize)> {
    let mut v: Vec<(String, usize)> = counts.into_iter().collect();
    v.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    v
}

fn percent(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

impl WeaponSummary {
    pub fn from_records(records: &[WeaponRecord]) -> Self {
        let mut games = BTreeMap::new();
        let mut categories = BTreeMap::new();
        for r in records {
            *games.entry(r.game.clone()).or_insert(0) += 1;
            *categories.entry(r.category.clone()).or_insert(0) += 1;
        }
        Self {
            total: records.len(),
            per_game: ranked(games),
            per_category: ranked(categories),
            real_names_found: records
                .iter()
                .filter(|r| !r.real_world_name.is_empty())
                .count(),
            in_game_differs: records
                .iter()
                .filter(|r| r.in_game_name != r.toc_name)
                .count(),
        }
    }

    pub fn real_name_rate(&self) -> f64 {
        percent(self.real_names_found, self.total)
    }

    pub fn in_game_differs_rate(&self) -> f64 {
        percent(self.in_game_differs, self.total)
    }

    pub fn render(&self, records: &[WeaponRecord]) -> String {
        let rule = "=".repeat(60);
        let mut lines = vec![
            String::new(),
            rule.clone(),
            "WEAPONS DATA SUMMARY".to_string(),
            rule.clone(),
            String::new(),
            format!("Total weapons found: {}", self.total),
            format!("Games: {}", self.per_game.len()),
            format!("Categories: {}", self.per_category.len()),
            String::new(),
            "--- Weapons per game ---".to_string(),
        ];
        for (game, n) in &self.per_game {
            lines.push(format!("{game}: {n}"));
        }
        lines.push(String::new());
        lines.push("--- Weapons per category ---".to_string());
        for (category, n) in self.per_category.iter().take(TOP_CATEGORIES) {
            let label = if category.is_empty() { "(none)" } else { category };
            lines.push(format!("{label}: {n}"));
        }
        if self.per_category.len() > TOP_CATEGORIES {
            lines.push(format!(
                "... and {} more categories",
                self.per_category.len() - TOP_CATEGORIES
            ));
        }
        lines.push(String::new());
        lines.push("--- Extraction statistics ---".to_string());
        lines.push(format!(
            "Real-world names found: {}/{} ({:.1}%)",
            self.real_names_found,
            self.total,
            self.real_name_rate()
        ));
        lines.push(format!(
            "In-game names differ from TOC: {}/{} ({:.1}%)",
            self.in_game_differs,
            self.total,
            self.in_game_differs_rate()
        ));

        let sample: Vec<DisplayRow> = records.iter().take(SAMPLE_ROWS).map(DisplayRow::from).collect();
        if !sample.is_empty() {
            let mut table = Table::new(sample);
            table.with(Style::rounded());
            lines.push(String::new());
            lines.push(format!("--- Sample data (first {SAMPLE_ROWS} weapons) ---"));
            lines.push(table.to_string());
        }
        lines.push(rule);
        lines.join("\n") + "\n"
    }
}

pub fn print_summary(records: &[WeaponRecord]) {
    if records.is_empty() {
        tracing::warn!("no weapons data to summarize");
        return;
    }
    print!("{}", WeaponSummary::from_records(records).render(records));
}
