use tracing::{debug, info, warn};

use crate::document::{Block, Document, TocEntry};
use crate::extractor::{NameExtractor, normalize_whitespace};
use crate::models::{ParseMethod, WeaponRecord};

/// Heading level that opens a weapon category.
pub const CATEGORY_LEVEL: u8 = 2;
/// Heading levels that name individual weapons.
pub const WEAPON_LEVELS: std::ops::RangeInclusive<u8> = 3..=4;

/// Section titles that never describe a weapon.
pub const NON_WEAPON_SECTIONS: &[&str] = &[
    "gallery",
    "notes",
    "external links",
    "see also",
    "contents",
    "references",
    "trivia",
    "cast",
    "crew",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TraversalState {
    #[default]
    SeekingCategory,
    InCategory,
}

/// Category context threaded through one page's traversal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryContext {
    pub state: TraversalState,
    pub category: String,
}

impl CategoryContext {
    fn enter(category: &str) -> Self {
        Self {
            state: TraversalState::InCategory,
            category: category.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct WeaponParser {
    extractor: NameExtractor,
}

impl WeaponParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records for one game's page, in document order.
    pub fn parse(&self, document: &Document, game: &str, method: ParseMethod) -> Vec<WeaponRecord> {
        let game = game.trim();
        if game.is_empty() {
            warn!("refusing to parse a page without a game name");
            return Vec::new();
        }
        let records = match method {
            ParseMethod::Content => self.parse_content(document, game),
            ParseMethod::Toc => self.parse_toc(document, game),
        };
        info!(game = %game, method = %method, records = records.len(), "parsed weapons");
        records
    }

    fn parse_content(&self, document: &Document, game: &str) -> Vec<WeaponRecord> {
        let mut records = Vec::new();
        let mut ctx = CategoryContext::default();
        for (index, block) in document.blocks().iter().enumerate() {
            let Block::Heading { level, text } = block else {
                continue;
            };
            let fallback = document.following_paragraph(index).unwrap_or("");
            ctx = self.step(ctx, *level, text, fallback, game, &mut records);
        }
        records
    }

    fn parse_toc(&self, document: &Document, game: &str) -> Vec<WeaponRecord> {
        let Some(entries) = document.toc() else {
            debug!(game = %game, "no table of contents on page");
            return Vec::new();
        };
        let mut records = Vec::new();
        let mut ctx = CategoryContext::default();
        for TocEntry { level, text } in entries {
            // toclevel-1 corresponds to a second-level heading
            ctx = self.step(ctx, level + 1, text, "", game, &mut records);
        }
        records
    }

    /// Advance the traversal by one heading, emitting a record for weapon headings.
    pub fn step(
        &self,
        ctx: CategoryContext,
        level: u8,
        heading: &str,
        fallback: &str,
        game: &str,
        out: &mut Vec<WeaponRecord>,
    ) -> CategoryContext {
        let heading = normalize_whitespace(heading);
        if heading.is_empty() || is_non_weapon_section(&heading) {
            return ctx;
        }
        if level == CATEGORY_LEVEL {
            debug!(category = %heading, "category");
            return CategoryContext::enter(&heading);
        }
        if WEAPON_LEVELS.contains(&level) {
            let (real_world_name, in_game_name) =
                self.extractor.extract(&heading, fallback).into_pair();
            debug!(weapon = %heading, real = %real_world_name, in_game = %in_game_name, "weapon");
            out.push(WeaponRecord {
                game: game.to_string(),
                category: ctx.category.clone(),
                toc_name: heading,
                real_world_name,
                in_game_name,
            });
        }
        ctx
    }
}

pub fn is_non_weapon_section(heading: &str) -> bool {
    let lowered = normalize_whitespace(heading).to_lowercase();
    NON_WEAPON_SECTIONS.iter().any(|m| *m == lowered)
}
