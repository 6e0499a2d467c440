use serde::{Deserialize, Serialize};
use std::fmt;

/// One firearm appearance in one game.
///
/// Empty strings mean "not extracted"; fields are never absent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct WeaponRecord {
    pub game: String,
    pub category: String,
    pub toc_name: String,
    pub real_world_name: String,
    pub in_game_name: String,
}

impl WeaponRecord {
    pub fn new(
        game: impl Into<String>,
        category: impl Into<String>,
        toc_name: impl Into<String>,
        real_world_name: impl Into<String>,
        in_game_name: impl Into<String>,
    ) -> Self {
        Self {
            game: game.into(),
            category: category.into(),
            toc_name: toc_name.into(),
            real_world_name: real_world_name.into(),
            in_game_name: in_game_name.into(),
        }
    }

    /// The three name fields in a fixed order: real-world, toc, in-game.
    pub fn names(&self) -> [&str; 3] {
        [&self.real_world_name, &self.toc_name, &self.in_game_name]
    }

    /// Best display label: the real-world name when known, the toc name otherwise.
    pub fn display_name(&self) -> &str {
        if self.real_world_name.is_empty() {
            &self.toc_name
        } else {
            &self.real_world_name
        }
    }
}

/// A game page to scrape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameSource {
    pub name: String,
    pub url: String,
}

impl GameSource {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }

    /// Parse a `NAME=URL` pair as given on the command line.
    pub fn parse_pair(raw: &str) -> Option<Self> {
        let (name, url) = raw.split_once('=')?;
        let name = name.trim();
        let url = url.trim();
        if name.is_empty() || url.is_empty() {
            return None;
        }
        Some(Self::new(name, url))
    }
}

/// Page traversal strategy for the weapon parser.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParseMethod {
    /// Walk every heading in the page body.
    #[default]
    Content,
    /// Read only the table of contents.
    Toc,
}

impl fmt::Display for ParseMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseMethod::Content => write!(f, "content"),
            ParseMethod::Toc => write!(f, "toc"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_pair_splits_on_first_equals() {
        let g = GameSource::parse_pair("MW2=https://www.imfdb.org/wiki/X?a=b").unwrap();
        assert_eq!(g.name, "MW2");
        assert_eq!(g.url, "https://www.imfdb.org/wiki/X?a=b");
    }

    #[test]
    fn parse_pair_rejects_missing_parts() {
        assert!(GameSource::parse_pair("no-separator").is_none());
        assert!(GameSource::parse_pair("=https://x").is_none());
        assert!(GameSource::parse_pair("name=  ").is_none());
    }

    #[test]
    fn parse_method_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&ParseMethod::Toc).unwrap(), "\"toc\"");
        assert_eq!(ParseMethod::Content.to_string(), "content");
    }

    #[test]
    fn display_name_prefers_real_world() {
        let r = WeaponRecord::new("G", "Rifles", "M4A1", "Colt M4A1 Carbine", "M4");
        assert_eq!(r.display_name(), "Colt M4A1 Carbine");
        let r = WeaponRecord::new("G", "Rifles", "M4A1", "", "M4");
        assert_eq!(r.display_name(), "M4A1");
    }

    #[test]
    fn serializes_exactly_five_fields_in_order() {
        let r = WeaponRecord::new("G", "", "Glock 17", "", "Glock 17");
        let s = serde_json::to_string(&r).unwrap();
        assert_eq!(
            s,
            r#"{"game":"G","category":"","toc_name":"Glock 17","real_world_name":"","in_game_name":"Glock 17"}"#
        );
    }
}
