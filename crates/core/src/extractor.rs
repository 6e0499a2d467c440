//! Heuristic name extraction from weapon headings.
//!
//! IMFDB headings usually read `Real Name (In-Game Name)` or
//! `Real Name - In-Game Name`. When neither shape is present the heading is
//! taken as the in-game name and the paragraph under it is scanned for the
//! real-world firearm.

use regex::Regex;
use std::sync::LazyLock;

/// Shortest accepted name, in characters.
pub const MIN_NAME_LEN: usize = 2;
/// Longest accepted name, in characters.
pub const MAX_NAME_LEN: usize = 120;

static PARENTHETICAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<real>[^()]*?)\s*\((?P<alias>[^()]*)\)").expect("static regex")
});

static DASHED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<real>.+?)(?:\s+-\s+|\s*–\s*)(?P<alias>.+)$").expect("static regex")
});

static KEYWORD_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:based\s+on|modell?ed\s+(?:on|after)|actually|real(?:[- ]world|[- ]life)?(?:\s+(?:name|counterpart|weapon|firearm))?\s+(?:is|was))\s+(?:an?\s+|the\s+)?(?P<name>[^,;:()]+)",
    )
    .expect("static regex")
});

static DESIGNATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\((?P<name>[A-Z][^()]*\d[^()]*)\)").expect("static regex")
});

static STOP_WORDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(?:is|was|which|that|who|with|but|and|in|as|from|although|though|while|for)\b")
        .expect("static regex")
});

/// Collapse whitespace runs to one space and trim.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep a name only when its length is plausible.
fn validated(name: &str) -> String {
    let name = normalize_whitespace(name);
    let len = name.chars().count();
    if (MIN_NAME_LEN..=MAX_NAME_LEN).contains(&len) {
        name
    } else {
        String::new()
    }
}

/// Real-world / in-game pair; either side may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedNames {
    pub real_world_name: String,
    pub in_game_name: String,
}

impl ExtractedNames {
    pub fn new(real_world_name: &str, in_game_name: &str) -> Self {
        Self {
            real_world_name: validated(real_world_name),
            in_game_name: validated(in_game_name),
        }
    }

    pub fn into_pair(self) -> (String, String) {
        (self.real_world_name, self.in_game_name)
    }
}

/// Text handed to each rule. Both fields are already whitespace-normalized.
#[derive(Debug, Clone, Copy)]
pub struct Fragment<'a> {
    pub heading: &'a str,
    pub fallback: &'a str,
}

/// One step of the extraction cascade.
pub trait NameRule: Send + Sync {
    fn name(&self) -> &'static str;

    /// `None` means the rule does not apply and the next one should run.
    fn try_match(&self, fragment: Fragment<'_>) -> Option<ExtractedNames>;
}

/// `Real Name (In-Game Name)`
#[derive(Debug, Default)]
pub struct ParentheticalRule;

impl NameRule for ParentheticalRule {
    fn name(&self) -> &'static str {
        "parenthetical"
    }

    fn try_match(&self, fragment: Fragment<'_>) -> Option<ExtractedNames> {
        let caps = PARENTHETICAL.captures(fragment.heading)?;
        Some(ExtractedNames::new(&caps["real"], &caps["alias"]))
    }
}

/// `Real Name - In-Game Name` with a spaced hyphen or an en-dash.
#[derive(Debug, Default)]
pub struct DashRule;

impl NameRule for DashRule {
    fn name(&self) -> &'static str {
        "dash"
    }

    fn try_match(&self, fragment: Fragment<'_>) -> Option<ExtractedNames> {
        let caps = DASHED.captures(fragment.heading)?;
        Some(ExtractedNames::new(&caps["real"], &caps["alias"]))
    }
}

/// Whole heading as in-game name, real name recovered from the fallback text.
#[derive(Debug, Default)]
pub struct SingleNameRule;

impl NameRule for SingleNameRule {
    fn name(&self) -> &'static str {
        "single-name"
    }

    fn try_match(&self, fragment: Fragment<'_>) -> Option<ExtractedNames> {
        if fragment.heading.is_empty() {
            return None;
        }
        let real = scan_fallback(fragment.fallback).unwrap_or_default();
        Some(ExtractedNames::new(&real, fragment.heading))
    }
}

/// First sentence naming the real firearm, either through keyword context
/// ("based on", "actually", "real name is") or a parenthesized designation
/// such as "(Heckler & Koch HK93)".
pub fn scan_fallback(text: &str) -> Option<String> {
    sentences(text).find_map(|sentence| {
        let from_keyword = KEYWORD_NAME
            .captures(sentence)
            .map(|c| trim_candidate(&c["name"]))
            .filter(|n| !validated(n).is_empty());
        from_keyword.or_else(|| {
            DESIGNATION
                .captures(sentence)
                .map(|c| trim_candidate(&c["name"]))
                .filter(|n| !validated(n).is_empty())
        })
    })
}

fn trim_candidate(raw: &str) -> String {
    let cut = match STOP_WORDS.find(raw) {
        Some(m) => &raw[..m.start()],
        None => raw,
    };
    cut.trim()
        .trim_end_matches(['.', '!', '?', '"', '\''])
        .trim_start_matches(['"', '\''])
        .trim()
        .to_string()
}

/// Split on `.`, `!` or `?` followed by whitespace, so "7.62mm" stays intact.
fn sentences(text: &str) -> impl Iterator<Item = &str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let at_break = chars.peek().is_none_or(|(_, next)| next.is_whitespace());
            if at_break {
                let end = i + c.len_utf8();
                out.push(text[start..end].trim());
                start = end;
            }
        }
    }
    if start < text.len() {
        out.push(text[start..].trim());
    }
    out.into_iter().filter(|s| !s.is_empty())
}

/// Ordered rule cascade; the first rule that matches wins.
pub struct NameExtractor {
    rules: Vec<Box<dyn NameRule>>,
}

impl Default for NameExtractor {
    fn default() -> Self {
        Self::with_rules(vec![
            Box::new(ParentheticalRule),
            Box::new(DashRule),
            Box::new(SingleNameRule),
        ])
    }
}

impl std::fmt::Debug for NameExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.rules.iter().map(|r| r.name()))
            .finish()
    }
}

impl NameExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules(rules: Vec<Box<dyn NameRule>>) -> Self {
        Self { rules }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Extract `(real_world_name, in_game_name)`; never fails.
    pub fn extract(&self, heading_text: &str, fallback_text: &str) -> ExtractedNames {
        let heading = normalize_whitespace(heading_text);
        let fallback = normalize_whitespace(fallback_text);
        let fragment = Fragment {
            heading: &heading,
            fallback: &fallback,
        };
        for rule in &self.rules {
            if let Some(names) = rule.try_match(fragment) {
                tracing::trace!(rule = rule.name(), heading = %heading, "name rule matched");
                return names;
            }
        }
        ExtractedNames::new("", &heading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn extract(heading: &str, fallback: &str) -> (String, String) {
        NameExtractor::new().extract(heading, fallback).into_pair()
    }

    fn frag<'a>(heading: &'a str, fallback: &'a str) -> Fragment<'a> {
        Fragment { heading, fallback }
    }

    #[test]
    fn parenthetical_splits_real_and_alias() {
        assert_eq!(
            extract("Colt M4A1 Carbine (M4)", ""),
            ("Colt M4A1 Carbine".into(), "M4".into())
        );
        assert_eq!(
            extract("  Heckler & Koch HK93   ( Lachmann-556 ) ", ""),
            ("Heckler & Koch HK93".into(), "Lachmann-556".into())
        );
    }

    #[test]
    fn single_character_alias_is_dropped() {
        assert_eq!(extract("(X)", ""), ("".into(), "".into()));
        assert_eq!(extract("Beretta 92FS (Z)", ""), ("Beretta 92FS".into(), "".into()));
    }

    #[test]
    fn dash_forms() {
        assert_eq!(
            extract("Kalashnikov AKM - Kastov 762", ""),
            ("Kalashnikov AKM".into(), "Kastov 762".into())
        );
        assert_eq!(
            extract("FN SCAR-H – TAQ-V", ""),
            ("FN SCAR-H".into(), "TAQ-V".into())
        );
    }

    #[test]
    fn hyphenated_model_names_are_not_split() {
        assert_eq!(extract("AK-47", ""), ("".into(), "AK-47".into()));
        assert_eq!(extract("Lachmann-556", ""), ("".into(), "Lachmann-556".into()));
    }

    #[test]
    fn parenthetical_wins_over_dash() {
        assert_eq!(
            extract("Colt Python - Snake (Python)", ""),
            ("Colt Python - Snake".into(), "Python".into())
        );
    }

    #[test]
    fn single_name_without_fallback() {
        assert_eq!(extract("Glock 17", ""), ("".into(), "Glock 17".into()));
        assert_eq!(
            extract("Glock 17", "This pistol is carried by most operators."),
            ("".into(), "Glock 17".into())
        );
    }

    #[test]
    fn single_name_with_keyword_fallback() {
        assert_eq!(
            extract(
                "Kastov 762",
                "The Kastov 762 is based on the Kalashnikov AKM, firing 7.62mm rounds."
            ),
            ("Kalashnikov AKM".into(), "Kastov 762".into())
        );
        assert_eq!(
            extract("Basilisk", "A revolver. It is actually a Smith & Wesson Model 500 with a short barrel."),
            ("Smith & Wesson Model 500".into(), "Basilisk".into())
        );
    }

    #[test]
    fn single_name_with_designation_fallback() {
        assert_eq!(
            extract("Lachmann-556", "Used by the player (Heckler & Koch HK93) in several missions."),
            ("Heckler & Koch HK93".into(), "Lachmann-556".into())
        );
    }

    #[test]
    fn overlong_names_are_discarded() {
        let long = "A".repeat(MAX_NAME_LEN + 1);
        assert_eq!(extract(&long, ""), ("".into(), "".into()));
        let exact = "B".repeat(MAX_NAME_LEN);
        assert_eq!(extract(&exact, ""), ("".into(), exact));
    }

    #[test]
    fn rules_are_independent() {
        assert!(ParentheticalRule.try_match(frag("Glock 17", "")).is_none());
        assert!(DashRule.try_match(frag("Glock 17", "")).is_none());
        assert_eq!(
            SingleNameRule.try_match(frag("Glock 17", "")),
            Some(ExtractedNames::new("", "Glock 17"))
        );
        assert!(SingleNameRule.try_match(frag("", "")).is_none());
    }

    #[test]
    fn default_rule_order() {
        assert_eq!(
            NameExtractor::new().rule_names(),
            vec!["parenthetical", "dash", "single-name"]
        );
    }

    #[test]
    fn empty_heading_yields_empty_pair() {
        assert_eq!(extract("   ", ""), ("".into(), "".into()));
    }

    #[test]
    fn sentences_keep_decimal_calibers() {
        let parts: Vec<&str> = sentences("Fires 5.56mm rounds. Based on the M16! Done").collect();
        assert_eq!(parts, vec!["Fires 5.56mm rounds.", "Based on the M16!", "Done"]);
    }
}
