//! Exact matching of detached styles against library tokens and styles.
//!
//! Every comparison stays within one category. Candidates come back in
//! library order, then token order, then style order; they are never ranked
//! because every candidate is an exact match.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::color;
use crate::library::{self, ConflictMap};
use crate::types::{DetachedStyle, LibraryInfo, MatchResult, StyleCategory, VariableMatch};

/// Leading decimal number, the way `parseFloat` reads one.
#[allow(clippy::expect_used, reason = "pattern is a literal")]
static LEADING_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r"^\s*[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?").expect("valid regex");
});

/// A comparable form of a value, built once per detached style.
enum Needle {
    /// Canonical color string.
    Color(String),
    /// Nothing can match.
    Never,
    /// Unit-stripped number.
    Number(f64),
    /// Lower-cased composite string.
    Text(String),
}

impl Needle {
    /// True when `candidate` is equal under this needle's rule. Candidates
    /// that do not parse are skipped, not errors.
    fn matches(&self, candidate: &str) -> bool {
        return match self {
            Needle::Color(canonical) => color::normalize_str(candidate).is_some_and(|c| return c == *canonical),
            Needle::Never => false,
            Needle::Number(n) => parse_leading_number(candidate).is_some_and(|c| return numbers_equal(c, *n)),
            Needle::Text(lowered) => candidate.to_lowercase() == *lowered,
        };
    }

    /// Build the needle for `value` under `category`'s rule.
    fn new(category: StyleCategory, value: &str) -> Self {
        let needle = match category {
            StyleCategory::Color => color::normalize_str(value).map(Needle::Color),
            StyleCategory::CornerRadius | StyleCategory::Spacing => parse_leading_number(value).map(Needle::Number),
            StyleCategory::Other => None,
            StyleCategory::Typography => Some(Needle::Text(value.to_lowercase())),
        };
        return needle.unwrap_or(Needle::Never);
    }
}

/// One match result per detached style, in input order.
pub fn find_matches(detached: &[DetachedStyle], libraries: &[LibraryInfo]) -> Vec<MatchResult> {
    let conflicts = library::check_for_conflicts(libraries);
    return detached.iter().map(|style| return match_one(style, libraries, &conflicts)).collect();
}

/// True when candidates come from at least two libraries and one of their
/// values is a known cross-library conflict.
fn has_conflict(matches: &[VariableMatch], conflicts: &ConflictMap) -> bool {
    if matches.len() < 2 {
        return false;
    }
    let libraries: HashSet<&str> = matches.iter().map(|m| return m.library_id.as_str()).collect();
    if libraries.len() < 2 {
        return false;
    }
    return matches
        .iter()
        .any(|m| return conflicts.get(&m.value.to_lowercase()).is_some_and(|owners| return owners.len() > 1));
}

/// Collect every same-category candidate equal to `style`'s value.
fn match_one(style: &DetachedStyle, libraries: &[LibraryInfo], conflicts: &ConflictMap) -> MatchResult {
    let needle = Needle::new(style.category, &style.value);
    let mut matches = Vec::new();

    for library in libraries {
        let candidate = |id: &str, name: &str, value: &str, is_style: bool| {
            return VariableMatch {
                exact_match: true,
                id: id.to_string(),
                is_style,
                library_id: library.id.clone(),
                library_name: library.name.clone(),
                name: name.to_string(),
                value: value.to_string(),
            };
        };
        for token in &library.variables {
            if token.category == style.category && needle.matches(&token.value) {
                matches.push(candidate(&token.id, &token.name, &token.value, false));
            }
        }
        for predefined in &library.styles {
            if predefined.category == style.category && needle.matches(&predefined.value) {
                matches.push(candidate(&predefined.id, &predefined.name, &predefined.value, true));
            }
        }
    }

    return MatchResult {
        detached_style_id: style.id.clone(),
        has_conflict: has_conflict(&matches, conflicts),
        matches,
    };
}

/// Exact numeric equality. Both sides come from the same decimal parse.
#[allow(clippy::float_cmp, reason = "matching is exact by definition")]
fn numbers_equal(a: f64, b: f64) -> bool {
    return a == b;
}

/// The number at the start of `value` with any unit suffix ignored.
/// `None` when the value does not start with a finite number.
pub fn parse_leading_number(value: &str) -> Option<f64> {
    let number = LEADING_NUMBER.find(value)?.as_str().trim();
    return number.parse::<f64>().ok().filter(|n| return n.is_finite());
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "test code")]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::color::ChannelColor;
    use crate::types::{LibraryStyle, StyleKind, Token};

    fn detached(category: StyleCategory, value: &str) -> DetachedStyle {
        return DetachedStyle {
            category,
            id: "d1".to_string(),
            node_id: "1:1".to_string(),
            node_name: "Card".to_string(),
            original_value: serde_json::Value::Null,
            property_name: "fill[0]".to_string(),
            value: value.to_string(),
        };
    }

    fn token(id: &str, category: StyleCategory, value: &str) -> Token {
        return Token { category, id: id.to_string(), name: id.to_string(), value: value.to_string() };
    }

    fn library(id: &str, variables: Vec<Token>) -> LibraryInfo {
        return LibraryInfo { id: id.to_string(), name: id.to_uppercase(), styles: Vec::new(), variables };
    }

    #[test]
    fn shared_color_in_two_libraries_is_flagged() {
        let libraries = vec![
            library("libA", vec![token("a1", StyleCategory::Color, "#336699")]),
            library("libB", vec![token("b1", StyleCategory::Color, "#336699")]),
        ];
        let results = find_matches(&[detached(StyleCategory::Color, "#336699")], &libraries);
        let result = results.first().unwrap();
        assert_eq!(result.matches.len(), 2);
        assert!(result.has_conflict);
        let owners: Vec<&str> = result.matches.iter().map(|m| return m.library_id.as_str()).collect();
        assert_eq!(owners, vec!["libA", "libB"]);
    }

    #[test]
    fn same_library_multi_match_is_not_a_conflict() {
        let libraries = vec![library(
            "libA",
            vec![token("a1", StyleCategory::Color, "#336699"), token("a2", StyleCategory::Color, "#336699")],
        )];
        let result = find_matches(&[detached(StyleCategory::Color, "#336699")], &libraries).remove(0);
        assert_eq!(result.matches.len(), 2);
        assert!(!result.has_conflict);
    }

    #[test]
    fn typography_compares_whole_strings_case_insensitively() {
        let libraries = vec![library(
            "lib",
            vec![token("t1", StyleCategory::Typography, "inter 16"), token("t2", StyleCategory::Typography, "Inter 16/1.5")],
        )];
        let result = find_matches(&[detached(StyleCategory::Typography, "Inter 16")], &libraries).remove(0);
        let ids: Vec<&str> = result.matches.iter().map(|m| return m.id.as_str()).collect();
        assert_eq!(ids, vec!["t1"]);
    }

    #[test]
    fn numbers_compare_after_stripping_units() {
        let libraries = vec![library(
            "lib",
            vec![
                token("s1", StyleCategory::Spacing, "16"),
                token("s2", StyleCategory::Spacing, "16.0px"),
                token("s3", StyleCategory::Spacing, "large"),
                token("r1", StyleCategory::CornerRadius, "16"),
            ],
        )];
        let result = find_matches(&[detached(StyleCategory::Spacing, "16px")], &libraries).remove(0);
        let ids: Vec<&str> = result.matches.iter().map(|m| return m.id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s2"]);
    }

    #[test]
    fn styles_follow_variables_and_are_marked() {
        let mut lib = library("lib", vec![token("v1", StyleCategory::Color, "#336699")]);
        lib.styles.push(LibraryStyle {
            category: StyleCategory::Color,
            id: "S:1".to_string(),
            name: "Primary".to_string(),
            style_type: StyleKind::Paint,
            value: "rgba(51, 102, 153, 1)".to_string(),
        });
        let result = find_matches(&[detached(StyleCategory::Color, "#336699")], &[lib]).remove(0);
        let flags: Vec<(&str, bool)> = result.matches.iter().map(|m| return (m.id.as_str(), m.is_style)).collect();
        assert_eq!(flags, vec![("v1", false), ("S:1", true)]);
    }

    #[test]
    fn other_never_matches() {
        let libraries = vec![library("lib", vec![token("o1", StyleCategory::Other, "DROP_SHADOW")])];
        let result = find_matches(&[detached(StyleCategory::Other, "DROP_SHADOW")], &libraries).remove(0);
        assert!(result.matches.is_empty());
    }

    #[test]
    fn leading_number_parse_matches_parse_float() {
        assert_eq!(parse_leading_number("12px"), Some(12.0));
        assert_eq!(parse_leading_number(" -1.5rem"), Some(-1.5));
        assert_eq!(parse_leading_number(".5"), Some(0.5));
        assert_eq!(parse_leading_number("1e2"), Some(100.0));
        assert_eq!(parse_leading_number("px12"), None);
    }

    fn category() -> impl Strategy<Value = StyleCategory> {
        return prop_oneof![
            Just(StyleCategory::Color),
            Just(StyleCategory::CornerRadius),
            Just(StyleCategory::Spacing),
            Just(StyleCategory::Typography),
        ];
    }

    proptest! {
        #[test]
        fn cross_category_never_matches(a in category(), b in category(), n in 0_u8..64) {
            prop_assume!(a != b);
            let value = format!("{n}");
            let libraries = vec![library("lib", vec![token("t", b, &value)])];
            let result = find_matches(&[detached(a, &value)], &libraries).remove(0);
            prop_assert!(result.matches.is_empty());
        }

        #[test]
        fn spacing_matches_iff_numbers_equal(a in 0_u16..200, b in 0_u16..200) {
            let libraries = vec![library("lib", vec![token("t", StyleCategory::Spacing, &format!("{b}"))])];
            let result = find_matches(&[detached(StyleCategory::Spacing, &format!("{a}px"))], &libraries).remove(0);
            prop_assert_eq!(result.matches.len() == 1, a == b);
        }

        #[test]
        fn color_matches_iff_canonical_forms_agree(
            detached_rgb in any::<(u8, u8, u8)>(),
            other_rgb in any::<(u8, u8, u8)>(),
            same in any::<bool>(),
        ) {
            let (r, g, b) = detached_rgb;
            let channels = ChannelColor { a: None, b: f64::from(b) / 255.0, g: f64::from(g) / 255.0, r: f64::from(r) / 255.0 };
            let value = color::from_channels(&channels).unwrap();
            let (tr, tg, tb) = if same { detached_rgb } else { other_rgb };
            let token_value = format!("#{tr:02X}{tg:02X}{tb:02X}");

            let libraries = vec![library("lib", vec![token("t", StyleCategory::Color, &token_value)])];
            let result = find_matches(&[detached(StyleCategory::Color, &value)], &libraries).remove(0);
            prop_assert_eq!(result.matches.len() == 1, detached_rgb == (tr, tg, tb));
        }

        #[test]
        fn typography_matches_iff_lowercase_equal(
            value in "[A-Za-z]{1,8} [0-9]{1,2}",
            other in "[A-Za-z]{1,8} [0-9]{1,2}",
            same in any::<bool>(),
            upper in any::<bool>(),
        ) {
            let base = if same { value.clone() } else { other };
            let token_value = if upper { base.to_uppercase() } else { base.to_lowercase() };
            let libraries = vec![library("lib", vec![token("t", StyleCategory::Typography, &token_value)])];
            let result = find_matches(&[detached(StyleCategory::Typography, &value)], &libraries).remove(0);
            prop_assert_eq!(result.matches.len() == 1, value.to_lowercase() == token_value.to_lowercase());
        }

        #[test]
        fn conflict_requires_two_libraries(copies in 2_usize..5, split in any::<bool>()) {
            let tokens = |lib: &str| -> Vec<Token> {
                return (0..copies).map(|i| return token(&format!("{lib}{i}"), StyleCategory::Color, "#336699")).collect();
            };
            let libraries = if split {
                vec![library("libA", tokens("a")), library("libB", tokens("b"))]
            } else {
                vec![library("libA", tokens("a"))]
            };
            let result = find_matches(&[detached(StyleCategory::Color, "#336699")], &libraries).remove(0);
            prop_assert_eq!(result.has_conflict, split);
        }
    }
}
