//! Core domain types shared by the scan, match and resolve phases.
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FixFailure;

/// Outcome of a whole apply batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Every fix in the batch applied.
    Complete,
    /// No fix applied.
    Failed,
    /// Some fixes applied, some failed. Earlier fixes are not rolled back.
    Partial,
}

/// Result of applying a batch of fixes.
/// `applied_count + error_count` always equals the number of fixes submitted.
#[derive(Debug, Clone)]
pub struct ApplyReport {
    /// Fixes that mutated the document.
    pub applied_count: usize,
    /// Fixes that failed, stale ids included.
    pub error_count: usize,
    /// One entry per failed fix, in submission order.
    pub failures: Vec<FailedFix>,
    /// Human-readable summary carrying both counts.
    pub message: String,
    /// Complete, partial, or failed.
    pub outcome: ApplyOutcome,
    /// True iff no fix failed.
    pub success: bool,
}

/// A detached style occurrence. `node_id` is a lookup key into the document,
/// not a handle: the node may be gone by the time a fix is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachedStyle {
    /// Category that picks the matching and mutation rule.
    pub category: StyleCategory,
    /// Scan-scoped unique id. The only valid join key into match results and fixes.
    pub id: String,
    /// Id of the owning node.
    pub node_id: String,
    /// Name of the owning node, for display.
    pub node_name: String,
    /// Raw value as read from the document. Never inspected by matching.
    pub original_value: serde_json::Value,
    /// Structural slot, index-qualified for paint lists (`fill[2]`).
    pub property_name: String,
    /// Canonical value: hex or rgba color, `<n>px`, or `<family> <size>`.
    pub value: String,
}

/// Detached styles grouped by the slot kind they were read from.
/// Each list is in traversal order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachedStyles {
    /// Corner radius records.
    pub corner_radius: Vec<DetachedStyle>,
    /// Effect records (category `Other`).
    pub effects: Vec<DetachedStyle>,
    /// Solid fill records.
    pub fills: Vec<DetachedStyle>,
    /// Auto-layout item spacing records.
    pub spacing: Vec<DetachedStyle>,
    /// Solid stroke records.
    pub strokes: Vec<DetachedStyle>,
    /// Text records.
    pub typography: Vec<DetachedStyle>,
}

impl DetachedStyles {
    /// Flatten in the order fills, strokes, effects, corner radius, spacing, typography.
    pub fn into_flat(self) -> Vec<DetachedStyle> {
        let mut all = Vec::with_capacity(self.len());
        all.extend(self.fills);
        all.extend(self.strokes);
        all.extend(self.effects);
        all.extend(self.corner_radius);
        all.extend(self.spacing);
        all.extend(self.typography);
        return all;
    }

    /// True when no category holds a record.
    pub fn is_empty(&self) -> bool {
        return self.len() == 0;
    }

    /// Total number of records across categories.
    pub fn len(&self) -> usize {
        return [
            self.corner_radius.len(),
            self.effects.len(),
            self.fills.len(),
            self.spacing.len(),
            self.strokes.len(),
            self.typography.len(),
        ]
        .iter()
        .fold(0_usize, |acc, n| return acc.saturating_add(*n));
    }
}

/// A failed fix and why it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedFix {
    /// Detached style id the fix was submitted for.
    pub detached_style_id: String,
    /// Why it failed.
    pub reason: FixFailure,
}

/// A user decision: reconnect one detached style to one token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fix {
    /// Detached style from the current scan.
    pub detached_style_id: String,
    /// Set when the target is a predefined style rather than a variable.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_style: Option<bool>,
    /// Target style id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_id: Option<String>,
    /// Target variable id. Carries the style id when `is_style` is set and `style_id` is not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_id: Option<String>,
}

impl Fix {
    /// The token this fix points at, or `None` if it names nothing.
    pub fn target(&self) -> Option<FixTarget> {
        let non_empty = |id: &Option<String>| return id.clone().filter(|s| return !s.is_empty());
        if self.is_style.unwrap_or(false) {
            return non_empty(&self.style_id)
                .or_else(|| return non_empty(&self.variable_id))
                .map(FixTarget::Style);
        }
        return non_empty(&self.variable_id).map(FixTarget::Variable);
    }
}

/// What a fix binds to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FixTarget {
    /// A predefined reusable style.
    Style(String),
    /// A token variable.
    Variable(String),
}

/// One token source and its categorized tokens.
/// Token ids are unique within a library; across libraries only `(library id, token id)` is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryInfo {
    /// Library id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Predefined styles, in source order.
    pub styles: Vec<LibraryStyle>,
    /// Variables with default-mode values, in source order.
    pub variables: Vec<Token>,
}

#[cfg(test)]
impl LibraryInfo {
    /// Look up a predefined style by id.
    pub fn style(&self, id: &str) -> Option<&LibraryStyle> {
        return self.styles.iter().find(|s| return s.id == id);
    }

    /// Look up a variable by id.
    pub fn variable(&self, id: &str) -> Option<&Token> {
        return self.variables.iter().find(|t| return t.id == id);
    }
}

/// A predefined reusable style from a library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryStyle {
    /// Category inferred from the style kind and content.
    pub category: StyleCategory,
    /// Style id.
    pub id: String,
    /// Style name.
    pub name: String,
    /// Kind of style as declared by the source.
    pub style_type: StyleKind,
    /// Category-normalized value.
    pub value: String,
}

/// Per-detached-style outcome of matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    /// Join key back to the detached style.
    pub detached_style_id: String,
    /// True when the candidates span libraries that define the same value.
    pub has_conflict: bool,
    /// Candidates in library order, then token order. Not ranked.
    pub matches: Vec<VariableMatch>,
}

/// Output of one scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    /// Records by category. Empty when the budget was exceeded.
    pub detached_styles: DetachedStyles,
    /// Set when the node count exceeded the budget and nothing was scanned.
    pub has_exceeded_limit: bool,
    /// Nodes counted in scope.
    pub node_count: usize,
}

/// Closed set of style categories. Every rule dispatches on this once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StyleCategory {
    /// Solid colors.
    Color,
    /// Corner radii.
    CornerRadius,
    /// Anything without a matching rule.
    Other,
    /// Gaps and paddings.
    Spacing,
    /// Font family and size.
    Typography,
}

impl fmt::Display for StyleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StyleCategory::Color => "color",
            StyleCategory::CornerRadius => "corner radius",
            StyleCategory::Other => "other",
            StyleCategory::Spacing => "spacing",
            StyleCategory::Typography => "typography",
        };
        return f.write_str(label);
    }
}

/// Kind of predefined style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StyleKind {
    /// Effect style (shadows, blurs).
    Effect,
    /// Layout grid style.
    Grid,
    /// Fill or stroke paint style.
    Paint,
    /// Text style.
    Text,
}

/// A library variable with its default-mode value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    /// Category from the declared type and name heuristics.
    pub category: StyleCategory,
    /// Variable id.
    pub id: String,
    /// Variable name, e.g. `color/brand/primary`.
    pub name: String,
    /// Category-normalized value.
    pub value: String,
}

/// A candidate token for one detached style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableMatch {
    /// Always true: only exact matches are produced.
    pub exact_match: bool,
    /// Token or style id.
    pub id: String,
    /// Set when the candidate is a predefined style.
    pub is_style: bool,
    /// Owning library id.
    pub library_id: String,
    /// Owning library name.
    pub library_name: String,
    /// Token or style name.
    pub name: String,
    /// The candidate's normalized value.
    pub value: String,
}

impl VariableMatch {
    /// Build the fix that binds `detached_style_id` to this candidate.
    pub fn to_fix(&self, detached_style_id: &str) -> Fix {
        if self.is_style {
            return Fix {
                detached_style_id: detached_style_id.to_string(),
                is_style: Some(true),
                style_id: Some(self.id.clone()),
                variable_id: None,
            };
        }
        return Fix {
            detached_style_id: detached_style_id.to_string(),
            is_style: None,
            style_id: None,
            variable_id: Some(self.id.clone()),
        };
    }
}
