//! Depth-first document scan producing detached-style records.
//!
//! The whole scope is counted before anything is extracted, so a scan over
//! the node budget returns nothing rather than a partial result.

use std::collections::HashSet;
use std::fmt;

use serde::Deserialize;
use serde_json::json;

use crate::color;
use crate::document::{DocumentRead, Mixed, Node, PaintSlot, StyleField};
use crate::types::{DetachedStyle, DetachedStyles, ScanResult, StyleCategory};

/// Node budget used when nothing else is configured.
pub const DEFAULT_NODE_LIMIT: usize = 5000;

/// Per-category scan gates. Everything is scanned by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
#[allow(clippy::struct_excessive_bools, reason = "one independent gate per slot kind")]
pub struct IncludeStyles {
    /// Corner radius.
    pub corner_radius: bool,
    /// Effect lists.
    pub effects: bool,
    /// Fill lists.
    pub fills: bool,
    /// Auto-layout item spacing.
    pub spacing: bool,
    /// Stroke lists.
    pub strokes: bool,
    /// Text font and size.
    pub typography: bool,
}

impl Default for IncludeStyles {
    fn default() -> Self {
        return Self {
            corner_radius: true,
            effects: true,
            fills: true,
            spacing: true,
            strokes: true,
            typography: true,
        };
    }
}

/// Options for one scan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScanOptions {
    /// Scan hidden nodes and their subtrees.
    pub include_hidden: bool,
    /// Which slot kinds to inspect.
    pub include_styles: IncludeStyles,
    /// Abort, with nothing scanned, when the scope holds more nodes than this.
    pub node_limit: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        return Self {
            include_hidden: false,
            include_styles: IncludeStyles::default(),
            node_limit: DEFAULT_NODE_LIMIT,
        };
    }
}

/// What to scan: the whole page or the current selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Every top-level node of the page.
    Page,
    /// The selected nodes and their subtrees.
    Selection,
}

impl Scope {
    /// Root nodes of this scope in `document`.
    pub fn roots<D: DocumentRead>(self, document: &D) -> Vec<&Node> {
        return match self {
            Scope::Page => document.roots(),
            Scope::Selection => document.selection(),
        };
    }
}

/// A node whose slots hold values that cannot be canonicalized.
#[derive(Debug)]
enum ShapeError {
    /// A color channel or alpha is NaN or infinite.
    NonFiniteColor {
        /// Index-qualified property holding the color.
        property: String,
    },
    /// A numeric slot is NaN or infinite.
    NonFiniteNumber {
        /// Slot name.
        property: &'static str,
    },
}

impl fmt::Display for ShapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return match self {
            ShapeError::NonFiniteColor { property } => write!(f, "non-finite color in {property}"),
            ShapeError::NonFiniteNumber { property } => write!(f, "non-finite number in {property}"),
        };
    }
}

/// Count every node under `roots`, containers included. Nodes reachable from
/// more than one root are counted once.
pub fn count_nodes(roots: &[&Node]) -> usize {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut stack: Vec<&Node> = roots.iter().rev().copied().collect();
    while let Some(node) = stack.pop() {
        if !seen.insert(node.id.as_str()) {
            continue;
        }
        stack.extend(node.children.iter().rev());
    }
    return seen.len();
}

/// Emit corner-radius records. Zero is the default and is not reported.
///
/// # Errors
///
/// Returns `ShapeError::NonFiniteNumber` for a NaN or infinite radius.
fn extract_corner_radius(node: &Node, out: &mut Vec<DetachedStyle>) -> Result<(), ShapeError> {
    if node.is_bound("cornerRadius") {
        return Ok(());
    }
    let Some(radius) = node.corner_radius.as_ref().and_then(Mixed::value).copied() else {
        return Ok(());
    };
    if radius == 0.0 {
        return Ok(());
    }
    if !radius.is_finite() {
        return Err(ShapeError::NonFiniteNumber { property: "cornerRadius" });
    }
    out.push(new_record(node, StyleCategory::CornerRadius, format!("{radius}px"), json!(radius), "cornerRadius".to_string()));
    return Ok(());
}

/// Emit one `Other` record per effect. Effects are reported but never matched.
fn extract_effects(node: &Node, out: &mut Vec<DetachedStyle>) {
    if node.has_style(StyleField::Effect) || node.is_bound("effects") {
        return;
    }
    let Some(effects) = node.effects.as_ref().and_then(Mixed::value) else {
        return;
    };
    for (idx, effect) in effects.iter().enumerate() {
        let original = serde_json::to_value(effect).unwrap_or_default();
        let value = format!("Effect: {}", effect.effect_type);
        out.push(new_record(node, StyleCategory::Other, value, original, format!("effect[{idx}]")));
    }
    return;
}

/// Run every enabled extractor over one node.
///
/// # Errors
///
/// Returns the first `ShapeError` hit; nothing from this node is kept then.
fn extract_node_styles(node: &Node, gates: &IncludeStyles) -> Result<DetachedStyles, ShapeError> {
    let mut found = DetachedStyles::default();
    if gates.fills {
        extract_paints(node, PaintSlot::Fill, &mut found.fills)?;
    }
    if gates.strokes {
        extract_paints(node, PaintSlot::Stroke, &mut found.strokes)?;
    }
    if gates.effects {
        extract_effects(node, &mut found.effects);
    }
    if gates.corner_radius {
        extract_corner_radius(node, &mut found.corner_radius)?;
    }
    if gates.spacing {
        extract_spacing(node, &mut found.spacing)?;
    }
    if gates.typography {
        extract_typography(node, &mut found.typography)?;
    }
    return Ok(found);
}

/// Emit one `Color` record per unbound solid paint in a fill or stroke list.
/// The whole list is skipped when a paint style or list binding is applied.
///
/// # Errors
///
/// Returns `ShapeError::NonFiniteColor` if a solid paint's channels are not finite.
fn extract_paints(node: &Node, slot: PaintSlot, out: &mut Vec<DetachedStyle>) -> Result<(), ShapeError> {
    if node.has_style(slot.style_field()) || node.is_bound(slot.binding_key()) {
        return Ok(());
    }
    let Some(paints) = slot.list(node).and_then(Mixed::value) else {
        return Ok(());
    };
    for (idx, paint) in paints.iter().enumerate() {
        let Some(channels) = paint.solid_color() else {
            continue;
        };
        if paint.bound_variables.contains_key("color") {
            continue;
        }
        let property = format!("{}[{idx}]", slot.prefix());
        let Some(value) = color::from_channels(channels) else {
            return Err(ShapeError::NonFiniteColor { property });
        };
        let original = serde_json::to_value(channels).unwrap_or_default();
        out.push(new_record(node, StyleCategory::Color, value, original, property));
    }
    return Ok(());
}

/// Emit the item-spacing record of an auto-layout frame. Padding is not scanned.
///
/// # Errors
///
/// Returns `ShapeError::NonFiniteNumber` for a NaN or infinite gap.
fn extract_spacing(node: &Node, out: &mut Vec<DetachedStyle>) -> Result<(), ShapeError> {
    if !node.is_auto_layout_frame() || node.is_bound("itemSpacing") {
        return Ok(());
    }
    let Some(gap) = node.item_spacing else {
        return Ok(());
    };
    if gap == 0.0 {
        return Ok(());
    }
    if !gap.is_finite() {
        return Err(ShapeError::NonFiniteNumber { property: "itemSpacing" });
    }
    out.push(new_record(node, StyleCategory::Spacing, format!("{gap}px"), json!(gap), "itemSpacing".to_string()));
    return Ok(());
}

/// Emit the typography record of a text node with a concrete font and size.
///
/// # Errors
///
/// Returns `ShapeError::NonFiniteNumber` for a NaN or infinite font size.
fn extract_typography(node: &Node, out: &mut Vec<DetachedStyle>) -> Result<(), ShapeError> {
    if !node.is_text()
        || node.has_style(StyleField::Text)
        || node.is_bound("fontName")
        || node.is_bound("fontSize")
    {
        return Ok(());
    }
    let font = node.font_name.as_ref().and_then(Mixed::value);
    let size = node.font_size.as_ref().and_then(Mixed::value).copied();
    let (Some(font), Some(size)) = (font, size) else {
        return Ok(());
    };
    if !size.is_finite() {
        return Err(ShapeError::NonFiniteNumber { property: "fontSize" });
    }
    let line_height = node.line_height.as_ref().and_then(Mixed::value).cloned();
    let original = json!({
        "fontFamily": font.family,
        "fontSize": size,
        "fontWeight": font.style,
        "lineHeight": line_height,
    });
    let value = format!("{} {size}", font.family);
    out.push(new_record(node, StyleCategory::Typography, value, original, "typography".to_string()));
    return Ok(());
}

/// Build a record with a fresh id.
fn new_record(
    node: &Node,
    category: StyleCategory,
    value: String,
    original_value: serde_json::Value,
    property_name: String,
) -> DetachedStyle {
    return DetachedStyle {
        category,
        id: uuid::Uuid::new_v4().to_string(),
        node_id: node.id.clone(),
        node_name: node.name.clone(),
        original_value,
        property_name,
        value,
    };
}

/// Scan `roots` for detached styles.
///
/// The scope is counted first; over budget, nothing is scanned and the
/// result is empty with `has_exceeded_limit` set. Otherwise one depth-first
/// pass visits each node once, in document order.
pub fn scan(roots: &[&Node], options: &ScanOptions) -> ScanResult {
    let node_count = count_nodes(roots);
    if node_count > options.node_limit {
        tracing::warn!(node_count, limit = options.node_limit, "node budget exceeded, scan skipped");
        return ScanResult {
            detached_styles: DetachedStyles::default(),
            has_exceeded_limit: true,
            node_count,
        };
    }

    let mut detached = DetachedStyles::default();
    let mut visited: HashSet<&str> = HashSet::new();
    for root in roots.iter().copied() {
        visit_node(root, options, &mut visited, &mut detached);
    }

    tracing::debug!(node_count, detached = detached.len(), "scan finished");
    return ScanResult { detached_styles: detached, has_exceeded_limit: false, node_count };
}

/// Visit one node and its subtree.
fn visit_node<'a>(
    node: &'a Node,
    options: &ScanOptions,
    visited: &mut HashSet<&'a str>,
    detached: &mut DetachedStyles,
) {
    if !visited.insert(node.id.as_str()) {
        return;
    }
    if !node.visible && !options.include_hidden {
        return;
    }

    match extract_node_styles(node, &options.include_styles) {
        Err(e) => tracing::warn!(node_id = %node.id, node_name = %node.name, "skipping node: {e}"),
        Ok(found) => {
            detached.corner_radius.extend(found.corner_radius);
            detached.effects.extend(found.effects);
            detached.fills.extend(found.fills);
            detached.spacing.extend(found.spacing);
            detached.strokes.extend(found.strokes);
            detached.typography.extend(found.typography);
        },
    }

    for child in &node.children {
        visit_node(child, options, visited, detached);
    }
    return;
}
