//! Apply user-approved fixes back onto the document.
//!
//! Each fix re-resolves its node and re-validates its slot; nothing from the
//! scan is trusted beyond the detached style's node id and property name. A
//! batch is best-effort: a failing fix is recorded and the next one runs.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::document::{DocumentWrite, Mixed, PaintSlot, StyleField, VariableAlias};
use crate::error::{Error, FixFailure};
use crate::types::{ApplyOutcome, ApplyReport, DetachedStyle, FailedFix, Fix, FixTarget, StyleCategory};

/// `fill[i]` or `stroke[i]`.
#[allow(clippy::expect_used, reason = "pattern is a literal")]
static PAINT_PROPERTY: LazyLock<Regex> = LazyLock::new(|| {
    return Regex::new(r"^(fill|stroke)\[(\d+)\]$").expect("valid regex");
});

/// Apply `fixes` in order against the detached styles of the current scan.
///
/// # Errors
///
/// Returns `Error::NoFixes` for an empty batch. Per-fix failures never
/// escape; they are counted in the report.
pub fn apply_fixes<D: DocumentWrite>(
    fixes: &[Fix],
    detached: &HashMap<String, DetachedStyle>,
    doc: &mut D,
) -> Result<ApplyReport, Error> {
    if fixes.is_empty() {
        return Err(Error::NoFixes);
    }

    let mut applied = 0_usize;
    let mut failures = Vec::new();
    for fix in fixes {
        match apply_one(fix, detached, doc) {
            Err(reason) => {
                tracing::warn!(detached_style_id = %fix.detached_style_id, "fix not applied: {reason}");
                failures.push(FailedFix { detached_style_id: fix.detached_style_id.clone(), reason });
            },
            Ok(()) => applied = applied.saturating_add(1),
        }
    }

    let report = summarize(applied, failures);
    tracing::info!(applied = report.applied_count, errors = report.error_count, "{}", report.message);
    return Ok(report);
}

/// Bind a paint's color, or name a paint style for the whole list. Either
/// way the recorded paint must still exist.
fn apply_color<D: DocumentWrite>(doc: &mut D, style: &DetachedStyle, target: &FixTarget) -> Result<(), FixFailure> {
    let (slot, index) = parse_paint_property(&style.property_name)?;
    let node = doc
        .node(&style.node_id)
        .ok_or_else(|| return FixFailure::NodeNotFound { node_id: style.node_id.clone() })?;
    let Some(current) = slot.list(node).and_then(Mixed::value) else {
        return Err(FixFailure::SlotMissing { node_id: style.node_id.clone(), property: style.property_name.clone() });
    };

    let mut paints = current.clone();
    let len = paints.len();
    let Some(paint) = paints.get_mut(index) else {
        return Err(FixFailure::IndexOutOfRange {
            len,
            node_id: style.node_id.clone(),
            property: style.property_name.clone(),
        });
    };
    let variable_id = match target {
        FixTarget::Style(style_id) => return doc.set_style_id(&style.node_id, slot.style_field(), style_id),
        FixTarget::Variable(id) => id,
    };
    paint.bound_variables.insert("color".to_string(), VariableAlias::to_variable(variable_id));
    return doc.set_paints(&style.node_id, slot, paints);
}

/// Bind the corner radius slot, keeping other bindings.
fn apply_corner_radius<D: DocumentWrite>(doc: &mut D, style: &DetachedStyle, target: &FixTarget) -> Result<(), FixFailure> {
    let FixTarget::Variable(variable_id) = target else {
        return Err(FixFailure::UnsupportedStyleTarget { category: style.category });
    };
    let has_slot = doc
        .node(&style.node_id)
        .is_some_and(|node| return node.corner_radius.as_ref().and_then(Mixed::value).is_some());
    if !has_slot {
        return Err(FixFailure::SlotMissing { node_id: style.node_id.clone(), property: style.property_name.clone() });
    }
    return doc.bind_variable(&style.node_id, "cornerRadius", VariableAlias::to_variable(variable_id));
}

/// Look up, validate and apply one fix.
fn apply_one<D: DocumentWrite>(
    fix: &Fix,
    detached: &HashMap<String, DetachedStyle>,
    doc: &mut D,
) -> Result<(), FixFailure> {
    let Some(style) = detached.get(&fix.detached_style_id) else {
        return Err(FixFailure::StyleNotFound { detached_style_id: fix.detached_style_id.clone() });
    };
    if doc.node(&style.node_id).is_none() {
        return Err(FixFailure::NodeNotFound { node_id: style.node_id.clone() });
    }
    let Some(target) = fix.target() else {
        return Err(FixFailure::MissingTarget { detached_style_id: fix.detached_style_id.clone() });
    };

    match style.category {
        StyleCategory::Color => apply_color(doc, style, &target)?,
        StyleCategory::CornerRadius => apply_corner_radius(doc, style, &target)?,
        StyleCategory::Other => return Err(FixFailure::UnsupportedCategory { category: style.category }),
        StyleCategory::Spacing => apply_spacing(doc, style, &target)?,
        StyleCategory::Typography => apply_typography(doc, style, &target)?,
    }
    tracing::debug!(node_id = %style.node_id, property = %style.property_name, "fix applied");
    return Ok(());
}

/// Bind the named spacing slot, keeping other bindings.
fn apply_spacing<D: DocumentWrite>(doc: &mut D, style: &DetachedStyle, target: &FixTarget) -> Result<(), FixFailure> {
    let FixTarget::Variable(variable_id) = target else {
        return Err(FixFailure::UnsupportedStyleTarget { category: style.category });
    };
    let property = style.property_name.as_str();
    let has_slot = doc.node(&style.node_id).is_some_and(|node| return node.spacing(property).is_some());
    if !has_slot {
        return Err(FixFailure::SlotMissing { node_id: style.node_id.clone(), property: property.to_string() });
    }
    return doc.bind_variable(&style.node_id, property, VariableAlias::to_variable(variable_id));
}

/// Point a text node's style slot at the chosen token or style.
fn apply_typography<D: DocumentWrite>(doc: &mut D, style: &DetachedStyle, target: &FixTarget) -> Result<(), FixFailure> {
    let is_text = doc.node(&style.node_id).is_some_and(|node| return node.is_text());
    if !is_text {
        return Err(FixFailure::NotTextNode { node_id: style.node_id.clone() });
    }
    let (FixTarget::Style(id) | FixTarget::Variable(id)) = target;
    return doc.set_style_id(&style.node_id, StyleField::Text, id);
}

/// Split `fill[2]` into its slot and index.
fn parse_paint_property(property: &str) -> Result<(PaintSlot, usize), FixFailure> {
    let malformed = || return FixFailure::MalformedProperty { property: property.to_string() };
    let caps = PAINT_PROPERTY.captures(property).ok_or_else(malformed)?;
    let slot = match caps.get(1).map(|m| return m.as_str()) {
        Some("fill") => PaintSlot::Fill,
        Some("stroke") => PaintSlot::Stroke,
        _ => return Err(malformed()),
    };
    let index = caps
        .get(2)
        .and_then(|m| return m.as_str().parse::<usize>().ok())
        .ok_or_else(malformed)?;
    return Ok((slot, index));
}

/// Fold per-fix outcomes into the batch report.
fn summarize(applied: usize, failures: Vec<FailedFix>) -> ApplyReport {
    let error_count = failures.len();
    let (outcome, message) = if error_count == 0 {
        (ApplyOutcome::Complete, format!("Successfully applied {applied} fixes."))
    } else if applied > 0 {
        (ApplyOutcome::Partial, format!("Applied {applied} fixes with {error_count} errors."))
    } else {
        (ApplyOutcome::Failed, format!("Applied 0 fixes with {error_count} errors."))
    };
    return ApplyReport {
        applied_count: applied,
        error_count,
        failures,
        message,
        outcome,
        success: error_count == 0,
    };
}
