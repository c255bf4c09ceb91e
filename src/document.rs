//! Host document model and its read/write access points.
//!
//! The document is a single page of nodes persisted as JSON. Slot names
//! follow the design tool's (`fills`, `cornerRadius`, `boundVariables`, ...)
//! so exported files load unchanged. Attributes this crate does not model are
//! carried through verbatim on pages, nodes, paints and effects.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::color::ChannelColor;
use crate::error::{Error, FixFailure};

/// Node type of text nodes.
pub const TEXT_NODE: &str = "TEXT";

/// Node type of frames.
pub const FRAME_NODE: &str = "FRAME";

/// Whole numbers below this magnitude are exact in an `f64`.
const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

/// A slot's binding entry: one alias, or one alias per list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BoundVariable {
    /// Single-valued slot binding.
    Alias(VariableAlias),
    /// Per-entry bindings for list slots.
    List(Vec<VariableAlias>),
}

/// A loaded document plus where it came from.
#[derive(Debug, Clone)]
pub struct Document {
    /// Set by every successful write.
    modified: bool,
    /// The single page this document holds.
    page: Page,
    /// File the page was read from, if any.
    path: Option<PathBuf>,
}

impl Document {
    /// Wrap an in-memory page.
    pub const fn from_page(page: Page) -> Self {
        return Self { modified: false, page, path: None };
    }

    /// Read and parse a document file.
    ///
    /// # Errors
    ///
    /// Returns `Error::DocumentNotFound` if the file doesn't exist,
    /// `Error::Io` for other read failures,
    /// or `Error::DocumentCorrupt` if the JSON is not a page.
    pub fn load(path: &Path) -> Result<Self, Error> {
        let content = match std::fs::read_to_string(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::DocumentNotFound { path: path.to_path_buf() });
            },
            Err(e) => return Err(Error::Io(e)),
            Ok(c) => c,
        };
        let page: Page = serde_json::from_str(&content).map_err(|e| {
            return Error::DocumentCorrupt { path: path.to_path_buf(), reason: e.to_string() };
        })?;
        tracing::debug!(path = %path.display(), roots = page.children.len(), "document loaded");
        let mut document = Self::from_page(page);
        document.path = Some(path.to_path_buf());
        return Ok(document);
    }

    /// True once any write has landed.
    pub const fn is_modified(&self) -> bool {
        return self.modified;
    }

    /// Find a node anywhere in the page, mutably.
    fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        return find_node_mut(&mut self.page.children, id);
    }

    /// Write the page back to the file it was loaded from.
    /// In-memory documents are left alone.
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if serialization fails, or `Error::Io` if the file cannot be written.
    pub fn save(&self) -> Result<(), Error> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let mut value = serde_json::to_value(&self.page)?;
        integral_numbers(&mut value);
        let mut content = serde_json::to_string_pretty(&value)?;
        content.push('\n');
        std::fs::write(path, content)?;
        tracing::info!(path = %path.display(), "document written");
        return Ok(());
    }

    /// Run `edit` on a node and mark the document modified.
    ///
    /// # Errors
    ///
    /// Returns `FixFailure::NodeNotFound` if no node has this id.
    fn with_node<F>(&mut self, node_id: &str, edit: F) -> Result<(), FixFailure>
    where
        F: FnOnce(&mut Node),
    {
        let Some(node) = self.node_mut(node_id) else {
            return Err(FixFailure::NodeNotFound { node_id: node_id.to_string() });
        };
        edit(node);
        self.modified = true;
        return Ok(());
    }
}

impl DocumentRead for Document {
    fn node(&self, id: &str) -> Option<&Node> {
        return find_node(&self.page.children, id);
    }

    fn roots(&self) -> Vec<&Node> {
        return self.page.children.iter().collect();
    }

    fn selection(&self) -> Vec<&Node> {
        return self
            .page
            .selection
            .iter()
            .filter_map(|id| {
                let node = self.node(id);
                if node.is_none() {
                    tracing::warn!(node_id = %id, "selected node does not exist");
                }
                return node;
            })
            .collect();
    }
}

impl DocumentWrite for Document {
    fn bind_variable(&mut self, node_id: &str, field: &str, alias: VariableAlias) -> Result<(), FixFailure> {
        return self.with_node(node_id, |node| {
            node.bound_variables.insert(field.to_string(), BoundVariable::Alias(alias));
        });
    }

    fn set_paints(&mut self, node_id: &str, slot: PaintSlot, paints: Vec<Paint>) -> Result<(), FixFailure> {
        return self.with_node(node_id, |node| {
            let list = Some(Mixed::Value(paints));
            match slot {
                PaintSlot::Fill => node.fills = list,
                PaintSlot::Stroke => node.strokes = list,
            }
        });
    }

    fn set_style_id(&mut self, node_id: &str, field: StyleField, style_id: &str) -> Result<(), FixFailure> {
        return self.with_node(node_id, |node| {
            let value = Some(Mixed::Value(style_id.to_string()));
            match field {
                StyleField::Effect => node.effect_style_id = value,
                StyleField::Fill => node.fill_style_id = value,
                StyleField::Stroke => node.stroke_style_id = value,
                StyleField::Text => node.text_style_id = value,
            }
        });
    }
}

/// Read access point: enumerate and look up nodes.
pub trait DocumentRead {
    /// Find a node anywhere in the page.
    fn node(&self, id: &str) -> Option<&Node>;

    /// Top-level nodes of the page, in document order.
    fn roots(&self) -> Vec<&Node>;

    /// Currently selected nodes that still exist.
    fn selection(&self) -> Vec<&Node>;
}

/// Write access point. Every method re-resolves the node by id.
pub trait DocumentWrite: DocumentRead {
    /// Bind one slot to a variable, keeping the node's other bindings.
    ///
    /// # Errors
    ///
    /// Returns `FixFailure::NodeNotFound` if the node is gone.
    fn bind_variable(&mut self, node_id: &str, field: &str, alias: VariableAlias) -> Result<(), FixFailure>;

    /// Replace a whole paint list in one write.
    ///
    /// # Errors
    ///
    /// Returns `FixFailure::NodeNotFound` if the node is gone.
    fn set_paints(&mut self, node_id: &str, slot: PaintSlot, paints: Vec<Paint>) -> Result<(), FixFailure>;

    /// Point a named style-id field at a predefined style.
    ///
    /// # Errors
    ///
    /// Returns `FixFailure::NodeNotFound` if the node is gone.
    fn set_style_id(&mut self, node_id: &str, field: StyleField, style_id: &str) -> Result<(), FixFailure>;
}

/// One effect entry. Only the type is inspected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Effect {
    /// Effect type, e.g. `DROP_SHADOW`.
    #[serde(rename = "type")]
    pub effect_type: String,
    /// Everything else, carried verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Font family and style of a text node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FontName {
    /// Family, e.g. `Inter`.
    pub family: String,
    /// Style, e.g. `Bold`.
    pub style: String,
}

/// A slot value that may be inconsistent across a multi-selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Mixed<T> {
    /// The `"mixed"` sentinel. Treated as absent.
    Mixed(MixedMarker),
    /// A concrete value.
    Value(T),
}

impl<T> Mixed<T> {
    /// The concrete value, or `None` for the mixed sentinel.
    pub const fn value(&self) -> Option<&T> {
        return match self {
            Mixed::Mixed(_) => None,
            Mixed::Value(v) => Some(v),
        };
    }
}

/// Wire form of the mixed sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MixedMarker {
    /// Serialized as the string `"mixed"`.
    #[serde(rename = "mixed")]
    Mixed,
}

/// A document node. Absent slots mean the node type does not have them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Slot name to variable binding.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bound_variables: BTreeMap<String, BoundVariable>,
    /// Child nodes, in document order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Node>,
    /// Uniform corner radius.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub corner_radius: Option<Mixed<f64>>,
    /// Applied effect style.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effect_style_id: Option<Mixed<String>>,
    /// Effect list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effects: Option<Mixed<Vec<Effect>>>,
    /// Geometry, opacity, layout and every other unmodeled attribute, carried verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
    /// Applied fill style.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fill_style_id: Option<Mixed<String>>,
    /// Fill paint list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fills: Option<Mixed<Vec<Paint>>>,
    /// Font of a text node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_name: Option<Mixed<FontName>>,
    /// Font size of a text node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_size: Option<Mixed<f64>>,
    /// Node id, unique within the document.
    pub id: String,
    /// Gap between auto-layout children.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_spacing: Option<f64>,
    /// Auto-layout mode; `NONE` disables auto layout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_mode: Option<String>,
    /// Line height, kept opaque.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_height: Option<Mixed<serde_json::Value>>,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Node type, e.g. `FRAME` or `TEXT`.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Bottom padding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding_bottom: Option<f64>,
    /// Left padding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding_left: Option<f64>,
    /// Right padding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding_right: Option<f64>,
    /// Top padding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub padding_top: Option<f64>,
    /// Applied stroke style.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_style_id: Option<Mixed<String>>,
    /// Stroke paint list.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strokes: Option<Mixed<Vec<Paint>>>,
    /// Applied text style.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_style_id: Option<Mixed<String>>,
    /// Hidden nodes are skipped, with their subtree, unless the scan includes them.
    #[serde(default = "visible_by_default", skip_serializing_if = "is_visible")]
    pub visible: bool,
}

impl Node {
    /// True when this slot has a variable binding.
    pub fn is_bound(&self, slot: &str) -> bool {
        return self.bound_variables.contains_key(slot);
    }

    /// True for frames with an auto-layout mode other than `NONE`.
    pub fn is_auto_layout_frame(&self) -> bool {
        return self.node_type == FRAME_NODE
            && self.layout_mode.as_deref().is_some_and(|mode| return mode != "NONE");
    }

    /// True for text nodes.
    pub fn is_text(&self) -> bool {
        return self.node_type == TEXT_NODE;
    }

    /// Current value of a spacing slot by its property name, if the node has it.
    pub fn spacing(&self, property: &str) -> Option<f64> {
        return match property {
            "itemSpacing" => self.item_spacing,
            "paddingBottom" => self.padding_bottom,
            "paddingLeft" => self.padding_left,
            "paddingRight" => self.padding_right,
            "paddingTop" => self.padding_top,
            _ => None,
        };
    }

    /// True when a named style is applied to this field.
    /// An empty or mixed style id does not count.
    pub fn has_style(&self, field: StyleField) -> bool {
        let id = match field {
            StyleField::Effect => &self.effect_style_id,
            StyleField::Fill => &self.fill_style_id,
            StyleField::Stroke => &self.stroke_style_id,
            StyleField::Text => &self.text_style_id,
        };
        return id.as_ref().and_then(Mixed::value).is_some_and(|s| return !s.is_empty());
    }
}

/// A single page: the unit a document file holds.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Top-level nodes.
    #[serde(default)]
    pub children: Vec<Node>,
    /// Page id and anything else the page carries.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
    /// Page name.
    #[serde(default)]
    pub name: String,
    /// Ids of the selected nodes.
    #[serde(default)]
    pub selection: Vec<String>,
}

/// One entry of a fill or stroke list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paint {
    /// Paint-level bindings; `color` binds a solid paint's color.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub bound_variables: BTreeMap<String, VariableAlias>,
    /// Solid color channels. Absent for gradients and images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<ChannelColor>,
    /// Everything else (opacity, blend mode, visibility), carried verbatim.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
    /// Paint type, e.g. `SOLID` or `GRADIENT_LINEAR`.
    #[serde(rename = "type")]
    pub paint_type: String,
}

impl Paint {
    /// The color of a solid paint. `None` for every other paint type.
    pub fn solid_color(&self) -> Option<&ChannelColor> {
        if self.paint_type != "SOLID" {
            return None;
        }
        return self.color.as_ref();
    }
}

/// Which paint list a color record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaintSlot {
    /// The fill list.
    Fill,
    /// The stroke list.
    Stroke,
}

impl PaintSlot {
    /// Node-level binding key for the whole list.
    pub const fn binding_key(self) -> &'static str {
        return match self {
            PaintSlot::Fill => "fills",
            PaintSlot::Stroke => "strokes",
        };
    }

    /// The node's current list for this slot.
    pub const fn list(self, node: &Node) -> Option<&Mixed<Vec<Paint>>> {
        return match self {
            PaintSlot::Fill => node.fills.as_ref(),
            PaintSlot::Stroke => node.strokes.as_ref(),
        };
    }

    /// Property-name prefix, as in `fill[0]`.
    pub const fn prefix(self) -> &'static str {
        return match self {
            PaintSlot::Fill => "fill",
            PaintSlot::Stroke => "stroke",
        };
    }

    /// Style-id field that names a paint style for this list.
    pub const fn style_field(self) -> StyleField {
        return match self {
            PaintSlot::Fill => StyleField::Fill,
            PaintSlot::Stroke => StyleField::Stroke,
        };
    }
}

/// Named style-id fields on a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StyleField {
    /// `effectStyleId`.
    Effect,
    /// `fillStyleId`.
    Fill,
    /// `strokeStyleId`.
    Stroke,
    /// `textStyleId`.
    Text,
}

/// Reference from a slot to a variable, by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableAlias {
    /// Variable id.
    pub id: String,
    /// Always `VARIABLE_ALIAS`.
    #[serde(rename = "type")]
    pub alias_type: String,
}

impl VariableAlias {
    /// Alias pointing at `variable_id`.
    pub fn to_variable(variable_id: &str) -> Self {
        return Self { id: variable_id.to_string(), alias_type: "VARIABLE_ALIAS".to_string() };
    }
}

/// Depth-first search for a node by id.
fn find_node<'a>(nodes: &'a [Node], id: &str) -> Option<&'a Node> {
    for node in nodes {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_node(&node.children, id) {
            return Some(found);
        }
    }
    return None;
}

/// Depth-first search for a node by id, mutably.
fn find_node_mut<'a>(nodes: &'a mut [Node], id: &str) -> Option<&'a mut Node> {
    for node in nodes {
        if node.id == id {
            return Some(node);
        }
        if let Some(found) = find_node_mut(&mut node.children, id) {
            return Some(found);
        }
    }
    return None;
}

/// Rewrite whole-valued floats as integers, the way the host exports them.
#[allow(clippy::cast_possible_truncation, reason = "only whole values in the exact-integer range are cast")]
fn integral_numbers(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Array(items) => items.iter_mut().for_each(integral_numbers),
        serde_json::Value::Number(n) if n.is_f64() => {
            let whole = n.as_f64().filter(|f| return f.fract() == 0.0 && f.abs() < MAX_EXACT_INTEGER);
            if let Some(f) = whole {
                *value = serde_json::Value::from(f as i64);
            }
        },
        serde_json::Value::Object(map) => map.values_mut().for_each(integral_numbers),
        _ => {},
    }
}

/// Serde skip predicate for the default visibility.
#[allow(clippy::trivially_copy_pass_by_ref, reason = "serde passes fields by reference")]
const fn is_visible(visible: &bool) -> bool {
    return *visible;
}

/// Serde default: nodes are visible unless stated otherwise.
const fn visible_by_default() -> bool {
    return true;
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "test code")]
mod tests {
    use super::*;

    fn sample_page() -> Page {
        return serde_json::from_str(
            r##"{
                "name": "Page 1",
                "selection": ["card"],
                "children": [{
                    "id": "card", "name": "Card", "type": "FRAME",
                    "layoutMode": "VERTICAL", "itemSpacing": 8,
                    "fills": [{"type": "SOLID", "color": {"r": 0.2, "g": 0.4, "b": 0.6}, "opacity": 0.9, "blendMode": "NORMAL"}],
                    "fillStyleId": "mixed",
                    "children": [{"id": "title", "name": "Title", "type": "TEXT", "visible": false}]
                }]
            }"##,
        )
        .unwrap();
    }

    #[test]
    fn mixed_sentinel_reads_as_absent() {
        let page = sample_page();
        let card = page.children.first().unwrap();
        assert_eq!(card.fill_style_id, Some(Mixed::Mixed(MixedMarker::Mixed)));
        assert!(!card.has_style(StyleField::Fill));
    }

    #[test]
    fn finds_nested_nodes_by_id() {
        let doc = Document::from_page(sample_page());
        let title = doc.node("title").unwrap();
        assert!(title.is_text());
        assert!(!title.visible);
        assert_eq!(doc.selection().len(), 1);
    }

    #[test]
    fn bind_variable_merges_with_existing_bindings() {
        let mut doc = Document::from_page(sample_page());
        doc.bind_variable("card", "paddingLeft", VariableAlias::to_variable("v1")).unwrap();
        doc.bind_variable("card", "itemSpacing", VariableAlias::to_variable("v2")).unwrap();
        let card = doc.node("card").unwrap();
        assert!(card.is_bound("paddingLeft"));
        assert!(card.is_bound("itemSpacing"));
        assert!(doc.is_modified());
    }

    #[test]
    fn writes_to_missing_nodes_fail() {
        let mut doc = Document::from_page(sample_page());
        let err = doc.set_style_id("gone", StyleField::Text, "S:1").unwrap_err();
        assert_eq!(err, FixFailure::NodeNotFound { node_id: "gone".to_string() });
        assert!(!doc.is_modified());
    }

    #[test]
    fn unknown_paint_attributes_survive_a_round_trip() {
        let page = sample_page();
        let json = serde_json::to_value(&page).unwrap();
        let paint = &json["children"][0]["fills"][0];
        assert_eq!(paint["blendMode"], "NORMAL");
        assert_eq!(paint["opacity"], 0.9);
        assert_eq!(json["children"][0]["fillStyleId"], "mixed");
    }

    #[test]
    fn save_keeps_unmodeled_attributes_and_whole_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("document.json");
        std::fs::write(
            &path,
            r#"{"id": "0:1", "name": "P", "children": [{
                "id": "1", "name": "Card", "type": "FRAME",
                "x": 10, "y": 20, "width": 300, "height": 200, "opacity": 0.5,
                "cornerRadius": 8, "topLeftRadius": 8, "layoutAlign": "STRETCH"
            }]}"#,
        )
        .unwrap();

        let mut doc = Document::load(&path).unwrap();
        doc.bind_variable("1", "cornerRadius", VariableAlias::to_variable("v-radius")).unwrap();
        doc.save().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let saved: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(saved["id"], "0:1");
        let card = &saved["children"][0];
        assert_eq!(card["width"], 300);
        assert_eq!(card["height"], 200);
        assert_eq!(card["x"], 10);
        assert_eq!(card["opacity"], 0.5);
        assert_eq!(card["topLeftRadius"], 8);
        assert_eq!(card["layoutAlign"], "STRETCH");
        assert_eq!(card["cornerRadius"], 8);
        assert_eq!(card["boundVariables"]["cornerRadius"]["id"], "v-radius");
        assert!(!text.contains("8.0"), "saved: {text}");
    }
}
