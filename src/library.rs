//! Token libraries: reading token sources, categorizing tokens, and finding
//! values defined in more than one library.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use walkdir::WalkDir;

use crate::color::{self, ChannelColor};
use crate::document::{Effect, FontName, Paint, VariableAlias};
use crate::error::Error;
use crate::types::{LibraryInfo, LibraryStyle, StyleCategory, StyleKind, Token};

/// File suffix of library files inside a token directory.
const LIBRARY_SUFFIX: &str = ".tokens.json";

/// Normalized value to the ids of the libraries defining it. Only values
/// defined by two or more libraries are present.
pub type ConflictMap = BTreeMap<String, Vec<String>>;

/// Libraries extracted for one scan, or the reason there are none usable.
#[derive(Debug, Clone, Default)]
pub struct LibrarySet {
    /// Set when no library produced a token, or the store could not be read.
    pub error_message: Option<String>,
    /// Libraries with at least one token, in source order.
    pub libraries: Vec<LibraryInfo>,
}

impl LibrarySet {
    /// An empty set carrying `message`.
    fn unusable(message: &str) -> Self {
        return Self { error_message: Some(message.to_string()), libraries: Vec::new() };
    }
}

/// One mode of a variable collection. Only the id is needed to pick values.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Mode {
    /// Mode id, the key into `valuesByMode`.
    pub mode_id: String,
}

/// A predefined style as the token source stores it.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawStyle {
    /// Effects of an effect style.
    #[serde(default)]
    pub effects: Vec<Effect>,
    /// Font of a text style.
    #[serde(default)]
    pub font_name: Option<FontName>,
    /// Font size of a text style.
    #[serde(default)]
    pub font_size: Option<f64>,
    /// Style id.
    pub id: String,
    /// Style name.
    #[serde(default)]
    pub name: String,
    /// Paints of a paint style.
    #[serde(default)]
    pub paints: Vec<Paint>,
    /// Style kind.
    pub style_type: StyleKind,
}

/// A variable as the token source stores it, with one value per mode.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawVariable {
    /// Variable id.
    pub id: String,
    /// Variable name.
    pub name: String,
    /// Declared type.
    pub resolved_type: VariableType,
    /// Mode id to value.
    #[serde(default)]
    pub values_by_mode: BTreeMap<String, VariableValue>,
}

/// Where a token source lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHandle {
    /// Short name, used as the library id when the source declares none.
    pub label: String,
    /// Backing file.
    pub path: PathBuf,
}

/// A directory of `*.tokens.json` library files.
#[derive(Debug, Clone)]
pub struct TokenDirectory {
    /// Directory walked for library files.
    root: PathBuf,
}

impl TokenDirectory {
    /// A store rooted at `root`.
    pub fn new(root: &Path) -> Self {
        return Self { root: root.to_path_buf() };
    }
}

impl TokenStore for TokenDirectory {
    fn read(&self, source: &SourceHandle) -> Result<TokenSource, Error> {
        let content = std::fs::read_to_string(&source.path)?;
        return Ok(serde_json::from_str(&content)?);
    }

    fn sources(&self) -> Result<Vec<SourceHandle>, Error> {
        if !self.root.is_dir() {
            return Err(Error::TokenSourceNotFound { path: self.root.clone() });
        }
        let handles = WalkDir::new(&self.root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| return e.file_type().is_file())
            .filter_map(|e| {
                let file_name = e.file_name().to_string_lossy();
                let label = file_name.strip_suffix(LIBRARY_SUFFIX)?.to_string();
                return Some(SourceHandle { label, path: e.path().to_path_buf() });
            })
            .collect();
        return Ok(handles);
    }
}

/// One library's worth of collections and styles.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSource {
    /// Variable collections.
    #[serde(default)]
    pub collections: Vec<VariableCollection>,
    /// Library id. Falls back to the source label when empty.
    #[serde(default)]
    pub id: String,
    /// Library name. Falls back to the id when empty.
    #[serde(default)]
    pub name: String,
    /// Predefined styles.
    #[serde(default)]
    pub styles: Vec<RawStyle>,
}

/// Token-store access point.
pub trait TokenStore {
    /// Read one source.
    ///
    /// # Errors
    ///
    /// Returns an error when the source cannot be read or parsed.
    fn read(&self, source: &SourceHandle) -> Result<TokenSource, Error>;

    /// Enumerate available sources, in a stable order.
    ///
    /// # Errors
    ///
    /// Returns an error when the store itself is unavailable.
    fn sources(&self) -> Result<Vec<SourceHandle>, Error>;
}

/// A group of variables sharing a set of modes.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableCollection {
    /// Mode whose values are used. Defaults to the first mode.
    #[serde(default)]
    pub default_mode_id: Option<String>,
    /// Declared modes.
    #[serde(default)]
    pub modes: Vec<Mode>,
    /// Collection name.
    #[serde(default)]
    pub name: String,
    /// Variables in source order.
    #[serde(default)]
    pub variables: Vec<RawVariable>,
}

impl VariableCollection {
    /// The mode whose values resolve tokens.
    fn default_mode(&self) -> Option<&str> {
        return self
            .default_mode_id
            .as_deref()
            .or_else(|| return self.modes.first().map(|m| return m.mode_id.as_str()));
    }
}

/// Declared type of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VariableType {
    /// True/false.
    Boolean,
    /// Color channels.
    Color,
    /// Number.
    Float,
    /// Text.
    String,
}

/// A variable's value in one mode.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    /// Reference to another variable. Not followed.
    Alias(VariableAlias),
    /// Color channels.
    Color(ChannelColor),
    /// Boolean flag.
    Flag(bool),
    /// Number.
    Number(f64),
    /// Text.
    Text(String),
}

/// Infer a token's category from its declared type, name and value.
///
/// Name checks are case-insensitive substring checks, so `card-radius` and
/// `radiusOfCurvature` both count as radius tokens.
pub fn categorize(resolved_type: VariableType, name: &str, value: &str) -> StyleCategory {
    let name = name.to_lowercase();
    let name_has = |needles: &[&str]| return needles.iter().any(|n| return name.contains(n));

    match resolved_type {
        VariableType::Color => return StyleCategory::Color,
        VariableType::Float => {
            if name_has(&["radius", "corner"]) {
                return StyleCategory::CornerRadius;
            }
            if name_has(&["spacing", "gap", "padding", "margin"]) {
                return StyleCategory::Spacing;
            }
        },
        VariableType::String => {
            let has_unit = ["px", "em", "rem"].iter().any(|u| return value.contains(u));
            if has_unit && name_has(&["font", "text", "typography"]) {
                return StyleCategory::Typography;
            }
        },
        VariableType::Boolean => {},
    }
    return StyleCategory::Other;
}

/// Values defined by two or more libraries, from color variables and from
/// every predefined style. Keys are lower-cased normalized values.
pub fn check_for_conflicts(libraries: &[LibraryInfo]) -> ConflictMap {
    let mut by_value: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for library in libraries {
        let colors = library
            .variables
            .iter()
            .filter(|t| return t.category == StyleCategory::Color)
            .map(|t| return t.value.as_str());
        let styles = library.styles.iter().map(|s| return s.value.as_str());

        for value in colors.chain(styles) {
            let owners = by_value.entry(value.to_lowercase()).or_default();
            if !owners.contains(&library.id) {
                owners.push(library.id.clone());
            }
        }
    }
    by_value.retain(|_, owners| return owners.len() > 1);
    return by_value;
}

/// Turn one raw source into a library, dropping values that are not tokens.
fn extract_library(source: TokenSource, handle: &SourceHandle) -> LibraryInfo {
    let id = if source.id.is_empty() { handle.label.clone() } else { source.id };
    let name = if source.name.is_empty() { id.clone() } else { source.name };

    let mut seen: HashSet<String> = HashSet::new();
    let mut variables = Vec::new();
    for collection in &source.collections {
        let Some(mode) = collection.default_mode() else {
            tracing::warn!(library = %id, collection = %collection.name, "collection has no modes, skipped");
            continue;
        };
        for raw in &collection.variables {
            let Some(value) = raw.values_by_mode.get(mode).and_then(|v| return resolve_value(raw.resolved_type, v)) else {
                tracing::debug!(library = %id, variable = %raw.name, "no usable default-mode value");
                continue;
            };
            if !seen.insert(raw.id.clone()) {
                tracing::warn!(library = %id, variable = %raw.id, "duplicate variable id dropped");
                continue;
            }
            variables.push(Token {
                category: categorize(raw.resolved_type, &raw.name, &value),
                id: raw.id.clone(),
                name: raw.name.clone(),
                value,
            });
        }
    }

    let mut styles = Vec::new();
    for raw in &source.styles {
        let Some(style) = extract_style(raw) else {
            tracing::debug!(library = %id, style = %raw.name, "style has no comparable value");
            continue;
        };
        if !seen.insert(style.id.clone()) {
            tracing::warn!(library = %id, style = %style.id, "duplicate style id dropped");
            continue;
        }
        styles.push(style);
    }

    return LibraryInfo { id, name, styles, variables };
}

/// Categorize and normalize a predefined style.
fn extract_style(raw: &RawStyle) -> Option<LibraryStyle> {
    let (category, value) = match raw.style_type {
        StyleKind::Effect => {
            let types: Vec<&str> = raw.effects.iter().map(|e| return e.effect_type.as_str()).collect();
            (StyleCategory::Other, format!("Effect: {}", types.join(", ")))
        },
        StyleKind::Grid => (StyleCategory::Other, "Grid".to_string()),
        StyleKind::Paint => {
            let paint = raw
                .paints
                .iter()
                .find(|p| return p.extra.get("visible") != Some(&serde_json::Value::Bool(false)))?;
            match paint.solid_color() {
                Some(channels) => (StyleCategory::Color, color::from_channels(channels)?),
                None => (StyleCategory::Other, format!("Paint: {}", paint.paint_type)),
            }
        },
        StyleKind::Text => {
            let font = raw.font_name.as_ref()?;
            let size = raw.font_size?;
            (StyleCategory::Typography, format!("{} {size}", font.family))
        },
    };
    return Some(LibraryStyle {
        category,
        id: raw.id.clone(),
        name: raw.name.clone(),
        style_type: raw.style_type,
        value,
    });
}

/// Read every source in `store` into libraries.
///
/// A source that fails to read is logged and skipped. Problems that leave
/// nothing to match against are reported through `error_message`.
pub fn get_libraries<S: TokenStore>(store: &S) -> LibrarySet {
    let handles = match store.sources() {
        Err(e) => {
            tracing::warn!("token store unavailable: {e}");
            return LibrarySet::unusable(&format!("Error accessing connected libraries: {e}"));
        },
        Ok(h) => h,
    };
    if handles.is_empty() {
        return LibrarySet::unusable("No connected libraries found. Please connect a library with variables.");
    }

    let mut libraries: Vec<LibraryInfo> = Vec::new();
    for handle in &handles {
        let source = match store.read(handle) {
            Err(e) => {
                tracing::warn!(library = %handle.label, path = %handle.path.display(), "skipping library: {e}");
                continue;
            },
            Ok(s) => s,
        };
        let library = extract_library(source, handle);
        if library.variables.is_empty() && library.styles.is_empty() {
            tracing::debug!(library = %library.id, "library has no tokens");
            continue;
        }
        if libraries.iter().any(|l| return l.id == library.id) {
            tracing::warn!(library = %library.id, path = %handle.path.display(), "duplicate library id, skipped");
            continue;
        }
        libraries.push(library);
    }

    if libraries.is_empty() {
        return LibrarySet::unusable("No variables found in connected libraries.");
    }
    tracing::debug!(count = libraries.len(), "libraries extracted");
    return LibrarySet { error_message: None, libraries };
}

/// Render a resolved value as a comparable string. Colors are normalized,
/// numbers use their shortest decimal form; booleans, aliases and empty
/// strings are not tokens.
fn resolve_value(resolved_type: VariableType, value: &VariableValue) -> Option<String> {
    return match value {
        VariableValue::Alias(alias) => {
            tracing::debug!(target_variable = %alias.id, "aliased values are not followed");
            None
        },
        VariableValue::Flag(_) => None,
        VariableValue::Color(channels) => color::from_channels(channels),
        VariableValue::Number(n) => n.is_finite().then(|| return format!("{n}")),
        VariableValue::Text(text) if text.is_empty() => None,
        VariableValue::Text(text) if resolved_type == VariableType::Color => color::normalize_str(text),
        VariableValue::Text(text) => Some(text.clone()),
    };
}

#[cfg(test)]
#[allow(clippy::missing_panics_doc, reason = "test code")]
pub(crate) mod tests {
    use serde_json::json;

    use super::*;

    /// In-memory store; a source given as `Err` fails to read.
    pub(crate) struct MemoryStore(pub Vec<(String, Result<serde_json::Value, String>)>);

    impl TokenStore for MemoryStore {
        fn read(&self, source: &SourceHandle) -> Result<TokenSource, Error> {
            let (_, entry) = self.0.iter().find(|(label, _)| return *label == source.label).unwrap();
            return match entry {
                Err(reason) => Err(Error::Io(std::io::Error::other(reason.clone()))),
                Ok(value) => Ok(serde_json::from_value(value.clone())?),
            };
        }

        fn sources(&self) -> Result<Vec<SourceHandle>, Error> {
            return Ok(self
                .0
                .iter()
                .map(|(label, _)| return SourceHandle { label: label.clone(), path: PathBuf::from(label) })
                .collect());
        }
    }

    /// A library with one collection in mode `m` holding `variables`.
    pub(crate) fn library_json(id: &str, variables: serde_json::Value) -> serde_json::Value {
        return json!({
            "id": id,
            "name": format!("{id} tokens"),
            "collections": [{"id": "c", "name": "Core", "modes": [{"modeId": "m", "name": "Default"}], "variables": variables}]
        });
    }

    /// A color variable with channels `(r, g, b)` in mode `m`.
    pub(crate) fn color_var(id: &str, name: &str, rgb: (f64, f64, f64)) -> serde_json::Value {
        return json!({
            "id": id, "name": name, "resolvedType": "COLOR",
            "valuesByMode": {"m": {"r": rgb.0, "g": rgb.1, "b": rgb.2, "a": 1}}
        });
    }

    #[test]
    fn category_rules_use_type_and_name_substrings() {
        assert_eq!(categorize(VariableType::Color, "anything", "#fff"), StyleCategory::Color);
        assert_eq!(categorize(VariableType::Float, "card-radius", "8"), StyleCategory::CornerRadius);
        assert_eq!(categorize(VariableType::Float, "radiusOfCurvature", "8"), StyleCategory::CornerRadius);
        assert_eq!(categorize(VariableType::Float, "Space/Gap-MD", "12"), StyleCategory::Spacing);
        assert_eq!(categorize(VariableType::Float, "opacity/disabled", "0.4"), StyleCategory::Other);
        assert_eq!(categorize(VariableType::String, "font/body", "16px"), StyleCategory::Typography);
        assert_eq!(categorize(VariableType::String, "font/family", "Inter"), StyleCategory::Other);
        assert_eq!(categorize(VariableType::String, "label", "2rem"), StyleCategory::Other);
    }

    #[test]
    fn default_mode_values_are_normalized() {
        let store = MemoryStore(vec![(
            "brand".to_string(),
            Ok(json!({
                "id": "brand", "name": "Brand",
                "collections": [{
                    "id": "c", "name": "Theme", "defaultModeId": "dark",
                    "modes": [{"modeId": "light"}, {"modeId": "dark"}],
                    "variables": [
                        {"id": "v1", "name": "color/bg", "resolvedType": "COLOR",
                         "valuesByMode": {"light": {"r": 1, "g": 1, "b": 1}, "dark": {"r": 0.2, "g": 0.4, "b": 0.6}}},
                        {"id": "v2", "name": "spacing/md", "resolvedType": "FLOAT", "valuesByMode": {"dark": 16}},
                        {"id": "v3", "name": "flag", "resolvedType": "BOOLEAN", "valuesByMode": {"dark": true}},
                        {"id": "v4", "name": "alias", "resolvedType": "COLOR",
                         "valuesByMode": {"dark": {"type": "VARIABLE_ALIAS", "id": "v1"}}}
                    ]
                }]
            })),
        )]);
        let set = get_libraries(&store);
        assert_eq!(set.error_message, None);
        let lib = set.libraries.first().unwrap();
        assert_eq!(lib.variables.len(), 2);
        assert_eq!(lib.variable("v1").unwrap().value, "#336699");
        let spacing = lib.variable("v2").unwrap();
        assert_eq!(spacing.value, "16");
        assert_eq!(spacing.category, StyleCategory::Spacing);
    }

    #[test]
    fn styles_are_categorized_by_kind() {
        let store = MemoryStore(vec![(
            "ui".to_string(),
            Ok(json!({
                "id": "ui",
                "styles": [
                    {"id": "S:1", "name": "Primary", "styleType": "PAINT",
                     "paints": [{"type": "SOLID", "visible": false, "color": {"r": 1, "g": 0, "b": 0}},
                                {"type": "SOLID", "color": {"r": 0.2, "g": 0.4, "b": 0.6}}]},
                    {"id": "S:2", "name": "Body", "styleType": "TEXT",
                     "fontName": {"family": "Inter", "style": "Regular"}, "fontSize": 16},
                    {"id": "S:3", "name": "Shadow", "styleType": "EFFECT", "effects": [{"type": "DROP_SHADOW"}]}
                ]
            })),
        )]);
        let lib = get_libraries(&store).libraries.into_iter().next().unwrap();
        assert_eq!(lib.name, "ui");
        let primary = lib.style("S:1").unwrap();
        assert_eq!((primary.category, primary.value.as_str()), (StyleCategory::Color, "#336699"));
        let body = lib.style("S:2").unwrap();
        assert_eq!((body.category, body.value.as_str()), (StyleCategory::Typography, "Inter 16"));
        assert_eq!(lib.style("S:3").unwrap().category, StyleCategory::Other);
    }

    #[test]
    fn unreadable_library_does_not_block_others() {
        let store = MemoryStore(vec![
            ("broken".to_string(), Err("permission denied".to_string())),
            ("brand".to_string(), Ok(library_json("brand", json!([color_var("v", "c", (0.0, 0.0, 0.0))])))),
        ]);
        let set = get_libraries(&store);
        assert_eq!(set.error_message, None);
        assert_eq!(set.libraries.len(), 1);
    }

    #[test]
    fn empty_store_is_reported_not_thrown() {
        let set = get_libraries(&MemoryStore(Vec::new()));
        assert!(set.libraries.is_empty());
        assert!(set.error_message.unwrap().starts_with("No connected libraries found"));

        let tokenless = MemoryStore(vec![("empty".to_string(), Ok(library_json("empty", json!([]))))]);
        assert_eq!(
            get_libraries(&tokenless).error_message.as_deref(),
            Some("No variables found in connected libraries.")
        );
    }

    #[test]
    fn duplicate_token_ids_keep_the_first() {
        let store = MemoryStore(vec![(
            "brand".to_string(),
            Ok(library_json(
                "brand",
                json!([color_var("v", "first", (0.0, 0.0, 0.0)), color_var("v", "second", (1.0, 1.0, 1.0))]),
            )),
        )]);
        let lib = get_libraries(&store).libraries.into_iter().next().unwrap();
        assert_eq!(lib.variables.len(), 1);
        assert_eq!(lib.variable("v").unwrap().name, "first");
    }

    #[test]
    fn shared_color_across_libraries_is_a_conflict() {
        let store = MemoryStore(vec![
            ("a".to_string(), Ok(library_json("libA", json!([color_var("a1", "blue", (0.2, 0.4, 0.6))])))),
            ("b".to_string(), Ok(library_json("libB", json!([
                color_var("b1", "primary", (0.2, 0.4, 0.6)),
                color_var("b2", "red", (1.0, 0.0, 0.0))
            ])))),
        ]);
        let conflicts = check_for_conflicts(&get_libraries(&store).libraries);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts.get("#336699").unwrap(), &vec!["libA".to_string(), "libB".to_string()]);
    }

    #[test]
    fn same_library_duplicates_are_not_conflicts() {
        let store = MemoryStore(vec![(
            "a".to_string(),
            Ok(library_json("libA", json!([
                color_var("a1", "blue", (0.2, 0.4, 0.6)),
                color_var("a2", "also-blue", (0.2, 0.4, 0.6))
            ]))),
        )]);
        assert!(check_for_conflicts(&get_libraries(&store).libraries).is_empty());
    }

    #[test]
    fn token_directory_reads_library_files_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, value: &serde_json::Value| {
            std::fs::write(dir.path().join(name), serde_json::to_string(value).unwrap()).unwrap();
        };
        write("b.tokens.json", &library_json("b", json!([color_var("v", "c", (0.0, 0.0, 0.0))])));
        write("a.tokens.json", &library_json("a", json!([color_var("v", "c", (0.0, 0.0, 0.0))])));
        write("notes.json", &json!({}));
        std::fs::write(dir.path().join("c.tokens.json"), "{ not json").unwrap();

        let set = get_libraries(&TokenDirectory::new(dir.path()));
        let ids: Vec<&str> = set.libraries.iter().map(|l| return l.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn missing_token_directory_is_reported() {
        let set = get_libraries(&TokenDirectory::new(Path::new("/nonexistent/tokens")));
        assert!(set.error_message.unwrap().starts_with("Error accessing connected libraries"));
    }
}
