//! Crate-level error types for tokenlink diagnostics.
use std::path::PathBuf;

use crate::types::StyleCategory;

/// Scan-level and I/O failures. Each variant carries enough context to render
/// a useful diagnostic: the file, the count, or the reason.
#[allow(clippy::error_impl_error, reason = "crate-internal error type in binary")]
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A cancel request arrived while a scan was running.
    #[error("scan cancelled")]
    Cancelled,

    /// The document file exists but does not describe a valid page.
    #[error("document corrupt: {}: {reason}", path.display())]
    DocumentCorrupt {
        /// Document file that failed to parse.
        path: PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// The document file does not exist on disk.
    #[error("document not found: {}", path.display())]
    DocumentNotFound {
        /// Path to the missing document.
        path: PathBuf,
    },

    /// A selection scan was requested but nothing is selected.
    #[error("no nodes selected; select at least one layer to scan")]
    EmptySelection,

    /// Underlying I/O error from the filesystem.
    #[error("io: {0}")]
    Io(
        /// The wrapped I/O error.
        #[from]
        std::io::Error,
    ),

    /// JSON (de)serialization failed.
    #[error("json: {0}")]
    Json(
        /// The wrapped JSON error.
        #[from]
        serde_json::Error,
    ),

    /// An apply batch was submitted with zero fixes.
    #[error("no fixes to apply")]
    NoFixes,

    /// No library produced a usable token.
    #[error("{reason}")]
    NoLibraries {
        /// Human-readable explanation from the library extractor.
        reason: String,
    },

    /// The scope holds more nodes than the configured budget.
    #[error("too many nodes ({count} found, limit {limit})")]
    NodeLimitExceeded {
        /// Number of nodes counted in scope.
        count: usize,
        /// Configured node budget.
        limit: usize,
    },

    /// The configured token directory does not exist.
    #[error("token source not found: {}", path.display())]
    TokenSourceNotFound {
        /// Path to the missing token directory.
        path: PathBuf,
    },

    /// TOML deserialization failed.
    #[error("toml deserialize: {0}")]
    TomlDe(
        /// The wrapped TOML deserialization error.
        #[from]
        toml::de::Error,
    ),
}

/// Why a single fix could not be applied. Counted per fix by the resolver,
/// never propagated past the batch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FixFailure {
    /// The paint index recorded at scan time is past the end of the node's current list.
    #[error("{property} out of range on node {node_id} (list has {len} entries)")]
    IndexOutOfRange {
        /// Current length of the paint list.
        len: usize,
        /// Node whose paint list shrank.
        node_id: String,
        /// Index-qualified property name from the scan.
        property: String,
    },

    /// The property name does not encode a paint slot and index.
    #[error("malformed property name: {property}")]
    MalformedProperty {
        /// Property name that failed to parse.
        property: String,
    },

    /// The fix names neither a variable nor a style.
    #[error("fix for {detached_style_id} names no variable or style")]
    MissingTarget {
        /// Detached style the fix was submitted for.
        detached_style_id: String,
    },

    /// The node was deleted after the scan.
    #[error("node not found: {node_id}")]
    NodeNotFound {
        /// Node id recorded at scan time.
        node_id: String,
    },

    /// A typography fix targets a node that is no longer text.
    #[error("node {node_id} is not a text node")]
    NotTextNode {
        /// Node that changed type.
        node_id: String,
    },

    /// The structural slot is gone or holds a mixed value.
    #[error("slot {property} missing on node {node_id}")]
    SlotMissing {
        /// Node that lost the slot.
        node_id: String,
        /// Slot name from the scan.
        property: String,
    },

    /// The detached style id is not part of the current scan.
    #[error("detached style not found: {detached_style_id}")]
    StyleNotFound {
        /// Unknown or stale detached style id.
        detached_style_id: String,
    },

    /// No mutation is defined for this category.
    #[error("unsupported style category: {category}")]
    UnsupportedCategory {
        /// Category of the detached style.
        category: StyleCategory,
    },

    /// A predefined style cannot be applied to this category's slot.
    #[error("a style cannot be applied to a {category} slot")]
    UnsupportedStyleTarget {
        /// Category of the detached style.
        category: StyleCategory,
    },
}
