//! Project configuration read from `.tokenlink.toml`.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::Error;
use crate::scanner::ScanOptions;

/// Config file name, looked up in the project root.
pub const CONFIG_FILE: &str = ".tokenlink.toml";

/// Project configuration loaded from `.tokenlink.toml`.
/// Paths are relative to the project root.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Document file to scan and fix.
    pub document: PathBuf,
    /// Directory of `*.tokens.json` libraries.
    pub libraries: PathBuf,
    /// Scan budget and category gates.
    pub scan: ScanOptions,
}

impl Default for Config {
    fn default() -> Self {
        return Self {
            document: PathBuf::from("document.json"),
            libraries: PathBuf::from("tokens"),
            scan: ScanOptions::default(),
        };
    }
}

impl Config {
    /// Absolute-or-root-relative document path.
    pub fn document_path(&self, root: &Path) -> PathBuf {
        return root.join(&self.document);
    }

    /// Absolute-or-root-relative token directory.
    pub fn libraries_path(&self, root: &Path) -> PathBuf {
        return root.join(&self.libraries);
    }

    /// Load config from `.tokenlink.toml` in `root`.
    /// A missing file gives the defaults; a file that exists but does not
    /// parse is an error, never a silent fallback.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if reading fails (other than not-found),
    /// or `Error::TomlDe` if the TOML is malformed.
    pub fn load(root: &Path) -> Result<Self, Error> {
        let path = root.join(CONFIG_FILE);
        let content = match std::fs::read_to_string(&path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            },
            Err(e) => return Err(Error::Io(e)),
            Ok(c) => c,
        };
        return Ok(toml::from_str(&content)?);
    }
}
