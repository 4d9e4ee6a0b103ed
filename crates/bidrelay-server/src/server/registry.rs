//! Text-file vendor registry.
//!
//! One vendor address per line, blank lines ignored, order preserved. The
//! file is read in full on every [`VendorRegistry::load`]; nothing is cached
//! between requests, so edits take effect on the next lookup.

use bidrelay_core::{Error, Result, VendorEndpoint};
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(Clone, Debug)]
pub struct VendorRegistry {
    path: PathBuf,
}

impl VendorRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the registry and returns its endpoints in file order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Registry`] if the file is missing, unreadable or not
    /// UTF-8.
    pub fn load(&self) -> Result<Vec<VendorEndpoint>> {
        let contents = fs::read_to_string(&self.path).map_err(|e| Error::Registry {
            path: self.path.display().to_string(),
            reason: e.to_string(),
        })?;
        Ok(parse_registry(&contents))
    }
}

/// Parses registry contents, one endpoint per non-blank line.
pub fn parse_registry(contents: &str) -> Vec<VendorEndpoint> {
    contents.lines().filter_map(VendorEndpoint::parse).collect()
}
