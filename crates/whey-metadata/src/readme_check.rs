//! Interface for the optional readme-validation collaborator.
//!
//! Rendering readmes (e.g. checking that the markup would render on PyPI) is delegated to
//! an external implementation; the backend only defines the seam and the `CHECK_README`
//! gate.

use std::env;

use crate::project::Readme;

/// A finding produced by a readme validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    /// 1-indexed line in the readme source, when known.
    pub line: Option<usize>,
}

/// Validates that a readme would render.
pub trait ReadmeValidator {
    /// Check the readme, returning all findings on failure.
    fn validate(&self, readme: &Readme) -> Result<(), Vec<Diagnostic>>;
}

/// A validator that accepts every readme.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl ReadmeValidator for AcceptAll {
    fn validate(&self, _readme: &Readme) -> Result<(), Vec<Diagnostic>> {
        Ok(())
    }
}

/// Whether the readme-validation collaborator should be called.
///
/// Disabled by setting `CHECK_README=0`.
pub fn check_readme_enabled() -> bool {
    env::var("CHECK_README").map_or(true, |value| value != "0")
}
