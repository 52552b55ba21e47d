//! Configuration model for the whey build backend.
//!
//! Loads `pyproject.toml`, validates the PEP 621 `[project]` table and the
//! `[tool.whey]` table, synthesizes dynamic fields, and emits core metadata.

use std::io;
use std::path::Path;

use thiserror::Error;

pub use crate::additional_files::ManifestDirective;
pub use crate::backfill::backfill;
pub use crate::classifiers::{license_classifier, validate_classifiers};
pub use crate::core_metadata::{entry_points_txt, CoreMetadata, MetadataParseError};
pub use crate::project::{
    BuilderNames, Contact, DynamicField, License, ProjectConfig, Readme, WheySettings,
};
pub use crate::pyproject::PyProjectToml;
pub use crate::readme_check::{check_readme_enabled, AcceptAll, Diagnostic, ReadmeValidator};

mod additional_files;
mod backfill;
mod classifiers;
mod core_metadata;
mod project;
mod pyproject;
mod raw;
mod readme_check;

#[cfg(test)]
mod tests;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("Invalid pyproject.toml")]
    Toml(#[from] toml::de::Error),
    #[error(
        "TOML constructs newer than 0.5.0 are not supported: \
        mixed-type array at `{path}`. Use elements of a single type."
    )]
    TomlCompat { path: String },
    #[error("Invalid pyproject.toml")]
    Validation(#[from] ValidationError),
}

/// A configuration error, annotated with the dotted path of the offending key.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("`project.version` is not a valid PEP 440 version: {0}")]
    InvalidVersion(String),
    #[error("`project.requires-python` is not a valid PEP 508 version specifier: {0}")]
    InvalidRequiresPython(String),
    #[error("`{path}` contains an invalid PEP 508 requirement: {message}")]
    InvalidRequirement { path: String, message: String },
    #[error("`project.description` must be a single line")]
    DescriptionNewlines,
    #[error(
        "The `project.readme.file` and `project.readme.text` keys are mutually exclusive; \
        remove one of the two."
    )]
    ReadmeFileAndText,
    #[error(
        "The `project.readme` table must contain one of `file` or `text`."
    )]
    ReadmeMissingSource,
    #[error(
        "The `project.readme.content-type` key must be provided when `project.readme.text` \
        is given."
    )]
    ReadmeMissingContentType,
    #[error("Unrecognised value for `project.readme.content-type`: `{0}`")]
    ReadmeUnsupportedContentType(String),
    #[error(
        "Charsets other than UTF-8 are not supported; convert the readme to UTF-8 and remove \
        `project.readme.charset`."
    )]
    ReadmeCharset,
    #[error(
        "Unknown readme extension `{0}`, can't determine the content type. Use a supported \
        extension (`.md`, `.rst`, `.txt`) or set `project.readme.content-type`."
    )]
    ReadmeUnknownExtension(String),
    #[error(
        "`project.readme` has no file extension, can't determine the content type. Use a \
        supported extension (`.md`, `.rst`, `.txt`) or set `project.readme.content-type`."
    )]
    ReadmeMissingExtension,
    #[error(
        "The `project.license.file` and `project.license.text` keys are mutually exclusive; \
        remove one of the two."
    )]
    LicenseFileAndText,
    #[error("The `project.license` table must contain one of `file` or `text`.")]
    LicenseMissingSource,
    #[error("The `{path}.name` key cannot contain commas")]
    ContactNameCommas { path: String },
    #[error("`{email}` is not a valid email address for `{path}.email`")]
    ContactInvalidEmail { path: String, email: String },
    #[error("Each `{path}` entry must contain at least one of `name` or `email`")]
    ContactEmpty { path: String },
    #[error("Unknown trove classifier in `{path}`: `{classifier}`")]
    UnknownClassifier { path: String, classifier: String },
    #[error("`{field}` was listed in `project.dynamic` but a value was given")]
    DynamicAndDeclared { field: &'static str },
    #[error(
        "`requires-python` was listed in `project.dynamic` but `tool.whey.python-versions` \
        is empty; nothing to synthesize from"
    )]
    RequiresPythonSynthesis,
    #[error(
        "Invalid value for `tool.whey.python-versions[{index}]`: whey only supports \
        Python 3-only projects"
    )]
    PythonVersionNotPython3 { index: usize },
    #[error("Invalid value for `tool.whey.package`: {message}")]
    InvalidPackage { message: String },
    #[error(
        "Invalid type for `tool.whey.python-versions[{index}]`: expected a string, integer \
        or float"
    )]
    PythonVersionType { index: usize },
    #[error("Use `project.scripts` instead of `project.entry-points.console_scripts`")]
    ReservedScripts,
    #[error("Use `project.gui-scripts` instead of `project.entry-points.gui_scripts`")]
    ReservedGuiScripts,
    #[error(
        "Entry point groups must consist of letters and numbers separated by dots, \
        invalid group: `{0}`"
    )]
    InvalidEntryPointGroup(String),
    #[error(
        "Entry point names must consist of letters, numbers, dots and dashes; \
        invalid name: `{0}`"
    )]
    InvalidEntryPointName(String),
    #[error(
        "additional-files: `{directive}` must have {expected} specified"
    )]
    ManifestDirectiveParameters {
        directive: &'static str,
        expected: &'static str,
    },
}

/// The validated, immutable configuration for one build invocation.
#[derive(Debug, Clone)]
pub struct Config {
    pub project: ProjectConfig,
    pub whey: WheySettings,
}

impl Config {
    /// Parse and normalize a `pyproject.toml` document.
    ///
    /// `root` is the directory containing the file; readme and license paths are resolved
    /// against it.
    pub fn from_toml(contents: &str, root: &Path) -> Result<Self, Error> {
        let pyproject_toml = PyProjectToml::parse(contents)?;
        let (project, whey) = project::normalize(pyproject_toml, root)?;
        Ok(Self { project, whey })
    }

    /// Load the configuration from `{source_tree}/pyproject.toml`.
    pub fn load(source_tree: &Path) -> Result<Self, Error> {
        let contents = fs_err::read_to_string(source_tree.join("pyproject.toml"))?;
        Self::from_toml(&contents, source_tree)
    }
}
