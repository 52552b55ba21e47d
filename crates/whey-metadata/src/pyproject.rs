//! The raw `pyproject.toml` model, as deserialized.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::warn;
use whey_normalize::{ExtraName, PackageName};

use crate::raw;
use crate::Error;

/// A `pyproject.toml` as specified in PEP 517 and PEP 621.
#[derive(Deserialize, Debug, Clone)]
#[serde(
    rename_all = "kebab-case",
    expecting = "The project table needs to follow \
    https://packaging.python.org/en/latest/guides/writing-pyproject-toml"
)]
pub struct PyProjectToml {
    /// Project metadata.
    pub(crate) project: Project,
    /// Tool tables; only `[tool.whey]` is read.
    pub(crate) tool: Option<Tool>,
}

impl PyProjectToml {
    /// Parse a `pyproject.toml` document, applying the TOML 0.5.0 gate first.
    pub fn parse(contents: &str) -> Result<Self, Error> {
        // The gate walks the raw value tree; the typed model is deserialized from the
        // source text so that errors carry spans.
        raw::parse(contents)?;
        let pyproject_toml: Self = toml::from_str(contents)?;

        if let Some(whey) = pyproject_toml
            .tool
            .as_ref()
            .and_then(|tool| tool.whey.as_ref())
        {
            for key in whey.unknown.keys() {
                warn!("Unknown key in `[tool.whey]`: `{key}`");
            }
        }

        Ok(pyproject_toml)
    }
}

/// The `[project]` table as specified in
/// <https://packaging.python.org/en/latest/specifications/pyproject-toml>.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub(crate) struct Project {
    /// The name of the project.
    pub(crate) name: PackageName,
    /// The version of the project.
    pub(crate) version: String,
    /// The summary description of the project in one line.
    pub(crate) description: Option<String>,
    /// The full description of the project (i.e. the README).
    pub(crate) readme: Option<RawReadme>,
    /// The Python version requirements of the project.
    pub(crate) requires_python: Option<String>,
    /// The license under which the project is distributed.
    pub(crate) license: Option<RawLicense>,
    /// The people or organizations considered to be the "authors" of the project.
    pub(crate) authors: Option<Vec<RawContact>>,
    /// The people or organizations considered to be the "maintainers" of the project.
    pub(crate) maintainers: Option<Vec<RawContact>>,
    /// The keywords for the project.
    pub(crate) keywords: Option<Vec<String>>,
    /// Trove classifiers which apply to the project.
    pub(crate) classifiers: Option<Vec<String>>,
    /// A table of URLs where the key is the URL label and the value is the URL itself.
    ///
    /// Insertion order is preserved through to the `Project-URL` headers.
    pub(crate) urls: Option<IndexMap<String, String>>,
    /// The console entry points of the project.
    pub(crate) scripts: Option<IndexMap<String, String>>,
    /// The GUI entry points of the project.
    pub(crate) gui_scripts: Option<IndexMap<String, String>>,
    /// Entry point groups of the project; exactly one level of nesting.
    pub(crate) entry_points: Option<IndexMap<String, IndexMap<String, String>>>,
    /// The dependencies of the project.
    pub(crate) dependencies: Option<Vec<String>>,
    /// The optional dependencies of the project, keyed by extra name.
    pub(crate) optional_dependencies: Option<IndexMap<ExtraName, Vec<String>>>,
    /// The fields another tool is permitted to provide.
    ///
    /// Only `classifiers`, `dependencies` and `requires-python` are supported; `name` and
    /// `version` must always be static.
    pub(crate) dynamic: Option<Vec<crate::DynamicField>>,
}

/// The optional `project.readme` key.
///
/// The table form is kept flat so that `file`/`text` exclusivity can be reported with a
/// dedicated error instead of an untagged-enum mismatch.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
pub(crate) enum RawReadme {
    /// Relative path to the README; the content type is inferred from its extension.
    Path(String),
    Table {
        #[serde(default)]
        file: Option<String>,
        #[serde(default)]
        text: Option<String>,
        #[serde(default, rename = "content-type")]
        content_type: Option<String>,
        #[serde(default)]
        charset: Option<String>,
    },
}

/// The optional `project.license` table; exactly one of `file` or `text`.
#[derive(Deserialize, Debug, Clone)]
pub(crate) struct RawLicense {
    #[serde(default)]
    pub(crate) file: Option<String>,
    #[serde(default)]
    pub(crate) text: Option<String>,
}

/// A `project.authors` or `project.maintainers` entry.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawContact {
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) email: Option<String>,
}

/// The `[tool]` table. Tables other than `[tool.whey]` belong to other tools and are
/// ignored.
#[derive(Deserialize, Debug, Clone)]
pub(crate) struct Tool {
    pub(crate) whey: Option<WheyTable>,
    #[serde(flatten)]
    _other: BTreeMap<String, toml::Value>,
}

/// The raw `[tool.whey]` table.
///
/// Unknown keys are collected and warned about instead of rejected: third-party builders
/// may read their own keys from this table.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct WheyTable {
    /// The name of the importable package; defaults to the project name with underscores
    /// for hyphens.
    pub(crate) package: Option<String>,
    /// The directory containing the package; defaults to the project root.
    pub(crate) source_dir: Option<String>,
    /// MANIFEST.in-style directives for additional files to include in distributions.
    pub(crate) additional_files: Option<Vec<String>>,
    /// The identifier of the project's license, SPDX-preferred.
    pub(crate) license_key: Option<String>,
    /// Classifiers to which the synthesized ones are appended.
    pub(crate) base_classifiers: Option<Vec<String>>,
    /// Supported platforms, e.g. `Windows`, `macOS`, `Linux`.
    pub(crate) platforms: Option<Vec<String>>,
    /// Supported Python versions; strings, integers and floats are accepted.
    pub(crate) python_versions: Option<Vec<toml::Value>>,
    /// Supported Python implementations, e.g. `CPython`, `PyPy`.
    pub(crate) python_implementations: Option<Vec<String>>,
    /// Overrides for the builders used per distribution type.
    pub(crate) builders: Option<RawBuilderNames>,
    #[serde(flatten)]
    pub(crate) unknown: BTreeMap<String, toml::Value>,
}

/// The `[tool.whey.builders]` table, naming the builder entry point per role.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawBuilderNames {
    pub(crate) sdist: Option<String>,
    pub(crate) wheel: Option<String>,
    pub(crate) binary: Option<String>,
}
