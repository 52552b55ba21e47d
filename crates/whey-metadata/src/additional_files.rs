//! Parser for MANIFEST.in-style `additional-files` entries.

use tracing::warn;

use crate::ValidationError;

/// A single `tool.whey.additional-files` entry.
///
/// Directives mutate the working file set in order: includes add files, excludes remove
/// them. Patterns use fnmatch-style globs (`*`, `?`, `[set]`), matched case-sensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestDirective {
    /// Include files matching the patterns, anchored at the project root.
    Include { patterns: Vec<String> },
    /// Remove files matching the patterns from the working set.
    Exclude { patterns: Vec<String> },
    /// Include files matching the patterns anywhere under `path`.
    RecursiveInclude { path: String, patterns: Vec<String> },
    /// Remove files matching the patterns anywhere under `path` from the working set.
    RecursiveExclude { path: String, patterns: Vec<String> },
}

/// Parse a single MANIFEST.in-style entry.
///
/// Returns `None` for unknown directives, which are warned about and skipped so that
/// entries aimed at other builders don't fail the build.
pub(crate) fn parse_directive(line: &str) -> Result<Option<ManifestDirective>, ValidationError> {
    let mut parts = line.split(' ').filter(|part| !part.is_empty());
    let Some(command) = parts.next() else {
        warn!("Empty entry in `tool.whey.additional-files`");
        return Ok(None);
    };
    let parameters: Vec<String> = parts.map(ToString::to_string).collect();

    match command {
        "include" => {
            if parameters.is_empty() {
                return Err(ValidationError::ManifestDirectiveParameters {
                    directive: "include",
                    expected: "at least one path or pattern",
                });
            }
            Ok(Some(ManifestDirective::Include {
                patterns: parameters,
            }))
        }
        "exclude" => {
            if parameters.is_empty() {
                return Err(ValidationError::ManifestDirectiveParameters {
                    directive: "exclude",
                    expected: "at least one path or pattern",
                });
            }
            Ok(Some(ManifestDirective::Exclude {
                patterns: parameters,
            }))
        }
        "recursive-include" => {
            let [path, patterns @ ..] = parameters.as_slice() else {
                return Err(ValidationError::ManifestDirectiveParameters {
                    directive: "recursive-include",
                    expected: "one path and at least one pattern",
                });
            };
            if patterns.is_empty() {
                return Err(ValidationError::ManifestDirectiveParameters {
                    directive: "recursive-include",
                    expected: "one path and at least one pattern",
                });
            }
            Ok(Some(ManifestDirective::RecursiveInclude {
                path: path.clone(),
                patterns: patterns.to_vec(),
            }))
        }
        "recursive-exclude" => {
            let [path, patterns @ ..] = parameters.as_slice() else {
                return Err(ValidationError::ManifestDirectiveParameters {
                    directive: "recursive-exclude",
                    expected: "one path and at least one pattern",
                });
            };
            if patterns.is_empty() {
                return Err(ValidationError::ManifestDirectiveParameters {
                    directive: "recursive-exclude",
                    expected: "one path and at least one pattern",
                });
            }
            Ok(Some(ManifestDirective::RecursiveExclude {
                path: path.clone(),
                patterns: patterns.to_vec(),
            }))
        }
        _ => {
            warn!("Unsupported directive in `tool.whey.additional-files`: `{line}`");
            Ok(None)
        }
    }
}
