//! Synthesis of dynamic PEP 621 fields from the `[tool.whey]` configuration.

use std::collections::HashSet;
use std::str::FromStr;

use pep440_rs::{Version, VersionSpecifiers};
use tracing::warn;

use crate::project::{DynamicField, ProjectConfig, WheySettings};
use crate::{classifiers, Error, ValidationError};

/// Synthesize every field listed in `project.dynamic`.
///
/// The configuration is immutable afterwards; builders never re-derive fields.
pub fn backfill(config: &mut ProjectConfig, settings: &WheySettings) -> Result<(), Error> {
    for field in config.dynamic.clone() {
        match field {
            DynamicField::Classifiers => {
                config.classifiers = backfill_classifiers(settings);
                classifiers::validate_classifiers("tool.whey.base-classifiers", &config.classifiers)?;
            }
            DynamicField::RequiresPython => {
                config.requires_python = Some(backfill_requires_python(settings)?);
            }
            DynamicField::Dependencies => {
                // No hook supplies dynamic dependencies, so the result is the empty list.
                config.dependencies = Vec::new();
            }
        }
    }
    Ok(())
}

/// Synthesize `requires-python` as `>=` the minimum supported Python version.
fn backfill_requires_python(settings: &WheySettings) -> Result<VersionSpecifiers, Error> {
    let minimum = settings
        .python_versions
        .iter()
        .filter_map(|version| Version::from_str(version).ok())
        .min()
        .ok_or(ValidationError::RequiresPythonSynthesis)?;
    let specifiers = VersionSpecifiers::from_str(&format!(">={minimum}"))
        .map_err(|err| ValidationError::InvalidRequiresPython(err.to_string()))?;
    Ok(specifiers)
}

/// Backfill trove classifiers for the project's license, supported platforms, Python
/// versions and implementations.
///
/// The canonical grouping is: base classifiers, license, platforms, Python versions,
/// implementations. Duplicates are dropped keeping the first occurrence; each group is
/// sorted lexicographically.
fn backfill_classifiers(settings: &WheySettings) -> Vec<String> {
    let mut groups: Vec<Vec<String>> = Vec::new();

    let mut base = settings.base_classifiers.clone();
    base.sort();
    groups.push(base);

    if let Some(license_key) = &settings.license_key {
        if let Some(classifier) = classifiers::license_classifier(license_key) {
            groups.push(vec![classifier]);
        } else {
            warn!("No trove classifier for license key `{license_key}`");
            if spdx::Expression::parse(license_key).is_err() {
                warn!("`tool.whey.license-key` is not a valid SPDX expression: `{license_key}`");
            }
        }
    }

    if !settings.platforms.is_empty() {
        let mut platform_classifiers = Vec::new();
        let platforms: HashSet<&str> =
            settings.platforms.iter().map(String::as_str).collect();
        if platforms == HashSet::from(["Windows", "macOS", "Linux"]) {
            platform_classifiers.push("Operating System :: OS Independent".to_string());
        } else {
            if platforms.contains("Windows") {
                platform_classifiers
                    .push("Operating System :: Microsoft :: Windows".to_string());
            }
            if platforms.contains("Linux") {
                platform_classifiers.push("Operating System :: POSIX :: Linux".to_string());
            }
            if platforms.contains("macOS") {
                platform_classifiers.push("Operating System :: MacOS".to_string());
            }
        }
        platform_classifiers.sort();
        groups.push(platform_classifiers);
    }

    if !settings.python_versions.is_empty() {
        let mut version_classifiers =
            vec!["Programming Language :: Python :: 3 :: Only".to_string()];
        version_classifiers.extend(
            settings
                .python_versions
                .iter()
                .map(|version| format!("Programming Language :: Python :: {version}")),
        );
        version_classifiers.sort();
        groups.push(version_classifiers);
    }

    if !settings.python_implementations.is_empty() {
        let mut implementation_classifiers: Vec<String> = settings
            .python_implementations
            .iter()
            .map(|implementation| {
                format!("Programming Language :: Python :: Implementation :: {implementation}")
            })
            .collect();
        implementation_classifiers.sort();
        groups.push(implementation_classifiers);
    }

    let mut seen = HashSet::new();
    groups
        .into_iter()
        .flatten()
        .filter(|classifier| seen.insert(classifier.clone()))
        .collect()
}
