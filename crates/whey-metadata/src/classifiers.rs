//! Embedded trove-classifier reference data.
//!
//! The classifier list is a frozen snapshot of <https://pypi.org/classifiers/>; the
//! license map translates the short codes accepted in `tool.whey.license-key` to the
//! license names used in trove classifiers.

use std::collections::HashSet;
use std::sync::OnceLock;

use crate::ValidationError;

/// One classifier per line; blank lines and `#` comments allowed.
static CLASSIFIERS_SNAPSHOT: &str = include_str!("classifiers.txt");

fn known_classifiers() -> &'static HashSet<&'static str> {
    static KNOWN: OnceLock<HashSet<&'static str>> = OnceLock::new();
    KNOWN.get_or_init(|| {
        CLASSIFIERS_SNAPSHOT
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect()
    })
}

/// Check every classifier against the frozen snapshot.
///
/// `path` is the dotted TOML path reported on failure.
pub fn validate_classifiers(path: &str, classifiers: &[String]) -> Result<(), ValidationError> {
    let known = known_classifiers();
    for classifier in classifiers {
        if !known.contains(classifier.as_str()) {
            return Err(ValidationError::UnknownClassifier {
                path: path.to_string(),
                classifier: classifier.clone(),
            });
        }
    }
    Ok(())
}

/// Look up the trove license classifier for a license short code.
///
/// Mapping of license short codes to license names used in trove classifiers.
pub fn license_classifier(license_key: &str) -> Option<String> {
    let name = match license_key {
        "Apache-2.0" => "Apache Software License",
        "BSD" | "BSD-2-Clause" | "BSD-3-Clause" => "BSD License",
        "AGPL-3.0-only" | "AGPL-3.0" => "GNU Affero General Public License v3",
        "AGPL-3.0-or-later" | "AGPL-3.0+" => {
            "GNU Affero General Public License v3 or later (AGPLv3+)"
        }
        "FDL" | "GFDL-1.1-only" | "GFDL-1.1-or-later" | "GFDL-1.2-only" | "GFDL-1.2-or-later"
        | "GFDL-1.3-only" | "GFDL-1.3-or-later" | "GFDL-1.1" | "GFDL-1.2" | "GFDL-1.3" => {
            "GNU Free Documentation License (FDL)"
        }
        "GPL" | "GPL-1.0-only" | "GPL-1.0-or-later" => "GNU General Public License (GPL)",
        "GPLv2" | "GPL-2.0-only" => "GNU General Public License v2 (GPLv2)",
        "GPLv2+" | "GPL-2.0-or-later" => "GNU General Public License v2 or later (GPLv2+)",
        "GPLv3" | "GPL-3.0-only" => "GNU General Public License v3 (GPLv3)",
        "GPLv3+" | "GPL-3.0-or-later" => "GNU General Public License v3 or later (GPLv3+)",
        "LGPLv2" => "GNU Lesser General Public License v2 (LGPLv2)",
        "LGPLv2+" => "GNU Lesser General Public License v2 or later (LGPLv2+)",
        "LGPLv3" | "LGPL-3.0-only" => "GNU Lesser General Public License v3 (LGPLv3)",
        "LGPLv3+" | "LGPL-3.0-or-later" => {
            "GNU Lesser General Public License v3 or later (LGPLv3+)"
        }
        "LGPL" => "GNU Library or Lesser General Public License (LGPL)",
        "MIT" => "MIT License",
        "PSF-2.0" => "Python Software Foundation License",
        _ => return None,
    };
    Some(format!("License :: OSI Approved :: {name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_nonempty() {
        assert!(known_classifiers().len() > 200);
    }

    /// Every classifier the synthesizer can produce must be in the snapshot.
    #[test]
    fn synthesized_classifiers_are_known() {
        let mut synthesized = vec![
            "Operating System :: Microsoft :: Windows".to_string(),
            "Operating System :: POSIX :: Linux".to_string(),
            "Operating System :: MacOS".to_string(),
            "Operating System :: OS Independent".to_string(),
            "Programming Language :: Python".to_string(),
            "Programming Language :: Python :: 3 :: Only".to_string(),
        ];
        for minor in 0..=14 {
            synthesized.push(format!("Programming Language :: Python :: 3.{minor}"));
        }
        for implementation in [
            "CPython",
            "IronPython",
            "Jython",
            "MicroPython",
            "PyPy",
            "Stackless",
        ] {
            synthesized.push(format!(
                "Programming Language :: Python :: Implementation :: {implementation}"
            ));
        }
        for key in [
            "Apache-2.0",
            "BSD",
            "BSD-2-Clause",
            "BSD-3-Clause",
            "AGPL-3.0",
            "AGPL-3.0+",
            "FDL",
            "GPL",
            "GPLv2",
            "GPLv2+",
            "GPLv3",
            "GPLv3+",
            "LGPL",
            "LGPLv2",
            "LGPLv2+",
            "LGPLv3",
            "LGPLv3+",
            "MIT",
            "PSF-2.0",
        ] {
            synthesized.push(license_classifier(key).unwrap());
        }
        validate_classifiers("test", &synthesized).unwrap();
    }

    #[test]
    fn unknown_classifier() {
        let err = validate_classifiers(
            "project.classifiers",
            &["Made :: Up :: Classifier".to_string()],
        )
        .unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"Unknown trove classifier in `project.classifiers`: `Made :: Up :: Classifier`"
        );
    }
}
