//! Names of the artifacts this backend produces.

use std::fmt;
use std::fmt::{Display, Formatter};

use pep440_rs::Version;
use whey_normalize::PackageName;

/// The filename of a source distribution, e.g. `spam-1.0.tar.gz`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDistFilename {
    pub name: PackageName,
    pub version: Version,
}

impl Display for SourceDistFilename {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}.tar.gz",
            self.name.as_dist_info_name(),
            self.version
        )
    }
}

/// The filename of a wheel, e.g. `spam-1.0-py3-none-any.whl`.
///
/// This backend supports no native code, so the tag triple is always `py3-none-any`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WheelFilename {
    pub name: PackageName,
    pub version: Version,
}

impl WheelFilename {
    /// The wheel's compatibility tag.
    pub fn tag() -> &'static str {
        "py3-none-any"
    }

    /// The name of the `.dist-info` directory inside the wheel.
    pub fn dist_info_dir(&self) -> String {
        format!("{}-{}.dist-info", self.name.as_dist_info_name(), self.version)
    }
}

impl Display for WheelFilename {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}.whl",
            self.name.as_dist_info_name(),
            self.version,
            Self::tag()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn filenames() {
        let name = PackageName::new("hello-world").unwrap();
        let version = Version::from_str("1.0").unwrap();
        assert_eq!(
            SourceDistFilename {
                name: name.clone(),
                version: version.clone(),
            }
            .to_string(),
            "hello_world-1.0.tar.gz"
        );
        assert_eq!(
            WheelFilename { name, version }.to_string(),
            "hello_world-1.0-py3-none-any.whl"
        );
    }
}
