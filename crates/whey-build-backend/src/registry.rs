//! Builder registration and dispatch.
//!
//! The host assembles a registry at startup; builds resolve the configured builder name
//! per role, falling back to the built-in builders.

use std::collections::BTreeMap;
use std::fmt;
use std::fmt::{Display, Formatter};
use std::path::Path;

use itertools::Itertools;

use whey_metadata::Config;

use crate::{editable, source_dist, wheel, Error};

/// What kind of artifact a build produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderRole {
    Sdist,
    Wheel,
    EditableWheel,
    Binary,
}

impl Display for BuilderRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sdist => f.write_str("sdist"),
            Self::Wheel => f.write_str("wheel"),
            Self::EditableWheel => f.write_str("editable wheel"),
            Self::Binary => f.write_str("binary"),
        }
    }
}

/// One build invocation: where to read the project and where to place the artifact.
#[derive(Debug, Clone, Copy)]
pub struct BuildRequest<'a> {
    pub source_tree: &'a Path,
    pub out_dir: &'a Path,
    /// The dist-info directory from a previous prepare-metadata call, to cross-check.
    pub metadata_directory: Option<&'a Path>,
}

impl<'a> BuildRequest<'a> {
    pub fn new(source_tree: &'a Path, out_dir: &'a Path) -> Self {
        Self {
            source_tree,
            out_dir,
            metadata_directory: None,
        }
    }

    #[must_use]
    pub fn with_metadata_directory(mut self, metadata_directory: Option<&'a Path>) -> Self {
        self.metadata_directory = metadata_directory;
        self
    }
}

/// The functions a registered builder provides.
///
/// `build_editable` is optional: only wheel-shaped builders can produce PEP 660
/// editable wheels.
#[derive(Clone, Copy, Debug)]
pub struct BuilderSpec {
    pub build: fn(&BuildRequest) -> Result<String, Error>,
    pub build_editable: Option<fn(&BuildRequest) -> Result<String, Error>>,
}

/// A mapping from builder name to builder, with the built-ins `whey_sdist`,
/// `whey_wheel` and `whey_binary` registered by default.
pub struct BuilderRegistry {
    builders: BTreeMap<String, BuilderSpec>,
}

impl Default for BuilderRegistry {
    fn default() -> Self {
        let mut registry = Self {
            builders: BTreeMap::new(),
        };
        registry.register(
            "whey_sdist",
            BuilderSpec {
                build: source_dist::build_source_dist,
                build_editable: None,
            },
        );
        registry.register(
            "whey_wheel",
            BuilderSpec {
                build: wheel::build_wheel,
                build_editable: Some(editable::build_editable),
            },
        );
        // The default binary distribution format is the wheel.
        registry.register(
            "whey_binary",
            BuilderSpec {
                build: wheel::build_wheel,
                build_editable: Some(editable::build_editable),
            },
        );
        registry
    }
}

impl BuilderRegistry {
    /// Register a builder under a name, replacing any previous registration.
    pub fn register(&mut self, name: impl Into<String>, spec: BuilderSpec) {
        self.builders.insert(name.into(), spec);
    }

    /// The name configured for the role in `[tool.whey.builders]`, or the built-in
    /// default.
    fn builder_name<'a>(role: BuilderRole, config: &'a Config) -> &'a str {
        let names = &config.whey.builders;
        match role {
            BuilderRole::Sdist => names.sdist.as_deref().unwrap_or("whey_sdist"),
            BuilderRole::Wheel | BuilderRole::EditableWheel => {
                names.wheel.as_deref().unwrap_or("whey_wheel")
            }
            BuilderRole::Binary => names.binary.as_deref().unwrap_or("whey_binary"),
        }
    }

    /// Resolve the builder for a role against the loaded configuration.
    ///
    /// Unknown names are fatal and report the registered names.
    pub fn resolve(
        &self,
        role: BuilderRole,
        config: &Config,
    ) -> Result<(String, BuilderSpec), Error> {
        let name = Self::builder_name(role, config);
        let spec = self
            .builders
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownBuilder {
                role,
                name: name.to_string(),
                known: self.builders.keys().join(", "),
            })?;
        Ok((name.to_string(), spec))
    }

    /// Resolve and run the builder for a role.
    ///
    /// Returns the filename of the created artifact.
    pub fn build(&self, role: BuilderRole, request: &BuildRequest) -> Result<String, Error> {
        let config = Config::load(request.source_tree)?;
        let (name, spec) = self.resolve(role, &config)?;
        match role {
            BuilderRole::EditableWheel => {
                let build_editable = spec
                    .build_editable
                    .ok_or(Error::EditableUnsupported(name))?;
                build_editable(request)
            }
            _ => (spec.build)(request),
        }
    }
}
