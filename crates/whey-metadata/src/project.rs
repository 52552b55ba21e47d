//! The normalized configuration model and the validation pass producing it.

use std::fmt;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use pep440_rs::{Version, VersionSpecifiers};
use pep508_rs::Requirement;
use serde::Deserialize;
use whey_normalize::{ExtraName, Identifier, PackageName};

use crate::pyproject::{PyProjectToml, RawContact, RawLicense, RawReadme, WheyTable};
use crate::{additional_files, backfill, classifiers, core_metadata, Error, ValidationError};
use crate::ManifestDirective;

/// A PEP 621 field whose value the tool is permitted to synthesize.
///
/// `name` and `version` must always be static; any other field name is rejected outright.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DynamicField {
    Classifiers,
    Dependencies,
    RequiresPython,
}

impl Display for DynamicField {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classifiers => f.write_str("classifiers"),
            Self::Dependencies => f.write_str("dependencies"),
            Self::RequiresPython => f.write_str("requires-python"),
        }
    }
}

/// A resolved readme: the text is read eagerly so later stages never touch the filesystem.
#[derive(Debug, Clone)]
pub struct Readme {
    /// The path the readme was read from, if it came from a file.
    pub path: Option<PathBuf>,
    pub text: String,
    /// One of `text/markdown`, `text/x-rst` or `text/plain`.
    pub content_type: String,
    pub charset: String,
}

/// A resolved license: file contents are read eagerly.
#[derive(Debug, Clone)]
pub struct License {
    /// The path the license was read from, if it came from a file.
    pub path: Option<PathBuf>,
    pub text: String,
}

/// A validated `project.authors` or `project.maintainers` entry.
#[derive(Debug, Clone)]
pub struct Contact {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// The normalized PEP 621 view of the `[project]` table.
///
/// Immutable after [`normalize`]; dynamic fields have already been synthesized.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub name: PackageName,
    pub version: Version,
    pub description: Option<String>,
    pub readme: Option<Readme>,
    pub requires_python: Option<VersionSpecifiers>,
    pub license: Option<License>,
    pub authors: Vec<Contact>,
    pub maintainers: Vec<Contact>,
    pub keywords: Vec<String>,
    pub classifiers: Vec<String>,
    pub urls: IndexMap<String, String>,
    pub scripts: IndexMap<String, String>,
    pub gui_scripts: IndexMap<String, String>,
    pub entry_points: IndexMap<String, IndexMap<String, String>>,
    pub dependencies: Vec<Requirement>,
    pub optional_dependencies: IndexMap<ExtraName, Vec<Requirement>>,
    pub dynamic: Vec<DynamicField>,
}

/// The resolved `[tool.whey]` view.
#[derive(Debug, Clone)]
pub struct WheySettings {
    /// The name of the importable package under `source_dir`.
    ///
    /// Every `/`-separated segment is a valid Python [`Identifier`], so the value can
    /// name a package nested in a namespace.
    pub package: String,
    /// The directory containing the package, relative to the project root.
    pub source_dir: PathBuf,
    pub additional_files: Vec<ManifestDirective>,
    pub license_key: Option<String>,
    pub base_classifiers: Vec<String>,
    pub platforms: Vec<String>,
    pub python_versions: Vec<String>,
    pub python_implementations: Vec<String>,
    pub builders: BuilderNames,
}

/// Builder-name overrides per distribution type.
#[derive(Debug, Clone, Default)]
pub struct BuilderNames {
    pub sdist: Option<String>,
    pub wheel: Option<String>,
    pub binary: Option<String>,
}

/// Validate the raw model and resolve it into the immutable configuration pair.
///
/// Readme and license files are read relative to `root`. Dynamic fields are synthesized
/// here, so the returned [`ProjectConfig`] is complete.
pub(crate) fn normalize(
    pyproject_toml: PyProjectToml,
    root: &Path,
) -> Result<(ProjectConfig, WheySettings), Error> {
    let project = pyproject_toml.project;
    let whey = pyproject_toml
        .tool
        .and_then(|tool| tool.whey)
        .unwrap_or_default();

    let dynamic = project.dynamic.unwrap_or_default();

    let version = Version::from_str(&project.version)
        .map_err(|err| ValidationError::InvalidVersion(err.to_string()))?;

    let description = match project.description {
        Some(description) => {
            if description.contains('\n') {
                return Err(ValidationError::DescriptionNewlines.into());
            }
            Some(description)
        }
        None => None,
    };

    let readme = project
        .readme
        .map(|readme| resolve_readme(readme, root))
        .transpose()?;
    let license = project
        .license
        .map(|license| resolve_license(license, root))
        .transpose()?;

    let authors = resolve_contacts(project.authors.unwrap_or_default(), "project.authors")?;
    let maintainers =
        resolve_contacts(project.maintainers.unwrap_or_default(), "project.maintainers")?;

    if project.classifiers.is_some() && dynamic.contains(&DynamicField::Classifiers) {
        return Err(ValidationError::DynamicAndDeclared {
            field: "classifiers",
        }
        .into());
    }
    let classifiers = project.classifiers.unwrap_or_default();
    classifiers::validate_classifiers("project.classifiers", &classifiers)?;

    if project.requires_python.is_some() && dynamic.contains(&DynamicField::RequiresPython) {
        return Err(ValidationError::DynamicAndDeclared {
            field: "requires-python",
        }
        .into());
    }
    let requires_python = project
        .requires_python
        .as_deref()
        .map(VersionSpecifiers::from_str)
        .transpose()
        .map_err(|err| ValidationError::InvalidRequiresPython(err.to_string()))?;

    if project.dependencies.is_some() && dynamic.contains(&DynamicField::Dependencies) {
        return Err(ValidationError::DynamicAndDeclared {
            field: "dependencies",
        }
        .into());
    }
    let dependencies = parse_requirements(
        project.dependencies.unwrap_or_default(),
        "project.dependencies",
    )?;
    let optional_dependencies = project
        .optional_dependencies
        .unwrap_or_default()
        .into_iter()
        .map(|(extra, requirements)| {
            let path = format!("project.optional-dependencies.{extra}");
            Ok((extra, parse_requirements(requirements, &path)?))
        })
        .collect::<Result<IndexMap<_, _>, Error>>()?;

    let mut config = ProjectConfig {
        name: project.name,
        version,
        description,
        readme,
        requires_python,
        license,
        authors,
        maintainers,
        keywords: project.keywords.unwrap_or_default(),
        classifiers,
        urls: project.urls.unwrap_or_default(),
        scripts: project.scripts.unwrap_or_default(),
        gui_scripts: project.gui_scripts.unwrap_or_default(),
        entry_points: project.entry_points.unwrap_or_default(),
        dependencies,
        optional_dependencies,
        dynamic,
    };

    // Surface invalid entry point groups and names before any artifact is produced.
    core_metadata::entry_points_txt(&config)?;

    let settings = resolve_whey_settings(whey, &config.name)?;
    backfill::backfill(&mut config, &settings)?;

    Ok((config, settings))
}

fn resolve_readme(readme: RawReadme, root: &Path) -> Result<Readme, Error> {
    const SUPPORTED_CONTENT_TYPES: [&str; 3] = ["text/plain", "text/x-rst", "text/markdown"];

    match readme {
        RawReadme::Path(path) => {
            let path = PathBuf::from(path);
            let content_type = content_type_from_suffix(&path)?;
            let text = fs_err::read_to_string(root.join(&path))?;
            Ok(Readme {
                path: Some(path),
                text,
                content_type: content_type.to_string(),
                charset: "UTF-8".to_string(),
            })
        }
        RawReadme::Table {
            file,
            text,
            content_type,
            charset,
        } => {
            if charset.as_ref().is_some_and(|charset| charset != "UTF-8") {
                return Err(ValidationError::ReadmeCharset.into());
            }
            let charset = charset.unwrap_or_else(|| "UTF-8".to_string());
            if let Some(content_type) = &content_type {
                if !SUPPORTED_CONTENT_TYPES.contains(&content_type.as_str()) {
                    return Err(
                        ValidationError::ReadmeUnsupportedContentType(content_type.clone()).into(),
                    );
                }
            }
            match (file, text) {
                (Some(_), Some(_)) => Err(ValidationError::ReadmeFileAndText.into()),
                (Some(file), None) => {
                    let path = PathBuf::from(file);
                    let content_type = match content_type {
                        Some(content_type) => content_type,
                        None => content_type_from_suffix(&path)?.to_string(),
                    };
                    let text = fs_err::read_to_string(root.join(&path))?;
                    Ok(Readme {
                        path: Some(path),
                        text,
                        content_type,
                        charset,
                    })
                }
                (None, Some(text)) => {
                    let content_type =
                        content_type.ok_or(ValidationError::ReadmeMissingContentType)?;
                    Ok(Readme {
                        path: None,
                        text,
                        content_type,
                        charset,
                    })
                }
                (None, None) => Err(ValidationError::ReadmeMissingSource.into()),
            }
        }
    }
}

fn content_type_from_suffix(path: &Path) -> Result<&'static str, ValidationError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(extension) => match extension.to_ascii_lowercase().as_str() {
            "md" => Ok("text/markdown"),
            "rst" => Ok("text/x-rst"),
            "txt" => Ok("text/plain"),
            _ => Err(ValidationError::ReadmeUnknownExtension(
                extension.to_string(),
            )),
        },
        None => Err(ValidationError::ReadmeMissingExtension),
    }
}

fn resolve_license(license: RawLicense, root: &Path) -> Result<License, Error> {
    match (license.file, license.text) {
        (Some(_), Some(_)) => Err(ValidationError::LicenseFileAndText.into()),
        (Some(file), None) => {
            let path = PathBuf::from(file);
            let text = fs_err::read_to_string(root.join(&path))?;
            Ok(License {
                path: Some(path),
                text,
            })
        }
        (None, Some(text)) => Ok(License { path: None, text }),
        (None, None) => Err(ValidationError::LicenseMissingSource.into()),
    }
}

fn resolve_contacts(contacts: Vec<RawContact>, path: &str) -> Result<Vec<Contact>, Error> {
    contacts
        .into_iter()
        .enumerate()
        .map(|(index, contact)| {
            let path = format!("{path}[{index}]");
            if contact.name.is_none() && contact.email.is_none() {
                return Err(ValidationError::ContactEmpty { path }.into());
            }
            if contact.name.as_ref().is_some_and(|name| name.contains(',')) {
                return Err(ValidationError::ContactNameCommas { path }.into());
            }
            if let Some(email) = &contact.email {
                // A light sanity check; full RFC 5322 validation is out of scope.
                let valid = email
                    .split_once('@')
                    .is_some_and(|(local, domain)| !local.is_empty() && !domain.is_empty());
                if !valid {
                    return Err(ValidationError::ContactInvalidEmail {
                        path,
                        email: email.clone(),
                    }
                    .into());
                }
            }
            Ok(Contact {
                name: contact.name,
                email: contact.email,
            })
        })
        .collect()
}

fn parse_requirements(requirements: Vec<String>, path: &str) -> Result<Vec<Requirement>, Error> {
    requirements
        .into_iter()
        .enumerate()
        .map(|(index, requirement)| {
            Requirement::from_str(&requirement).map_err(|err| {
                ValidationError::InvalidRequirement {
                    path: format!("{path}[{index}]"),
                    message: err.to_string(),
                }
                .into()
            })
        })
        .collect()
}

fn resolve_whey_settings(whey: WheyTable, name: &PackageName) -> Result<WheySettings, Error> {
    // The package must be importable; the directory name is used verbatim.
    let package = whey
        .package
        .unwrap_or_else(|| name.as_dist_info_name().to_string());
    for segment in package.split('/') {
        Identifier::from_str(segment).map_err(|err| ValidationError::InvalidPackage {
            message: err.to_string(),
        })?;
    }

    let python_versions = whey
        .python_versions
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, version)| {
            let version = match version {
                toml::Value::String(version) => version,
                toml::Value::Integer(version) => version.to_string(),
                toml::Value::Float(version) => version.to_string(),
                _ => return Err(ValidationError::PythonVersionType { index }),
            };
            if version.starts_with('1') || version.starts_with('2') {
                return Err(ValidationError::PythonVersionNotPython3 { index });
            }
            Ok(version)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let additional_files = whey
        .additional_files
        .unwrap_or_default()
        .iter()
        .map(|entry| additional_files::parse_directive(entry))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .flatten()
        .collect();

    let builders = whey.builders.unwrap_or_default();

    Ok(WheySettings {
        package,
        source_dir: PathBuf::from(whey.source_dir.unwrap_or_else(|| ".".to_string())),
        additional_files,
        license_key: whey.license_key,
        base_classifiers: whey.base_classifiers.unwrap_or_default(),
        platforms: whey.platforms.unwrap_or_default(),
        python_versions,
        python_implementations: whey.python_implementations.unwrap_or_default(),
        builders: BuilderNames {
            sdist: builders.sdist,
            wheel: builders.wheel,
            binary: builders.binary,
        },
    })
}
