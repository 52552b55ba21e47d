//! Core Metadata 2.2 emission and parsing.
//!
//! The emitter produces the pseudo-email format used by `METADATA` and `PKG-INFO`; the
//! parser exists so that emitted documents can be read back.

use std::fmt::Display;

use itertools::Itertools;
use pep508_rs::Requirement;
use thiserror::Error;
use whey_normalize::ExtraName;

use crate::project::{Contact, ProjectConfig, WheySettings};
use crate::ValidationError;

/// Core Metadata 2.2 as specified in
/// <https://packaging.python.org/specifications/core-metadata/>.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoreMetadata {
    /// Version of the file format; this tool always writes `2.2`.
    pub metadata_version: String,
    /// The name of the distribution.
    pub name: String,
    /// A string containing the distribution's version number.
    pub version: String,
    /// Platform specifications describing the operating systems supported by the
    /// distribution.
    pub platforms: Vec<String>,
    /// A one-line summary of what the distribution does.
    pub summary: Option<String>,
    /// A longer description of the distribution, emitted as the message body.
    pub description: Option<String>,
    /// The markup syntax used in the description.
    pub description_content_type: Option<String>,
    /// Additional keywords, separated by commas.
    pub keywords: Option<String>,
    /// A string containing the URL for the distribution's home page.
    pub home_page: Option<String>,
    /// The author's name, or the names of all authors without email addresses.
    pub author: Option<String>,
    /// The authors' email addresses in RFC 822 `From:` form.
    pub author_email: Option<String>,
    /// The maintainer's name; omitted when identical to `author`.
    pub maintainer: Option<String>,
    /// The maintainers' email addresses in RFC 822 `From:` form.
    pub maintainer_email: Option<String>,
    /// The license identifier, taken from `tool.whey.license-key`.
    pub license: Option<String>,
    /// One classifier per entry, in synthesized order.
    pub classifiers: Vec<String>,
    /// One PEP 508 requirement per entry.
    pub requires_dist: Vec<String>,
    /// The Python version(s) the distribution is compatible with.
    pub requires_python: Option<String>,
    /// `label, url` pairs, in declaration order.
    pub project_urls: Vec<String>,
    /// The names of the optional features, in declaration order.
    pub provides_extras: Vec<String>,
    /// The names of the fields listed in `project.dynamic`.
    pub dynamic: Vec<String>,
}

#[derive(Debug, Error)]
pub enum MetadataParseError {
    #[error("Metadata field {0} not found")]
    FieldNotFound(&'static str),
}

impl CoreMetadata {
    /// Convert a validated configuration to core metadata.
    pub fn from_project(config: &ProjectConfig, settings: &WheySettings) -> Self {
        let (author, author_email) = split_contacts(&config.authors);
        let (maintainer, maintainer_email) = split_contacts(&config.maintainers);

        let mut home_page = None;
        let mut project_urls = Vec::new();
        for (label, url) in &config.urls {
            if home_page.is_none()
                && matches!(label.to_lowercase().as_str(), "homepage" | "home page")
            {
                home_page = Some(url.clone());
            } else {
                project_urls.push(format!("{label}, {url}"));
            }
        }

        let mut requires_dist: Vec<String> = config
            .dependencies
            .iter()
            .map(ToString::to_string)
            .collect();
        let mut provides_extras = Vec::new();
        for (extra, requirements) in &config.optional_dependencies {
            provides_extras.push(extra.to_string());
            for requirement in requirements {
                requires_dist.push(requirement_with_extra(requirement, extra));
            }
        }

        Self {
            metadata_version: "2.2".to_string(),
            name: config.name.to_string(),
            version: config.version.to_string(),
            platforms: settings.platforms.clone(),
            summary: config.description.clone(),
            description: config.readme.as_ref().map(|readme| readme.text.clone()),
            description_content_type: config
                .readme
                .as_ref()
                .map(|readme| readme.content_type.clone()),
            keywords: if config.keywords.is_empty() {
                None
            } else {
                Some(config.keywords.join(","))
            },
            home_page,
            author,
            author_email,
            maintainer,
            maintainer_email,
            license: settings.license_key.clone(),
            classifiers: config.classifiers.clone(),
            requires_dist,
            requires_python: config
                .requires_python
                .as_ref()
                .map(ToString::to_string),
            project_urls,
            provides_extras,
            dynamic: config.dynamic.iter().map(ToString::to_string).collect(),
        }
    }

    /// Parse a metadata document emitted by [`CoreMetadata::core_metadata_format`].
    ///
    /// Continuation lines are unfolded by stripping their indentation and joining with a
    /// newline.
    pub fn parse(content: &str) -> Result<Self, MetadataParseError> {
        let (head, body) = match content.split_once("\n\n") {
            Some((head, body)) => (head, Some(body)),
            None => (content, None),
        };

        let mut headers: Vec<(String, String)> = Vec::new();
        for line in head.lines() {
            if line.starts_with(' ') || line.starts_with('\t') {
                // Continuation of the previous header.
                if let Some((_, value)) = headers.last_mut() {
                    value.push('\n');
                    value.push_str(line.trim_start());
                }
            } else if let Some((name, value)) = line.split_once(':') {
                headers.push((name.to_string(), value.trim_start().to_string()));
            }
        }

        let get_first = |name: &str| {
            headers
                .iter()
                .find(|(header, _)| header == name)
                .map(|(_, value)| value.clone())
        };
        let get_all = |name: &str| -> Vec<String> {
            headers
                .iter()
                .filter(|(header, _)| header == name)
                .map(|(_, value)| value.clone())
                .collect()
        };

        Ok(Self {
            metadata_version: get_first("Metadata-Version")
                .ok_or(MetadataParseError::FieldNotFound("Metadata-Version"))?,
            name: get_first("Name").ok_or(MetadataParseError::FieldNotFound("Name"))?,
            version: get_first("Version").ok_or(MetadataParseError::FieldNotFound("Version"))?,
            platforms: get_all("Platform"),
            summary: get_first("Summary"),
            description: body.map(ToString::to_string),
            description_content_type: get_first("Description-Content-Type"),
            keywords: get_first("Keywords"),
            home_page: get_first("Home-page"),
            author: get_first("Author"),
            author_email: get_first("Author-email"),
            maintainer: get_first("Maintainer"),
            maintainer_email: get_first("Maintainer-email"),
            license: get_first("License"),
            classifiers: get_all("Classifier"),
            requires_dist: get_all("Requires-Dist"),
            requires_python: get_first("Requires-Python"),
            project_urls: get_all("Project-URL"),
            provides_extras: get_all("Provides-Extra"),
            dynamic: get_all("Dynamic"),
        })
    }

    /// Convert to the pseudo-email format used by Python's `METADATA`.
    ///
    /// > The standard file format for metadata (including in wheels and installed
    /// > projects) is based on the format of email headers. However, email formats have
    /// > been revised several times, and exactly which email RFC applies to packaging
    /// > metadata is not specified.
    /// - <https://packaging.python.org/en/latest/specifications/core-metadata/>
    pub fn core_metadata_format(&self) -> String {
        fn write_str(writer: &mut String, key: &str, value: impl Display) {
            let value = value.to_string();
            let mut lines = value.lines();
            if let Some(line) = lines.next() {
                writer.push_str(&format!("{key}: {line}\n"));
            } else {
                // The value is an empty string
                writer.push_str(&format!("{key}: \n"));
            }
            for line in lines {
                writer.push_str(&format!("{}{}\n", " ".repeat(key.len() + 2), line));
            }
        }
        fn write_opt_str(writer: &mut String, key: &str, value: Option<&impl Display>) {
            if let Some(value) = value {
                write_str(writer, key, value);
            }
        }
        fn write_all(
            writer: &mut String,
            key: &str,
            values: impl IntoIterator<Item = impl Display>,
        ) {
            for value in values {
                write_str(writer, key, value);
            }
        }

        let mut writer = String::new();
        write_str(&mut writer, "Metadata-Version", &self.metadata_version);
        write_str(&mut writer, "Name", &self.name);
        write_str(&mut writer, "Version", &self.version);
        write_all(&mut writer, "Platform", &self.platforms);
        write_opt_str(&mut writer, "Summary", self.summary.as_ref());
        write_opt_str(&mut writer, "Keywords", self.keywords.as_ref());
        write_opt_str(&mut writer, "Home-page", self.home_page.as_ref());
        write_opt_str(&mut writer, "Author", self.author.as_ref());
        write_opt_str(&mut writer, "Author-email", self.author_email.as_ref());
        write_opt_str(&mut writer, "License", self.license.as_ref());
        write_all(&mut writer, "Classifier", &self.classifiers);
        write_all(&mut writer, "Requires-Dist", &self.requires_dist);
        write_opt_str(&mut writer, "Maintainer", self.maintainer.as_ref());
        write_opt_str(
            &mut writer,
            "Maintainer-email",
            self.maintainer_email.as_ref(),
        );
        write_opt_str(
            &mut writer,
            "Requires-Python",
            self.requires_python.as_ref(),
        );
        write_all(&mut writer, "Project-URL", &self.project_urls);
        write_all(&mut writer, "Provides-Extra", &self.provides_extras);
        write_opt_str(
            &mut writer,
            "Description-Content-Type",
            self.description_content_type.as_ref(),
        );
        write_all(&mut writer, "Dynamic", &self.dynamic);

        if let Some(description) = &self.description {
            writer.push('\n');
            writer.push_str(description);
        }
        writer
    }
}

/// Append `extra == "name"` to a requirement's marker, composing with an existing marker.
fn requirement_with_extra(requirement: &Requirement, extra: &ExtraName) -> String {
    let rendered = requirement.to_string();
    match rendered.split_once(';') {
        Some((base, marker)) => format!(
            "{}; ({}) and extra == \"{extra}\"",
            base.trim_end(),
            marker.trim()
        ),
        None => format!("{rendered}; extra == \"{extra}\""),
    }
}

/// Split contacts into the `Author`/`Maintainer` and `Author-email`/`Maintainer-email`
/// header values.
///
/// Entries carrying an email are rendered in RFC 822 `From:` form and comma-joined;
/// entries with a name only are joined into the name header.
fn split_contacts(contacts: &[Contact]) -> (Option<String>, Option<String>) {
    let mut names = Vec::new();
    let mut emails = Vec::new();
    for contact in contacts {
        match (&contact.name, &contact.email) {
            (Some(name), Some(email)) => emails.push(format!("{name} <{email}>")),
            (None, Some(email)) => emails.push(email.clone()),
            (Some(name), None) => names.push(name.clone()),
            (None, None) => {}
        }
    }
    let names = if names.is_empty() {
        None
    } else if names.len() == 1 {
        Some(names[0].clone())
    } else {
        let (last, rest) = names.split_last().expect("at least two names");
        Some(format!("{} and {last}", rest.iter().join(", ")))
    };
    let emails = if emails.is_empty() {
        None
    } else {
        Some(emails.join(", "))
    };
    (names, emails)
}

/// Validate and convert the entry points to the contents of `entry_points.txt`.
///
/// <https://packaging.python.org/en/latest/specifications/entry-points/>
///
/// Returns `None` if no entry points were defined.
pub fn entry_points_txt(config: &ProjectConfig) -> Result<Option<String>, ValidationError> {
    if config.scripts.is_empty()
        && config.gui_scripts.is_empty()
        && config.entry_points.is_empty()
    {
        return Ok(None);
    }

    let mut writer = String::new();
    if !config.scripts.is_empty() {
        write_group(&mut writer, "console_scripts", &config.scripts)?;
    }
    if !config.gui_scripts.is_empty() {
        write_group(&mut writer, "gui_scripts", &config.gui_scripts)?;
    }
    for (group, entries) in &config.entry_points {
        if group == "console_scripts" {
            return Err(ValidationError::ReservedScripts);
        }
        if group == "gui_scripts" {
            return Err(ValidationError::ReservedGuiScripts);
        }
        write_group(&mut writer, group, entries)?;
    }
    Ok(Some(writer))
}

/// Write a group to `entry_points.txt`.
fn write_group<'a>(
    writer: &mut String,
    group: &str,
    entries: impl IntoIterator<Item = (&'a String, &'a String)>,
) -> Result<(), ValidationError> {
    if !group
        .chars()
        .next()
        .map(|c| c.is_alphanumeric() || c == '_')
        .unwrap_or(false)
        || !group
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '_')
    {
        return Err(ValidationError::InvalidEntryPointGroup(group.to_string()));
    }

    writer.push_str(&format!("[{group}]\n"));
    for (name, object_reference) in entries {
        // More strict than the spec, we enforce the recommendation
        if !name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == '_')
        {
            return Err(ValidationError::InvalidEntryPointName(name.to_string()));
        }
        writer.push_str(&format!("{name} = {object_reference}\n"));
    }
    writer.push('\n');
    Ok(())
}
