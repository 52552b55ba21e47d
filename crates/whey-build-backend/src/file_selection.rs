//! The file-selection engine: seed walk, auto-inclusions and MANIFEST-style directives.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use tracing::{debug, trace};
use walkdir::WalkDir;

use whey_metadata::{ManifestDirective, WheySettings};

use crate::Error;

/// Names that are never included by the seed walk: bytecode caches, editor backups and
/// VCS bookkeeping.
pub(crate) const DEFAULT_EXCLUDES: &[&str] = &[
    "__pycache__",
    "*.pyc",
    "*.pyo",
    "*.so~",
    "*~",
    "#*#",
    ".git",
    ".hg",
    ".svn",
];

/// A file selected for inclusion in an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// The path relative to the project root, with `/` separators.
    pub archive_path: String,
    /// The file on disk.
    pub source: PathBuf,
}

/// The files selected for an archive, in lexicographic order of their archive paths.
pub type FileList = Vec<FileEntry>;

/// Evaluate the seed walk and the `additional-files` directives against the project tree.
///
/// The returned list is sorted, free of duplicates, and contains no path outside the
/// project root (symlinks resolved).
pub fn select_files(source_tree: &Path, settings: &WheySettings) -> Result<FileList, Error> {
    let mut selector = FileSelector::new(source_tree)?;
    selector.seed(settings)?;
    for directive in &settings.additional_files {
        selector.apply(directive)?;
    }
    selector.finalize()
}

struct FileSelector<'a> {
    source_tree: &'a Path,
    /// The working set, keyed by portable relative path. The map keeps the set sorted
    /// and free of duplicates.
    selected: BTreeMap<String, PathBuf>,
    /// Type-hint markers and stub files, kept even when an exclude matches them.
    protected: HashSet<String>,
    default_excludes: GlobSet,
}

impl<'a> FileSelector<'a> {
    fn new(source_tree: &'a Path) -> Result<Self, Error> {
        Ok(Self {
            source_tree,
            selected: BTreeMap::new(),
            protected: HashSet::new(),
            default_excludes: unanchored_matcher(DEFAULT_EXCLUDES.iter().copied())?,
        })
    }

    /// Walk `source_dir / package` and include every regular file that the built-in
    /// excludes don't match. `py.typed` markers and `*.pyi` stubs are protected from
    /// later excludes.
    fn seed(&mut self, settings: &WheySettings) -> Result<(), Error> {
        let package_dir = self
            .source_tree
            .join(&settings.source_dir)
            .join(&settings.package);
        if !package_dir.is_dir() {
            return Err(Error::MissingPackageDir(package_dir));
        }

        let source_tree = self.source_tree;
        let default_excludes = self.default_excludes.clone();
        let mut found = false;
        // Symlinks are followed; targets outside the project root are rejected at
        // finalization.
        for entry in WalkDir::new(&package_dir)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| {
                let relative = entry
                    .path()
                    .strip_prefix(source_tree)
                    .expect("walkdir starts with root");
                !default_excludes.is_match(relative)
            })
        {
            let entry = entry.map_err(|err| Error::WalkDir {
                root: package_dir.clone(),
                err,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = portable_path(entry.path(), self.source_tree)?;
            if entry.file_name() == "py.typed"
                || entry.path().extension().is_some_and(|ext| ext == "pyi")
            {
                self.protected.insert(relative.clone());
            }
            trace!("Seeding {relative}");
            self.insert(relative, entry.path().to_path_buf())?;
            found = true;
        }

        if !found {
            return Err(Error::EmptyPackage(package_dir));
        }
        Ok(())
    }

    /// Apply one directive as a mutation on the working set.
    fn apply(&mut self, directive: &ManifestDirective) -> Result<(), Error> {
        match directive {
            ManifestDirective::Include { patterns } => {
                let matcher = anchored_matcher(patterns)?;
                let walk_root = self.source_tree.to_path_buf();
                self.include(&walk_root, &matcher, false, || {
                    format!("include {}", patterns.join(" "))
                })
            }
            ManifestDirective::RecursiveInclude { path, patterns } => {
                let matcher = recursive_matcher(path, patterns)?;
                let walk_root = self.source_tree.join(path);
                self.include(&walk_root, &matcher, true, || {
                    format!("recursive-include {path} {}", patterns.join(" "))
                })
            }
            ManifestDirective::Exclude { patterns } => {
                let matcher = anchored_matcher(patterns)?;
                self.exclude(&matcher);
                Ok(())
            }
            ManifestDirective::RecursiveExclude { path, patterns } => {
                let matcher = recursive_matcher(path, patterns)?;
                self.exclude(&matcher);
                Ok(())
            }
        }
    }

    /// Add every file beneath `walk_root` whose project-relative path matches.
    ///
    /// A directive that matches nothing is a configuration error, not a silent no-op.
    fn include(
        &mut self,
        walk_root: &Path,
        matcher: &GlobSet,
        skip_pycache: bool,
        directive: impl Fn() -> String,
    ) -> Result<(), Error> {
        let mut matched = false;
        for entry in WalkDir::new(walk_root).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(|err| Error::WalkDir {
                root: walk_root.to_path_buf(),
                err,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = portable_path(entry.path(), self.source_tree)?;
            if skip_pycache && relative.split('/').any(|part| part == "__pycache__") {
                continue;
            }
            if matcher.is_match(Path::new(&relative)) {
                debug!("Including {relative}");
                self.insert(relative, entry.path().to_path_buf())?;
                matched = true;
            }
        }
        if matched {
            Ok(())
        } else {
            Err(Error::NoMatches {
                directive: directive(),
            })
        }
    }

    /// Add a file to the working set.
    ///
    /// Re-selecting a file that is already in the set is fine; two distinct files for
    /// the same archive member are rejected. Paths are compared component-wise, so a
    /// `.` in one of the walk roots doesn't count as a distinct file.
    fn insert(&mut self, relative: String, source: PathBuf) -> Result<(), Error> {
        match self.selected.entry(relative) {
            Entry::Vacant(vacant) => {
                vacant.insert(source);
                Ok(())
            }
            Entry::Occupied(occupied) => {
                if occupied.get() == &source {
                    Ok(())
                } else {
                    Err(Error::DuplicateArchivePath {
                        path: occupied.key().clone(),
                        first: occupied.get().clone(),
                        second: source,
                    })
                }
            }
        }
    }

    /// Remove every matching entry from the working set, except protected files.
    fn exclude(&mut self, matcher: &GlobSet) {
        self.selected.retain(|relative, _| {
            if self.protected.contains(relative) {
                return true;
            }
            let matched = matcher.is_match(Path::new(relative));
            if matched {
                debug!("Excluding {relative}");
            }
            !matched
        });
    }

    /// Sort (by construction of the map), then reject any selected file that resolves
    /// outside the project root.
    fn finalize(self) -> Result<FileList, Error> {
        let root = fs_err::canonicalize(self.source_tree)?;
        self.selected
            .into_iter()
            .map(|(archive_path, source)| {
                let resolved = fs_err::canonicalize(&source)?;
                if !resolved.starts_with(&root) {
                    return Err(Error::EscapesProjectRoot(source));
                }
                Ok(FileEntry {
                    archive_path,
                    source,
                })
            })
            .collect()
    }
}

/// A matcher for patterns anchored at the project root.
fn anchored_matcher(patterns: &[String]) -> Result<GlobSet, Error> {
    build_globset(patterns.iter().map(String::as_str))
}

/// A matcher for patterns applied at any depth under `path`, like `Path.rglob`.
fn recursive_matcher(path: &str, patterns: &[String]) -> Result<GlobSet, Error> {
    let escaped = globset::escape(path.trim_end_matches('/'));
    build_globset(patterns.iter().flat_map(|pattern| {
        [
            format!("{escaped}/{pattern}"),
            format!("{escaped}/**/{pattern}"),
        ]
    }))
}

/// A matcher for bare names matched at any depth, for the built-in excludes.
fn unanchored_matcher<'a>(
    patterns: impl IntoIterator<Item = &'a str>,
) -> Result<GlobSet, Error> {
    build_globset(patterns.into_iter().map(|pattern| format!("**/{pattern}")))
}

fn build_globset(patterns: impl IntoIterator<Item = impl AsRef<str>>) -> Result<GlobSet, Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(parse_pattern(pattern.as_ref())?);
    }
    builder.build().map_err(|err| Error::GlobSetTooLarge {
        field: "tool.whey.additional-files".to_string(),
        source: err,
    })
}

/// Parse an fnmatch-style pattern: `*` and `?` don't cross `/`, `[set]` is supported,
/// matching is case-sensitive.
fn parse_pattern(pattern: &str) -> Result<Glob, Error> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|err| Error::Glob {
            field: "tool.whey.additional-files".to_string(),
            glob: pattern.to_string(),
            source: err,
        })
}

/// The directory prefixes of a portable path, shortest first.
pub(crate) fn parent_directories(path: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut prefix = String::new();
    let parts: Vec<&str> = path.split('/').collect();
    for part in &parts[..parts.len() - 1] {
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(part);
        result.push(prefix.clone());
    }
    result
}

/// The project-relative path with `/` separators, as stored in archives.
pub(crate) fn portable_path(path: &Path, root: &Path) -> Result<String, Error> {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let mut portable = String::new();
    for component in relative.components() {
        let part = component
            .as_os_str()
            .to_str()
            .ok_or_else(|| Error::NotUtf8Path(path.to_path_buf()))?;
        if !portable.is_empty() {
            portable.push('/');
        }
        portable.push_str(part);
    }
    Ok(portable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_archive_path() {
        let mut selector = FileSelector::new(Path::new("/project")).unwrap();
        selector
            .insert(
                "spam/data/a.txt".to_string(),
                PathBuf::from("/project/spam/data/a.txt"),
            )
            .unwrap();
        // The same file, reached through a walk root with a `.` component.
        selector
            .insert(
                "spam/data/a.txt".to_string(),
                PathBuf::from("/project/./spam/data/a.txt"),
            )
            .unwrap();
        // A different file for an already-selected archive member.
        let err = selector
            .insert(
                "spam/data/a.txt".to_string(),
                PathBuf::from("/project/other/a.txt"),
            )
            .unwrap_err();
        insta::assert_snapshot!(
            err.to_string(),
            @"Two distinct files map to the same archive path `spam/data/a.txt`: `/project/spam/data/a.txt` and `/project/other/a.txt`"
        );
    }

    #[test]
    fn parent_directories_of_portable_paths() {
        assert_eq!(parent_directories("spam/data/a.txt"), ["spam", "spam/data"]);
        assert!(parent_directories("pyproject.toml").is_empty());
    }
}
