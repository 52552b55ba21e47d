//! Build backend for Python distributions driven by `pyproject.toml`.
//!
//! Produces source distributions (`.tar.gz`), wheels (`.whl`) and PEP 660 editable
//! wheels. The public functions mirror the PEP 517 / PEP 660 hook surface; the CLI and
//! other hosts dispatch through the [`BuilderRegistry`].

use std::io;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use fs_err::File;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::trace;

use whey_metadata::{Config, CoreMetadata};

pub use crate::file_selection::{select_files, FileEntry, FileList};
pub use crate::filename::{SourceDistFilename, WheelFilename};
pub use crate::registry::{
    BuildRequest, BuilderRegistry, BuilderRole, BuilderSpec,
};
pub use crate::timestamps::ArchiveTimestamp;

mod editable;
mod file_selection;
mod filename;
mod registry;
mod source_dist;
mod timestamps;
mod wheel;

#[cfg(test)]
mod tests;

/// The version reported in the `Generator` field of `WHEEL`.
pub(crate) const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Config(#[from] whey_metadata::Error),
    #[error("Invalid pattern in `{field}`: `{glob}`")]
    Glob {
        field: String,
        glob: String,
        #[source]
        source: globset::Error,
    },
    #[error("Patterns in `{field}` compiled to an oversized matcher")]
    GlobSetTooLarge {
        field: String,
        #[source]
        source: globset::Error,
    },
    #[error("Package directory not found: `{}`", _0.display())]
    MissingPackageDir(PathBuf),
    #[error("No source files found in `{}`", _0.display())]
    EmptyPackage(PathBuf),
    #[error("`{directive}` in `tool.whey.additional-files` matched no files")]
    NoMatches { directive: String },
    #[error("Failed to walk source tree: `{}`", root.display())]
    WalkDir {
        root: PathBuf,
        #[source]
        err: walkdir::Error,
    },
    #[error("Non-UTF-8 paths are not supported: `{}`", _0.display())]
    NotUtf8Path(PathBuf),
    #[error("Selected file is outside the project root: `{}`", _0.display())]
    EscapesProjectRoot(PathBuf),
    #[error(
        "Two distinct files map to the same archive path `{path}`: `{}` and `{}`",
        first.display(),
        second.display()
    )]
    DuplicateArchivePath {
        path: String,
        first: PathBuf,
        second: PathBuf,
    },
    #[error(
        "`{0}` is outside `tool.whey.source-dir` and cannot be included in a wheel"
    )]
    OutsideSourceDir(String),
    #[error("Failed to write wheel zip archive")]
    Zip(#[from] zip::result::ZipError),
    #[error("Failed to write RECORD file")]
    Csv(#[from] csv::Error),
    #[error("Failed to write to `{}`", _0.display())]
    TarWrite(PathBuf, #[source] io::Error),
    #[error("Failed to persist the archive to `{}`", _0.display())]
    Persist(PathBuf, #[source] io::Error),
    #[error("Inconsistent metadata between prepare and build step: `{0}`")]
    InconsistentSteps(&'static str),
    #[error("`SOURCE_DATE_EPOCH` must be an integer number of seconds, not `{0}`")]
    InvalidSourceDateEpoch(String),
    #[error(
        "`SOURCE_DATE_EPOCH` is {0}, outside the supported range [{min}, {max}]",
        min = timestamps::MIN_SOURCE_DATE_EPOCH,
        max = timestamps::MAX_SOURCE_DATE_EPOCH
    )]
    SourceDateEpochRange(i64),
    #[error("Unknown {role} builder `{name}`. Known builders: {known}")]
    UnknownBuilder {
        role: BuilderRole,
        name: String,
        known: String,
    },
    #[error("The `{0}` builder does not support editable installs")]
    EditableUnsupported(String),
}

/// Build a source distribution and place it in the output directory.
///
/// PEP 517 hook `build_sdist`; returns the filename of the created archive.
pub fn build_sdist(source_tree: &Path, sdist_directory: &Path) -> Result<String, Error> {
    BuilderRegistry::default().build(
        BuilderRole::Sdist,
        &BuildRequest::new(source_tree, sdist_directory),
    )
}

/// Build a wheel and place it in the output directory.
///
/// PEP 517 hook `build_wheel`; returns the filename of the created archive.
pub fn build_wheel(
    source_tree: &Path,
    wheel_directory: &Path,
    metadata_directory: Option<&Path>,
) -> Result<String, Error> {
    BuilderRegistry::default().build(
        BuilderRole::Wheel,
        &BuildRequest::new(source_tree, wheel_directory)
            .with_metadata_directory(metadata_directory),
    )
}

/// Build an editable wheel and place it in the output directory.
///
/// PEP 660 hook `build_editable`; returns the filename of the created archive.
pub fn build_editable(
    source_tree: &Path,
    wheel_directory: &Path,
    metadata_directory: Option<&Path>,
) -> Result<String, Error> {
    BuilderRegistry::default().build(
        BuilderRole::EditableWheel,
        &BuildRequest::new(source_tree, wheel_directory)
            .with_metadata_directory(metadata_directory),
    )
}

/// Build a binary distribution through the configured binary builder.
pub fn build_binary(source_tree: &Path, out_dir: &Path) -> Result<String, Error> {
    BuilderRegistry::default().build(
        BuilderRole::Binary,
        &BuildRequest::new(source_tree, out_dir),
    )
}

/// Write the dist-info directory to the output directory without building the wheel.
///
/// PEP 517 hook `prepare_metadata_for_build_wheel`; returns the name of the dist-info
/// directory.
pub fn prepare_metadata_for_build_wheel(
    source_tree: &Path,
    metadata_directory: &Path,
) -> Result<String, Error> {
    wheel::metadata(source_tree, metadata_directory)
}

/// PEP 660 hook `prepare_metadata_for_build_editable`; the editable wheel carries the
/// same metadata as the regular wheel.
pub fn prepare_metadata_for_build_editable(
    source_tree: &Path,
    metadata_directory: &Path,
) -> Result<String, Error> {
    wheel::metadata(source_tree, metadata_directory)
}

/// PEP 517 hook `get_requires_for_build_sdist`: the backend has no build requirements
/// beyond itself.
pub fn get_requires_for_build_sdist() -> Vec<String> {
    Vec::new()
}

/// PEP 517 hook `get_requires_for_build_wheel`.
pub fn get_requires_for_build_wheel() -> Vec<String> {
    Vec::new()
}

/// PEP 660 hook `get_requires_for_build_editable`.
pub fn get_requires_for_build_editable() -> Vec<String> {
    Vec::new()
}

/// Allow dispatching between writing to a directory, writing to a zip and writing to a
/// `.tar.gz`.
///
/// All paths are string types instead of path types since archives are portable between
/// platforms.
///
/// Contract: You must call close before dropping to obtain a valid output (dropping is
/// fine in the error case, and removes any temporary file).
pub(crate) trait DirectoryWriter {
    /// Add a file with the given content.
    fn write_bytes(&mut self, path: &str, bytes: &[u8]) -> Result<(), Error>;

    /// Add a local file.
    fn write_file(&mut self, path: &str, file: &Path) -> Result<(), Error>;

    /// Create a directory.
    fn write_directory(&mut self, directory: &str) -> Result<(), Error>;

    /// Write the `RECORD` file and, if applicable, persist the archive.
    fn close(self, dist_info_dir: &str) -> Result<(), Error>
    where
        Self: Sized;
}

/// An entry in the `RECORD` file.
///
/// <https://packaging.python.org/en/latest/specifications/recording-installed-packages/#the-record-file>
pub(crate) struct RecordEntry {
    /// The path to the file relative to the package root.
    ///
    /// While the spec would allow backslashes, we always use portable paths with forward
    /// slashes.
    pub(crate) path: String,
    /// The SHA256 of the file, URL-safe base64 encoded without padding, per PEP 376.
    pub(crate) hash: String,
    /// The size of the file in bytes.
    pub(crate) size: usize,
}

/// Read the input file and write it both to the hasher and the target file.
///
/// We're implementing this tee-ing manually since there is no sync `InspectReader` or
/// std tee function.
pub(crate) fn write_hashed(
    path: &str,
    reader: &mut dyn Read,
    writer: &mut dyn Write,
) -> Result<RecordEntry, io::Error> {
    let mut hasher = Sha256::new();
    let mut size = 0;
    // 8KB is the default defined in `std::sys_common::io`.
    let mut buffer = vec![0; 8 * 1024];
    loop {
        let read = match reader.read(&mut buffer) {
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        if read == 0 {
            // End of file
            break;
        }
        hasher.update(&buffer[..read]);
        writer.write_all(&buffer[..read])?;
        size += read;
    }
    Ok(RecordEntry {
        path: path.to_string(),
        hash: URL_SAFE_NO_PAD.encode(hasher.finalize()),
        size,
    })
}

/// Hash bytes held in memory for the `RECORD` file.
pub(crate) fn record_entry_for_bytes(path: &str, bytes: &[u8]) -> RecordEntry {
    RecordEntry {
        path: path.to_string(),
        hash: URL_SAFE_NO_PAD.encode(Sha256::new().chain_update(bytes).finalize()),
        size: bytes.len(),
    }
}

/// Write the `RECORD` file.
///
/// Rows are `path,sha256=<urlsafe-b64-nopad>,<size>`, LF-terminated; `RECORD` itself is
/// listed with an empty hash and size.
pub(crate) fn write_record(
    writer: &mut dyn Write,
    dist_info_dir: &str,
    record: Vec<RecordEntry>,
) -> Result<(), Error> {
    let mut record_writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);
    for entry in record {
        record_writer.write_record(&[
            entry.path,
            format!("sha256={}", entry.hash),
            entry.size.to_string(),
        ])?;
    }

    // We can't compute the hash or size for RECORD without modifying it at the same time.
    record_writer.write_record(&[
        format!("{dist_info_dir}/RECORD"),
        String::new(),
        String::new(),
    ])?;
    record_writer.flush()?;
    Ok(())
}

/// A writer backed by a plain directory, used for the prepare-metadata hooks.
pub(crate) struct FilesystemWriter {
    /// The metadata directory that file paths are relative to.
    root: PathBuf,
    /// The entries in the `RECORD` file.
    record: Vec<RecordEntry>,
}

impl FilesystemWriter {
    pub(crate) fn new(root: &Path) -> Self {
        Self {
            root: root.to_owned(),
            record: Vec::new(),
        }
    }
}

impl DirectoryWriter for FilesystemWriter {
    fn write_bytes(&mut self, path: &str, bytes: &[u8]) -> Result<(), Error> {
        trace!("Adding {path}");
        self.record.push(record_entry_for_bytes(path, bytes));
        Ok(fs_err::write(self.root.join(path), bytes)?)
    }

    fn write_file(&mut self, path: &str, file: &Path) -> Result<(), Error> {
        trace!("Adding {path} from {}", file.display());
        let mut reader = io::BufReader::new(File::open(file)?);
        let mut writer = File::create(self.root.join(path))?;
        let record = write_hashed(path, &mut reader, &mut writer)?;
        self.record.push(record);
        Ok(())
    }

    fn write_directory(&mut self, directory: &str) -> Result<(), Error> {
        trace!("Adding directory {directory}");
        Ok(fs_err::create_dir_all(self.root.join(directory))?)
    }

    /// Write the `RECORD` file.
    fn close(mut self, dist_info_dir: &str) -> Result<(), Error> {
        let record = std::mem::take(&mut self.record);
        let mut writer = File::create(self.root.join(format!("{dist_info_dir}/RECORD")))?;
        write_record(&mut writer, dist_info_dir, record)?;
        Ok(())
    }
}

/// PEP 517 requires that the metadata directory from the prepare metadata call is
/// identical to the build wheel call. This method performs a prudence check that
/// `METADATA` and `entry_points.txt` match.
pub(crate) fn check_metadata_directory(
    metadata_directory: Option<&Path>,
    config: &Config,
) -> Result<(), Error> {
    let Some(metadata_directory) = metadata_directory else {
        return Ok(());
    };

    let dist_info_dir = format!(
        "{}-{}.dist-info",
        config.project.name.as_dist_info_name(),
        config.project.version
    );

    // `METADATA` is a mandatory file.
    let current =
        CoreMetadata::from_project(&config.project, &config.whey).core_metadata_format();
    let previous =
        fs_err::read_to_string(metadata_directory.join(&dist_info_dir).join("METADATA"))?;
    if previous != current {
        return Err(Error::InconsistentSteps("METADATA"));
    }

    // `entry_points.txt` is not written if it would be empty.
    let entrypoints_path = metadata_directory
        .join(&dist_info_dir)
        .join("entry_points.txt");
    match whey_metadata::entry_points_txt(&config.project).map_err(whey_metadata::Error::from)? {
        None => {
            if entrypoints_path.is_file() {
                return Err(Error::InconsistentSteps("entry_points.txt"));
            }
        }
        Some(entrypoints) => {
            if fs_err::read_to_string(&entrypoints_path)? != entrypoints {
                return Err(Error::InconsistentSteps("entry_points.txt"));
            }
        }
    }

    Ok(())
}
