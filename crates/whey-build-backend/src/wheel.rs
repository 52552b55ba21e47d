//! Build a wheel: a zip with the package tree and a `.dist-info/` directory.

use std::collections::BTreeSet;
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use fs_err::File;
use itertools::Itertools;
use tempfile::NamedTempFile;
use tracing::{debug, trace};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use whey_metadata::{entry_points_txt, Config, CoreMetadata};

use crate::file_selection::select_files;
use crate::filename::WheelFilename;
use crate::timestamps::ArchiveTimestamp;
use crate::{
    check_metadata_directory, record_entry_for_bytes, write_hashed, write_record, BuildRequest,
    DirectoryWriter, Error, FilesystemWriter, RecordEntry, VERSION,
};

/// Build a wheel from the source tree and place it in the output directory.
pub(crate) fn build_wheel(request: &BuildRequest) -> Result<String, Error> {
    let config = Config::load(request.source_tree)?;
    check_metadata_directory(request.metadata_directory, &config)?;
    let timestamp = ArchiveTimestamp::resolve(request.source_tree)?;
    let filename = write_wheel(request.source_tree, request.out_dir, &config, timestamp)?;
    Ok(filename.to_string())
}

pub(crate) fn write_wheel(
    source_tree: &Path,
    out_dir: &Path,
    config: &Config,
    timestamp: ArchiveTimestamp,
) -> Result<WheelFilename, Error> {
    let filename = WheelFilename {
        name: config.project.name.clone(),
        version: config.project.version.clone(),
    };

    fs_err::create_dir_all(out_dir)?;
    let final_path = out_dir.join(filename.to_string());
    debug!("Writing wheel at {}", final_path.display());
    let mut writer = ZipDirectoryWriter::new_wheel(out_dir, &final_path, timestamp)?;

    debug!("Adding content files to {}", final_path.display());
    let source_dir_prefix = source_dir_prefix(config);
    let mut directories = BTreeSet::new();
    for entry in select_files(source_tree, &config.whey)? {
        let wheel_path = match &source_dir_prefix {
            None => entry.archive_path.as_str(),
            Some(prefix) => entry
                .archive_path
                .strip_prefix(prefix)
                .ok_or_else(|| Error::OutsideSourceDir(entry.archive_path.clone()))?,
        };
        for ancestor in crate::file_selection::parent_directories(wheel_path) {
            if directories.insert(ancestor.clone()) {
                writer.write_directory(&ancestor)?;
            }
        }
        writer.write_file(wheel_path, &entry.source)?;
    }

    debug!("Adding metadata files to {}", final_path.display());
    let dist_info_dir = write_dist_info(&mut writer, config, &filename)?;
    writer.close(&dist_info_dir)?;

    Ok(filename)
}

/// The portable `source-dir` prefix to strip from wheel paths, or `None` for a flat
/// layout.
fn source_dir_prefix(config: &Config) -> Option<String> {
    let source_dir = &config.whey.source_dir;
    if source_dir == Path::new(".") || source_dir == Path::new("") {
        return None;
    }
    let portable = source_dir
        .components()
        .filter_map(|component| component.as_os_str().to_str())
        .join("/");
    Some(format!("{portable}/"))
}

/// Write the dist-info directory to the output directory without building the wheel.
///
/// Returns the name of the dist-info directory.
pub(crate) fn metadata(source_tree: &Path, metadata_directory: &Path) -> Result<String, Error> {
    let config = Config::load(source_tree)?;
    let filename = WheelFilename {
        name: config.project.name.clone(),
        version: config.project.version.clone(),
    };

    debug!("Writing metadata files to {}", metadata_directory.display());
    fs_err::create_dir_all(metadata_directory)?;
    let mut writer = FilesystemWriter::new(metadata_directory);
    let dist_info_dir = write_dist_info(&mut writer, &config, &filename)?;
    writer.close(&dist_info_dir)?;

    Ok(dist_info_dir)
}

/// Add `LICENSE`, `WHEEL`, `entry_points.txt` and `METADATA` to the dist-info directory.
///
/// Returns the name of the dist-info directory. `RECORD` is added on closing.
pub(crate) fn write_dist_info(
    writer: &mut impl DirectoryWriter,
    config: &Config,
    filename: &WheelFilename,
) -> Result<String, Error> {
    let dist_info_dir = filename.dist_info_dir();

    writer.write_directory(&dist_info_dir)?;

    // Add `LICENSE`.
    if let Some(license) = &config.project.license {
        writer.write_bytes(
            &format!("{dist_info_dir}/LICENSE"),
            license.text.as_bytes(),
        )?;
    }

    // Add `WHEEL`.
    let wheel_info = wheel_info();
    writer.write_bytes(&format!("{dist_info_dir}/WHEEL"), wheel_info.as_bytes())?;

    // Add `entry_points.txt`.
    if let Some(entrypoints) =
        entry_points_txt(&config.project).map_err(whey_metadata::Error::from)?
    {
        writer.write_bytes(
            &format!("{dist_info_dir}/entry_points.txt"),
            entrypoints.as_bytes(),
        )?;
    }

    // Add `METADATA`.
    let metadata =
        CoreMetadata::from_project(&config.project, &config.whey).core_metadata_format();
    writer.write_bytes(&format!("{dist_info_dir}/METADATA"), metadata.as_bytes())?;

    // `RECORD` is added on closing.

    Ok(dist_info_dir)
}

/// Returns the `WHEEL` file contents.
pub(crate) fn wheel_info() -> String {
    // https://packaging.python.org/en/latest/specifications/binary-distribution-format/#file-contents
    [
        ("Wheel-Version", "1.0".to_string()),
        ("Generator", format!("whey {VERSION}")),
        ("Root-Is-Purelib", "true".to_string()),
        ("Tag", WheelFilename::tag().to_string()),
    ]
    .into_iter()
    .map(|(key, value)| format!("{key}: {value}\n"))
    .collect()
}

/// Zip archive (wheel) writer, through a temporary file persisted on success.
pub(crate) struct ZipDirectoryWriter {
    final_path: PathBuf,
    timestamp: ArchiveTimestamp,
    writer: ZipWriter<NamedTempFile>,
    compression: CompressionMethod,
    /// The entries in the `RECORD` file.
    record: Vec<RecordEntry>,
}

impl ZipDirectoryWriter {
    /// A wheel writer with deflate compression.
    pub(crate) fn new_wheel(
        out_dir: &Path,
        final_path: &Path,
        timestamp: ArchiveTimestamp,
    ) -> Result<Self, Error> {
        let temp = tempfile::Builder::new()
            .prefix(".whey-")
            .suffix(".whl")
            .tempfile_in(out_dir)?;
        Ok(Self {
            final_path: final_path.to_path_buf(),
            timestamp,
            writer: ZipWriter::new(temp),
            compression: CompressionMethod::Deflated,
            record: Vec::new(),
        })
    }

    fn options(&self) -> SimpleFileOptions {
        SimpleFileOptions::default()
            .compression_method(self.compression)
            .unix_permissions(0o644)
            .last_modified_time(self.timestamp.zip_datetime())
    }
}

impl DirectoryWriter for ZipDirectoryWriter {
    fn write_bytes(&mut self, path: &str, bytes: &[u8]) -> Result<(), Error> {
        trace!("Adding {path}");
        self.writer.start_file(path, self.options())?;
        self.writer.write_all(bytes)?;
        self.record.push(record_entry_for_bytes(path, bytes));
        Ok(())
    }

    fn write_file(&mut self, path: &str, file: &Path) -> Result<(), Error> {
        trace!("Adding {path} from {}", file.display());
        let mut reader = BufReader::new(File::open(file)?);
        self.writer.start_file(path, self.options())?;
        let record = write_hashed(path, &mut reader, &mut self.writer)?;
        self.record.push(record);
        Ok(())
    }

    fn write_directory(&mut self, directory: &str) -> Result<(), Error> {
        trace!("Adding directory {directory}");
        let options = SimpleFileOptions::default()
            .compression_method(self.compression)
            .unix_permissions(0o755)
            .last_modified_time(self.timestamp.zip_datetime());
        Ok(self.writer.add_directory(directory, options)?)
    }

    /// Write the `RECORD` file, the central directory, and move the wheel into place.
    fn close(mut self, dist_info_dir: &str) -> Result<(), Error> {
        let record_path = format!("{dist_info_dir}/RECORD");
        trace!("Adding {record_path}");
        let record = std::mem::take(&mut self.record);
        self.writer.start_file(record_path.as_str(), self.options())?;
        let mut buffer = Vec::new();
        write_record(&mut buffer, dist_info_dir, record)?;
        self.writer.write_all(&buffer)?;

        trace!("Adding central directory");
        let temp = self.writer.finish()?;
        temp.persist(&self.final_path)
            .map_err(|err| Error::Persist(self.final_path.clone(), err.error))?;
        Ok(())
    }
}
