//! Build a source distribution: a gzip-compressed tar with `PKG-INFO` at the top level.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::io::{BufReader, Cursor};
use std::path::{Path, PathBuf};

use flate2::write::GzEncoder;
use flate2::{Compression, GzBuilder};
use fs_err::File;
use tar::{EntryType, Header};
use tempfile::NamedTempFile;
use tracing::debug;

use whey_metadata::{Config, CoreMetadata};

use crate::file_selection::select_files;
use crate::filename::SourceDistFilename;
use crate::timestamps::ArchiveTimestamp;
use crate::{BuildRequest, Error};

/// Build a source distribution from the source tree and place it in the output
/// directory.
pub(crate) fn build_source_dist(request: &BuildRequest) -> Result<String, Error> {
    let config = Config::load(request.source_tree)?;
    let timestamp = ArchiveTimestamp::resolve(request.source_tree)?;
    let filename = write_source_dist(request.source_tree, request.out_dir, &config, timestamp)?;
    Ok(filename.to_string())
}

/// What lands in the archive for a given member path.
enum SdistEntry {
    /// A file from the project tree.
    File(PathBuf),
    /// Content materialized from the configuration, e.g. `LICENSE` from `license.text`.
    Bytes(Vec<u8>),
}

pub(crate) fn write_source_dist(
    source_tree: &Path,
    out_dir: &Path,
    config: &Config,
    timestamp: ArchiveTimestamp,
) -> Result<SourceDistFilename, Error> {
    let filename = SourceDistFilename {
        name: config.project.name.clone(),
        version: config.project.version.clone(),
    };
    let top_level = format!(
        "{}-{}",
        config.project.name.as_dist_info_name(),
        config.project.version
    );

    fs_err::create_dir_all(out_dir)?;
    let final_path = out_dir.join(filename.to_string());
    debug!("Writing source dist at {}", final_path.display());
    let mut writer = TarGzWriter::new(out_dir, &final_path, timestamp)?;

    let metadata =
        CoreMetadata::from_project(&config.project, &config.whey).core_metadata_format();
    writer.write_bytes(&format!("{top_level}/PKG-INFO"), metadata.as_bytes())?;

    let mut entries: BTreeMap<String, SdistEntry> = select_files(source_tree, &config.whey)?
        .into_iter()
        .map(|entry| (entry.archive_path, SdistEntry::File(entry.source)))
        .collect();

    // `pyproject.toml` is always included.
    entries
        .entry("pyproject.toml".to_string())
        .or_insert_with(|| SdistEntry::File(source_tree.join("pyproject.toml")));

    // The readme and license land at the top level of the sdist, unless the selection
    // already picked up files with the same names.
    if let Some(readme) = &config.project.readme {
        let name = match readme.content_type.as_str() {
            "text/markdown" => "README.md",
            "text/x-rst" => "README.rst",
            _ => "README",
        };
        entries
            .entry(name.to_string())
            .or_insert_with(|| SdistEntry::Bytes(readme.text.clone().into_bytes()));
    }
    if let Some(license) = &config.project.license {
        entries
            .entry("LICENSE".to_string())
            .or_insert_with(|| SdistEntry::Bytes(license.text.clone().into_bytes()));
    }

    let mut directories = BTreeSet::new();
    for (path, entry) in entries {
        for ancestor in crate::file_selection::parent_directories(&path) {
            if directories.insert(ancestor.clone()) {
                writer.write_directory(&format!("{top_level}/{ancestor}"))?;
            }
        }
        let member = format!("{top_level}/{path}");
        debug!("Including {path}");
        match entry {
            SdistEntry::File(source) => writer.write_file(&member, &source)?,
            SdistEntry::Bytes(bytes) => writer.write_bytes(&member, &bytes)?,
        }
    }

    writer.close()?;
    Ok(filename)
}

/// Writes a `.tar.gz` through a temporary file, persisted on success.
///
/// Reproducibility: the gzip header carries `mtime = 0`, every tar entry carries the
/// resolved archive timestamp, zeroed owner and group, and mode 0644 (0755 for
/// directories).
struct TarGzWriter {
    final_path: PathBuf,
    timestamp: ArchiveTimestamp,
    tar: tar::Builder<GzEncoder<NamedTempFile>>,
}

impl TarGzWriter {
    fn new(
        out_dir: &Path,
        final_path: &Path,
        timestamp: ArchiveTimestamp,
    ) -> Result<Self, Error> {
        let temp = tempfile::Builder::new()
            .prefix(".whey-")
            .suffix(".tar.gz")
            .tempfile_in(out_dir)?;
        let enc = GzBuilder::new().mtime(0).write(temp, Compression::default());
        let tar = tar::Builder::new(enc);
        Ok(Self {
            final_path: final_path.to_path_buf(),
            timestamp,
            tar,
        })
    }

    fn header(&self, mode: u32, size: u64) -> Header {
        let mut header = Header::new_gnu();
        header.set_mode(mode);
        header.set_uid(0);
        header.set_gid(0);
        header.set_mtime(self.timestamp.tar_mtime());
        header.set_size(size);
        header
    }

    fn write_bytes(&mut self, path: &str, bytes: &[u8]) -> Result<(), Error> {
        let mut header = self.header(0o644, bytes.len() as u64);
        header.set_cksum();
        self.tar
            .append_data(&mut header, path, Cursor::new(bytes))
            .map_err(|err| Error::TarWrite(self.final_path.clone(), err))?;
        Ok(())
    }

    fn write_file(&mut self, path: &str, file: &Path) -> Result<(), Error> {
        let metadata = fs_err::metadata(file)?;
        let mut header = self.header(0o644, metadata.len());
        header.set_cksum();
        let reader = BufReader::new(File::open(file)?);
        self.tar
            .append_data(&mut header, path, reader)
            .map_err(|err| Error::TarWrite(self.final_path.clone(), err))?;
        Ok(())
    }

    fn write_directory(&mut self, directory: &str) -> Result<(), Error> {
        let mut header = self.header(0o755, 0);
        header.set_entry_type(EntryType::Directory);
        header
            .set_path(format!("{directory}/"))
            .map_err(|err| Error::TarWrite(self.final_path.clone(), err))?;
        header.set_cksum();
        self.tar
            .append(&header, io::empty())
            .map_err(|err| Error::TarWrite(self.final_path.clone(), err))?;
        Ok(())
    }

    /// Finish the archive and atomically move it into place.
    fn close(self) -> Result<(), Error> {
        let encoder = self
            .tar
            .into_inner()
            .map_err(|err| Error::TarWrite(self.final_path.clone(), err))?;
        let temp = encoder
            .finish()
            .map_err(|err| Error::TarWrite(self.final_path.clone(), err))?;
        temp.persist(&self.final_path)
            .map_err(|err| Error::Persist(self.final_path.clone(), err.error))?;
        Ok(())
    }
}
