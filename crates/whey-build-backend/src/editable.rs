//! Build a PEP 660 editable wheel.
//!
//! The wheel carries a `.pth` redirector instead of the package tree: installing it
//! prepends the project's source directory to the import search path, so the installed
//! package tracks the working tree.

use std::path::Path;

use tracing::debug;

use whey_metadata::Config;

use crate::filename::WheelFilename;
use crate::timestamps::ArchiveTimestamp;
use crate::wheel::{write_dist_info, ZipDirectoryWriter};
use crate::{check_metadata_directory, BuildRequest, DirectoryWriter, Error};

/// Build an editable wheel from the source tree and place it in the output directory.
///
/// An editable wheel uses the wheel format not for distribution but as ephemeral
/// communication between the build system and the front end. It must not be cached nor
/// distributed.
pub(crate) fn build_editable(request: &BuildRequest) -> Result<String, Error> {
    let config = Config::load(request.source_tree)?;
    check_metadata_directory(request.metadata_directory, &config)?;
    let timestamp = ArchiveTimestamp::resolve(request.source_tree)?;

    let filename = WheelFilename {
        name: config.project.name.clone(),
        version: config.project.version.clone(),
    };

    fs_err::create_dir_all(request.out_dir)?;
    let final_path = request.out_dir.join(filename.to_string());
    debug!("Writing editable wheel at {}", final_path.display());
    let mut writer = ZipDirectoryWriter::new_wheel(request.out_dir, &final_path, timestamp)?;

    // Avoid a trailing `.` component in the redirector for the default flat layout.
    let src_root = if config.whey.source_dir == Path::new(".") {
        request.source_tree.to_path_buf()
    } else {
        request.source_tree.join(&config.whey.source_dir)
    };
    let package_dir = src_root.join(&config.whey.package);
    if !package_dir.is_dir() {
        return Err(Error::MissingPackageDir(package_dir));
    }

    // The `.pth` file must name the source directory absolutely, since the wheel is
    // installed far away from the project.
    let absolute = std::path::absolute(&src_root)?;
    let absolute = absolute
        .to_str()
        .ok_or_else(|| Error::NotUtf8Path(absolute.clone()))?;
    debug!("Adding pth file to {}", final_path.display());
    writer.write_bytes(
        &format!("{}.pth", config.project.name.as_dist_info_name()),
        format!("{absolute}\n").as_bytes(),
    )?;

    debug!("Adding metadata files to {}", final_path.display());
    let dist_info_dir = write_dist_info(&mut writer, &config, &filename)?;
    writer.close(&dist_info_dir)?;

    Ok(filename.to_string())
}
