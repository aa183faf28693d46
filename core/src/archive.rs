use crate::listing::FileListing;
use crate::{Error, Result};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const ARCHIVE_EXTENSION: &str = ".zip";

/// Zips the listed files from `src_dir` into `output_dir/archive_name`.
///
/// Members are stored under their listed relative paths, in listing order.
/// The listing is used as-is; nothing is walked again. Refuses to replace an
/// existing file. Returns the absolute path of the new archive.
pub fn create_archive(
    output_dir: &Path,
    archive_name: &str,
    src_dir: &Path,
    listing: &FileListing,
) -> Result<PathBuf> {
    let archive_path = std::path::absolute(output_dir.join(archive_name))?;
    debug!("Creating local archive {}", archive_path.display());

    let file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&archive_path)
        .map_err(|e| {
            if e.kind() == io::ErrorKind::AlreadyExists {
                Error::Io(io::Error::new(
                    e.kind(),
                    format!("archive {} already exists", archive_path.display()),
                ))
            } else {
                Error::Io(e)
            }
        })?;

    info!("Archiving {} files under {}", listing.len(), src_dir.display());
    let mut zip = ZipWriter::new(file);
    for rel_path in listing.iter() {
        let source = src_dir.join(rel_path);
        debug!("Archiving {}", rel_path);

        let metadata = fs::metadata(&source)?;
        let options = FileOptions::<()>::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(permission_bits(&metadata))
            .large_file(metadata.len() >= u32::MAX as u64);

        zip.start_file(member_name(rel_path), options)?;
        let mut input = File::open(&source)?;
        io::copy(&mut input, &mut zip)?;
    }
    zip.finish()?;

    debug!("Created local archive {}", archive_path.display());
    Ok(archive_path)
}

/// Zip members always use `/`, whatever the platform separator.
fn member_name(rel_path: &str) -> String {
    if std::path::MAIN_SEPARATOR == '/' {
        rel_path.to_string()
    } else {
        rel_path.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

#[cfg(unix)]
fn permission_bits(metadata: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &fs::Metadata) -> u32 {
    if metadata.permissions().readonly() { 0o444 } else { 0o644 }
}
