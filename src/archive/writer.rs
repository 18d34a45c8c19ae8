// src/archive/writer.rs

//! Jar writing
//!
//! Output jars are always written to a temporary file in the destination
//! directory and renamed into place, so a failed or aborted write never
//! leaves a partial file at a final artifact path. Dropping an unpromoted
//! [`NamedTempFile`] deletes it.

use super::Archive;
use crate::error::{Error, Result};
use crate::manifest::ManifestAttributes;
use std::fs;
use std::io::{self, BufWriter, Seek, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// Path of the jar manifest
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

const TEMP_PREFIX: &str = ".agent-bundle-";
const TEMP_SUFFIX: &str = ".jar.tmp";

fn entry_options() -> SimpleFileOptions {
    // Fixed timestamp so identical inputs give byte-identical jars
    SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644)
}

/// Encode a jar: the manifest first, then every entry in archive order
///
/// An entry at the manifest path inside `archive` is ignored; the given
/// manifest always wins.
pub fn encode_jar<W: Write + Seek>(
    writer: W,
    manifest: &ManifestAttributes,
    archive: &Archive,
) -> io::Result<W> {
    let mut zip = ZipWriter::new(writer);

    zip.start_file(MANIFEST_PATH, entry_options())
        .map_err(io::Error::other)?;
    zip.write_all(&manifest.to_bytes())?;

    for entry in archive.entries() {
        if entry.path == MANIFEST_PATH {
            continue;
        }
        zip.start_file(entry.path.as_str(), entry_options())
            .map_err(io::Error::other)?;
        zip.write_all(&entry.content)?;
    }

    zip.finish().map_err(io::Error::other)
}

fn create_temp(dir: &Path) -> Result<NamedTempFile> {
    fs::create_dir_all(dir).map_err(|e| Error::write_failure(dir, e))?;
    tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir)
        .map_err(|e| Error::write_failure(dir, e))
}

/// Write a jar into a fresh temporary file inside `dir`
pub fn write_jar_to_temp(
    dir: &Path,
    manifest: &ManifestAttributes,
    archive: &Archive,
) -> Result<NamedTempFile> {
    let mut temp = create_temp(dir)?;
    let temp_path = temp.path().to_path_buf();

    let write = |file: &mut fs::File| -> io::Result<()> {
        let mut writer = encode_jar(BufWriter::new(&mut *file), manifest, archive)?;
        writer.flush()?;
        drop(writer);
        file.sync_all()
    };
    write(temp.as_file_mut()).map_err(|e| Error::write_failure(&temp_path, e))?;

    debug!(
        "Wrote {} entries to temporary jar {}",
        archive.len() + 1,
        temp_path.display()
    );
    Ok(temp)
}

/// Copy a finished temporary jar into a second temporary file in `dir`
///
/// The copy is byte-for-byte, so both files carry the same manifest.
pub fn copy_to_temp(source: &NamedTempFile, dir: &Path) -> Result<NamedTempFile> {
    let mut temp = create_temp(dir)?;
    let temp_path = temp.path().to_path_buf();

    let copy = |file: &mut fs::File| -> io::Result<()> {
        let mut reader = source.reopen()?;
        io::copy(&mut reader, file)?;
        file.sync_all()
    };
    copy(temp.as_file_mut()).map_err(|e| Error::write_failure(&temp_path, e))?;

    Ok(temp)
}

/// Atomically move a temporary jar to its final path
pub fn promote(temp: NamedTempFile, dest: &Path) -> Result<()> {
    temp.persist(dest)
        .map_err(|e| Error::write_failure(dest, e.error))?;
    debug!("Promoted jar to {}", dest.display());
    Ok(())
}

/// Promote two jars as a pair
///
/// `first` is promoted before `second`. If the second rename fails, the
/// first destination is put back the way it was: the previous file is
/// restored from a backup taken beforehand, or the new file is removed when
/// there was none. The destinations therefore never hold jars from two
/// different builds.
pub fn promote_pair(
    first: NamedTempFile,
    first_dest: &Path,
    second: NamedTempFile,
    second_dest: &Path,
) -> Result<()> {
    let backup = backup_existing(first_dest)?;
    promote(first, first_dest)?;

    if let Err(e) = promote(second, second_dest) {
        restore(backup, first_dest);
        return Err(e);
    }
    Ok(())
}

fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

/// Copy the file at `path`, if any, into a temporary file beside it
fn backup_existing(path: &Path) -> Result<Option<NamedTempFile>> {
    let mut existing = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::write_failure(path, e)),
    };

    let mut backup = create_temp(parent_dir(path))?;
    let backup_path = backup.path().to_path_buf();
    let mut copy = |file: &mut fs::File| -> io::Result<()> {
        io::copy(&mut existing, file)?;
        file.sync_all()
    };
    copy(backup.as_file_mut()).map_err(|e| Error::write_failure(&backup_path, e))?;
    Ok(Some(backup))
}

fn restore(backup: Option<NamedTempFile>, dest: &Path) {
    let restored = match backup {
        Some(backup) => backup.persist(dest).map(drop).map_err(|e| e.error),
        None => fs::remove_file(dest),
    };
    match restored {
        Ok(()) => debug!("Rolled back {}", dest.display()),
        Err(e) => warn!("Failed to roll back {}: {}", dest.display(), e),
    }
}

/// Write a jar to `path`, replacing any existing file atomically
pub fn write_jar(path: &Path, manifest: &ManifestAttributes, archive: &Archive) -> Result<()> {
    let temp = write_jar_to_temp(parent_dir(path), manifest, archive)?;
    promote(temp, path)
}
