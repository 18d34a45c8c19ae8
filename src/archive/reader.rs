// src/archive/reader.rs

//! Jar reading

use super::{Archive, ArchiveEntry};
use crate::error::{Error, Result};
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;
use tracing::debug;
use zip::ZipArchive;

impl Archive {
    /// Read every file entry of a jar on disk
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::archive_read(path, e.to_string()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let archive = Self::from_reader(name, BufReader::new(file), path)?;
        debug!(
            "Read {} entries ({} bytes) from {}",
            archive.len(),
            archive.content_size(),
            path.display()
        );
        Ok(archive)
    }

    /// Read a jar held in memory
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Self> {
        let name = name.into();
        let origin = name.clone();
        Self::from_reader(name, Cursor::new(bytes), Path::new(&origin))
    }

    fn from_reader<R: Read + Seek>(name: String, reader: R, origin: &Path) -> Result<Self> {
        let mut zip =
            ZipArchive::new(reader).map_err(|e| Error::archive_read(origin, e.to_string()))?;
        let mut archive = Archive::new(name);

        for i in 0..zip.len() {
            let mut file = zip
                .by_index(i)
                .map_err(|e| Error::archive_read(origin, e.to_string()))?;

            if file.is_dir() {
                continue;
            }

            let path = file.name().to_string();
            validate_entry_path(&path).map_err(|msg| Error::archive_read(origin, msg))?;

            let mut content = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut content)
                .map_err(|e| Error::archive_read(origin, format!("entry {}: {}", path, e)))?;

            if archive.push(ArchiveEntry::new(path, content)).is_err() {
                return Err(Error::archive_read(
                    origin,
                    format!("duplicate entry {}", file.name()),
                ));
            }
        }

        Ok(archive)
    }
}

/// Check that an entry path is relative, forward-slash delimited and has no traversal
fn validate_entry_path(path: &str) -> std::result::Result<(), String> {
    if path.is_empty() {
        return Err("entry with empty path".to_string());
    }
    if path.starts_with('/') || path.contains('\\') {
        return Err(format!("entry path {} is not a relative forward-slash path", path));
    }
    if path
        .split('/')
        .any(|segment| segment.is_empty() || segment == "." || segment == "..")
    {
        return Err(format!("entry path {} contains an invalid segment", path));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::EntryKind;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            if name.ends_with('/') {
                writer
                    .add_directory(name.trim_end_matches('/'), SimpleFileOptions::default())
                    .unwrap();
            } else {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(content).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_read_skips_directories() {
        let bytes = zip_bytes(&[
            ("com/", b""),
            ("com/example/Foo.class", b"\xca\xfe\xba\xbe"),
            ("LICENSE", b"Apache"),
        ]);

        let archive = Archive::from_bytes("lib.jar", &bytes).unwrap();
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.entries()[0].kind, EntryKind::Class);
        assert_eq!(archive.get("LICENSE").unwrap().content, b"Apache");
    }

    #[test]
    fn test_read_rejects_garbage() {
        let err = Archive::from_bytes("broken.jar", b"not a zip").unwrap_err();
        assert!(matches!(err, Error::ArchiveRead { .. }));
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Archive::read(&dir.path().join("missing.jar")).unwrap_err();
        match err {
            Error::ArchiveRead { path, .. } => assert!(path.ends_with("missing.jar")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_validate_entry_path() {
        assert!(validate_entry_path("a/b/C.class").is_ok());
        assert!(validate_entry_path("/etc/passwd").is_err());
        assert!(validate_entry_path("a/../b").is_err());
        assert!(validate_entry_path("a//b").is_err());
        assert!(validate_entry_path("a\\b").is_err());
    }
}
