// tests/common/mod.rs

//! Shared test utilities for the integration tests: jar and class file
//! builders plus a temporary bundle project.

#![allow(dead_code)]

use agent_bundle::{Archive, BundleConfig};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

/// A minimal class file: `class <name> extends java/lang/Object`, with the
/// given extra Utf8 constants appended to the pool.
pub fn class_file(name: &str, extra_utf8: &[&str]) -> Vec<u8> {
    let mut pool: Vec<u8> = Vec::new();
    let utf8 = |pool: &mut Vec<u8>, s: &str| {
        pool.push(1);
        pool.extend_from_slice(&(s.len() as u16).to_be_bytes());
        pool.extend_from_slice(s.as_bytes());
    };

    utf8(&mut pool, name); // 1
    pool.extend_from_slice(&[7, 0, 1]); // 2: Class #1
    utf8(&mut pool, "java/lang/Object"); // 3
    pool.extend_from_slice(&[7, 0, 3]); // 4: Class #3
    for s in extra_utf8 {
        utf8(&mut pool, s);
    }
    let count = 5 + extra_utf8.len() as u16;

    let mut out = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52];
    out.extend_from_slice(&count.to_be_bytes());
    out.extend_from_slice(&pool);
    // access, this_class, super_class, interfaces, fields, methods, attributes
    out.extend_from_slice(&[0, 0x21, 0, 2, 0, 4, 0, 0, 0, 0, 0, 0, 0, 0]);
    out
}

/// Write a jar with the given entries, in order
pub fn write_jar(path: &Path, entries: &[(&str, Vec<u8>)]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    for (name, content) in entries {
        zip.start_file(*name, SimpleFileOptions::default()).unwrap();
        zip.write_all(content).unwrap();
    }
    zip.finish().unwrap();
}

/// Read a jar back into memory
pub fn read_jar(path: &Path) -> Archive {
    Archive::read(path).unwrap()
}

/// A scratch project directory with a bundle.toml and input jars
pub struct BundleProject {
    pub dir: TempDir,
}

impl BundleProject {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a jar relative to the project
    pub fn jar(&self, relative: &str, entries: &[(&str, Vec<u8>)]) -> PathBuf {
        let path = self.path().join(relative);
        write_jar(&path, entries);
        path
    }

    /// Write bundle.toml with the standard project section and given extra TOML
    pub fn config(&self, body: &str) -> BundleConfig {
        let content = format!(
            r#"
[project]
name = "splunk-otel-javaagent"
version = "1.2.0"
upstream_version = "1.15.0-alpha"

{}
"#,
            body
        );
        let path = self.path().join("bundle.toml");
        fs::write(&path, content).unwrap();
        BundleConfig::from_file(&path).unwrap()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.path().join("build/libs")
    }

    pub fn classifier_jar(&self) -> PathBuf {
        self.output_dir().join("splunk-otel-javaagent-1.2.0-all.jar")
    }

    pub fn primary_jar(&self) -> PathBuf {
        self.output_dir().join("splunk-otel-javaagent-1.2.0.jar")
    }

    /// Files currently in the output directory, sorted
    pub fn output_files(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(self.output_dir()) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

pub fn text(s: &str) -> Vec<u8> {
    s.as_bytes().to_vec()
}

/// Input manifest, as every real jar carries one
pub fn input_manifest() -> (&'static str, Vec<u8>) {
    ("META-INF/MANIFEST.MF", text("Manifest-Version: 1.0\r\n\r\n"))
}
