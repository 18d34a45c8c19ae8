// src/verify.rs
//! Bundle verification
//!
//! Checks a written bundle against the guarantees the pipeline makes:
//! - the manifest is the first entry and carries every required attribute
//! - every isolated entry is under the namespace prefix and none of them is
//!   a loadable `.class`
//! - no shared-library package appears under the namespace
//! - every isolated class declares the name its restored path implies
//!
//! Problems are collected rather than returned as the first error, so a
//! single run reports everything wrong with a bundle.

use crate::archive::{self, Archive, MANIFEST_PATH};
use crate::error::{Error, Result};
use crate::hash;
use crate::isolate::NamespacePlan;
use crate::manifest::{
    AGENT_CLASS, AttributeValue, CAN_REDEFINE_CLASSES, CAN_RETRANSFORM_CLASSES,
    IMPLEMENTATION_VENDOR, IMPLEMENTATION_VERSION, MAIN_CLASS, ManifestAttributes, PREMAIN_CLASS,
};
use crate::relocate::classfile;
use crate::shared::SharedContract;
use std::path::Path;
use tracing::debug;

const REQUIRED_TEXT: [&str; 5] = [
    MAIN_CLASS,
    AGENT_CLASS,
    PREMAIN_CLASS,
    IMPLEMENTATION_VENDOR,
    IMPLEMENTATION_VERSION,
];
const REQUIRED_FLAGS: [&str; 2] = [CAN_REDEFINE_CLASSES, CAN_RETRANSFORM_CLASSES];

/// Outcome of [`verify_bundle`]
#[derive(Debug, Clone)]
pub struct VerifyReport {
    /// Whether no problems were found
    pub valid: bool,
    pub sha256: String,
    /// Entries in the jar, manifest included
    pub entries: usize,
    /// Entries under the isolation prefix
    pub isolated_entries: usize,
    /// Isolated class files whose declared name was checked
    pub isolated_classes: usize,
    pub manifest: Option<ManifestAttributes>,
    pub problems: Vec<String>,
}

/// Outcome of [`verify_twins`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwinCheck {
    pub identical: bool,
    pub first_sha256: String,
    pub second_sha256: String,
}

/// Verify a bundle on disk
pub fn verify_bundle(
    path: &Path,
    plan: &NamespacePlan,
    shared: &SharedContract,
) -> Result<VerifyReport> {
    let bytes = std::fs::read(path).map_err(|e| Error::archive_read(path, e.to_string()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let archive = Archive::from_bytes(name, &bytes).map_err(|e| match e {
        Error::ArchiveRead { message, .. } => Error::archive_read(path, message),
        other => other,
    })?;

    let mut report = verify_archive(&archive, plan, shared);
    report.sha256 = hash::sha256(&bytes);
    debug!(
        "Verified {}: {} entries, {} problems",
        path.display(),
        report.entries,
        report.problems.len()
    );
    Ok(report)
}

/// Verify an in-memory bundle (manifest included as an entry)
pub fn verify_archive(
    archive: &Archive,
    plan: &NamespacePlan,
    shared: &SharedContract,
) -> VerifyReport {
    let mut problems = Vec::new();

    let manifest = check_manifest(archive, &mut problems);

    let mut isolated_entries = 0;
    let mut isolated_classes = 0;
    for entry in archive.entries() {
        let Some(restored) = plan.restore_path(&entry.path) else {
            continue;
        };
        isolated_entries += 1;

        if entry.path.ends_with(".class") {
            problems.push(format!("{} is a loadable class inside the isolated namespace", entry.path));
            continue;
        }

        let (_, unversioned) = archive::split_versioned(&restored);
        if shared.covers_internal_name(unversioned) {
            problems.push(format!(
                "{} belongs to a shared library but is isolated",
                entry.path
            ));
            continue;
        }

        if !entry.path.ends_with(plan.class_suffix()) {
            continue;
        }
        isolated_classes += 1;
        let Some(expected) = unversioned.strip_suffix(".class") else {
            continue;
        };
        match classfile::class_name(&entry.content) {
            Ok(declared) if declared == expected => {}
            Ok(declared) => problems.push(format!(
                "{} declares class {} but restores to {}",
                entry.path, declared, restored
            )),
            Err(e) => problems.push(format!("{} is not a valid class file: {}", entry.path, e)),
        }
    }

    VerifyReport {
        valid: problems.is_empty(),
        sha256: String::new(),
        entries: archive.len(),
        isolated_entries,
        isolated_classes,
        manifest,
        problems,
    }
}

fn check_manifest(archive: &Archive, problems: &mut Vec<String>) -> Option<ManifestAttributes> {
    let Some(entry) = archive.get(MANIFEST_PATH) else {
        problems.push(format!("{} is missing", MANIFEST_PATH));
        return None;
    };
    if archive.entries().first().map(|e| e.path.as_str()) != Some(MANIFEST_PATH) {
        problems.push(format!("{} is not the first entry", MANIFEST_PATH));
    }

    let manifest = match ManifestAttributes::parse(&entry.content) {
        Ok(manifest) => manifest,
        Err(e) => {
            problems.push(format!("{} cannot be parsed: {}", MANIFEST_PATH, e));
            return None;
        }
    };

    for name in REQUIRED_TEXT {
        match manifest.value(name) {
            Some(value) if !value.is_empty() => {}
            _ => problems.push(format!("manifest attribute {} is missing", name)),
        }
    }
    for name in REQUIRED_FLAGS {
        if manifest.get(name) != Some(&AttributeValue::Flag(true)) {
            problems.push(format!("manifest attribute {} must be true", name));
        }
    }
    if let Some(version) = manifest.value(IMPLEMENTATION_VERSION)
        && !version.contains("-otel-")
    {
        problems.push(format!(
            "{} '{}' is not of the form <version>-otel-<upstream>",
            IMPLEMENTATION_VERSION, version
        ));
    }

    Some(manifest)
}

/// Check that two jars are byte-identical
pub fn verify_twins(first: &Path, second: &Path) -> Result<TwinCheck> {
    let first_sha256 =
        hash::sha256_file(first).map_err(|e| Error::archive_read(first, e.to_string()))?;
    let second_sha256 =
        hash::sha256_file(second).map_err(|e| Error::archive_read(second, e.to_string()))?;
    Ok(TwinCheck {
        identical: first_sha256 == second_sha256,
        first_sha256,
        second_sha256,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveEntry;
    use crate::isolate::IsolationConfig;
    use crate::manifest::ManifestSpec;

    fn plan() -> NamespacePlan {
        NamespacePlan::new(&IsolationConfig::default()).unwrap()
    }

    /// Minimal class file declaring `name`
    fn class_bytes(name: &str) -> Vec<u8> {
        let mut out = vec![0xCA, 0xFE, 0xBA, 0xBE, 0, 0, 0, 52];
        out.extend_from_slice(&3u16.to_be_bytes());
        out.push(1);
        out.extend_from_slice(&(name.len() as u16).to_be_bytes());
        out.extend_from_slice(name.as_bytes());
        out.push(7);
        out.extend_from_slice(&1u16.to_be_bytes());
        // access, this_class, super_class, interfaces, fields, methods, attributes
        out.extend_from_slice(&[0, 0x21, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        out
    }

    fn bundle(entries: Vec<ArchiveEntry>) -> Archive {
        let manifest = ManifestAttributes::for_bundle(&ManifestSpec::default(), "1.2.0", "1.15.0");
        let mut archive = Archive::new("bundle.jar");
        archive
            .push(ArchiveEntry::new(MANIFEST_PATH, manifest.to_bytes()))
            .unwrap();
        for entry in entries {
            archive.push(entry).unwrap();
        }
        archive
    }

    #[test]
    fn test_valid_bundle() {
        let archive = bundle(vec![
            ArchiveEntry::new("inst/com/splunk/Agent.classdata", class_bytes("com/splunk/Agent")),
            ArchiveEntry::new("inst/LICENSE.renamed", b"license".to_vec()),
            ArchiveEntry::new("org/slf4j/Logger.class", class_bytes("org/slf4j/Logger")),
        ]);

        let report = verify_archive(&archive, &plan(), &SharedContract::default());
        assert!(report.valid, "{:?}", report.problems);
        assert_eq!(report.isolated_entries, 2);
        assert_eq!(report.isolated_classes, 1);
    }

    #[test]
    fn test_detects_isolation_problems() {
        let archive = bundle(vec![
            ArchiveEntry::new("inst/com/splunk/Loadable.class", Vec::new()),
            ArchiveEntry::new("inst/org/slf4j/Logger.classdata", class_bytes("org/slf4j/Logger")),
            ArchiveEntry::new("inst/com/splunk/Wrong.classdata", class_bytes("com/splunk/Other")),
        ]);

        let report = verify_archive(&archive, &plan(), &SharedContract::default());
        assert!(!report.valid);
        assert_eq!(report.problems.len(), 3);
    }

    #[test]
    fn test_detects_manifest_problems() {
        let mut archive = Archive::new("bundle.jar");
        archive
            .push(ArchiveEntry::new("com/x/A.class", class_bytes("com/x/A")))
            .unwrap();
        let report = verify_archive(&archive, &plan(), &SharedContract::default());
        assert!(!report.valid);
        assert!(report.manifest.is_none());

        let mut manifest = ManifestAttributes::new();
        manifest.insert(MAIN_CLASS, AttributeValue::text("a.B"));
        let archive = {
            let mut a = Archive::new("bundle.jar");
            a.push(ArchiveEntry::new(MANIFEST_PATH, manifest.to_bytes())).unwrap();
            a
        };
        let report = verify_archive(&archive, &plan(), &SharedContract::default());
        // Four missing text attributes, two missing flags
        assert_eq!(report.problems.len(), 6);
    }

    #[test]
    fn test_verify_twins() {
        let temp = tempfile::TempDir::new().unwrap();
        let a = temp.path().join("a.jar");
        let b = temp.path().join("b.jar");
        let c = temp.path().join("c.jar");
        std::fs::write(&a, b"same").unwrap();
        std::fs::write(&b, b"same").unwrap();
        std::fs::write(&c, b"different").unwrap();

        assert!(verify_twins(&a, &b).unwrap().identical);
        assert!(!verify_twins(&a, &c).unwrap().identical);
        assert!(verify_twins(&a, &temp.path().join("missing.jar")).is_err());
    }
}
