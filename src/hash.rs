// src/hash.rs

//! SHA-256 digests of bundle artifacts
//!
//! Digests are reported after a build and compared by `verify --twin`;
//! they are lowercase hex, optionally printed with a `sha256:` prefix.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

pub const SHA256_PREFIX: &str = "sha256:";

/// SHA-256 of a byte slice, as lowercase hex
pub fn sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// SHA-256 of everything a reader yields
pub fn sha256_reader<R: Read>(reader: &mut R) -> io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// SHA-256 of a file on disk
pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    sha256_reader(&mut file)
}

/// Format a digest as `sha256:<hex>`
pub fn prefixed(digest: &str) -> String {
    format!("{}{}", SHA256_PREFIX, digest)
}
