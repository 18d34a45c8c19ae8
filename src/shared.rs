// src/shared.rs

//! Libraries shared between the bootstrap tier and isolated agent code
//!
//! The isolated agent classes resolve a handful of API types against the
//! copies already loaded by the bootstrap tier. Those libraries must never
//! be relocated and must never be copied under the isolation prefix,
//! otherwise the agent would see a second, incompatible copy of the same
//! types. [`SharedContract`] is the single list both the relocator and the
//! isolator consult.

use crate::archive::Archive;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

const MAVEN_METADATA_PREFIX: &str = "META-INF/maven/";

/// A library whose types are shared with the bootstrap tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedLibrary {
    /// Maven coordinate, `group:artifact`
    pub coordinate: String,
    /// Dotted package names owned by the library
    pub packages: Vec<String>,
}

impl SharedLibrary {
    pub fn new(coordinate: &str, packages: &[&str]) -> Self {
        Self {
            coordinate: coordinate.to_string(),
            packages: packages.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn group(&self) -> &str {
        self.coordinate.split_once(':').map_or("", |(g, _)| g)
    }

    pub fn artifact(&self) -> &str {
        self.coordinate
            .split_once(':')
            .map_or(self.coordinate.as_str(), |(_, a)| a)
    }

    /// Whether a jar file name looks like this library (`artifact.jar` or `artifact-<digit>...jar`)
    fn matches_file_name(&self, file_name: &str) -> bool {
        let Some(stem) = file_name.strip_suffix(".jar") else {
            return false;
        };
        let artifact = self.artifact();
        if stem == artifact {
            return true;
        }
        stem.strip_prefix(artifact)
            .and_then(|rest| rest.strip_prefix('-'))
            .is_some_and(|version| version.starts_with(|c: char| c.is_ascii_digit()))
    }
}

/// The set of libraries that pass through relocation and isolation untouched
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedContract {
    #[serde(rename = "library")]
    libraries: Vec<SharedLibrary>,
    /// Package prefixes in internal form, with trailing slash
    #[serde(skip)]
    internal_prefixes: Vec<String>,
}

impl Default for SharedContract {
    fn default() -> Self {
        Self::new(vec![
            SharedLibrary::new("org.slf4j:slf4j-api", &["org.slf4j"]),
            SharedLibrary::new("io.opentelemetry:opentelemetry-api", &["io.opentelemetry.api"]),
            SharedLibrary::new(
                "io.opentelemetry:opentelemetry-context",
                &["io.opentelemetry.context"],
            ),
            SharedLibrary::new(
                "io.opentelemetry:opentelemetry-semconv",
                &["io.opentelemetry.semconv"],
            ),
        ])
    }
}

impl SharedContract {
    pub fn new(libraries: Vec<SharedLibrary>) -> Self {
        let internal_prefixes = libraries
            .iter()
            .flat_map(|lib| lib.packages.iter())
            .map(|pkg| format!("{}/", pkg.replace('.', "/")))
            .collect();
        Self {
            libraries,
            internal_prefixes,
        }
    }

    /// A contract with no shared libraries
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Rebuild derived state after deserialization and check the entries
    pub fn validated(self) -> Result<Self> {
        for lib in &self.libraries {
            if lib.group().is_empty() || lib.artifact().is_empty() {
                return Err(Error::Config(format!(
                    "shared library coordinate '{}' must be group:artifact",
                    lib.coordinate
                )));
            }
            if lib.packages.is_empty() {
                return Err(Error::Config(format!(
                    "shared library {} declares no packages",
                    lib.coordinate
                )));
            }
            for pkg in &lib.packages {
                if pkg.is_empty() || pkg.starts_with('.') || pkg.ends_with('.') || pkg.contains('/')
                {
                    return Err(Error::Config(format!(
                        "shared package '{}' of {} must be a dotted package name",
                        pkg, lib.coordinate
                    )));
                }
            }
        }
        Ok(Self::new(self.libraries))
    }

    pub fn libraries(&self) -> &[SharedLibrary] {
        &self.libraries
    }

    /// Package prefixes in internal (slash) form, each ending with `/`
    pub fn internal_prefixes(&self) -> &[String] {
        &self.internal_prefixes
    }

    /// Whether an internal class name (or path) lies inside a shared package
    pub fn covers_internal_name(&self, name: &str) -> bool {
        self.internal_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }

    /// Whether a dotted class name lies inside a shared package
    pub fn covers_class_name(&self, name: &str) -> bool {
        self.covers_internal_name(&name.replace('.', "/"))
    }

    /// Identify which shared library, if any, an input archive is
    ///
    /// Maven metadata inside the jar wins; the file name is the fallback.
    pub fn identify(&self, path: &Path, archive: &Archive) -> Option<&SharedLibrary> {
        let coordinates = maven_coordinates(archive);
        if !coordinates.is_empty() {
            return self
                .libraries
                .iter()
                .find(|lib| coordinates.iter().any(|c| c == &lib.coordinate));
        }

        let file_name = path.file_name()?.to_str()?;
        self.libraries.iter().find(|lib| lib.matches_file_name(file_name))
    }
}

/// Maven coordinates declared by `pom.properties` files in a jar
pub fn maven_coordinates(archive: &Archive) -> Vec<String> {
    archive
        .entries()
        .iter()
        .filter(|e| e.path.starts_with(MAVEN_METADATA_PREFIX) && e.path.ends_with("/pom.properties"))
        .filter_map(|e| {
            let text = std::str::from_utf8(&e.content).ok()?;
            let mut group = None;
            let mut artifact = None;
            for line in text.lines() {
                let line = line.trim();
                if let Some(v) = line.strip_prefix("groupId=") {
                    group = Some(v.trim());
                } else if let Some(v) = line.strip_prefix("artifactId=") {
                    artifact = Some(v.trim());
                }
            }
            Some(format!("{}:{}", group?, artifact?))
        })
        .collect()
}
