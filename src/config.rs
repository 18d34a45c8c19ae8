// src/config.rs
//! Bundle configuration (`bundle.toml`)
//!
//! ```toml
//! [project]
//! name = "splunk-otel-javaagent"
//! version = "1.2.0"
//! upstream_version = "1.15.0-alpha"
//!
//! [inputs]
//! bootstrap = ["libs/bootstrap"]
//! agent_libs = ["libs/agent"]
//! upstream = ["libs/opentelemetry-javaagent.jar"]
//!
//! [[relocate]]
//! pattern = "okhttp3"
//! replacement = "com.splunk.javaagent.shaded.okhttp3"
//! ```
//!
//! Input and output paths are relative to the directory holding the file.

use crate::error::{Error, Result};
use crate::isolate::{IsolationConfig, NamespacePlan};
use crate::manifest::{self, ManifestSpec};
use crate::relocate::RelocationRule;
use crate::shared::SharedContract;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "bundle.toml";

/// `[project]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Base name of the output jars
    pub name: String,
    pub version: String,
    /// Version of the upstream agent being extended
    pub upstream_version: String,
}

/// `[inputs]`: the three library sets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputsConfig {
    pub bootstrap: Vec<PathBuf>,
    pub agent_libs: Vec<PathBuf>,
    pub upstream: Vec<PathBuf>,
}

/// `[output]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub classifier: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("build/libs"),
            classifier: "all".to_string(),
        }
    }
}

/// `[merge]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Concatenate `META-INF/services` descriptors instead of deduplicating them
    pub service_files: bool,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            service_files: true,
        }
    }
}

/// The whole bundle description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleConfig {
    pub project: ProjectConfig,

    #[serde(default)]
    pub inputs: InputsConfig,

    #[serde(default)]
    pub output: OutputConfig,

    #[serde(default)]
    pub relocate: Vec<RelocationRule>,

    #[serde(default)]
    pub shared_contract: SharedContract,

    #[serde(default)]
    pub isolation: IsolationConfig,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub manifest: ManifestSpec,

    /// Directory relative paths are resolved against
    #[serde(skip)]
    base_dir: PathBuf,
}

impl BundleConfig {
    /// Load and validate a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        Ok(Self::parse(&content)?.with_base_dir(base_dir))
    }

    /// Parse and validate config text; paths resolve against the current directory
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: BundleConfig =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.shared_contract = std::mem::take(&mut config.shared_contract).validated()?;
        config.base_dir = PathBuf::from(".");
        config.validate()?;
        Ok(config)
    }

    /// Check required fields and the sections that can be checked without I/O
    pub fn validate(&self) -> Result<()> {
        let project = &self.project;
        check_file_name_part("project.name", &project.name)?;
        check_file_name_part("project.version", &project.version)?;
        if project.upstream_version.is_empty() {
            return Err(Error::Config("project.upstream_version is required".to_string()));
        }
        check_file_name_part("output.classifier", &self.output.classifier)?;
        if self.inputs.bootstrap.is_empty()
            && self.inputs.agent_libs.is_empty()
            && self.inputs.upstream.is_empty()
        {
            return Err(Error::Config("no inputs configured".to_string()));
        }

        self.manifest.validate()?;
        NamespacePlan::new(&self.isolation)?;
        Ok(())
    }

    pub fn with_base_dir(mut self, dir: &Path) -> Self {
        self.base_dir = dir.to_path_buf();
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.project.version = version.into();
    }

    pub fn set_upstream_version(&mut self, version: impl Into<String>) {
        self.project.upstream_version = version.into();
    }

    pub fn set_output_dir(&mut self, dir: impl Into<PathBuf>) {
        self.output.dir = dir.into();
    }

    /// Output directory resolved against the config location
    pub fn output_dir(&self) -> PathBuf {
        if self.output.dir.is_absolute() {
            self.output.dir.clone()
        } else {
            self.base_dir.join(&self.output.dir)
        }
    }

    /// `<dir>/<name>-<version>-<classifier>.jar`
    pub fn classifier_jar_path(&self) -> PathBuf {
        self.output_dir().join(format!(
            "{}-{}-{}.jar",
            self.project.name, self.project.version, self.output.classifier
        ))
    }

    /// `<dir>/<name>-<version>.jar`
    pub fn primary_jar_path(&self) -> PathBuf {
        self.output_dir()
            .join(format!("{}-{}.jar", self.project.name, self.project.version))
    }

    pub fn implementation_version(&self) -> String {
        manifest::implementation_version(&self.project.version, &self.project.upstream_version)
    }
}

/// Output jar names are `<name>-<version>[-<classifier>].jar`; each part must
/// stay inside the output directory
fn check_file_name_part(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Config(format!("{} is required", field)));
    }
    if value.contains(['/', '\\']) || value.contains("..") || value.chars().any(char::is_control) {
        return Err(Error::Config(format!(
            "{} '{}' must be usable as part of a file name",
            field,
            value.escape_default()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const MINIMAL: &str = r#"
[project]
name = "splunk-otel-javaagent"
version = "1.2.0"
upstream_version = "1.15.0-alpha"

[inputs]
upstream = ["libs/opentelemetry-javaagent.jar"]
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config = BundleConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.output.classifier, "all");
        assert_eq!(config.output.dir, PathBuf::from("build/libs"));
        assert!(config.merge.service_files);
        assert!(config.relocate.is_empty());
        assert_eq!(config.shared_contract.libraries().len(), 4);
        assert_eq!(config.shared_contract.internal_prefixes().len(), 4);
        assert_eq!(config.isolation.prefix, "inst");
        assert_eq!(config.manifest.vendor, "Splunk");
        assert_eq!(config.implementation_version(), "1.2.0-otel-1.15.0-alpha");
    }

    #[test]
    fn test_full_config() {
        let content = r#"
[project]
name = "agent"
version = "2.0.0"
upstream_version = "2.1.0"

[inputs]
bootstrap = ["bootstrap"]
agent_libs = ["libs/a.jar", "libs/b.jar"]
upstream = ["upstream.jar"]

[output]
dir = "dist"
classifier = "bundle"

[[relocate]]
pattern = "okhttp3"
replacement = "com.example.shaded.okhttp3"
exclude = ["okhttp3.internal.publicsuffix"]

[[shared_contract.library]]
coordinate = "org.slf4j:slf4j-api"
packages = ["org.slf4j"]

[isolation]
prefix = "private"

[[isolation.rename]]
pattern = "^NOTICE$"
replacement = "NOTICE.renamed"

[merge]
service_files = false

[manifest]
vendor = "Example"

[[manifest.extra]]
name = "Built-By"
value = "ci"
"#;
        let config = BundleConfig::parse(content).unwrap();
        assert_eq!(config.inputs.agent_libs.len(), 2);
        assert_eq!(config.relocate[0].exclude, vec!["okhttp3.internal.publicsuffix"]);
        assert_eq!(config.shared_contract.libraries().len(), 1);
        assert_eq!(config.isolation.prefix, "private");
        assert_eq!(config.isolation.class_extension, "classdata");
        assert_eq!(config.isolation.rename.len(), 1);
        assert!(!config.merge.service_files);
        assert_eq!(config.manifest.vendor, "Example");
        assert_eq!(config.manifest.extra[0].name, "Built-By");
        assert_eq!(
            config.classifier_jar_path(),
            PathBuf::from("./dist/agent-2.0.0-bundle.jar")
        );
        assert_eq!(config.primary_jar_path(), PathBuf::from("./dist/agent-2.0.0.jar"));
    }

    #[test]
    fn test_missing_required_fields() {
        let no_version = MINIMAL.replace("version = \"1.2.0\"\n", "version = \"\"\n");
        assert!(matches!(
            BundleConfig::parse(&no_version),
            Err(Error::Config(_))
        ));

        let no_inputs = r#"
[project]
name = "agent"
version = "1"
upstream_version = "2"
"#;
        assert!(BundleConfig::parse(no_inputs).is_err());

        assert!(BundleConfig::parse("not toml [").is_err());
    }

    #[test]
    fn test_output_name_parts_stay_in_output_dir() {
        for version in ["../../escape", "1.0/evil", "..", "1.0\\x", "1.0\nMain-Class: x"] {
            let content = MINIMAL.replace("version = \"1.2.0\"", &format!("version = {:?}", version));
            let err = BundleConfig::parse(&content).unwrap_err();
            assert!(err.to_string().contains("project.version"), "{err}");
        }

        let bad_name = MINIMAL.replace("splunk-otel-javaagent", "../agent");
        assert!(matches!(BundleConfig::parse(&bad_name), Err(Error::Config(_))));

        let mut config = BundleConfig::parse(MINIMAL).unwrap();
        config.set_version("../../../tmp/agent");
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        config.set_version("1.2.0-SNAPSHOT");
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_isolation_rejected() {
        let content = format!("{}\n[isolation]\nclass_extension = \"class\"\n", MINIMAL);
        assert!(BundleConfig::parse(&content).is_err());
    }

    #[test]
    fn test_from_file_resolves_against_config_dir() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("bundle.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        let mut config = BundleConfig::from_file(&path).unwrap();
        assert_eq!(config.base_dir(), temp.path());
        assert_eq!(config.output_dir(), temp.path().join("build/libs"));

        config.set_version("9.9.9");
        config.set_output_dir(temp.path().join("out"));
        assert_eq!(
            config.primary_jar_path(),
            temp.path().join("out/splunk-otel-javaagent-9.9.9.jar")
        );
    }

    #[test]
    fn test_demo_config_parses() {
        let config = BundleConfig::parse(include_str!("../demos/bundle.toml")).unwrap();
        assert_eq!(config.relocate.len(), 3);
        assert_eq!(config.shared_contract, SharedContract::default());
        assert_eq!(config.manifest.extra.len(), 1);
        assert_eq!(config.implementation_version(), "1.2.0-otel-1.15.0-alpha");
    }
}
