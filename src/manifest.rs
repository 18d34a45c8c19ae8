// src/manifest.rs
//! Bundle manifest synthesis
//!
//! Builds the `META-INF/MANIFEST.MF` attributes of the agent bundle and
//! renders them in jar manifest syntax (CRLF line endings, 72-byte lines
//! with single-space continuations).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

pub const MAIN_CLASS: &str = "Main-Class";
pub const AGENT_CLASS: &str = "Agent-Class";
pub const PREMAIN_CLASS: &str = "Premain-Class";
pub const CAN_REDEFINE_CLASSES: &str = "Can-Redefine-Classes";
pub const CAN_RETRANSFORM_CLASSES: &str = "Can-Retransform-Classes";
pub const IMPLEMENTATION_VENDOR: &str = "Implementation-Vendor";
pub const IMPLEMENTATION_VERSION: &str = "Implementation-Version";

const MANIFEST_VERSION: &str = "Manifest-Version";
const MAX_LINE_BYTES: usize = 72;

/// Launcher entry point used when the bundle is run with `java -jar`
pub const DEFAULT_MAIN_CLASS: &str = "io.opentelemetry.javaagent.OpenTelemetryAgent";
/// Agent entry point used for both `-javaagent` and dynamic attach
pub const DEFAULT_AGENT_CLASS: &str = "com.splunk.opentelemetry.javaagent.SplunkAgent";
pub const DEFAULT_VENDOR: &str = "Splunk";

/// A manifest attribute value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    Text(String),
    Flag(bool),
}

impl AttributeValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn render(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Flag(b) => b.to_string(),
        }
    }
}

/// An extra attribute configured by the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraAttribute {
    pub name: String,
    pub value: String,
}

/// Inputs to the manifest that do not change between builds
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestSpec {
    #[serde(default = "default_main_class")]
    pub main_class: String,

    /// Written to both `Agent-Class` and `Premain-Class`
    #[serde(default = "default_agent_class")]
    pub agent_class: String,

    #[serde(default = "default_vendor")]
    pub vendor: String,

    /// Additional attributes, appended in order
    #[serde(default)]
    pub extra: Vec<ExtraAttribute>,
}

fn default_main_class() -> String {
    DEFAULT_MAIN_CLASS.to_string()
}

fn default_agent_class() -> String {
    DEFAULT_AGENT_CLASS.to_string()
}

fn default_vendor() -> String {
    DEFAULT_VENDOR.to_string()
}

impl Default for ManifestSpec {
    fn default() -> Self {
        Self {
            main_class: default_main_class(),
            agent_class: default_agent_class(),
            vendor: default_vendor(),
            extra: Vec::new(),
        }
    }
}

impl ManifestSpec {
    pub fn validate(&self) -> Result<()> {
        for class in [&self.main_class, &self.agent_class] {
            if class.is_empty() || class.contains('/') || class.ends_with(".class") {
                return Err(Error::Config(format!(
                    "manifest entry point '{}' must be a dotted class name",
                    class
                )));
            }
        }
        for extra in &self.extra {
            validate_name(&extra.name)?;
            validate_value(&extra.name, &extra.value)?;
        }
        Ok(())
    }
}

/// The composite bundle version: `<version>-otel-<upstream version>`
pub fn implementation_version(version: &str, upstream_version: &str) -> String {
    format!("{}-otel-{}", version, upstream_version)
}

/// Ordered manifest attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManifestAttributes {
    attributes: Vec<(String, AttributeValue)>,
}

impl ManifestAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synthesize the bundle manifest
    pub fn for_bundle(spec: &ManifestSpec, version: &str, upstream_version: &str) -> Self {
        let mut manifest = Self::new();
        manifest.insert(MAIN_CLASS, AttributeValue::text(&spec.main_class));
        manifest.insert(AGENT_CLASS, AttributeValue::text(&spec.agent_class));
        manifest.insert(PREMAIN_CLASS, AttributeValue::text(&spec.agent_class));
        manifest.insert(CAN_REDEFINE_CLASSES, AttributeValue::Flag(true));
        manifest.insert(CAN_RETRANSFORM_CLASSES, AttributeValue::Flag(true));
        manifest.insert(IMPLEMENTATION_VENDOR, AttributeValue::text(&spec.vendor));
        manifest.insert(
            IMPLEMENTATION_VERSION,
            AttributeValue::Text(implementation_version(version, upstream_version)),
        );
        for extra in &spec.extra {
            manifest.insert(&extra.name, AttributeValue::text(&extra.value));
        }
        manifest
    }

    /// Set an attribute, keeping its original position if it already exists
    pub fn insert(&mut self, name: &str, value: AttributeValue) {
        if let Some(slot) = self.attributes.iter_mut().find(|(n, _)| n == name) {
            slot.1 = value;
        } else {
            self.attributes.push((name.to_string(), value));
        }
    }

    pub fn get(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// Rendered value of an attribute
    pub fn value(&self, name: &str) -> Option<String> {
        self.get(name).map(AttributeValue::render)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.attributes.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    /// Render as MANIFEST.MF bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = String::new();
        if self.get(MANIFEST_VERSION).is_none() {
            write_attribute(&mut out, MANIFEST_VERSION, "1.0");
        }
        for (name, value) in &self.attributes {
            write_attribute(&mut out, name, &value.render());
        }
        out.push_str("\r\n");
        out.into_bytes()
    }

    /// Parse the main section of a MANIFEST.MF
    ///
    /// `true`/`false` values are read back as flags.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| Error::Config(format!("manifest is not valid UTF-8: {}", e)))?;

        let mut lines: Vec<String> = Vec::new();
        for line in text.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                // End of the main section
                if !lines.is_empty() {
                    break;
                }
                continue;
            }
            if let Some(continuation) = line.strip_prefix(' ') {
                match lines.last_mut() {
                    Some(last) => last.push_str(continuation),
                    None => {
                        return Err(Error::Config(
                            "manifest starts with a continuation line".to_string(),
                        ));
                    }
                }
            } else {
                lines.push(line.to_string());
            }
        }

        let mut manifest = Self::new();
        for line in lines {
            let (name, value) = line
                .split_once(": ")
                .ok_or_else(|| Error::Config(format!("malformed manifest line '{}'", line)))?;
            let value = match value {
                "true" => AttributeValue::Flag(true),
                "false" => AttributeValue::Flag(false),
                other => AttributeValue::text(other),
            };
            manifest.insert(name, value);
        }
        Ok(manifest)
    }
}

fn write_attribute(out: &mut String, name: &str, value: &str) {
    let line = format!("{}: {}", name, value);
    let mut rest = line.as_str();
    let mut limit = MAX_LINE_BYTES;
    loop {
        if rest.len() <= limit {
            out.push_str(rest);
            out.push_str("\r\n");
            return;
        }
        let mut split = limit;
        while !rest.is_char_boundary(split) {
            split -= 1;
        }
        out.push_str(&rest[..split]);
        out.push_str("\r\n ");
        rest = &rest[split..];
        // Continuation lines spend one byte on the leading space
        limit = MAX_LINE_BYTES - 1;
    }
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.len() <= 70
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!("invalid manifest attribute name '{}'", name)))
    }
}

fn validate_value(name: &str, value: &str) -> Result<()> {
    if value.contains(['\r', '\n', '\0']) {
        return Err(Error::Config(format!(
            "manifest attribute '{}' contains a line break",
            name
        )));
    }
    Ok(())
}
