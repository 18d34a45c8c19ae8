// src/relocate/services.rs

//! `META-INF/services` provider descriptors
//!
//! A descriptor is named after the service interface and lists one
//! implementation class per line, so both the file name and its lines
//! carry dotted class names that relocation has to follow.

use super::rules::RelocationMap;

pub const SERVICES_PREFIX: &str = "META-INF/services/";

/// Whether a path is a provider descriptor (directly under `META-INF/services/`)
pub fn is_service_descriptor(path: &str) -> bool {
    path.strip_prefix(SERVICES_PREFIX)
        .is_some_and(|name| !name.is_empty() && !name.contains('/'))
}

/// Relocate the interface name in a descriptor path
pub fn relocate_descriptor_path(map: &RelocationMap, path: &str) -> Option<String> {
    let interface = path.strip_prefix(SERVICES_PREFIX)?;
    map.map_dotted_name(interface)
        .map(|mapped| format!("{}{}", SERVICES_PREFIX, mapped))
}

/// Relocate the implementation names listed in a descriptor
///
/// Comments and blank lines are kept; a relocated line loses its trailing
/// comment. Returns `None` when nothing changed or the file is not UTF-8.
pub fn relocate_descriptor(map: &RelocationMap, content: &[u8]) -> Option<Vec<u8>> {
    let text = std::str::from_utf8(content).ok()?;
    let mut changed = false;
    let mut out = String::with_capacity(text.len() + 64);

    for line in text.split_inclusive('\n') {
        let body = line.split('#').next().unwrap_or("").trim();
        match map.map_dotted_name(body) {
            Some(mapped) if !body.is_empty() => {
                changed = true;
                out.push_str(&mapped);
                out.push('\n');
            }
            _ => out.push_str(line),
        }
    }

    changed.then(|| out.into_bytes())
}

/// Append the providers of `addition` that `existing` does not list yet
pub fn merge_descriptors(existing: &[u8], addition: &[u8]) -> Vec<u8> {
    let existing_text = String::from_utf8_lossy(existing);
    let addition_text = String::from_utf8_lossy(addition);

    let provider = |line: &str| line.split('#').next().unwrap_or("").trim().to_string();
    let known: std::collections::HashSet<String> = existing_text
        .lines()
        .map(provider)
        .filter(|p| !p.is_empty())
        .collect();

    let mut out = existing_text.into_owned();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    let mut added = std::collections::HashSet::new();
    for line in addition_text.lines() {
        let name = provider(line);
        if name.is_empty() || known.contains(&name) || !added.insert(name.clone()) {
            continue;
        }
        out.push_str(&name);
        out.push('\n');
    }
    out.into_bytes()
}
