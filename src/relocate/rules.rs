// src/relocate/rules.rs

//! Relocation rules and the validated relocation map

use crate::error::{Error, Result};
use crate::shared::SharedContract;
use serde::{Deserialize, Serialize};

/// A single `pattern -> replacement` package relocation, as configured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelocationRule {
    /// Dotted package prefix to move, e.g. `okhttp3`
    pub pattern: String,
    /// Dotted package prefix to move it to
    pub replacement: String,
    /// Dotted package or class-name prefixes left in place
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl RelocationRule {
    pub fn new(pattern: &str, replacement: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            replacement: replacement.to_string(),
            exclude: Vec::new(),
        }
    }

    pub fn with_exclude(mut self, prefix: &str) -> Self {
        self.exclude.push(prefix.to_string());
        self
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    pattern: String,
    replacement: String,
    /// `a/b`
    slash_package: String,
    /// `a/b/`
    slash_pattern: String,
    slash_replacement: String,
    dot_pattern: String,
    dot_replacement: String,
    slash_excludes: Vec<String>,
}

impl CompiledRule {
    fn compile(rule: &RelocationRule) -> Result<Self> {
        validate_package(&rule.pattern)?;
        validate_package(&rule.replacement)?;
        if rule.pattern == rule.replacement {
            return Err(Error::Config(format!(
                "relocation of '{}' onto itself",
                rule.pattern
            )));
        }

        let slash_package = rule.pattern.replace('.', "/");
        let slash_replacement_package = rule.replacement.replace('.', "/");
        Ok(Self {
            pattern: rule.pattern.clone(),
            replacement: rule.replacement.clone(),
            slash_pattern: format!("{}/", slash_package),
            slash_replacement: format!("{}/", slash_replacement_package),
            dot_pattern: format!("{}.", rule.pattern),
            dot_replacement: format!("{}.", rule.replacement),
            slash_package,
            slash_excludes: rule.exclude.iter().map(|e| e.replace('.', "/")).collect(),
        })
    }

    fn is_excluded(&self, internal_name: &str) -> bool {
        self.slash_excludes
            .iter()
            .any(|e| internal_name.starts_with(e.as_str()))
    }
}

fn validate_package(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.split('.').all(|segment| {
            !segment.is_empty()
                && !segment.starts_with(|c: char| c.is_ascii_digit())
                && segment
                    .chars()
                    .all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        });
    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "'{}' is not a valid dotted package name",
            name
        )))
    }
}

/// Whether `inner` equals `outer` or lies inside it, on a package boundary
fn within(inner: &str, outer: &str) -> bool {
    inner == outer
        || inner
            .strip_prefix(outer)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// Whether names relocated by `first` would be relocated again by `second`
///
/// `first`'s output is matched by `second` when the target lies inside
/// `second`'s pattern, unless `first`'s own, longer pattern still claims
/// it (as in `okio -> okio.shaded`), or when `second`'s pattern lies inside
/// the target.
fn feeds_into(first: &CompiledRule, second: &CompiledRule) -> bool {
    let target = first.slash_replacement.trim_end_matches('/');
    if within(&second.slash_package, target) {
        return true;
    }
    within(target, &second.slash_package)
        && !(within(target, &first.slash_package)
            && first.slash_package.len() > second.slash_package.len())
}

/// A validated, injective set of relocation rules
///
/// Names inside the shared contract are never relocated, whatever the
/// rules say.
#[derive(Debug, Clone)]
pub struct RelocationMap {
    /// Longest pattern first, so nested packages win over their parents
    rules: Vec<CompiledRule>,
    shared: SharedContract,
}

impl RelocationMap {
    /// Validate and compile a set of rules
    ///
    /// Fails with [`Error::AmbiguousRelocation`] when two rules share a
    /// pattern, when one replacement contains another (two different
    /// source names could then land on the same target), or when one rule's
    /// output would be picked up again by another rule, and with
    /// [`Error::SharedContract`] when a rule would move a shared package
    /// or move something into one.
    pub fn new(rules: &[RelocationRule], shared: SharedContract) -> Result<Self> {
        let mut compiled = rules
            .iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>>>()?;

        for (i, a) in compiled.iter().enumerate() {
            for b in &compiled[i + 1..] {
                if a.slash_package == b.slash_package {
                    return Err(Error::AmbiguousRelocation(format!(
                        "package '{}' is relocated twice (to '{}' and '{}')",
                        a.pattern, a.replacement, b.replacement
                    )));
                }
                let a_target = a.slash_replacement.trim_end_matches('/');
                let b_target = b.slash_replacement.trim_end_matches('/');
                if within(a_target, b_target) || within(b_target, a_target) {
                    return Err(Error::AmbiguousRelocation(format!(
                        "'{}' -> '{}' and '{}' -> '{}' have overlapping targets",
                        a.pattern, a.replacement, b.pattern, b.replacement
                    )));
                }
                for (first, second) in [(a, b), (b, a)] {
                    if feeds_into(first, second) {
                        return Err(Error::AmbiguousRelocation(format!(
                            "'{}' -> '{}' produces names that '{}' -> '{}' relocates again",
                            first.pattern, first.replacement, second.pattern, second.replacement
                        )));
                    }
                }
            }
        }

        for rule in &compiled {
            let target = rule.slash_replacement.trim_end_matches('/');
            if within(&rule.slash_package, target) {
                return Err(Error::AmbiguousRelocation(format!(
                    "'{}' -> '{}' moves a package into its own parent",
                    rule.pattern, rule.replacement
                )));
            }
        }

        for rule in &compiled {
            if shared.covers_internal_name(&rule.slash_pattern) {
                return Err(Error::SharedContract(format!(
                    "relocation of '{}' would move a package shared with the bootstrap tier",
                    rule.pattern
                )));
            }
            if shared.covers_internal_name(&rule.slash_replacement) {
                return Err(Error::SharedContract(format!(
                    "relocation target '{}' lies inside a package shared with the bootstrap tier",
                    rule.replacement
                )));
            }
        }

        compiled.sort_by(|a, b| b.slash_package.len().cmp(&a.slash_package.len()));
        Ok(Self {
            rules: compiled,
            shared,
        })
    }

    /// A map that relocates nothing
    pub fn empty(shared: SharedContract) -> Self {
        Self {
            rules: Vec::new(),
            shared,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn shared(&self) -> &SharedContract {
        &self.shared
    }

    /// The configured rules as `(pattern, replacement)` pairs
    pub fn rules(&self) -> impl Iterator<Item = (&str, &str)> {
        self.rules
            .iter()
            .map(|r| (r.pattern.as_str(), r.replacement.as_str()))
    }

    /// Relocate an internal (slash-separated) name or path
    ///
    /// Returns `None` when the name is unaffected: outside every pattern,
    /// excluded, shared, or already under the matching replacement.
    pub fn map_internal_name(&self, name: &str) -> Option<String> {
        if self.shared.covers_internal_name(name) {
            return None;
        }
        for rule in &self.rules {
            if name == rule.slash_package {
                return Some(rule.slash_replacement.trim_end_matches('/').to_string());
            }
            let Some(rest) = name.strip_prefix(rule.slash_pattern.as_str()) else {
                continue;
            };
            if name.starts_with(rule.slash_replacement.as_str()) || rule.is_excluded(name) {
                return None;
            }
            return Some(format!("{}{}", rule.slash_replacement, rest));
        }
        None
    }

    /// Relocate a dotted class or package name
    pub fn map_dotted_name(&self, name: &str) -> Option<String> {
        if name.contains('/') {
            return None;
        }
        if self.shared.covers_class_name(name) {
            return None;
        }
        for rule in &self.rules {
            if name == rule.pattern {
                return Some(rule.replacement.clone());
            }
            let Some(rest) = name.strip_prefix(rule.dot_pattern.as_str()) else {
                continue;
            };
            if name.starts_with(rule.dot_replacement.as_str())
                || rule.is_excluded(&name.replace('.', "/"))
            {
                return None;
            }
            return Some(format!("{}{}", rule.dot_replacement, rest));
        }
        None
    }
}
