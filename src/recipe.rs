// Purpose: Install recipe definitions and their bound instances.

use std::fmt;
use std::str::FromStr;

use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::errors::{Error, Result};
use crate::install::PkgManager;

/// Marker a recipe must place in its instructions when it declares system
/// package dependencies. It is replaced with the synthesized install command
/// when the recipe is merged into a renderer.
pub const DEPENDENCY_MARKER: &str = "self.install_dependencies";

/// Binding names the renderer injects into every template namespace. Recipe
/// arguments may not shadow them.
const RESERVED_BINDINGS: &[&str] = &[
    "install_dependencies",
    "binaries_url",
    "urls",
    "env",
    "instructions",
    "arguments",
    "dependencies",
];

pub(crate) fn dependency_marker_re() -> Regex {
    Regex::new(r"\{\{\s*self\.install_dependencies\s*\}\}").unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMethod {
    Binaries,
    Source,
}

impl fmt::Display for InstallMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallMethod::Binaries => f.write_str("binaries"),
            InstallMethod::Source => f.write_str("source"),
        }
    }
}

impl FromStr for InstallMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binaries" => Ok(InstallMethod::Binaries),
            "source" => Ok(InstallMethod::Source),
            other => Err(Error::Configuration(format!(
                "installation method must be 'binaries' or 'source' but got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Arguments {
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub optional: Vec<String>,
}

/// System package dependencies, keyed by package manager. The `debs` list
/// holds URLs of Debian packages installed with dpkg on apt systems.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dependencies {
    #[serde(default)]
    pub apt: Vec<String>,
    #[serde(default)]
    pub debs: Vec<String>,
    #[serde(default)]
    pub yum: Vec<String>,
}

impl Dependencies {
    pub fn for_manager(&self, pkg_manager: PkgManager) -> &[String] {
        match pkg_manager {
            PkgManager::Apt => &self.apt,
            PkgManager::Dpkg => &self.debs,
            PkgManager::Yum => &self.yum,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.apt.is_empty() && self.debs.is_empty() && self.yum.is_empty()
    }
}

/// One installation method of a recipe: a templated instruction body plus the
/// environment, arguments and dependencies it needs. Only the binaries method
/// carries `urls` (version to download URL).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MethodBlock {
    pub instructions: String,
    #[serde(default)]
    pub env: Map<String, Value>,
    #[serde(default)]
    pub arguments: Arguments,
    #[serde(default)]
    pub dependencies: Dependencies,
    #[serde(default)]
    pub urls: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Recipe {
    pub name: String,
    #[serde(default)]
    pub binaries: Option<MethodBlock>,
    #[serde(default)]
    pub source: Option<MethodBlock>,
}

impl Recipe {
    /// Structural validation, run once when the recipe enters a registry.
    pub fn validate(&self) -> Result<()> {
        if self.binaries.is_none() && self.source.is_none() {
            return Err(Error::TemplateDefinition(format!(
                "template '{}' must define at least one of 'binaries' or 'source'",
                self.name
            )));
        }
        if let Some(block) = &self.binaries {
            match &block.urls {
                Some(urls) if !urls.is_empty() => {}
                _ => {
                    return Err(Error::TemplateDefinition(format!(
                        "template '{}' defines a 'binaries' method without 'urls'",
                        self.name
                    )))
                }
            }
            self.check_marker(InstallMethod::Binaries, block)?;
        }
        if let Some(block) = &self.source {
            if block.urls.is_some() {
                return Err(Error::TemplateDefinition(format!(
                    "template '{}' must not define 'urls' in its 'source' method",
                    self.name
                )));
            }
            self.check_marker(InstallMethod::Source, block)?;
        }
        Ok(())
    }

    // Validation and merge-time expansion must agree on what a marker is,
    // so this uses the same pattern the renderer substitutes on.
    fn check_marker(&self, method: InstallMethod, block: &MethodBlock) -> Result<()> {
        if !block.dependencies.is_empty() && !dependency_marker_re().is_match(&block.instructions) {
            return Err(Error::TemplateDefinition(format!(
                "dependencies are declared but never installed in '{}.{}.instructions'. \
                 Add '{{{{ {} }}}}' to the instructions.",
                self.name, method, DEPENDENCY_MARKER
            )));
        }
        Ok(())
    }

    pub fn method(&self, method: InstallMethod) -> Option<&MethodBlock> {
        match method {
            InstallMethod::Binaries => self.binaries.as_ref(),
            InstallMethod::Source => self.source.as_ref(),
        }
    }

    /// Prefer binaries when both methods are defined.
    pub fn default_method(&self) -> InstallMethod {
        if self.binaries.is_some() {
            InstallMethod::Binaries
        } else {
            InstallMethod::Source
        }
    }
}

pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A recipe method bound to concrete keyword values. Validation of the
/// keyword-argument contract happens eagerly, at construction.
#[derive(Debug, Clone)]
pub struct TemplateInstance {
    name: String,
    method: InstallMethod,
    block: MethodBlock,
    kwds: Map<String, Value>,
}

impl TemplateInstance {
    pub fn new(
        recipe: &Recipe,
        method: InstallMethod,
        kwds: Map<String, Value>,
    ) -> Result<Self> {
        let block = recipe.method(method).ok_or_else(|| {
            Error::Configuration(format!(
                "installation method '{}' is not defined for template '{}'",
                method, recipe.name
            ))
        })?;

        // Non-string values are coerced to strings before they are validated
        // or bound.
        let mut coerced = Map::new();
        for (key, value) in kwds {
            coerced.insert(key, Value::String(value_to_string(&value)));
        }

        let instance = Self {
            name: recipe.name.clone(),
            method,
            block: block.clone(),
            kwds: coerced,
        };
        instance.validate_kwds()?;
        Ok(instance)
    }

    fn validate_kwds(&self) -> Result<()> {
        let args = &self.block.arguments;

        let missing: Vec<&str> = args
            .required
            .iter()
            .filter(|name| !self.kwds.contains_key(name.as_str()))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(Error::Argument(format!(
                "missing required arguments: '{}'.",
                missing.join("', '")
            )));
        }

        for name in self.kwds.keys() {
            if RESERVED_BINDINGS.contains(&name.as_str()) {
                return Err(Error::Argument(format!(
                    "argument name '{}' is reserved and cannot be bound",
                    name
                )));
            }
        }

        let unknown: Vec<&str> = self
            .kwds
            .keys()
            .filter(|name| !args.required.contains(name) && !args.optional.contains(name))
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            return Err(Error::Argument(format!(
                "keyword arguments are not specified in the template: '{}'.",
                unknown.join("', '")
            )));
        }

        // Builds from source can target any version, so only the binaries
        // method constrains the bound value.
        if args.required.iter().any(|a| a == "version") && self.method == InstallMethod::Binaries {
            let version = self
                .kwds
                .get("version")
                .and_then(Value::as_str)
                .unwrap_or_default();
            let versions = self.versions();
            if !versions.iter().any(|v| v == &version) {
                return Err(Error::Argument(format!(
                    "unknown version '{}'. Allowed versions are '{}'.",
                    version,
                    versions.join("', '")
                )));
            }
        }

        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn method(&self) -> InstallMethod {
        self.method
    }

    /// The raw, still-templated instruction body.
    pub fn instructions(&self) -> &str {
        &self.block.instructions
    }

    /// Environment variables declared by the definition, in declared order.
    /// Values may still contain template expressions.
    pub fn env(&self) -> Vec<(String, String)> {
        self.block
            .env
            .iter()
            .map(|(k, v)| (k.clone(), value_to_string(v)))
            .collect()
    }

    /// Bound keyword values, exposed as an explicit lookup rather than as
    /// instance fields.
    pub fn kwds(&self) -> &Map<String, Value> {
        &self.kwds
    }

    pub fn dependencies(&self, pkg_manager: PkgManager) -> &[String] {
        self.block.dependencies.for_manager(pkg_manager)
    }

    pub fn deb_urls(&self) -> &[String] {
        &self.block.dependencies.debs
    }

    /// Valid versions for the binaries method, sorted. Empty means the method
    /// accepts any version (source builds).
    pub fn versions(&self) -> Vec<&str> {
        match (&self.method, &self.block.urls) {
            (InstallMethod::Binaries, Some(urls)) => {
                let mut versions: Vec<&str> = urls.keys().map(String::as_str).collect();
                versions.sort_unstable();
                versions
            }
            _ => Vec::new(),
        }
    }

    /// The download URL for the bound version, when this is a binaries
    /// instance with a bound `version`.
    pub fn binaries_url(&self) -> Option<String> {
        let urls = self.block.urls.as_ref()?;
        let version = self.kwds.get("version")?.as_str()?;
        urls.get(version).map(value_to_string)
    }
}
