//! Dependency manifest discovery.
//!
//! Looks for well-known manifests at the repository root and extracts the
//! declared dependencies from each one.

use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Parsed manifests keyed by file name (e.g. `Cargo.toml`).
pub type Dependencies = BTreeMap<String, Manifest>;

static ARTIFACT_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<artifactId>(.*?)</artifactId>").expect("artifactId pattern is valid")
});

/// Dependencies declared by one manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Manifest {
    /// `package.json`: dependency maps plus scripts
    Npm {
        dependencies: BTreeMap<String, serde_json::Value>,
        #[serde(rename = "devDependencies")]
        dev_dependencies: BTreeMap<String, serde_json::Value>,
        scripts: BTreeMap<String, serde_json::Value>,
    },

    /// Every other manifest: a flat list of dependency names/specs
    List(Vec<String>),
}

impl Manifest {
    /// Number of declared dependencies (scripts excluded).
    pub fn len(&self) -> usize {
        match self {
            Self::Npm { dependencies, dev_dependencies, .. } => {
                dependencies.len() + dev_dependencies.len()
            }
            Self::List(items) => items.len(),
        }
    }

    /// Whether the manifest declares nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Npm { dependencies, dev_dependencies, scripts } => {
                dependencies.is_empty() && dev_dependencies.is_empty() && scripts.is_empty()
            }
            Self::List(items) => items.is_empty(),
        }
    }
}

type Parser = fn(&str) -> anyhow::Result<Manifest>;

/// Supported manifests, in lookup order.
const MANIFESTS: [(&str, Parser); 5] = [
    ("package.json", parse_package_json),
    ("requirements.txt", parse_requirements_txt),
    ("pom.xml", parse_pom_xml),
    ("Cargo.toml", parse_cargo_toml),
    ("go.mod", parse_go_mod),
];

/// Find and parse dependency manifests at `root`.
///
/// Manifests that fail to parse or declare nothing are left out.
pub fn find_dependencies(root: &Path) -> Dependencies {
    let mut found = Dependencies::new();

    for (file_name, parse) in MANIFESTS {
        let path = root.join(file_name);
        if !path.is_file() {
            continue;
        }

        let parsed = std::fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|content| parse(&content));

        match parsed {
            Ok(manifest) if !manifest.is_empty() => {
                tracing::debug!(manifest = file_name, count = manifest.len(), "Parsed manifest");
                found.insert(file_name.to_string(), manifest);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(manifest = file_name, error = %e, "Failed to parse manifest");
            }
        }
    }

    found
}

#[derive(Deserialize)]
struct PackageJson {
    #[serde(default)]
    dependencies: BTreeMap<String, serde_json::Value>,
    #[serde(default, rename = "devDependencies")]
    dev_dependencies: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    scripts: BTreeMap<String, serde_json::Value>,
}

fn parse_package_json(content: &str) -> anyhow::Result<Manifest> {
    let package: PackageJson = serde_json::from_str(content)?;
    Ok(Manifest::Npm {
        dependencies: package.dependencies,
        dev_dependencies: package.dev_dependencies,
        scripts: package.scripts,
    })
}

fn parse_requirements_txt(content: &str) -> anyhow::Result<Manifest> {
    Ok(Manifest::List(
        content
            .lines()
            .filter(|line| !line.starts_with('#'))
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect(),
    ))
}

fn parse_pom_xml(content: &str) -> anyhow::Result<Manifest> {
    Ok(Manifest::List(
        ARTIFACT_ID.captures_iter(content).map(|caps| caps[1].trim().to_string()).collect(),
    ))
}

fn parse_cargo_toml(content: &str) -> anyhow::Result<Manifest> {
    let table: toml::Table = toml::from_str(content)?;
    let names = table
        .get("dependencies")
        .and_then(toml::Value::as_table)
        .map(|deps| deps.keys().cloned().collect())
        .unwrap_or_default();
    Ok(Manifest::List(names))
}

fn parse_go_mod(content: &str) -> anyhow::Result<Manifest> {
    let mut modules = Vec::new();
    let mut in_block = false;

    for line in content.lines().map(str::trim) {
        if in_block {
            if line == ")" {
                in_block = false;
            } else if let Some(module) = line.split_whitespace().next() {
                if !module.starts_with("//") {
                    modules.push(module.to_string());
                }
            }
        } else if line.starts_with("require (") || line == "require(" {
            in_block = true;
        } else if let Some(rest) = line.strip_prefix("require ") {
            if let Some(module) = rest.split_whitespace().next() {
                modules.push(module.to_string());
            }
        }
    }

    Ok(Manifest::List(modules))
}
