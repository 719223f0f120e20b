// src/recipe/parser.rs

//! Recipe loading and validation
//!
//! Loading happens in three passes so every failure names the offending
//! field: a structural pass over the untyped document, typed
//! deserialization, then semantic validation.

use crate::error::{Error, Result};
use crate::hash::Hash;
use crate::recipe::format::{Architecture, PackageType, Recipe, TemplateKind};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Recipe document syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecipeFormat {
    Json,
    Yaml,
}

impl RecipeFormat {
    /// Pick a format from the file extension, falling back to sniffing
    pub fn detect(path: &Path, content: &str) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::Json,
            Some("yaml") | Some("yml") => Self::Yaml,
            _ if content.trim_start().starts_with('{') => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// A recipe together with where it came from
#[derive(Debug, Clone)]
pub struct LoadedRecipe {
    pub recipe: Recipe,
    /// Directory containing the recipe file
    pub base_dir: PathBuf,
    /// Non-fatal findings from validation
    pub warnings: Vec<String>,
}

impl LoadedRecipe {
    /// Home overlay directory, if the recipe declares one
    pub fn home_dir(&self) -> Option<PathBuf> {
        self.recipe
            .install
            .home
            .as_deref()
            .map(|p| self.base_dir.join(p))
    }

    /// Lifecycle script directory, if the recipe declares one
    pub fn scripts_dir(&self) -> Option<PathBuf> {
        self.recipe
            .install
            .scripts
            .as_deref()
            .map(|p| self.base_dir.join(p))
    }

    /// Filesystem overlay file, if the recipe declares one
    pub fn filesystem_file(&self) -> Option<PathBuf> {
        self.recipe
            .install
            .filesystem
            .as_deref()
            .map(|p| self.base_dir.join(p))
    }
}

/// Load, parse and validate a recipe file
pub fn parse_recipe_file(path: &Path) -> Result<LoadedRecipe> {
    let content = std::fs::read_to_string(path)?;
    let format = RecipeFormat::detect(path, &content);
    debug!("Parsing {} as {:?}", path.display(), format);

    let recipe = parse_recipe(&content, format)?;
    let warnings = validate_recipe(&recipe)?;
    let base_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    Ok(LoadedRecipe {
        recipe,
        base_dir,
        warnings,
    })
}

/// Parse recipe text into a typed recipe
///
/// Does not run semantic validation; see [`validate_recipe`].
pub fn parse_recipe(content: &str, format: RecipeFormat) -> Result<Recipe> {
    let document: Value = match format {
        RecipeFormat::Json => serde_json::from_str(content)
            .map_err(|e| Error::recipe("<document>", format!("invalid JSON: {}", e)))?,
        RecipeFormat::Yaml => serde_yaml::from_str(content)
            .map_err(|e| Error::recipe("<document>", format!("invalid YAML: {}", e)))?,
    };

    check_structure(&document)?;

    serde_json::from_value(document).map_err(|e| Error::recipe("<document>", e.to_string()))
}

/// Semantic checks on a parsed recipe
///
/// Returns warnings for recoverable findings.
pub fn validate_recipe(recipe: &Recipe) -> Result<Vec<String>> {
    let mut warnings = Vec::new();
    let pkg = &recipe.package;

    for (field, value) in [
        ("package.name", &pkg.name),
        ("package.version", &pkg.version),
        ("package.architecture", &pkg.architecture),
        ("package.source", &pkg.source),
        ("build.template", &recipe.build.template),
    ] {
        if value.trim().is_empty() {
            return Err(Error::recipe(field, "must not be empty"));
        }
    }

    if pkg
        .name
        .chars()
        .any(|c| c.is_whitespace() || c == '/' || c == '\\')
    {
        return Err(Error::recipe(
            "package.name",
            "must not contain whitespace or path separators",
        ));
    }
    if pkg.version.contains('/') || pkg.version.chars().any(char::is_whitespace) {
        return Err(Error::recipe(
            "package.version",
            "must not contain whitespace or path separators",
        ));
    }

    pkg.architecture
        .parse::<Architecture>()
        .map_err(|e| Error::recipe("package.architecture", e))?;

    let template = recipe
        .build
        .template
        .parse::<TemplateKind>()
        .map_err(|e| Error::recipe("build.template", e))?;

    if template == TemplateKind::Custom && recipe.install.script.is_none() {
        return Err(Error::recipe(
            "install.script",
            "required by the custom template",
        ));
    }

    if let Some(checksum) = &pkg.source_checksum {
        Hash::parse_prefixed(checksum)
            .map_err(|e| Error::recipe("package.source_checksum", e.to_string()))?;
    } else if pkg.source.starts_with("http://") || pkg.source.starts_with("https://") {
        warnings.push("Remote source has no checksum".to_string());
    }

    if pkg.description.is_empty() {
        warnings.push("Missing package description".to_string());
    }
    if pkg.license.is_empty() {
        warnings.push("Missing package license".to_string());
    }
    if template != TemplateKind::Custom && recipe.build.script.is_some() {
        warnings.push(format!(
            "build.script is ignored by the {} template",
            template
        ));
    }
    Ok(warnings)
}

const REQUIRED_PACKAGE_FIELDS: &[&str] = &["name", "version", "architecture", "source"];
const OPTIONAL_PACKAGE_STRINGS: &[&str] = &[
    "source_checksum",
    "type",
    "description",
    "maintainer",
    "license",
    "homepage",
];
const PACKAGE_LISTS: &[&str] = &[
    "tags",
    "dependencies",
    "conflicts",
    "provides",
    "replaces",
    "conf",
];
const BUILD_LISTS: &[&str] = &["dependencies", "use", "extra_flags"];
const OPTIONAL_BUILD_STRINGS: &[&str] = &["script", "prefix", "workdir"];
const OPTIONAL_INSTALL_STRINGS: &[&str] = &["script", "home", "scripts", "filesystem"];

fn check_structure(document: &Value) -> Result<()> {
    let root = document
        .as_object()
        .ok_or_else(|| Error::recipe("<document>", "expected an object at the top level"))?;

    let package = required_section(root, "package")?;
    for field in REQUIRED_PACKAGE_FIELDS {
        require_string(package, "package", field)?;
    }
    for field in OPTIONAL_PACKAGE_STRINGS {
        optional_string(package, "package", field)?;
    }
    for field in PACKAGE_LISTS {
        string_list(package, "package", field)?;
    }
    if let Some(Value::String(kind)) = package.get("type") {
        kind.parse::<PackageType>()
            .map_err(|e| Error::recipe("package.type", e))?;
    }

    let build = required_section(root, "build")?;
    require_string(build, "build", "template")?;
    for field in BUILD_LISTS {
        string_list(build, "build", field)?;
    }
    for field in OPTIONAL_BUILD_STRINGS {
        optional_string(build, "build", field)?;
    }
    if let Some(env) = build.get("environment") {
        let env = env
            .as_object()
            .ok_or_else(|| Error::recipe("build.environment", "expected an object"))?;
        for (key, value) in env {
            if !value.is_string() {
                return Err(Error::recipe(
                    format!("build.environment.{}", key),
                    "expected a string",
                ));
            }
        }
    }

    if let Some(install) = optional_section(root, "install")? {
        for field in OPTIONAL_INSTALL_STRINGS {
            optional_string(install, "install", field)?;
        }
    }

    Ok(())
}

fn required_section<'a>(
    root: &'a Map<String, Value>,
    name: &str,
) -> Result<&'a Map<String, Value>> {
    optional_section(root, name)?
        .ok_or_else(|| Error::recipe(name, "missing required section"))
}

fn optional_section<'a>(
    root: &'a Map<String, Value>,
    name: &str,
) -> Result<Option<&'a Map<String, Value>>> {
    match root.get(name) {
        Some(Value::Object(map)) => Ok(Some(map)),
        None | Some(Value::Null) => Ok(None),
        Some(_) => Err(Error::recipe(name, "expected an object")),
    }
}

fn require_string(map: &Map<String, Value>, section: &str, field: &str) -> Result<()> {
    match map.get(field) {
        Some(Value::String(_)) => Ok(()),
        Some(other) => Err(Error::recipe(
            format!("{}.{}", section, field),
            format!("expected a string, found {}", type_name(other)),
        )),
        None => Err(Error::recipe(
            format!("{}.{}", section, field),
            "missing required field",
        )),
    }
}

fn optional_string(map: &Map<String, Value>, section: &str, field: &str) -> Result<()> {
    match map.get(field) {
        None | Some(Value::String(_)) => Ok(()),
        Some(other) => Err(Error::recipe(
            format!("{}.{}", section, field),
            format!("expected a string, found {}", type_name(other)),
        )),
    }
}

fn string_list(map: &Map<String, Value>, section: &str, field: &str) -> Result<()> {
    let items = match map.get(field) {
        None => return Ok(()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(Error::recipe(
                format!("{}.{}", section, field),
                format!("expected a list of strings, found {}", type_name(other)),
            ));
        }
    };
    for (i, item) in items.iter().enumerate() {
        if !item.is_string() {
            return Err(Error::recipe(
                format!("{}.{}[{}]", section, field, i),
                format!("expected a string, found {}", type_name(item)),
            ));
        }
    }
    Ok(())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}
