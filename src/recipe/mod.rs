// src/recipe/mod.rs

//! Recipes: declarative descriptions of how to build one package
//!
//! A recipe names the upstream source, the build template that knows how to
//! drive the project's build system, and the metadata that ends up in the
//! package's `metadata.json`. See [`format`] for the document layout.
//!
//! Loading is side-effect free: [`parse_recipe_file`] either returns a fully
//! validated [`Recipe`] or a [`crate::Error::RecipeValidation`] naming the
//! offending field.

pub mod format;
pub mod parser;

pub use format::{
    Architecture, BuildSection, InstallSection, PackageSection, PackageType, Recipe,
    TemplateKind, LATEST_VERSION,
};
pub use parser::{
    parse_recipe, parse_recipe_file, validate_recipe, LoadedRecipe, RecipeFormat,
};
