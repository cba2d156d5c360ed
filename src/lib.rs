//! Generate Dockerfiles and Singularity definition files from declarative
//! install recipes.
//!
//! Recipes describe how to install a piece of software (from prebuilt
//! binaries or from source) as templated shell instructions. A
//! [`TemplateRegistry`] holds recipes by name; a [`Renderer`] merges bound
//! recipe instances and built-in instructions into a container build file in
//! the chosen dialect.

pub mod errors;
pub mod install;
pub mod recipe;
pub mod registry;
pub mod render;
pub mod spec;

pub use errors::{Error, Result};
pub use install::PkgManager;
pub use recipe::{InstallMethod, Recipe, TemplateInstance};
pub use registry::TemplateRegistry;
pub use render::{DockerRenderer, Renderer, SingularityRenderer, Step};
pub use spec::BuildSpec;
