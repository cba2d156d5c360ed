// Purpose: In-memory registry of install recipes, loaded from YAML files.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use log::debug;
use walkdir::WalkDir;

use crate::errors::{Error, Result};
use crate::recipe::Recipe;

/// Name to recipe mapping with case-insensitive lookup. The registry is plain
/// owned state: construct one, fill it, and pass it to whatever renders.
/// Re-registering a name silently overwrites the previous recipe.
#[derive(Debug, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Recipe>,
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a recipe, keyed by its lowercased name.
    pub fn register(&mut self, recipe: Recipe) -> Result<()> {
        recipe.validate()?;
        let key = recipe.name.to_lowercase();
        debug!("registering template '{}'", key);
        self.templates.insert(key, recipe);
        Ok(())
    }

    /// Parse a YAML recipe file and register it.
    pub fn register_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)?;
        let recipe: Recipe = serde_yaml::from_str(&text)?;
        self.register(recipe)
    }

    /// Register every `*.yaml`/`*.yml` file under `dir`.
    pub fn load_dir(&mut self, dir: &Path) -> Result<()> {
        for entry in WalkDir::new(dir) {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let is_yaml = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext == "yaml" || ext == "yml")
                .unwrap_or(false);
            if is_yaml {
                self.register_file(entry.path())?;
            }
        }
        Ok(())
    }

    /// Case-insensitive lookup. A miss reports the registered names.
    pub fn get(&self, name: &str) -> Result<&Recipe> {
        let key = name.to_lowercase();
        self.templates.get(&key).ok_or_else(|| Error::TemplateNotFound {
            name: key,
            known: self.keys().join("', '"),
        })
    }

    /// Sorted names of the registered recipes.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Drop all registrations. Mainly a test hook.
    pub fn clear(&mut self) {
        self.templates.clear();
    }
}
