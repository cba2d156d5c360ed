// Purpose: The YAML build specification the CLI consumes.

use std::path::Path;

use serde::Deserialize;

use crate::errors::Result;
use crate::install::PkgManager;
use crate::render::Step;

/// A complete container build specification: the package manager of the base
/// image, usernames that already exist in it, and the ordered instruction
/// list.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSpec {
    pub pkg_manager: PkgManager,
    #[serde(default)]
    pub users: Vec<String>,
    pub instructions: Vec<Step>,
}

impl BuildSpec {
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_spec() {
        let spec = BuildSpec::from_yaml(
            r#"
pkg_manager: apt
instructions:
  - name: from_
    kwds:
      base_image: alpine
  - name: run
    kwds:
      command: echo hello
"#,
        )
        .unwrap();
        assert_eq!(spec.pkg_manager, PkgManager::Apt);
        assert!(spec.users.is_empty());
        assert_eq!(spec.instructions.len(), 2);
        assert_eq!(spec.instructions[0].name, "from_");
    }

    #[test]
    fn test_parse_users_and_template_step() {
        let spec = BuildSpec::from_yaml(
            r#"
pkg_manager: yum
users: [neuro]
instructions:
  - name: jq
    kwds:
      version: "1.6"
"#,
        )
        .unwrap();
        assert_eq!(spec.pkg_manager, PkgManager::Yum);
        assert_eq!(spec.users, vec!["neuro"]);
        assert_eq!(
            spec.instructions[0].kwds.get("version").unwrap(),
            "1.6"
        );
    }

    #[test]
    fn test_unknown_pkg_manager_fails_at_parse() {
        let err = BuildSpec::from_yaml("pkg_manager: brew\ninstructions: []\n").unwrap_err();
        assert!(err.to_string().contains("brew"));
    }

    #[test]
    fn test_unknown_top_level_field_fails() {
        assert!(BuildSpec::from_yaml(
            "pkg_manager: apt\ninstructions: []\nextra: true\n"
        )
        .is_err());
    }

    #[test]
    fn test_step_without_kwds() {
        let spec = BuildSpec::from_yaml(
            "pkg_manager: apt\ninstructions:\n  - name: run\n",
        )
        .unwrap();
        assert!(spec.instructions[0].kwds.is_empty());
    }
}
