// Purpose: Singularity definition-file dialect: instructions accumulate into
// sections that are assembled in canonical order.

use std::collections::BTreeMap;
use std::fmt;

use crate::errors::{Error, Result};
use crate::install::PkgManager;
use crate::render::{RenderState, Renderer};

/// Renders a Singularity definition file. Unlike a layered image, the
/// definition file groups by section, so instructions land in buckets and the
/// order inside `%post` is the only order preserved.
#[derive(Debug, Clone)]
pub struct SingularityRenderer {
    state: RenderState,
    header: Option<(String, String)>,
    files: Vec<String>,
    environment: Vec<(String, String)>,
    post: Vec<String>,
    labels: BTreeMap<String, String>,
}

impl SingularityRenderer {
    pub fn new(pkg_manager: PkgManager) -> Self {
        Self::with_users(pkg_manager, Vec::new())
    }

    pub fn with_users(pkg_manager: PkgManager, users: impl IntoIterator<Item = String>) -> Self {
        Self {
            state: RenderState::with_users(pkg_manager, users),
            header: None,
            files: Vec::new(),
            environment: Vec::new(),
            post: Vec::new(),
            labels: BTreeMap::new(),
        }
    }
}

impl fmt::Display for SingularityRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut sections: Vec<String> = Vec::new();
        if let Some((bootstrap, from)) = &self.header {
            sections.push(format!("Bootstrap: {}\nFrom: {}", bootstrap, from));
        }
        if !self.files.is_empty() {
            sections.push(format!("%files\n{}", self.files.join("\n")));
        }
        if !self.environment.is_empty() {
            let exports: Vec<String> = self
                .environment
                .iter()
                .map(|(k, v)| format!("export {}=\"{}\"", k, v))
                .collect();
            sections.push(format!("%environment\n{}", exports.join("\n")));
        }
        if !self.post.is_empty() {
            sections.push(format!("%post\n{}", self.post.join("\n\n")));
        }
        if !self.labels.is_empty() {
            let pairs: Vec<String> = self
                .labels
                .iter()
                .map(|(k, v)| format!("{} {}", k, v))
                .collect();
            sections.push(format!("%labels\n{}", pairs.join("\n")));
        }
        f.write_str(&sections.join("\n\n"))
    }
}

impl Renderer for SingularityRenderer {
    fn state(&self) -> &RenderState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RenderState {
        &mut self.state
    }

    /// Set the header. Images named without a scheme bootstrap from Docker
    /// Hub; `docker://` and `library://` select the matching agent.
    fn from_(&mut self, base_image: &str, alias: Option<&str>) -> Result<&mut Self> {
        if alias.is_some() {
            return Err(Error::Unsupported(
                "build stages are not supported by the singularity format".to_string(),
            ));
        }
        let header = match base_image.split_once("://") {
            None => ("docker".to_string(), base_image.to_string()),
            Some(("docker", rest)) => ("docker".to_string(), rest.to_string()),
            Some(("library", rest)) => ("library".to_string(), rest.to_string()),
            Some((scheme, _)) => {
                return Err(Error::Argument(format!(
                    "unknown bootstrap agent '{}'",
                    scheme
                )))
            }
        };
        self.header = Some(header);
        Ok(self)
    }

    fn arg(&mut self, _key: &str, _value: Option<&str>) -> Result<&mut Self> {
        Err(Error::Unsupported(
            "build-time arguments are not supported by the singularity format".to_string(),
        ))
    }

    fn copy(
        &mut self,
        sources: &[String],
        destination: &str,
        from_stage: Option<&str>,
        chown: Option<&str>,
    ) -> Result<&mut Self> {
        if from_stage.is_some() {
            return Err(Error::Unsupported(
                "copying from a build stage is not supported by the singularity format"
                    .to_string(),
            ));
        }
        if chown.is_some() {
            return Err(Error::Unsupported(
                "changing ownership on copy is not supported by the singularity format"
                    .to_string(),
            ));
        }
        for source in sources {
            self.files.push(format!("{} {}", source, destination));
        }
        Ok(self)
    }

    fn env(&mut self, vars: &[(String, String)]) -> Result<&mut Self> {
        self.environment.extend(vars.iter().cloned());
        Ok(self)
    }

    /// Labels are keyed; setting a key again overwrites its value.
    fn label(&mut self, labels: &[(String, String)]) -> Result<&mut Self> {
        for (key, value) in labels {
            self.labels.insert(key.clone(), value.clone());
        }
        Ok(self)
    }

    fn run(&mut self, command: &str) -> Result<&mut Self> {
        self.post.push(command.to_string());
        Ok(self)
    }

    fn user(&mut self, user: &str) -> Result<&mut Self> {
        let mut entry = String::new();
        if !self.state.users().contains(user) {
            entry.push_str(&format!(
                "test \"$(getent passwd {})\" \\\n|| useradd --no-user-group --create-home --shell /bin/bash {}\n",
                user, user
            ));
            self.state.users_mut().insert(user.to_string());
        }
        entry.push_str(&format!("su - {}", user));
        self.post.push(entry);
        Ok(self)
    }

    fn workdir(&mut self, path: &str) -> Result<&mut Self> {
        self.post.push(format!("mkdir -p {}\ncd {}", path, path));
        Ok(self)
    }

    fn source_text(&self) -> String {
        self.to_string()
    }

    fn is_empty(&self) -> bool {
        self.header.is_none()
            && self.files.is_empty()
            && self.environment.is_empty()
            && self.post.is_empty()
            && self.labels.is_empty()
    }
}
