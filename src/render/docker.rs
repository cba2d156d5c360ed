// Purpose: Dockerfile dialect: one instruction per part, joined by newlines.

use std::fmt;

use crate::errors::Result;
use crate::install::PkgManager;
use crate::render::{RenderState, Renderer};

/// Renders a Dockerfile. Instructions append to an ordered list of parts;
/// the text stays templated until `render`.
#[derive(Debug, Clone)]
pub struct DockerRenderer {
    state: RenderState,
    parts: Vec<String>,
}

impl DockerRenderer {
    pub fn new(pkg_manager: PkgManager) -> Self {
        Self::with_users(pkg_manager, Vec::new())
    }

    pub fn with_users(pkg_manager: PkgManager, users: impl IntoIterator<Item = String>) -> Self {
        Self {
            state: RenderState::with_users(pkg_manager, users),
            parts: Vec::new(),
        }
    }
}

impl fmt::Display for DockerRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.parts.join("\n"))
    }
}

impl Renderer for DockerRenderer {
    fn state(&self) -> &RenderState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RenderState {
        &mut self.state
    }

    fn from_(&mut self, base_image: &str, alias: Option<&str>) -> Result<&mut Self> {
        let part = match alias {
            Some(alias) => format!("FROM {} AS {}", base_image, alias),
            None => format!("FROM {}", base_image),
        };
        self.parts.push(part);
        Ok(self)
    }

    fn arg(&mut self, key: &str, value: Option<&str>) -> Result<&mut Self> {
        let part = match value {
            Some(value) => format!("ARG {}={}", key, value),
            None => format!("ARG {}", key),
        };
        self.parts.push(part);
        Ok(self)
    }

    fn copy(
        &mut self,
        sources: &[String],
        destination: &str,
        from_stage: Option<&str>,
        chown: Option<&str>,
    ) -> Result<&mut Self> {
        let mut prefix = String::from("COPY ");
        if let Some(stage) = from_stage {
            prefix.push_str(&format!("--from={} ", stage));
        }
        if let Some(owner) = chown {
            prefix.push_str(&format!("--chown={} ", owner));
        }
        // JSON form, so paths with spaces survive.
        let mut items: Vec<String> = sources.iter().map(|s| format!("\"{}\"", s)).collect();
        items.push(format!("\"{}\"", destination));
        let indent = " ".repeat(prefix.len() + 1);
        let part = format!("{}[{}]", prefix, items.join(&format!(", \\\n{}", indent)));
        self.parts.push(part);
        Ok(self)
    }

    fn env(&mut self, vars: &[(String, String)]) -> Result<&mut Self> {
        let pairs: Vec<String> = vars
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v))
            .collect();
        self.parts.push(format!("ENV {}", pairs.join(" \\\n    ")));
        Ok(self)
    }

    fn label(&mut self, labels: &[(String, String)]) -> Result<&mut Self> {
        let pairs: Vec<String> = labels
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", k, v))
            .collect();
        self.parts.push(format!("LABEL {}", pairs.join(" \\\n      ")));
        Ok(self)
    }

    fn run(&mut self, command: &str) -> Result<&mut Self> {
        self.parts.push(format!("RUN {}", reflow(command)));
        Ok(self)
    }

    fn user(&mut self, user: &str) -> Result<&mut Self> {
        if !self.state.users().contains(user) {
            self.run(&format!(
                "test \"$(getent passwd {})\" \\\n|| useradd --no-user-group --create-home --shell /bin/bash {}",
                user, user
            ))?;
            self.state_mut().users_mut().insert(user.to_string());
        }
        self.parts.push(format!("USER {}", user));
        Ok(self)
    }

    fn workdir(&mut self, path: &str) -> Result<&mut Self> {
        self.parts.push(format!("WORKDIR {}", path));
        Ok(self)
    }

    fn source_text(&self) -> String {
        self.to_string()
    }

    fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Join a multi-line shell command into one RUN instruction: `&&` between
/// commands, backslash continuations, and indentation that lines the
/// continuations up. Lines that already continue (start with a connective or
/// are comments) keep their flow.
fn reflow(command: &str) -> String {
    let lines: Vec<&str> = command.lines().collect();
    if lines.len() <= 1 {
        return command.to_string();
    }

    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        let mut text = line.to_string();
        if i > 0 {
            let trimmed = line.trim_start();
            let already_continued = ["&&", "&", "||", "|", "fi"]
                .iter()
                .any(|c| trimmed.starts_with(c))
                || trimmed.starts_with('#');
            let previous = lines[i - 1].trim_end();
            let previous_continued =
                previous.ends_with('\\') || previous.trim_start().starts_with("if");

            if !already_continued && !previous_continued {
                text = format!("&& {}", text);
            }
            if !already_continued && previous_continued {
                text = format!("{}{}", " ".repeat(7), text);
            } else {
                text = format!("{}{}", " ".repeat(4), text);
            }
        }
        if i < lines.len() - 1 && !text.trim_end().ends_with('\\') {
            text.push_str(" \\");
        }
        out.push(text);
    }
    out.join("\n")
}
