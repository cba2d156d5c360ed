// Purpose: Dialect-neutral renderer behavior: shared state, instruction
// dispatch, recipe merging and the final two-pass evaluation.

pub mod docker;
pub mod eval;
pub mod singularity;

pub use docker::DockerRenderer;
pub use singularity::SingularityRenderer;

use std::collections::HashSet;

use log::debug;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::errors::{Error, Result};
use crate::install::{self, PkgManager};
use crate::recipe::{dependency_marker_re, value_to_string, InstallMethod, TemplateInstance};
use crate::registry::TemplateRegistry;

/// One dialect-neutral build step: a built-in instruction or the name of a
/// registered recipe, with keyword arguments.
#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    pub name: String,
    #[serde(default)]
    pub kwds: Map<String, Value>,
}

/// Renderer state shared by every dialect.
#[derive(Debug, Clone)]
pub struct RenderState {
    pkg_manager: PkgManager,
    users: HashSet<String>,
    namespaces: Map<String, Value>,
}

impl RenderState {
    pub fn new(pkg_manager: PkgManager) -> Self {
        Self::with_users(pkg_manager, Vec::new())
    }

    pub fn with_users(pkg_manager: PkgManager, users: impl IntoIterator<Item = String>) -> Self {
        let mut users: HashSet<String> = users.into_iter().collect();
        users.insert("root".to_string());
        Self {
            pkg_manager,
            users,
            namespaces: Map::new(),
        }
    }

    pub fn pkg_manager(&self) -> PkgManager {
        self.pkg_manager
    }

    /// Usernames assumed present in the image, including any created so far.
    pub fn users(&self) -> &HashSet<String> {
        &self.users
    }

    pub(crate) fn users_mut(&mut self) -> &mut HashSet<String> {
        &mut self.users
    }

    fn next_namespace_id(&self) -> String {
        format!("template_{}", self.namespaces.len())
    }
}

/// The built-in instructions a step name can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinOp {
    From,
    Arg,
    Copy,
    Env,
    Install,
    Label,
    Run,
    RunInShell,
    User,
    Workdir,
}

impl BuiltinOp {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "from" | "from_" => Some(BuiltinOp::From),
            "arg" => Some(BuiltinOp::Arg),
            "copy" => Some(BuiltinOp::Copy),
            "env" => Some(BuiltinOp::Env),
            "install" => Some(BuiltinOp::Install),
            "label" => Some(BuiltinOp::Label),
            "run" => Some(BuiltinOp::Run),
            "run_in_shell" => Some(BuiltinOp::RunInShell),
            "user" => Some(BuiltinOp::User),
            "workdir" => Some(BuiltinOp::Workdir),
            _ => None,
        }
    }
}

/// A step name resolved once, before dispatch.
enum Resolved<'a> {
    Builtin(BuiltinOp),
    Template(&'a str),
}

fn resolve(name: &str) -> Resolved<'_> {
    match BuiltinOp::parse(name) {
        Some(op) => Resolved::Builtin(op),
        None => Resolved::Template(name),
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FromArgs {
    base_image: String,
    #[serde(default, alias = "as_")]
    alias: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ArgArgs {
    key: String,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CopyArgs {
    source: OneOrMany,
    destination: String,
    #[serde(default, alias = "from_")]
    from_stage: Option<String>,
    #[serde(default)]
    chown: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct InstallArgs {
    pkgs: Vec<String>,
    #[serde(default)]
    opts: Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RunArgs {
    command: String,
}

fn default_shell() -> String {
    "bash".to_string()
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RunInShellArgs {
    command: String,
    #[serde(default = "default_shell")]
    shell: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UserArgs {
    user: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WorkdirArgs {
    path: String,
}

fn parse_kwds<T: DeserializeOwned>(kwds: &Map<String, Value>) -> Result<T> {
    serde_json::from_value(Value::Object(kwds.clone()))
        .map_err(|err| Error::Argument(err.to_string()))
}

fn kwds_as_pairs(kwds: &Map<String, Value>) -> Vec<(String, String)> {
    kwds.iter()
        .map(|(k, v)| (k.clone(), value_to_string(v)))
        .collect()
}

/// A container build-file renderer. The dialect provides the instruction
/// primitives and the accumulated output text; everything else (install
/// synthesis, recipe merging, step dispatch, evaluation, equivalence) is
/// shared.
///
/// Instruction methods return the renderer so applications can be chained.
/// Failed steps are not rolled back: a renderer that returned an error from
/// `apply` should be discarded.
pub trait Renderer: Sized {
    fn state(&self) -> &RenderState;
    fn state_mut(&mut self) -> &mut RenderState;

    fn from_(&mut self, base_image: &str, alias: Option<&str>) -> Result<&mut Self>;
    fn arg(&mut self, key: &str, value: Option<&str>) -> Result<&mut Self>;
    fn copy(
        &mut self,
        sources: &[String],
        destination: &str,
        from_stage: Option<&str>,
        chown: Option<&str>,
    ) -> Result<&mut Self>;
    fn env(&mut self, vars: &[(String, String)]) -> Result<&mut Self>;
    fn label(&mut self, labels: &[(String, String)]) -> Result<&mut Self>;
    fn run(&mut self, command: &str) -> Result<&mut Self>;
    fn user(&mut self, user: &str) -> Result<&mut Self>;
    fn workdir(&mut self, path: &str) -> Result<&mut Self>;

    /// The accumulated, still-templated output text.
    fn source_text(&self) -> String;

    /// True while no instruction has produced output.
    fn is_empty(&self) -> bool;

    /// Synthesize the install command for the configured package manager and
    /// append it as a run instruction.
    fn install(&mut self, pkgs: &[String], opts: Option<&str>) -> Result<&mut Self> {
        let command = install::install(self.state().pkg_manager(), pkgs, opts);
        self.run(&command)
    }

    /// Run a command inside the named shell.
    fn run_in_shell(&mut self, command: &str, shell: &str) -> Result<&mut Self> {
        self.run(&format!("{} -c '{}'", shell, command))
    }

    /// Merge a bound recipe instance into the output state.
    ///
    /// The instance gets a unique namespace id, so several instances of the
    /// same recipe never collide when the text is evaluated. References to
    /// `self.` in the recipe's env and instructions (and in bound values) are
    /// rewritten to that id. The dependency marker is expanded here, where the
    /// renderer's package manager is known.
    fn add_template(&mut self, instance: &TemplateInstance) -> Result<&mut Self> {
        let id = self.state().next_namespace_id();
        let id_dot = format!("{}.", id);
        debug!("merging template '{}' as '{}'", instance.name(), id);

        let deps_command = dependency_install_command(self.state().pkg_manager(), instance);

        let mut bindings = Map::new();
        for (key, value) in instance.kwds() {
            let value = value_to_string(value).replace("self.", &id_dot);
            bindings.insert(key.clone(), Value::String(value));
        }
        if let Some(url) = instance.binaries_url() {
            bindings.insert("binaries_url".to_string(), Value::String(url));
        }
        self.state_mut()
            .namespaces
            .insert(id.clone(), Value::Object(bindings));

        let env = instance.env();
        if !env.is_empty() {
            let vars: Vec<(String, String)> = env
                .into_iter()
                .map(|(k, v)| (k.replace("self.", &id_dot), v.replace("self.", &id_dot)))
                .collect();
            self.env(&vars)?;
        }

        let instructions = instance.instructions().trim_end();
        if !instructions.is_empty() {
            let marker = dependency_marker_re();
            let mut command = if marker.is_match(instructions) {
                // NoExpand: the install command is literal text, not a
                // capture-group expansion.
                marker
                    .replace_all(instructions, regex::NoExpand(&deps_command))
                    .into_owned()
            } else if !deps_command.is_empty() {
                format!("{}\n{}", deps_command, instructions)
            } else {
                instructions.to_string()
            };
            command = command.replace("self.", &id_dot);
            // An empty dependency command can leave the first line blank.
            self.run(command.trim_start_matches('\n'))?;
        }

        Ok(self)
    }

    /// Look up a recipe by name, bind it and merge it. Without an explicit
    /// method, binaries wins when the recipe defines it.
    fn add_registered(
        &mut self,
        registry: &TemplateRegistry,
        name: &str,
        method: Option<InstallMethod>,
        kwds: Map<String, Value>,
    ) -> Result<&mut Self> {
        let recipe = registry.get(name)?;
        let method = method.unwrap_or_else(|| recipe.default_method());
        let instance = TemplateInstance::new(recipe, method, kwds)?;
        self.add_template(&instance)
    }

    /// Apply an ordered list of steps. Each name resolves either to a
    /// built-in instruction or to a registry lookup; failures are wrapped
    /// with the step name and propagated, never skipped.
    fn apply(&mut self, registry: &TemplateRegistry, steps: &[Step]) -> Result<&mut Self> {
        if steps.is_empty() {
            return Err(Error::Argument(
                "the instruction list must not be empty".to_string(),
            ));
        }
        for step in steps {
            debug!("applying step '{}'", step.name);
            match resolve(&step.name) {
                Resolved::Builtin(op) => self
                    .apply_builtin(op, &step.kwds)
                    .map_err(|err| err.on_step(&step.name))?,
                Resolved::Template(name) => {
                    let mut kwds = step.kwds.clone();
                    let method = take_method(&mut kwds).map_err(|err| err.on_step(name))?;
                    self.add_registered(registry, name, method, kwds)
                        .map_err(|err| err.on_step(name))?;
                }
            }
        }
        if self.is_empty() {
            return Err(Error::Argument(
                "the instruction list produced nothing to render".to_string(),
            ));
        }
        Ok(self)
    }

    fn apply_builtin(&mut self, op: BuiltinOp, kwds: &Map<String, Value>) -> Result<()> {
        match op {
            BuiltinOp::From => {
                let args: FromArgs = parse_kwds(kwds)?;
                self.from_(&args.base_image, args.alias.as_deref())?;
            }
            BuiltinOp::Arg => {
                let args: ArgArgs = parse_kwds(kwds)?;
                self.arg(&args.key, args.value.as_deref())?;
            }
            BuiltinOp::Copy => {
                let args: CopyArgs = parse_kwds(kwds)?;
                let sources = args.source.into_vec();
                self.copy(
                    &sources,
                    &args.destination,
                    args.from_stage.as_deref(),
                    args.chown.as_deref(),
                )?;
            }
            BuiltinOp::Env => {
                self.env(&kwds_as_pairs(kwds))?;
            }
            BuiltinOp::Install => {
                let args: InstallArgs = parse_kwds(kwds)?;
                self.install(&args.pkgs, args.opts.as_deref())?;
            }
            BuiltinOp::Label => {
                self.label(&kwds_as_pairs(kwds))?;
            }
            BuiltinOp::Run => {
                let args: RunArgs = parse_kwds(kwds)?;
                self.run(&args.command)?;
            }
            BuiltinOp::RunInShell => {
                let args: RunInShellArgs = parse_kwds(kwds)?;
                self.run_in_shell(&args.command, &args.shell)?;
            }
            BuiltinOp::User => {
                let args: UserArgs = parse_kwds(kwds)?;
                self.user(&args.user)?;
            }
            BuiltinOp::Workdir => {
                let args: WorkdirArgs = parse_kwds(kwds)?;
                self.workdir(&args.path)?;
            }
        }
        Ok(())
    }

    /// Evaluate the accumulated text. Reads state only; render as often as
    /// you like.
    fn render(&self) -> Result<String> {
        let namespaces = Value::Object(self.state().namespaces.clone());
        eval::evaluate(&self.source_text(), &namespaces)
    }

    /// Rendered-text equality, ignoring blank lines and full-line comments.
    fn equivalent_text(&self, text: &str) -> Result<bool> {
        Ok(normalize(&self.render()?) == normalize(text))
    }

    /// Two renderers describe the same container specification when their
    /// rendered texts differ only cosmetically.
    fn equivalent(&self, other: &impl Renderer) -> Result<bool> {
        self.equivalent_text(&other.render()?)
    }
}

/// The dependency install command for one merged instance: the renderer's
/// package manager plus, on apt systems, any Debian package URLs.
fn dependency_install_command(pkg_manager: PkgManager, instance: &TemplateInstance) -> String {
    let mut command = String::new();
    let pkgs = instance.dependencies(pkg_manager);
    if !pkgs.is_empty() {
        command.push_str(&install::install(pkg_manager, pkgs, None));
    }
    if pkg_manager == PkgManager::Apt && !instance.deb_urls().is_empty() {
        if !command.is_empty() {
            command.push('\n');
        }
        command.push_str(&install::dpkg_install(instance.deb_urls(), None));
    }
    command
}

fn take_method(kwds: &mut Map<String, Value>) -> Result<Option<InstallMethod>> {
    let value = kwds
        .remove("method")
        .or_else(|| kwds.remove("installation_method"));
    match value {
        Some(value) => {
            let name = value.as_str().ok_or_else(|| {
                Error::Configuration("installation method must be a string".to_string())
            })?;
            Ok(Some(name.parse()?))
        }
        None => Ok(None),
    }
}

/// Strip blank lines and full-line comments; cosmetic formatting does not
/// change the container specification.
pub fn normalize(text: &str) -> String {
    text.lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .collect::<Vec<&str>>()
        .join("\n")
}
