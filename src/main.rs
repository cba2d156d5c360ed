use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

use specforge::render::Renderer;
use specforge::{BuildSpec, DockerRenderer, PkgManager, SingularityRenderer, TemplateRegistry};

#[derive(Debug, Args)]
struct GlobalOpts {
    // Directories with recipe YAML files. Later directories override earlier
    // ones on name collisions.
    #[arg(long, short, global = true)]
    template_dir: Vec<PathBuf>,

    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Dialect {
    Docker,
    Singularity,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[clap(
        name = "generate",
        about = "Generate a container build file from a build specification."
    )]
    Generate {
        #[clap(long, short, value_enum, default_value_t = Dialect::Docker)]
        dialect: Dialect,

        // Override the package manager declared in the build specification.
        #[clap(long, short, value_enum)]
        pkg_manager: Option<PkgManager>,

        // Write to this file instead of stdout.
        #[clap(long, short)]
        output: Option<PathBuf>,

        spec: PathBuf,
    },

    #[clap(name = "templates", about = "List the registered recipe names.")]
    Templates,
}

#[derive(Parser)]
#[command(name = "specforge")]
#[command(about="Generate Dockerfiles and Singularity definition files from declarative install recipes.", long_about=None)]
#[command(version = "0.1.0")]
pub struct App {
    #[clap(flatten)]
    args: GlobalOpts,

    #[clap(subcommand)]
    command: Command,
}

fn main() -> Result<()> {
    let app = App::parse();
    let args = app.args;

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )?;

    let mut registry = TemplateRegistry::new();
    for dir in &args.template_dir {
        registry.load_dir(dir)?;
    }

    match app.command {
        Command::Generate {
            dialect,
            pkg_manager,
            output,
            spec,
        } => {
            let spec = BuildSpec::load(&spec)?;
            let pkg_manager = pkg_manager.unwrap_or(spec.pkg_manager);
            let rendered = generate(&registry, &spec, dialect, pkg_manager)?;
            match output {
                Some(path) => std::fs::write(path, rendered + "\n")?,
                None => writeln!(std::io::stdout(), "{}", rendered)?,
            }
        }
        Command::Templates => {
            if registry.is_empty() {
                println!("No templates registered.");
            } else {
                for name in registry.keys() {
                    println!("{}", name);
                }
            }
        }
    }

    Ok(())
}

fn generate(
    registry: &TemplateRegistry,
    spec: &BuildSpec,
    dialect: Dialect,
    pkg_manager: PkgManager,
) -> Result<String, specforge::Error> {
    let users = spec.users.iter().cloned();
    match dialect {
        Dialect::Docker => {
            let mut renderer = DockerRenderer::with_users(pkg_manager, users);
            renderer.apply(registry, &spec.instructions)?;
            renderer.render()
        }
        Dialect::Singularity => {
            let mut renderer = SingularityRenderer::with_users(pkg_manager, users);
            renderer.apply(registry, &spec.instructions)?;
            renderer.render()
        }
    }
}
