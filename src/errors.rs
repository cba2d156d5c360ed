// Purpose: Error types shared across the crate.

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad configuration, e.g. an unknown package manager or an installation
    /// method that a recipe does not define.
    #[error("{0}")]
    Configuration(String),

    /// Invalid keyword arguments supplied to a template instance.
    #[error("{0}")]
    Argument(String),

    /// A recipe definition failed structural validation.
    #[error("invalid template: {0}")]
    TemplateDefinition(String),

    /// Registry lookup miss.
    #[error("unknown template '{name}'. Registered templates are '{known}'.")]
    TemplateNotFound { name: String, known: String },

    /// Template evaluation failed. The failing recipe is anonymized to a
    /// unique identifier before evaluation, so the message stays generic.
    #[error("{0}")]
    Template(String),

    /// A build step failed while applying an instruction list.
    #[error("error on step '{step}': {source}")]
    Render {
        step: String,
        #[source]
        source: Box<Error>,
    },

    /// The requested operation has no equivalent in the target dialect.
    #[error("{0}")]
    Unsupported(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Wrap an error with the name of the build step that raised it.
    pub(crate) fn on_step(self, step: &str) -> Error {
        Error::Render {
            step: step.to_string(),
            source: Box::new(self),
        }
    }
}
