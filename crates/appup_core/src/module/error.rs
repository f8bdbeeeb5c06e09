use crate::contrib::ParseError;
use crate::module::manifest::ManifestError;
use crate::registry::BoxError;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;

pub type ModuleResult<T> = Result<T, ModuleError>;

/// Module install/start/stop failures.
#[derive(Debug)]
pub enum ModuleError {
    /// Reading the module or extracting from it failed.
    Io { location: PathBuf, source: io::Error },
    /// No registered format accepts the location.
    UnsupportedFormat(PathBuf),
    /// The manifest is malformed.
    Manifest {
        location: PathBuf,
        source: ManifestError,
    },
    /// The embedded extension document is malformed.
    Contribution {
        location: PathBuf,
        source: ParseError,
    },
    NotInstalled(PathBuf),
    ActivatorNotFound { location: PathBuf, activator: String },
    /// Activator construction, `start` or `stop` failed.
    Activation {
        location: PathBuf,
        activator: String,
        source: BoxError,
    },
}

impl ModuleError {
    pub(crate) fn io(location: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            location: location.into(),
            source,
        }
    }

    /// True for configuration problems rather than I/O or activation faults.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Manifest { .. } | Self::Contribution { .. } | Self::ActivatorNotFound { .. }
        )
    }
}

impl Display for ModuleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { location, source } => {
                write!(f, "unable to read module `{}`: {source}", location.display())
            }
            Self::UnsupportedFormat(location) => {
                write!(f, "unsupported module format: {}", location.display())
            }
            Self::Manifest { location, source } => {
                write!(f, "invalid manifest in `{}`: {source}", location.display())
            }
            Self::Contribution { location, source } => {
                write!(f, "invalid contributions in `{}`: {source}", location.display())
            }
            Self::NotInstalled(location) => {
                write!(f, "no module installed at {}", location.display())
            }
            Self::ActivatorNotFound {
                location,
                activator,
            } => write!(
                f,
                "activator `{activator}` of `{}` is not registered",
                location.display()
            ),
            Self::Activation {
                location,
                activator,
                source,
            } => write!(
                f,
                "activator `{activator}` of `{}` failed: {source}",
                location.display()
            ),
        }
    }
}

impl Error for ModuleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Manifest { source, .. } => Some(source),
            Self::Contribution { source, .. } => Some(source),
            Self::Activation { source, .. } => Some(source.as_ref()),
            Self::UnsupportedFormat(_) | Self::NotInstalled(_) | Self::ActivatorNotFound { .. } => {
                None
            }
        }
    }
}
