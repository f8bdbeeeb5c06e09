//! Service registry error taxonomy.

use crate::registry::service::BoxError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Failures surfaced by `lookup`, `list_bindings` and the injector.
///
/// None of these are cached: a later lookup of the same name attempts
/// construction again.
#[derive(Debug)]
pub enum RegistryError {
    /// A service's construction requires itself through its dependencies.
    Cycle { name: String, chain: Vec<String> },
    /// No type, provider or resource-marked constructor is known for a name.
    NameNotFound(String),
    /// A declared dependency could not be resolved or accepted.
    Injection {
        service: String,
        dependency: String,
        source: BoxError,
    },
    /// A factory or post-construct hook failed.
    Instantiation { name: String, source: BoxError },
    /// A pre-destroy hook failed.
    Shutdown { name: String, source: BoxError },
}

impl RegistryError {
    /// Names taking part in a dependency cycle, outermost first.
    pub fn cycle_chain(&self) -> Option<&[String]> {
        match self {
            Self::Cycle { chain, .. } => Some(chain.as_slice()),
            _ => None,
        }
    }
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cycle { name, chain } => write!(
                f,
                "resource dependency cycle detected for `{name}`: {}",
                chain.join(" -> ")
            ),
            Self::NameNotFound(name) => write!(f, "name not found: {name}"),
            Self::Injection {
                service,
                dependency,
                source,
            } => write!(
                f,
                "unable to inject `{dependency}` into `{service}`: {source}"
            ),
            Self::Instantiation { name, source } => {
                write!(f, "unable to create service instance `{name}`: {source}")
            }
            Self::Shutdown { name, source } => {
                write!(f, "error shutting down service `{name}`: {source}")
            }
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Injection { source, .. }
            | Self::Instantiation { source, .. }
            | Self::Shutdown { source, .. } => Some(source.as_ref()),
            Self::Cycle { .. } | Self::NameNotFound(_) => None,
        }
    }
}
