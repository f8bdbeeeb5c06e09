use crate::registry::{BoxError, RegistryError};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Malformed extension document.
#[derive(Debug)]
pub struct ParseError {
    owner: String,
    source: roxmltree::Error,
}

impl ParseError {
    pub(crate) fn new(owner: &str, source: roxmltree::Error) -> Self {
        Self {
            owner: owner.to_string(),
            source,
        }
    }

    /// Identifier of the contributor whose document failed.
    pub fn owner(&self) -> &str {
        &self.owner
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid extension document from `{}`: {}", self.owner, self.source)
    }
}

impl Error for ParseError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.source)
    }
}

/// Failures instantiating a contributed implementation type.
#[derive(Debug)]
pub enum ContribError {
    MissingAttribute { element: String, attribute: String },
    EmptyAttribute { element: String, attribute: String },
    TypeNotFound(String),
    /// The type is abstract and has no factory.
    NotInstantiable(String),
    Instantiation { type_name: String, source: BoxError },
    Injection { type_name: String, source: RegistryError },
}

impl Display for ContribError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingAttribute { element, attribute } => {
                write!(f, "no such attribute `{attribute}` on `{element}`")
            }
            Self::EmptyAttribute { element, attribute } => {
                write!(f, "attribute `{attribute}` on `{element}` is empty")
            }
            Self::TypeNotFound(name) => write!(f, "type not found: {name}"),
            Self::NotInstantiable(name) => write!(f, "type is not instantiable: {name}"),
            Self::Instantiation { type_name, source } => {
                write!(f, "unable to instantiate `{type_name}`: {source}")
            }
            Self::Injection { type_name, source } => {
                write!(f, "unable to initialize `{type_name}`: {source}")
            }
        }
    }
}

impl Error for ContribError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Instantiation { source, .. } => Some(source.as_ref()),
            Self::Injection { source, .. } => Some(source),
            Self::MissingAttribute { .. }
            | Self::EmptyAttribute { .. }
            | Self::TypeNotFound(_)
            | Self::NotInstantiable(_) => None,
        }
    }
}
