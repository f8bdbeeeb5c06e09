//! Immutable contribution element trees.

use crate::contrib::error::ContribError;
use crate::registry::{Injector, Service, TypeResolver};
use log::debug;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Contributor of an extension document.
pub struct ContribOwner {
    id: String,
    location: Option<PathBuf>,
    resolver: Arc<dyn TypeResolver>,
}

impl ContribOwner {
    pub fn new(id: impl Into<String>, resolver: Arc<dyn TypeResolver>) -> Self {
        Self {
            id: id.into(),
            location: None,
            resolver,
        }
    }

    pub fn with_location(mut self, location: impl Into<PathBuf>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Resolver used to instantiate this owner's contributed types.
    pub fn resolver(&self) -> &Arc<dyn TypeResolver> {
        &self.resolver
    }
}

impl Debug for ContribOwner {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContribOwner")
            .field("id", &self.id)
            .field("location", &self.location)
            .finish()
    }
}

/// One element below an `extension`: name, attributes, ordered children.
#[derive(Debug, Clone)]
pub struct ContribElement {
    owner: Arc<ContribOwner>,
    name: String,
    attributes: BTreeMap<String, String>,
    children: Vec<ContribElement>,
}

impl ContribElement {
    pub(crate) fn new(
        owner: Arc<ContribOwner>,
        name: String,
        attributes: BTreeMap<String, String>,
        children: Vec<ContribElement>,
    ) -> Self {
        Self {
            owner,
            name,
            attributes,
            children,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn owner(&self) -> &ContribOwner {
        &self.owner
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Child elements in document order, optionally filtered by name.
    pub fn children(&self, name: Option<&str>) -> Vec<&ContribElement> {
        self.children
            .iter()
            .filter(|child| name.map_or(true, |name| child.name == name))
            .collect()
    }

    /// Instantiates the type named by `attribute` and prepares it for use.
    ///
    /// Resources are injected and the post-construct hook runs before the
    /// instance is returned.
    pub fn create_instance(
        &self,
        attribute: &str,
        injector: &dyn Injector,
    ) -> Result<Box<dyn Service>, ContribError> {
        let type_name = self.type_name(attribute)?;
        let service_type = self
            .owner
            .resolver
            .load_type(type_name)
            .ok_or_else(|| ContribError::TypeNotFound(type_name.to_string()))?;
        let factory = service_type
            .factory()
            .ok_or_else(|| ContribError::NotInstantiable(type_name.to_string()))?;

        debug!(
            "event=contrib_create module=contrib owner={} element={} type={type_name}",
            self.owner.id, self.name
        );
        let mut instance = factory().map_err(|source| ContribError::Instantiation {
            type_name: type_name.to_string(),
            source,
        })?;

        injector
            .inject(instance.as_mut())
            .and_then(|()| injector.invoke_post_construct(instance.as_mut()))
            .map_err(|source| ContribError::Injection {
                type_name: type_name.to_string(),
                source,
            })?;
        Ok(instance)
    }

    fn type_name(&self, attribute: &str) -> Result<&str, ContribError> {
        match self.attribute(attribute) {
            None => Err(ContribError::MissingAttribute {
                element: self.name.clone(),
                attribute: attribute.to_string(),
            }),
            Some(value) if value.trim().is_empty() => Err(ContribError::EmptyAttribute {
                element: self.name.clone(),
                attribute: attribute.to_string(),
            }),
            Some(value) => Ok(value.trim()),
        }
    }
}
