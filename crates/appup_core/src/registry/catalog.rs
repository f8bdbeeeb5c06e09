//! Named type catalog standing in for dynamic class loading.
//!
//! # Responsibility
//! - Map type names to factories for services, providers and activators.
//! - Answer the `TypeResolver` questions asked by the registry, the module
//!   loader, the contribution registry and the lifecycle manager.
//!
//! # Invariants
//! - Providers for one name are discovered in registration order.
//! - Registering a provider makes its interface name resolvable.

use crate::module::Activator;
use crate::registry::service::{BoxError, Service};
use log::debug;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Creates one service instance.
pub type ServiceFactory = Arc<dyn Fn() -> Result<Box<dyn Service>, BoxError> + Send + Sync>;

/// Creates one module activator instance.
pub type ActivatorFactory = Arc<dyn Fn() -> Result<Box<dyn Activator>, BoxError> + Send + Sync>;

/// Resolved type description.
#[derive(Clone)]
pub struct ServiceType {
    name: String,
    factory: Option<ServiceFactory>,
    resource: bool,
}

impl ServiceType {
    /// Abstract type: only instantiable through discovered providers.
    pub fn interface(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            factory: None,
            resource: false,
        }
    }

    /// Concrete type that can be instantiated on request but is not created
    /// implicitly by a registry lookup.
    pub fn concrete(name: impl Into<String>, factory: ServiceFactory) -> Self {
        Self {
            name: name.into(),
            factory: Some(factory),
            resource: false,
        }
    }

    /// Concrete type the registry may create on first lookup.
    pub fn resource(name: impl Into<String>, factory: ServiceFactory) -> Self {
        Self {
            name: name.into(),
            factory: Some(factory),
            resource: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_interface(&self) -> bool {
        self.factory.is_none()
    }

    pub fn is_resource(&self) -> bool {
        self.resource
    }

    pub fn factory(&self) -> Option<&ServiceFactory> {
        self.factory.as_ref()
    }
}

impl Debug for ServiceType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceType")
            .field("name", &self.name)
            .field("interface", &self.is_interface())
            .field("resource", &self.resource)
            .finish()
    }
}

/// Type-and-provider resolver collaborator.
pub trait TypeResolver: Send + Sync {
    fn load_type(&self, name: &str) -> Option<ServiceType>;
    fn discover_providers(&self, service_type: &ServiceType) -> Vec<ServiceFactory>;
    fn load_activator(&self, name: &str) -> Option<ActivatorFactory>;
}

#[derive(Default)]
struct CatalogState {
    types: HashMap<String, ServiceType>,
    providers: HashMap<String, Vec<ServiceFactory>>,
    activators: HashMap<String, ActivatorFactory>,
}

/// Thread-safe in-process `TypeResolver`.
#[derive(Default)]
pub struct TypeCatalog {
    state: RwLock<CatalogState>,
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an abstract name that providers may implement.
    pub fn add_interface(&self, name: impl Into<String>) {
        let name = name.into();
        debug!("event=catalog_add module=catalog kind=interface name={name}");
        self.state
            .write()
            .types
            .insert(name.clone(), ServiceType::interface(name));
    }

    /// Declares a concrete, non-resource type.
    pub fn add_type<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Box<dyn Service>, BoxError> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!("event=catalog_add module=catalog kind=type name={name}");
        self.state
            .write()
            .types
            .insert(name.clone(), ServiceType::concrete(name, Arc::new(factory)));
    }

    /// Declares a concrete type the registry creates on first lookup.
    pub fn add_resource<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Box<dyn Service>, BoxError> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!("event=catalog_add module=catalog kind=resource name={name}");
        self.state
            .write()
            .types
            .insert(name.clone(), ServiceType::resource(name, Arc::new(factory)));
    }

    /// Appends one provider implementation for `interface`.
    pub fn add_provider<F>(&self, interface: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Box<dyn Service>, BoxError> + Send + Sync + 'static,
    {
        let interface = interface.into();
        debug!("event=catalog_add module=catalog kind=provider name={interface}");
        let mut state = self.state.write();
        state
            .types
            .entry(interface.clone())
            .or_insert_with(|| ServiceType::interface(interface.clone()));
        state
            .providers
            .entry(interface)
            .or_default()
            .push(Arc::new(factory));
    }

    /// Declares a module activator type.
    pub fn add_activator<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Box<dyn Activator>, BoxError> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!("event=catalog_add module=catalog kind=activator name={name}");
        self.state.write().activators.insert(name, Arc::new(factory));
    }
}

impl TypeResolver for TypeCatalog {
    fn load_type(&self, name: &str) -> Option<ServiceType> {
        self.state.read().types.get(name).cloned()
    }

    fn discover_providers(&self, service_type: &ServiceType) -> Vec<ServiceFactory> {
        self.state
            .read()
            .providers
            .get(service_type.name())
            .cloned()
            .unwrap_or_default()
    }

    fn load_activator(&self, name: &str) -> Option<ActivatorFactory> {
        self.state.read().activators.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::{TypeCatalog, TypeResolver};
    use crate::registry::service::Service;

    struct Impl(u8);
    impl Service for Impl {}

    #[test]
    fn providers_keep_registration_order() {
        let catalog = TypeCatalog::new();
        catalog.add_provider("svc.Api", || Ok(Box::new(Impl(1))));
        catalog.add_provider("svc.Api", || Ok(Box::new(Impl(2))));

        let service_type = catalog.load_type("svc.Api").expect("interface registered");
        assert!(service_type.is_interface());
        assert_eq!(catalog.discover_providers(&service_type).len(), 2);
    }

    #[test]
    fn resource_and_concrete_types_are_distinguished() {
        let catalog = TypeCatalog::new();
        catalog.add_resource("svc.Resource", || Ok(Box::new(Impl(0))));
        catalog.add_type("svc.Plain", || Ok(Box::new(Impl(0))));

        assert!(catalog.load_type("svc.Resource").expect("resource").is_resource());
        let plain = catalog.load_type("svc.Plain").expect("plain");
        assert!(!plain.is_resource());
        assert!(!plain.is_interface());
        assert!(catalog.load_type("svc.Missing").is_none());
    }
}
