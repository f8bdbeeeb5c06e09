//! Concurrent name-to-service registry with lazy creation.
//!
//! # Responsibility
//! - Map logical names to ordered registrations of shared instances.
//! - Create missing services on first lookup, wiring their dependencies.
//! - Notify listeners about bind/unbind of a name.
//!
//! # Invariants
//! - Lock order is creation lock, then table lock. The table lock is never
//!   held while calling lookups, factories, hooks or listeners.
//! - Instances become visible by name only after injection and `on_init`
//!   completed for every instance created for that name. A failed creation
//!   binds nothing.
//! - Bind/unbind of a name reach listeners in table order, since both run
//!   under the creation lock.
//!
//! The creation lock is global: a construction that never returns blocks
//! every lookup that needs creation, for any name. There is no timeout.

use crate::registry::catalog::{ServiceFactory, TypeResolver};
use crate::registry::error::{RegistryError, RegistryResult};
use crate::registry::service::{BoxError, Dependency, Injector, Service, ServiceHandle};
use log::{debug, error, warn};
use parking_lot::{Mutex, ReentrantMutex};
use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Formatter};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Bound (name, instance) pair.
#[derive(Clone)]
pub struct Registration {
    name: String,
    instance: ServiceHandle,
    sequence: u64,
}

impl Registration {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instance(&self) -> &ServiceHandle {
        &self.instance
    }

    /// Typed view of the instance, if it has type `T`.
    pub fn downcast<T: Service>(&self) -> Option<Arc<T>> {
        crate::registry::service::downcast(&self.instance)
    }

    /// Reference equality of the bound instances.
    pub fn same_instance(&self, other: &Registration) -> bool {
        Arc::ptr_eq(&self.instance, &other.instance)
    }
}

impl Debug for Registration {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name, self.instance.type_name())
    }
}

/// Change notification delivered to listeners of a name.
#[derive(Debug, Clone)]
pub enum NamingEvent {
    Added(Registration),
    Removed(Registration),
}

impl NamingEvent {
    pub fn registration(&self) -> &Registration {
        match self {
            Self::Added(registration) | Self::Removed(registration) => registration,
        }
    }

    pub fn is_added(&self) -> bool {
        matches!(self, Self::Added(_))
    }
}

/// Handle returned by `add_listener`, used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&NamingEvent) + Send + Sync>;

/// Names being resolved on one call chain, outermost first.
///
/// Built by the outermost lookup and passed down through recursive
/// dependency resolution.
#[derive(Debug, Default)]
pub struct LookupContext {
    chain: Vec<String>,
}

impl LookupContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chain(&self) -> &[String] {
        &self.chain
    }

    fn enter(&mut self, name: &str) -> RegistryResult<()> {
        if self.chain.iter().any(|entry| entry == name) {
            let mut chain = self.chain.clone();
            chain.push(name.to_string());
            return Err(RegistryError::Cycle {
                name: name.to_string(),
                chain,
            });
        }
        self.chain.push(name.to_string());
        Ok(())
    }

    fn leave(&mut self, name: &str) {
        if let Some(index) = self.chain.iter().rposition(|entry| entry == name) {
            self.chain.remove(index);
        }
    }
}

/// Process-wide service registry. Share it through `Arc`.
pub struct ServiceRegistry {
    resolver: Arc<dyn TypeResolver>,
    creation: ReentrantMutex<()>,
    table: Mutex<HashMap<String, Vec<Registration>>>,
    listeners: Mutex<HashMap<String, Vec<(ListenerId, Listener)>>>,
    next_sequence: AtomicU64,
    next_listener: AtomicU64,
}

impl ServiceRegistry {
    pub fn new(resolver: Arc<dyn TypeResolver>) -> Self {
        Self {
            resolver,
            creation: ReentrantMutex::new(()),
            table: Mutex::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
            next_sequence: AtomicU64::new(0),
            next_listener: AtomicU64::new(0),
        }
    }

    /// Returns the first instance bound under `name`, creating it if needed.
    pub fn lookup(&self, name: &str) -> RegistryResult<ServiceHandle> {
        self.lookup_all(name)?
            .into_iter()
            .next()
            .map(|registration| registration.instance)
            .ok_or_else(|| RegistryError::NameNotFound(name.to_string()))
    }

    /// Returns every registration of `name`, creating them if needed.
    pub fn lookup_all(&self, name: &str) -> RegistryResult<Vec<Registration>> {
        self.lookup_in(&mut LookupContext::new(), name)
    }

    /// Lookup continuing an existing resolution chain.
    pub fn lookup_in(
        &self,
        context: &mut LookupContext,
        name: &str,
    ) -> RegistryResult<Vec<Registration>> {
        debug!("event=service_lookup module=registry name={name}");
        if let Some(found) = self.registered(name) {
            return Ok(found);
        }

        context.enter(name)?;
        let result = self.create(context, name);
        context.leave(name);
        result
    }

    /// Forces resolution of `name` and returns its current registrations.
    pub fn list_bindings(&self, name: &str) -> RegistryResult<Vec<Registration>> {
        // No lock may be held here: the lookup can take the creation lock.
        self.lookup_all(name)?;

        let table = self.table.lock();
        match table.get(name) {
            Some(registrations) if !registrations.is_empty() => Ok(registrations.clone()),
            _ => Err(RegistryError::NameNotFound(name.to_string())),
        }
    }

    /// Appends a registration for `name` and notifies its listeners.
    pub fn bind(&self, name: &str, instance: ServiceHandle) -> Registration {
        debug!("event=service_bind module=registry name={name}");
        let _creation = self.creation.lock();

        let registration = self.registration(name, instance);
        self.publish(name, vec![registration.clone()]);
        registration
    }

    /// Removes every registration of `name` and returns them.
    pub fn unbind(&self, name: &str) -> Vec<Registration> {
        debug!("event=service_unbind module=registry name={name}");
        let _creation = self.creation.lock();

        let removed = self.table.lock().remove(name).unwrap_or_default();
        if removed.is_empty() {
            return removed;
        }
        if removed.len() > 1 {
            warn!(
                "event=service_unbind module=registry status=warn name={name} registrations={}",
                removed.len()
            );
        }

        self.notify(name, &NamingEvent::Removed(removed[0].clone()));
        removed
    }

    /// Registers a callback for bind/unbind events of `name`.
    pub fn add_listener<F>(&self, name: &str, listener: F) -> ListenerId
    where
        F: Fn(&NamingEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .entry(name.to_string())
            .or_default()
            .push((id, Arc::new(listener)));
        id
    }

    /// Removes a listener; returns false when it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        for entries in listeners.values_mut() {
            if let Some(index) = entries.iter().position(|(entry, _)| *entry == id) {
                entries.remove(index);
                return true;
            }
        }
        false
    }

    /// Names that currently have at least one registration.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .table
            .lock()
            .iter()
            .filter(|(_, registrations)| !registrations.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Drops every registration, running pre-destroy hooks newest first.
    pub fn close(&self) {
        debug!("event=registry_close module=registry status=start");
        let _creation = self.creation.lock();

        let mut drained: Vec<Registration> = self
            .table
            .lock()
            .drain()
            .flat_map(|(_, registrations)| registrations)
            .collect();
        drained.sort_by_key(|registration| std::cmp::Reverse(registration.sequence));

        let mut seen = HashSet::new();
        for registration in drained {
            let identity = Arc::as_ptr(&registration.instance) as *const () as usize;
            if !seen.insert(identity) {
                continue;
            }
            if let Err(err) = self.invoke_pre_destroy(registration.instance.as_ref()) {
                error!(
                    "event=registry_close module=registry status=error name={} error={err}",
                    registration.name
                );
            }
        }
        debug!("event=registry_close module=registry status=ok");
    }

    fn registered(&self, name: &str) -> Option<Vec<Registration>> {
        let table = self.table.lock();
        table
            .get(name)
            .filter(|registrations| !registrations.is_empty())
            .cloned()
    }

    fn create(&self, context: &mut LookupContext, name: &str) -> RegistryResult<Vec<Registration>> {
        let _creation = self.creation.lock();

        // Another thread may have finished while this one waited.
        if let Some(found) = self.registered(name) {
            return Ok(found);
        }

        let service_type = self
            .resolver
            .load_type(name)
            .ok_or_else(|| RegistryError::NameNotFound(name.to_string()))?;

        let providers = self.resolver.discover_providers(&service_type);
        let instances = if !providers.is_empty() {
            debug!(
                "event=service_create module=registry source=provider name={name} count={}",
                providers.len()
            );
            providers
                .iter()
                .map(|factory| self.prepare(context, name, factory))
                .collect::<RegistryResult<Vec<_>>>()?
        } else {
            match service_type.factory() {
                Some(factory) if service_type.is_resource() => {
                    debug!("event=service_create module=registry source=resource name={name}");
                    vec![self.prepare(context, name, factory)?]
                }
                _ => return Err(RegistryError::NameNotFound(name.to_string())),
            }
        };

        let registrations: Vec<Registration> = instances
            .into_iter()
            .map(|instance| self.registration(name, instance))
            .collect();
        self.publish(name, registrations.clone());
        Ok(registrations)
    }

    /// Builds, injects and initializes one instance without binding it.
    fn prepare(
        &self,
        context: &mut LookupContext,
        name: &str,
        factory: &ServiceFactory,
    ) -> RegistryResult<ServiceHandle> {
        let mut instance = factory().map_err(|source| instantiation(name, source))?;
        self.inject_in(context, name, instance.as_mut())?;
        instance
            .on_init()
            .map_err(|source| instantiation(name, source))?;
        Ok(Arc::from(instance))
    }

    fn registration(&self, name: &str, instance: ServiceHandle) -> Registration {
        Registration {
            name: name.to_string(),
            instance,
            sequence: self.next_sequence.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Appends `registrations` in one table update, then notifies listeners.
    /// Callers hold the creation lock.
    fn publish(&self, name: &str, registrations: Vec<Registration>) {
        self.table
            .lock()
            .entry(name.to_string())
            .or_default()
            .extend(registrations.iter().cloned());

        for registration in registrations {
            self.notify(name, &NamingEvent::Added(registration));
        }
    }

    fn inject_in(
        &self,
        context: &mut LookupContext,
        owner: &str,
        service: &mut dyn Service,
    ) -> RegistryResult<()> {
        for dependency in service.dependencies() {
            debug!(
                "event=service_inject module=registry owner={owner} slot={} name={}",
                dependency.slot, dependency.name
            );
            let resolved = self.resolve_dependency(context, owner, &dependency)?;
            service
                .inject(&dependency, resolved)
                .map_err(|source| RegistryError::Injection {
                    service: owner.to_string(),
                    dependency: dependency.name.clone(),
                    source,
                })?;
        }
        Ok(())
    }

    fn resolve_dependency(
        &self,
        context: &mut LookupContext,
        owner: &str,
        dependency: &Dependency,
    ) -> RegistryResult<ServiceHandle> {
        match self.lookup_in(context, &dependency.name) {
            Ok(registrations) => registrations
                .into_iter()
                .next()
                .map(|registration| registration.instance)
                .ok_or_else(|| RegistryError::NameNotFound(dependency.name.clone())),
            Err(err @ RegistryError::Cycle { .. }) => Err(err),
            Err(err) => Err(RegistryError::Injection {
                service: owner.to_string(),
                dependency: dependency.name.clone(),
                source: Box::new(err),
            }),
        }
    }

    fn notify(&self, name: &str, event: &NamingEvent) {
        let listeners: Vec<Listener> = match self.listeners.lock().get(name) {
            Some(entries) => entries.iter().map(|(_, listener)| Arc::clone(listener)).collect(),
            None => return,
        };
        for listener in listeners {
            listener(event);
        }
    }
}

impl Injector for ServiceRegistry {
    fn inject(&self, service: &mut dyn Service) -> RegistryResult<()> {
        let owner = service.type_name();
        self.inject_in(&mut LookupContext::new(), owner, service)
    }

    fn invoke_post_construct(&self, service: &mut dyn Service) -> RegistryResult<()> {
        let name = service.type_name();
        service
            .on_init()
            .map_err(|source| instantiation(name, source))
    }

    fn invoke_pre_destroy(&self, service: &dyn Service) -> RegistryResult<()> {
        service.on_shutdown().map_err(|source| RegistryError::Shutdown {
            name: service.type_name().to_string(),
            source,
        })
    }
}

fn instantiation(name: &str, source: BoxError) -> RegistryError {
    RegistryError::Instantiation {
        name: name.to_string(),
        source,
    }
}
