//! Ordered startup and shutdown of top-level components.
//!
//! # Responsibility
//! - Instantiate configured components, skipping platform-restricted ones.
//! - Run start hooks in configuration order and stop hooks in reverse.
//! - Isolate per-component failures when an error sink is configured.
//!
//! # Invariants
//! - "started" is an ordered sub-sequence of "instantiated".
//! - Only started components are stopped, in exact reverse start order.
//! - `start` and `stop` each run at most once.

use crate::platform::Platform;
use crate::registry::{BoxError, Injector, RegistryError, Service, TypeResolver};
use log::{debug, error, info};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// Receiver of per-component failures.
pub trait ErrorSink: Send + Sync {
    fn report(&self, name: &str, error: &dyn Error);
}

impl<F> ErrorSink for F
where
    F: Fn(&str, &dyn Error) + Send + Sync,
{
    fn report(&self, name: &str, error: &dyn Error) {
        self(name, error)
    }
}

#[derive(Debug)]
pub enum LifecycleError {
    /// `start`/`stop` called in the wrong manager state.
    Usage(&'static str),
    /// An entry is malformed.
    Configuration(String),
    TypeNotFound(String),
    NotInstantiable(String),
    Instantiation { name: String, source: BoxError },
    Injection { name: String, source: RegistryError },
    Start { name: String, source: BoxError },
    Stop { name: String, source: BoxError },
}

impl Display for LifecycleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Usage(message) => write!(f, "{message}"),
            Self::Configuration(message) => write!(f, "invalid lifecycle configuration: {message}"),
            Self::TypeNotFound(name) => write!(f, "unable to load lifecycle type `{name}`"),
            Self::NotInstantiable(name) => write!(f, "lifecycle type `{name}` is not instantiable"),
            Self::Instantiation { name, source } => {
                write!(f, "unable to create lifecycle `{name}`: {source}")
            }
            Self::Injection { name, source } => {
                write!(f, "unable to inject resources into lifecycle `{name}`: {source}")
            }
            Self::Start { name, source } => write!(f, "error starting lifecycle `{name}`: {source}"),
            Self::Stop { name, source } => write!(f, "error stopping lifecycle `{name}`: {source}"),
        }
    }
}

impl Error for LifecycleError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Instantiation { source, .. }
            | Self::Start { source, .. }
            | Self::Stop { source, .. } => Some(source.as_ref()),
            Self::Injection { source, .. } => Some(source),
            Self::Usage(_)
            | Self::Configuration(_)
            | Self::TypeNotFound(_)
            | Self::NotInstantiable(_) => None,
        }
    }
}

/// One configured component: `name[;restriction]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEntry {
    name: String,
    restriction: Option<String>,
}

impl LifecycleEntry {
    pub fn parse(raw: &str) -> Result<Self, LifecycleError> {
        let (name, restriction) = match raw.split_once(';') {
            Some((name, restriction)) => (name.trim(), Some(restriction.to_string())),
            None => (raw.trim(), None),
        };
        if name.is_empty() {
            return Err(LifecycleError::Configuration(format!(
                "empty lifecycle name in `{raw}`"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            restriction,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn restriction(&self) -> Option<&str> {
        self.restriction.as_deref()
    }

    pub fn applies_to(&self, platform: &Platform) -> bool {
        self.restriction
            .as_deref()
            .map_or(true, |expression| platform.matches(expression))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    NotStarted,
    Starting,
    Started,
    StartedWithFailures,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    Instantiated,
    Started,
    Stopped,
}

struct Component {
    name: String,
    instance: Box<dyn Service>,
    state: ComponentState,
}

/// Drives the configured components through start and stop.
pub struct LifecycleManager {
    entries: Vec<LifecycleEntry>,
    resolver: Arc<dyn TypeResolver>,
    injector: Option<Arc<dyn Injector>>,
    sink: Option<Arc<dyn ErrorSink>>,
    platform: Platform,
    state: LifecycleState,
    components: Vec<Component>,
    started: Vec<usize>,
}

impl LifecycleManager {
    /// Parses every entry up front; an empty name fails construction.
    pub fn new<I, S>(resolver: Arc<dyn TypeResolver>, entries: I) -> Result<Self, LifecycleError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries = entries
            .into_iter()
            .map(|entry| LifecycleEntry::parse(entry.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            entries,
            resolver,
            injector: None,
            sink: None,
            platform: Platform::current().clone(),
            state: LifecycleState::NotStarted,
            components: Vec::new(),
            started: Vec::new(),
        })
    }

    /// Injects declared dependencies into each component at instantiation.
    pub fn with_injector(mut self, injector: Arc<dyn Injector>) -> Self {
        self.injector = Some(injector);
        self
    }

    pub fn with_error_sink<F>(self, sink: F) -> Self
    where
        F: Fn(&str, &dyn Error) + Send + Sync + 'static,
    {
        self.with_sink(Arc::new(sink))
    }

    pub fn with_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Platform used to evaluate entry restrictions.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn entries(&self) -> &[LifecycleEntry] {
        &self.entries
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Names of instantiated components, in configuration order.
    pub fn instantiated(&self) -> Vec<&str> {
        self.components
            .iter()
            .map(|component| component.name.as_str())
            .collect()
    }

    /// Names of started components, in start order.
    pub fn started(&self) -> Vec<&str> {
        self.started
            .iter()
            .map(|index| self.components[*index].name.as_str())
            .collect()
    }

    pub fn component_state(&self, name: &str) -> Option<ComponentState> {
        self.components
            .iter()
            .find(|component| component.name == name)
            .map(|component| component.state)
    }

    /// Instantiates and starts every applicable component.
    ///
    /// Returns `Ok(false)` when some component failed and an error sink
    /// received the failure. Without a sink the first failure is returned.
    pub fn start(&mut self) -> Result<bool, LifecycleError> {
        if self.state != LifecycleState::NotStarted {
            return Err(LifecycleError::Usage("lifecycle already started"));
        }
        self.state = LifecycleState::Starting;
        info!(
            "event=lifecycle_start module=lifecycle status=start entries={}",
            self.entries.len()
        );

        let mut success = true;
        for index in 0..self.entries.len() {
            let entry = &self.entries[index];
            if !entry.applies_to(&self.platform) {
                debug!(
                    "event=lifecycle_skip module=lifecycle name={} restriction={}",
                    entry.name,
                    entry.restriction().unwrap_or_default()
                );
                continue;
            }

            let name = entry.name.clone();
            match self.instantiate(&name) {
                Ok(instance) => {
                    debug!("event=lifecycle_instantiate module=lifecycle status=ok name={name}");
                    self.components.push(Component {
                        name,
                        instance,
                        state: ComponentState::Instantiated,
                    });
                }
                Err(err) => {
                    success = false;
                    self.fail(&name, err)?;
                }
            }
        }

        for index in 0..self.components.len() {
            let component = &mut self.components[index];
            match component.instance.on_init() {
                Ok(()) => {
                    component.state = ComponentState::Started;
                    self.started.push(index);
                    debug!(
                        "event=lifecycle_component_start module=lifecycle status=ok name={}",
                        component.name
                    );
                }
                Err(source) => {
                    success = false;
                    let name = component.name.clone();
                    let err = LifecycleError::Start {
                        name: name.clone(),
                        source,
                    };
                    self.fail(&name, err)?;
                }
            }
        }

        self.state = if success {
            LifecycleState::Started
        } else {
            LifecycleState::StartedWithFailures
        };
        info!(
            "event=lifecycle_start module=lifecycle status={} started={}",
            if success { "ok" } else { "partial" },
            self.started.len()
        );
        Ok(success)
    }

    /// Stops started components in reverse start order.
    ///
    /// Failures are reported per component; teardown always completes.
    pub fn stop(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            LifecycleState::Started | LifecycleState::StartedWithFailures => {}
            LifecycleState::NotStarted | LifecycleState::Starting => {
                return Err(LifecycleError::Usage("lifecycle never started"));
            }
            LifecycleState::Stopping | LifecycleState::Stopped => {
                return Err(LifecycleError::Usage("lifecycle already stopped"));
            }
        }
        self.state = LifecycleState::Stopping;
        info!(
            "event=lifecycle_stop module=lifecycle status=start started={}",
            self.started.len()
        );

        for index in self.started.iter().rev() {
            let component = &mut self.components[*index];
            let result = component.instance.on_shutdown();
            component.state = ComponentState::Stopped;
            if let Err(source) = result {
                let err = LifecycleError::Stop {
                    name: component.name.clone(),
                    source,
                };
                match &self.sink {
                    Some(sink) => sink.report(&component.name, &err),
                    None => error!(
                        "event=lifecycle_component_stop module=lifecycle status=error name={} error={err}",
                        component.name
                    ),
                }
            }
        }

        self.state = LifecycleState::Stopped;
        info!("event=lifecycle_stop module=lifecycle status=ok");
        Ok(())
    }

    fn instantiate(&self, name: &str) -> Result<Box<dyn Service>, LifecycleError> {
        let service_type = self
            .resolver
            .load_type(name)
            .ok_or_else(|| LifecycleError::TypeNotFound(name.to_string()))?;
        let factory = service_type
            .factory()
            .ok_or_else(|| LifecycleError::NotInstantiable(name.to_string()))?;
        let mut instance = factory().map_err(|source| LifecycleError::Instantiation {
            name: name.to_string(),
            source,
        })?;

        if let Some(injector) = &self.injector {
            injector
                .inject(instance.as_mut())
                .map_err(|source| LifecycleError::Injection {
                    name: name.to_string(),
                    source,
                })?;
        }
        Ok(instance)
    }

    fn fail(&mut self, name: &str, err: LifecycleError) -> Result<(), LifecycleError> {
        match &self.sink {
            Some(sink) => {
                sink.report(name, &err);
                Ok(())
            }
            None => {
                error!("event=lifecycle_component module=lifecycle status=error name={name} error={err}");
                self.state = LifecycleState::StartedWithFailures;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{LifecycleEntry, LifecycleError, LifecycleManager, LifecycleState};
    use crate::platform::Platform;
    use crate::registry::TypeCatalog;
    use std::sync::Arc;

    #[test]
    fn entry_splits_name_and_restriction() {
        let entry = LifecycleEntry::parse("svc.Native;osname=win32").expect("valid entry");
        assert_eq!(entry.name(), "svc.Native");
        assert_eq!(entry.restriction(), Some("osname=win32"));
        assert!(entry.applies_to(&Platform::new("windows", "x86_64")));
        assert!(!entry.applies_to(&Platform::new("linux", "x86_64")));
    }

    #[test]
    fn empty_name_is_configuration_error() {
        assert!(matches!(
            LifecycleEntry::parse(";osname=linux"),
            Err(LifecycleError::Configuration(_))
        ));
        let result = LifecycleManager::new(Arc::new(TypeCatalog::new()), ["svc.A", ""]);
        assert!(matches!(result, Err(LifecycleError::Configuration(_))));
    }

    #[test]
    fn stop_before_start_is_usage_error() {
        let mut manager = LifecycleManager::new(Arc::new(TypeCatalog::new()), Vec::<String>::new())
            .expect("empty lifecycle");
        assert!(matches!(manager.stop(), Err(LifecycleError::Usage(_))));
        assert!(manager.start().expect("empty start"));
        assert!(matches!(manager.start(), Err(LifecycleError::Usage(_))));
        manager.stop().expect("first stop");
        assert!(matches!(manager.stop(), Err(LifecycleError::Usage(_))));
        assert_eq!(manager.state(), LifecycleState::Stopped);
    }

    #[test]
    fn missing_type_without_sink_fails_fast() {
        let mut manager = LifecycleManager::new(Arc::new(TypeCatalog::new()), ["svc.Missing"])
            .expect("valid entries");
        assert!(matches!(
            manager.start(),
            Err(LifecycleError::TypeNotFound(name)) if name == "svc.Missing"
        ));
        assert_eq!(manager.state(), LifecycleState::StartedWithFailures);
        manager.stop().expect("partially started lifecycle can stop");
    }
}
