//! Runtime bootstrap: wires registries, modules and lifecycle together.
//!
//! # Responsibility
//! - Build the scratch directory, service registry and contribution
//!   registry from a `RuntimeConfig`.
//! - Install and start configured modules, then start the lifecycle.
//! - Tear everything down in reverse and track the process exit code.
//!
//! # Invariants
//! - The contribution registry is bound before any module installs.
//! - A failed `start` tears down whatever was already started.
//! - The first non-zero exit request wins.

use crate::config::{ConfigError, RuntimeConfig};
use crate::contrib::{ContribRegistry, CONTRIB_REGISTRY_NAME};
use crate::lifecycle::{LifecycleError, LifecycleManager};
use crate::module::{ModuleError, ModuleLoader, ScratchDir};
use crate::platform::Platform;
use crate::registry::{Injector, ServiceHandle, ServiceRegistry, TypeResolver};
use log::{error, info, warn};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

pub const PROP_START_TIME: &str = "appup.start_time";
pub const PROP_CONF_DIR: &str = "appup.conf_dir";
pub const PROP_LIB_DIR: &str = "appup.lib_dir";
pub const PROP_OS: &str = "appup.os";
pub const PROP_ARCH: &str = "appup.arch";

#[derive(Debug)]
pub enum RuntimeError {
    /// `start`/`stop` called in the wrong state.
    Usage(&'static str),
    Config(ConfigError),
    Io { path: PathBuf, source: io::Error },
    Module(ModuleError),
    Lifecycle(LifecycleError),
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Usage(message) => write!(f, "{message}"),
            Self::Config(err) => write!(f, "{err}"),
            Self::Io { path, source } => write!(f, "runtime i/o failure at `{}`: {source}", path.display()),
            Self::Module(err) => write!(f, "{err}"),
            Self::Lifecycle(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RuntimeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Usage(_) => None,
            Self::Config(err) => Some(err),
            Self::Io { source, .. } => Some(source),
            Self::Module(err) => Some(err),
            Self::Lifecycle(err) => Some(err),
        }
    }
}

impl From<ConfigError> for RuntimeError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<ModuleError> for RuntimeError {
    fn from(value: ModuleError) -> Self {
        Self::Module(value)
    }
}

impl From<LifecycleError> for RuntimeError {
    fn from(value: LifecycleError) -> Self {
        Self::Lifecycle(value)
    }
}

/// Process exit code shared by everything that can fail the run.
#[derive(Debug, Clone, Default)]
pub struct ExitStatus {
    code: Arc<AtomicI32>,
}

impl ExitStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `code`; zero and any request after the first non-zero one are
    /// ignored.
    pub fn request(&self, code: i32) {
        if code == 0 {
            return;
        }
        if let Err(existing) = self
            .code
            .compare_exchange(0, code, Ordering::SeqCst, Ordering::SeqCst)
        {
            error!(
                "event=exit_request module=runtime status=ignored existing={existing} requested={code}"
            );
        }
    }

    pub fn code(&self) -> i32 {
        self.code.load(Ordering::SeqCst)
    }
}

struct Running {
    scratch: Arc<ScratchDir>,
    registry: Arc<ServiceRegistry>,
    contrib: Arc<ContribRegistry>,
    loader: ModuleLoader,
    lifecycle: Option<LifecycleManager>,
}

/// Embeddable runtime instance.
pub struct Runtime {
    config: RuntimeConfig,
    resolver: Arc<dyn TypeResolver>,
    exit: ExitStatus,
    properties: BTreeMap<String, String>,
    running: Option<Running>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig, resolver: Arc<dyn TypeResolver>) -> Self {
        Self {
            config,
            resolver,
            exit: ExitStatus::new(),
            properties: BTreeMap::new(),
            running: None,
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn exit_status(&self) -> &ExitStatus {
        &self.exit
    }

    /// Effective properties, including the `appup.*` entries recorded at start.
    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn registry(&self) -> Option<&Arc<ServiceRegistry>> {
        self.running.as_ref().map(|running| &running.registry)
    }

    pub fn contrib(&self) -> Option<&Arc<ContribRegistry>> {
        self.running.as_ref().map(|running| &running.contrib)
    }

    pub fn loader(&self) -> Option<&ModuleLoader> {
        self.running.as_ref().map(|running| &running.loader)
    }

    pub fn lifecycle(&self) -> Option<&LifecycleManager> {
        self.running
            .as_ref()
            .and_then(|running| running.lifecycle.as_ref())
    }

    pub fn start(&mut self) -> Result<(), RuntimeError> {
        if self.running.is_some() {
            return Err(RuntimeError::Usage("runtime already started"));
        }
        info!("event=runtime_start module=runtime status=start");

        let result = self.start_inner();
        match &result {
            Ok(()) => info!(
                "event=runtime_start module=runtime status=ok exit_code={}",
                self.exit.code()
            ),
            Err(err) => {
                error!("event=runtime_start module=runtime status=error error={err}");
                self.exit.request(1);
                self.shutdown();
            }
        }
        result
    }

    pub fn stop(&mut self) -> Result<(), RuntimeError> {
        if self.running.is_none() {
            return Err(RuntimeError::Usage("runtime not started"));
        }
        self.shutdown();
        Ok(())
    }

    /// Starts and stops the runtime, returning the process exit code.
    pub fn run(&mut self) -> i32 {
        if self.start().is_ok() {
            self.shutdown();
        }
        self.exit.code()
    }

    fn start_inner(&mut self) -> Result<(), RuntimeError> {
        self.properties = self.runtime_properties()?;

        let scratch = Arc::new(ScratchDir::new(&self.config.lib_dir).map_err(|source| {
            RuntimeError::Io {
                path: self.config.lib_dir.clone(),
                source,
            }
        })?);
        self.properties.insert(
            PROP_LIB_DIR.to_string(),
            scratch.path().display().to_string(),
        );

        let registry = Arc::new(ServiceRegistry::new(Arc::clone(&self.resolver)));
        let contrib = Arc::new(ContribRegistry::new());
        let contrib_handle: ServiceHandle = contrib.clone();
        registry.bind(CONTRIB_REGISTRY_NAME, contrib_handle);

        let loader = ModuleLoader::new(
            Arc::clone(&self.resolver),
            Arc::clone(&registry),
            Arc::clone(&contrib),
            Arc::clone(&scratch),
        )
        .with_properties(self.properties.clone());
        let running = self.running.insert(Running {
            scratch,
            registry,
            contrib,
            loader,
            lifecycle: None,
        });

        let modules = self.config.resolved_modules()?;
        for module in &modules {
            running.loader.install(module)?;
        }
        for module in &modules {
            running.loader.start(module)?;
        }

        let exit = self.exit.clone();
        let injector: Arc<dyn Injector> = running.registry.clone();
        let lifecycle = running.lifecycle.insert(
            LifecycleManager::new(
                Arc::clone(&self.resolver),
                self.config.resolved_start_components()?,
            )?
            .with_injector(injector)
            .with_error_sink(move |name, err| {
                error!(
                    "event=lifecycle_component module=runtime status=error name={name} error={err}"
                );
                exit.request(1);
            }),
        );
        if !lifecycle.start()? {
            warn!("event=runtime_start module=runtime status=warn reason=lifecycle_failures");
            self.exit.request(1);
        }
        Ok(())
    }

    fn runtime_properties(&self) -> Result<BTreeMap<String, String>, RuntimeError> {
        let conf_dir = std::path::absolute(&self.config.conf_dir).map_err(|source| {
            RuntimeError::Io {
                path: self.config.conf_dir.clone(),
                source,
            }
        })?;
        let conf_dir = std::fs::canonicalize(&conf_dir).unwrap_or(conf_dir);
        let start_time = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        let platform = Platform::current();

        let mut properties = self.config.properties.clone();
        properties.insert(PROP_START_TIME.to_string(), start_time.to_string());
        properties.insert(PROP_CONF_DIR.to_string(), conf_dir.display().to_string());
        properties.insert(PROP_OS.to_string(), platform.os().to_string());
        properties.insert(PROP_ARCH.to_string(), platform.arch().to_string());
        Ok(properties)
    }

    fn shutdown(&mut self) {
        let Some(mut running) = self.running.take() else {
            return;
        };
        info!("event=runtime_stop module=runtime status=start");

        if let Some(lifecycle) = running.lifecycle.as_mut() {
            if let Err(err) = lifecycle.stop() {
                error!("event=runtime_stop module=runtime status=error stage=lifecycle error={err}");
                self.exit.request(1);
            }
        }
        if !running.loader.stop_all().is_empty() {
            self.exit.request(1);
        }
        running.registry.close();
        running.scratch.cleanup();
        info!(
            "event=runtime_stop module=runtime status=ok exit_code={}",
            self.exit.code()
        );
    }
}
