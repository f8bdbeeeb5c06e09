//! Runtime configuration loaded from TOML.
//!
//! # Responsibility
//! - Deserialize `RuntimeConfig` with defaults for every field.
//! - Merge extra property files and expand `{property}` references.
//!
//! # Invariants
//! - Unknown properties expand to the empty string.
//! - An unterminated `{` is an error, never silently kept.
//! - Later property files override earlier ones and inline properties.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONF_DIR: &str = "config";
pub const DEFAULT_LIB_DIR: &str = ".lib";

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: io::Error },
    Parse {
        path: Option<PathBuf>,
        source: toml::de::Error,
    },
    /// A property file holds a value that is not a string, number or bool.
    InvalidProperty { path: PathBuf, key: String },
    /// A `{` without matching `}`.
    Interpolation(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "unable to read `{}`: {source}", path.display())
            }
            Self::Parse {
                path: Some(path),
                source,
            } => write!(f, "invalid configuration `{}`: {source}", path.display()),
            Self::Parse { path: None, source } => write!(f, "invalid configuration: {source}"),
            Self::InvalidProperty { path, key } => write!(
                f,
                "property `{key}` in `{}` must be a scalar value",
                path.display()
            ),
            Self::Interpolation(input) => write!(f, "bad configuration string: {input}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::InvalidProperty { .. } | Self::Interpolation(_) => None,
        }
    }
}

/// Launcher and runtime settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub conf_dir: PathBuf,
    /// Scratch directory for extracted native resources and code paths.
    pub lib_dir: PathBuf,
    pub log_level: Option<String>,
    pub log_dir: Option<PathBuf>,
    /// Module locations to install and start, in order.
    pub modules: Vec<String>,
    /// Lifecycle entries in `name[;restriction]` form.
    pub start_components: Vec<String>,
    pub properties: BTreeMap<String, String>,
    pub properties_files: Vec<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            conf_dir: PathBuf::from(DEFAULT_CONF_DIR),
            lib_dir: PathBuf::from(DEFAULT_LIB_DIR),
            log_level: None,
            log_dir: None,
            modules: Vec::new(),
            start_components: Vec::new(),
            properties: BTreeMap::new(),
            properties_files: Vec::new(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse { path: None, source })
    }

    /// Reads a configuration file and merges its property files.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })?;
        config.import_properties()?;
        Ok(config)
    }

    /// Merges every `properties_files` entry into `properties`.
    pub fn import_properties(&mut self) -> Result<(), ConfigError> {
        for entry in self.properties_files.clone() {
            let path = PathBuf::from(interpolate(&entry, &self.properties)?);
            let imported = read_properties_file(&path)?;
            self.properties.extend(imported);
        }
        Ok(())
    }

    /// Module locations with properties expanded.
    pub fn resolved_modules(&self) -> Result<Vec<String>, ConfigError> {
        self.expand_all(&self.modules)
    }

    /// Lifecycle entries with properties expanded; empty items are kept so
    /// the lifecycle can reject them.
    pub fn resolved_start_components(&self) -> Result<Vec<String>, ConfigError> {
        self.expand_all(&self.start_components)
    }

    fn expand_all(&self, values: &[String]) -> Result<Vec<String>, ConfigError> {
        values
            .iter()
            .map(|value| interpolate(value, &self.properties))
            .collect()
    }
}

/// Replaces each `{name}` with the named property.
pub fn interpolate(input: &str, properties: &BTreeMap<String, String>) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('{') {
        result.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find('}')
            .ok_or_else(|| ConfigError::Interpolation(input.to_string()))?;
        let key = &after[..end];
        if let Some(value) = properties.get(key) {
            result.push_str(value);
        }
        rest = &after[end + 1..];
    }
    result.push_str(rest);
    Ok(result)
}

fn read_properties_file(path: &Path) -> Result<BTreeMap<String, String>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let table: toml::Table = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: Some(path.to_path_buf()),
        source,
    })?;

    let mut properties = BTreeMap::new();
    for (key, value) in table {
        let value = match value {
            toml::Value::String(value) => value,
            toml::Value::Integer(value) => value.to_string(),
            toml::Value::Float(value) => value.to_string(),
            toml::Value::Boolean(value) => value.to_string(),
            _ => {
                return Err(ConfigError::InvalidProperty {
                    path: path.to_path_buf(),
                    key,
                })
            }
        };
        properties.insert(key, value);
    }
    Ok(properties)
}

#[cfg(test)]
mod tests {
    use super::{interpolate, ConfigError, RuntimeConfig};
    use std::collections::BTreeMap;
    use std::fs;
    use std::path::PathBuf;

    fn properties() -> BTreeMap<String, String> {
        BTreeMap::from([("home".to_string(), "/opt/app".to_string())])
    }

    #[test]
    fn interpolate_expands_known_and_blanks_unknown() {
        assert_eq!(
            interpolate("{home}/modules/{missing}x", &properties()).expect("valid input"),
            "/opt/app/modules/x"
        );
        assert_eq!(interpolate("plain", &properties()).expect("plain"), "plain");
    }

    #[test]
    fn interpolate_rejects_unterminated_brace() {
        let err = interpolate("{home/modules", &properties()).expect_err("must fail");
        assert!(matches!(err, ConfigError::Interpolation(_)));
    }

    #[test]
    fn defaults_apply_to_missing_fields() {
        let config = RuntimeConfig::from_toml_str("modules = [\"a\"]").expect("valid toml");
        assert_eq!(config.conf_dir, PathBuf::from("config"));
        assert_eq!(config.lib_dir, PathBuf::from(".lib"));
        assert_eq!(config.modules, vec!["a".to_string()]);
        assert!(config.start_components.is_empty());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(matches!(
            RuntimeConfig::from_toml_str("unknown = 1"),
            Err(ConfigError::Parse { path: None, .. })
        ));
    }

    #[test]
    fn load_merges_property_files_in_order() {
        let dir = tempfile::tempdir().expect("temp dir");
        let extra = dir.path().join("extra.toml");
        fs::write(&extra, "home = \"/srv\"\nport = 8080\n").expect("write extra");

        let config_path = dir.path().join("appup.toml");
        fs::write(
            &config_path,
            format!(
                "modules = [\"{{home}}/m\"]\nproperties_files = [\"{{dir}}/extra.toml\"]\n\n[properties]\nhome = \"/opt\"\ndir = \"{}\"\n",
                dir.path().display()
            ),
        )
        .expect("write config");

        let config = RuntimeConfig::load(&config_path).expect("config loads");
        assert_eq!(config.properties.get("port").map(String::as_str), Some("8080"));
        assert_eq!(
            config.resolved_modules().expect("modules expand"),
            vec!["/srv/m".to_string()]
        );
    }
}
