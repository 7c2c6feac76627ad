//! Pipeline configuration.
//!
//! Loaded from an optional `dbt-flow.toml`; the CLI layers flags and
//! environment variables on top.

use std::path::{Path, PathBuf};

use flow_core::{ServiceConfig, DEFAULT_NAMESPACE, LOCAL_TARGET};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};

/// Config file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "dbt-flow.toml";

/// Which `DockerActivities` implementation a worker registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Backend {
    #[default]
    CloudBuild,
    Docker,
}

impl std::str::FromStr for Backend {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cloud-build" => Ok(Self::CloudBuild),
            "docker" => Ok(Self::Docker),
            other => Err(PipelineError::InvalidConfig(format!(
                "unknown backend '{}' (expected cloud-build or docker)",
                other
            ))),
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CloudBuild => write!(f, "cloud-build"),
            Self::Docker => write!(f, "docker"),
        }
    }
}

/// Durable-execution service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalSettings {
    pub target: String,
    pub namespace: String,
    /// Namespaces registered on the local service
    pub namespaces: Vec<String>,
    pub history_dir: Option<PathBuf>,
}

impl Default for TemporalSettings {
    fn default() -> Self {
        Self {
            target: LOCAL_TARGET.to_string(),
            namespace: String::new(),
            namespaces: vec![DEFAULT_NAMESPACE.to_string()],
            history_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpSettings {
    pub project_id: String,
    pub access_token: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptSettings {
    /// Program and arguments run by the script step
    pub command: Vec<String>,
    pub working_dir: Option<PathBuf>,
}

/// Full pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub temporal: TemporalSettings,
    pub gcp: GcpSettings,
    /// Directory packaged as the build context
    pub source_dir: PathBuf,
    pub backend: Backend,
    pub script: ScriptSettings,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            temporal: TemporalSettings::default(),
            gcp: GcpSettings::default(),
            source_dir: PathBuf::from("."),
            backend: Backend::default(),
            script: ScriptSettings::default(),
        }
    }
}

impl FlowConfig {
    /// Parse a TOML document.
    pub fn from_toml(content: &str, path: &Path) -> PipelineResult<Self> {
        toml::from_str(content).map_err(|e| PipelineError::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load `path`, or `dbt-flow.toml` from the working directory if present.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> PipelineResult<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(CONFIG_FILE_NAME), false),
        };

        if !path.exists() {
            if required {
                return Err(PipelineError::InvalidConfig(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            debug!("No {} found, using defaults", CONFIG_FILE_NAME);
            return Ok(Self::default());
        }

        debug!("Loading configuration from {}", path.display());
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml(&content, &path)
    }

    /// Check the settings activities depend on.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.gcp.project_id.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "GCP project id is empty (set gcp.project_id or GCP_PROJECT_ID)".to_string(),
            ));
        }
        if self.backend == Backend::CloudBuild && self.gcp.access_token.is_none() {
            return Err(PipelineError::InvalidConfig(
                "the cloud-build backend needs an access token (set GCP_ACCESS_TOKEN)".to_string(),
            ));
        }
        if !self.source_dir.is_dir() {
            return Err(PipelineError::InvalidConfig(format!(
                "source directory not found: {}",
                self.source_dir.display()
            )));
        }
        Ok(())
    }

    /// Connection settings for the execution service.
    pub fn service_config(&self) -> ServiceConfig {
        let mut config = ServiceConfig::new(&self.temporal.target, &self.temporal.namespace);
        config.namespaces = self.temporal.namespaces.clone();
        if let Some(dir) = &self.temporal.history_dir {
            config = config.history_dir(dir);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = FlowConfig::default();
        assert_eq!(config.temporal.target, "local");
        assert!(config.temporal.namespace.is_empty());
        assert_eq!(config.backend, Backend::CloudBuild);
        assert_eq!(config.service_config().effective_namespace(), "default");
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = FlowConfig::from_toml(
            r#"
            source_dir = "jaffle_shop"
            backend = "docker"

            [temporal]
            namespace = "analytics"
            namespaces = ["default", "analytics"]

            [gcp]
            project_id = "p1"

            [script]
            command = ["python", "workflow.py"]
            "#,
            Path::new("dbt-flow.toml"),
        )
        .unwrap();

        assert_eq!(config.source_dir, PathBuf::from("jaffle_shop"));
        assert_eq!(config.backend, Backend::Docker);
        assert_eq!(config.temporal.target, "local");
        assert_eq!(config.temporal.namespace, "analytics");
        assert_eq!(config.gcp.project_id, "p1");
        assert_eq!(config.script.command, vec!["python", "workflow.py"]);
        assert_eq!(config.service_config().effective_namespace(), "analytics");
    }

    #[test]
    fn test_invalid_toml_reports_path() {
        let err = FlowConfig::from_toml("backend = 3", Path::new("custom.toml")).unwrap_err();
        assert!(err.to_string().contains("custom.toml"));
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(FlowConfig::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dbt-flow.toml");
        std::fs::write(&path, "[gcp]\nproject_id = \"p1\"\n").unwrap();
        assert_eq!(FlowConfig::load(Some(&path)).unwrap().gcp.project_id, "p1");
    }

    #[test]
    fn test_validate_rejects_empty_project() {
        let dir = TempDir::new().unwrap();
        let mut config = FlowConfig {
            source_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        config.gcp.access_token = Some("token".to_string());

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("project id"));

        config.gcp.project_id = "p1".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_docker_backend_without_token() {
        let dir = TempDir::new().unwrap();
        let mut config = FlowConfig {
            source_dir: dir.path().to_path_buf(),
            backend: Backend::Docker,
            ..Default::default()
        };
        config.gcp.project_id = "p1".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("docker".parse::<Backend>().unwrap(), Backend::Docker);
        assert_eq!("cloud-build".parse::<Backend>().unwrap(), Backend::CloudBuild);
        assert!("podman".parse::<Backend>().is_err());
    }
}
