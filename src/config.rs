use std::{net::SocketAddr, path::Path, time::Duration};

use anyhow::Result;
use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};

const LOCAL_ENV: &str = "local";
const ENV_PREFIX: &str = "LANGHOST_";
pub const DEFAULT_PLUGIN_MANIFEST: &str = "plugins.yaml";
const DEFAULT_TERMINATION_GRACE_SECS: u64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TelemetryConfig {
    // Export spans over OTLP/gRPC.
    #[serde(default)]
    pub enable_tracing: bool,
    // OpenTelemetry collector grpc endpoint.
    // Defaults to OTEL_EXPORTER_OTLP_ENDPOINT or localhost:4317 if empty.
    #[serde(default)]
    pub endpoint: Option<String>,
}

/// How programs are launched and inspected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Interpreter used to launch programs, e.g. `node` or `python3`.
    /// When unset the program path is executed directly.
    #[serde(default)]
    pub interpreter: Option<String>,
    /// Arguments placed between the interpreter and the program path.
    #[serde(default)]
    pub interpreter_args: Vec<String>,
    /// File name of the plugin manifest looked up next to the program.
    #[serde(default = "default_plugin_manifest")]
    pub plugin_manifest: String,
    /// Upper bound on a single program execution. Unbounded when unset.
    #[serde(default)]
    pub run_timeout_secs: Option<u64>,
    /// Time between SIGTERM and SIGKILL when a run is cancelled.
    #[serde(default = "default_termination_grace_secs")]
    pub termination_grace_secs: u64,
}

fn default_plugin_manifest() -> String {
    DEFAULT_PLUGIN_MANIFEST.to_string()
}

fn default_termination_grace_secs() -> u64 {
    DEFAULT_TERMINATION_GRACE_SECS
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            interpreter: None,
            interpreter_args: Vec::new(),
            plugin_manifest: default_plugin_manifest(),
            run_timeout_secs: None,
            termination_grace_secs: default_termination_grace_secs(),
        }
    }
}

impl RuntimeConfig {
    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    pub fn termination_grace(&self) -> Duration {
        Duration::from_secs(self.termination_grace_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.plugin_manifest.trim().is_empty() {
            return Err(anyhow::anyhow!("plugin_manifest must not be empty"));
        }
        if self.termination_grace_secs == 0 {
            return Err(anyhow::anyhow!(
                "termination_grace_secs must be greater than zero"
            ));
        }
        if matches!(&self.interpreter, Some(interpreter) if interpreter.trim().is_empty()) {
            return Err(anyhow::anyhow!("interpreter must not be empty when set"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanghostConfig {
    /// Environment name (e.g., "local", "staging", "production").
    #[serde(default = "default_env")]
    pub env: String,
    /// Address the gRPC server binds to. Port 0 picks a free port, which is
    /// announced on stdout once bound.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

fn default_env() -> String {
    LOCAL_ENV.to_string()
}

fn default_listen_addr() -> String {
    "127.0.0.1:0".to_string()
}

impl Default for LanghostConfig {
    fn default() -> Self {
        LanghostConfig {
            env: default_env(),
            listen_addr: default_listen_addr(),
            telemetry: TelemetryConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl LanghostConfig {
    /// Defaults, overlaid by the YAML file at `path`, overlaid by
    /// `LANGHOST_*` environment variables.
    pub fn from_path(path: impl AsRef<Path>) -> Result<LanghostConfig> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(anyhow::anyhow!(
                "config file not found: {}",
                path.display()
            ));
        }
        let figment = Figment::from(Serialized::defaults(LanghostConfig::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(figment)
    }

    /// Defaults overlaid by `LANGHOST_*` environment variables only.
    pub fn from_env() -> Result<LanghostConfig> {
        let figment = Figment::from(Serialized::defaults(LanghostConfig::default()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));
        Self::extract(figment)
    }

    #[cfg(test)]
    fn from_yaml_str(config_str: &str) -> Result<LanghostConfig> {
        let figment = Figment::from(Serialized::defaults(LanghostConfig::default()))
            .merge(Yaml::string(config_str));
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<LanghostConfig> {
        let config: LanghostConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(anyhow::anyhow!(
                "invalid listen address: {}",
                self.listen_addr
            ));
        }
        self.runtime.validate()
    }

    pub fn structured_logging(&self) -> bool {
        self.env != LOCAL_ENV
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = LanghostConfig::default();
        assert_eq!(config.env, "local");
        assert_eq!(config.listen_addr, "127.0.0.1:0");
        assert!(!config.structured_logging());
        assert!(!config.telemetry.enable_tracing);
        assert_eq!(config.runtime.plugin_manifest, "plugins.yaml");
        assert_eq!(config.runtime.termination_grace(), Duration::from_secs(5));
        assert!(config.runtime.run_timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_runtime_section() {
        let yaml = r#"
env: production
listen_addr: "0.0.0.0:50051"
runtime:
  interpreter: node
  interpreter_args: ["--enable-source-maps"]
  run_timeout_secs: 600
"#;
        let config = LanghostConfig::from_yaml_str(yaml).unwrap();
        assert!(config.structured_logging());
        assert_eq!(config.listen_addr, "0.0.0.0:50051");
        assert_eq!(config.runtime.interpreter.as_deref(), Some("node"));
        assert_eq!(config.runtime.interpreter_args, vec!["--enable-source-maps"]);
        assert_eq!(config.runtime.run_timeout(), Some(Duration::from_secs(600)));
        // Unspecified fields keep their defaults.
        assert_eq!(config.runtime.plugin_manifest, "plugins.yaml");
        assert_eq!(config.runtime.termination_grace_secs, 5);
    }

    #[test]
    fn test_invalid_listen_addr() {
        let yaml = r#"
listen_addr: "not-an-address"
"#;
        let err = LanghostConfig::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("invalid listen address"));
    }

    #[test]
    fn test_invalid_runtime() {
        let yaml = r#"
runtime:
  termination_grace_secs: 0
"#;
        assert!(LanghostConfig::from_yaml_str(yaml).is_err());

        let yaml = r#"
runtime:
  plugin_manifest: ""
"#;
        assert!(LanghostConfig::from_yaml_str(yaml).is_err());
    }
}
