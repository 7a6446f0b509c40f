//! Static plugin discovery from a manifest that sits next to the program.
//!
//! ```yaml
//! plugins:
//!   - name: aws
//!     kind: resource
//!     version: 1.2.0
//!     server: https://example.com/plugins
//! ```
//!
//! Entries are reported in manifest order and duplicates are kept; whether
//! to dedupe is the caller's call.

use std::{
    io,
    path::{Path, PathBuf},
};

use proto_api::language_pb::PluginDependency;
use serde::Deserialize;
use tonic::Status;
use tracing::debug;

const DEFAULT_PLUGIN_KIND: &str = "resource";

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("program not found: {}", .0.display())]
    ProgramNotFound(PathBuf),
    #[error("invalid plugin manifest {}: {reason}", .path.display())]
    InvalidManifest { path: PathBuf, reason: String },
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<DiscoveryError> for Status {
    fn from(err: DiscoveryError) -> Self {
        match &err {
            DiscoveryError::ProgramNotFound(_) => Status::not_found(err.to_string()),
            DiscoveryError::InvalidManifest { .. } => Status::invalid_argument(err.to_string()),
            DiscoveryError::Io { .. } | DiscoveryError::Other(_) => {
                Status::internal(format!("{err:#}"))
            }
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginManifest {
    #[serde(default)]
    pub plugins: Vec<ManifestPlugin>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestPlugin {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub server: Option<String>,
}

fn default_kind() -> String {
    DEFAULT_PLUGIN_KIND.to_string()
}

impl From<ManifestPlugin> for PluginDependency {
    fn from(plugin: ManifestPlugin) -> Self {
        PluginDependency {
            name: plugin.name,
            kind: plugin.kind,
            version: plugin.version.unwrap_or_default(),
            server: plugin.server.unwrap_or_default(),
        }
    }
}

impl PluginManifest {
    pub fn parse(path: &Path, contents: &str) -> Result<Self, DiscoveryError> {
        let manifest: PluginManifest =
            serde_yaml::from_str(contents).map_err(|e| DiscoveryError::InvalidManifest {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        if let Some(index) = manifest.plugins.iter().position(|p| p.name.trim().is_empty()) {
            return Err(DiscoveryError::InvalidManifest {
                path: path.to_path_buf(),
                reason: format!("plugin entry {index} has an empty name"),
            });
        }
        Ok(manifest)
    }

    pub fn into_dependencies(self) -> Vec<PluginDependency> {
        self.plugins.into_iter().map(PluginDependency::from).collect()
    }
}

/// Directory inspected for a program: the program itself when it is a
/// directory, its parent otherwise.
async fn program_dir(program: &Path) -> Result<PathBuf, DiscoveryError> {
    let metadata = match tokio::fs::metadata(program).await {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(DiscoveryError::ProgramNotFound(program.to_path_buf()));
        }
        Err(e) => {
            return Err(DiscoveryError::Io {
                path: program.to_path_buf(),
                source: e,
            });
        }
    };
    if metadata.is_dir() {
        return Ok(program.to_path_buf());
    }
    Ok(program
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(".")))
}

/// Reads `manifest_name` from the program's directory. A missing manifest
/// means the program has no plugin dependencies.
pub async fn discover(
    program: &Path,
    manifest_name: &str,
) -> Result<Vec<PluginDependency>, DiscoveryError> {
    let dir = program_dir(program).await?;
    let manifest_path = dir.join(manifest_name);

    let contents = match tokio::fs::read_to_string(&manifest_path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(manifest = %manifest_path.display(), "no plugin manifest");
            return Ok(Vec::new());
        }
        Err(e) if e.kind() == io::ErrorKind::InvalidData => {
            return Err(DiscoveryError::InvalidManifest {
                path: manifest_path,
                reason: e.to_string(),
            });
        }
        Err(e) => {
            return Err(DiscoveryError::Io {
                path: manifest_path,
                source: e,
            });
        }
    };

    let plugins = PluginManifest::parse(&manifest_path, &contents)?.into_dependencies();
    debug!(
        manifest = %manifest_path.display(),
        count = plugins.len(),
        "loaded plugin manifest"
    );
    Ok(plugins)
}
