//! On-disk cache of the rendered client agent.

use crate::agent::{ClientAgent, embedded_fingerprint};
use crate::error::Result;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info};

/// State of the cached agent after [`AssetCache::ensure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetStatus {
    /// The cached script was current and reused
    Fresh,
    /// The script was regenerated
    Rebuilt,
    /// Regeneration failed; the previous script is still served
    Stale,
    /// Regeneration failed and there is nothing to serve
    Unavailable,
}

impl AssetStatus {
    /// Whether pages may reference the script
    pub fn is_available(&self) -> bool {
        !matches!(self, AssetStatus::Unavailable)
    }

    /// Whether the script on disk matches the current agent
    pub fn is_current(&self) -> bool {
        matches!(self, AssetStatus::Fresh | AssetStatus::Rebuilt)
    }
}

/// Build-or-reuse cache for the agent script at `path`.
///
/// The cache is fresh when the script exists, is newer than the
/// configuration file (when there is one) and carries the fingerprint of
/// the current agent configuration.
#[derive(Debug, Clone)]
pub struct AssetCache {
    path: PathBuf,
    config_path: Option<PathBuf>,
}

impl AssetCache {
    pub fn new(path: impl Into<PathBuf>, config_path: Option<PathBuf>) -> Self {
        Self {
            path: path.into(),
            config_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn is_fresh(&self, agent: &ClientAgent) -> Result<bool> {
        let asset_meta = match fs::metadata(&self.path).await {
            Ok(meta) => meta,
            Err(_) => return Ok(false),
        };

        if let Some(config_path) = &self.config_path {
            if let Ok(config_meta) = fs::metadata(config_path).await {
                if config_meta.modified()? > asset_meta.modified()? {
                    debug!(asset = %self.path.display(), "Configuration is newer than agent script");
                    return Ok(false);
                }
            }
        }

        let script = fs::read_to_string(&self.path).await?;
        Ok(embedded_fingerprint(&script) == Some(agent.fingerprint()?.as_str()))
    }

    /// Render the agent and replace the cached script
    pub async fn rebuild(&self, agent: &ClientAgent) -> Result<()> {
        let script = agent.render()?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let staging = self.path.with_extension("js.tmp");
        fs::write(&staging, script).await?;
        fs::rename(&staging, &self.path).await?;

        info!(asset = %self.path.display(), "Regenerated client agent script");
        Ok(())
    }

    /// Reuse the cached script when fresh, otherwise rebuild it. Failures
    /// are logged and degrade to the previous script, or to no script.
    pub async fn ensure(&self, agent: &ClientAgent) -> AssetStatus {
        match self.refresh(agent).await {
            Ok(status) => status,
            Err(e) => {
                error!(asset = %self.path.display(), error = %e, "Client agent unavailable");
                if fs::metadata(&self.path).await.is_ok() {
                    AssetStatus::Stale
                } else {
                    AssetStatus::Unavailable
                }
            }
        }
    }

    async fn refresh(&self, agent: &ClientAgent) -> Result<AssetStatus> {
        if self.is_fresh(agent).await? {
            return Ok(AssetStatus::Fresh);
        }
        self.rebuild(agent).await?;
        Ok(AssetStatus::Rebuilt)
    }

    /// Cached script contents, if present
    pub async fn read(&self) -> Option<String> {
        fs::read_to_string(&self.path).await.ok()
    }
}
