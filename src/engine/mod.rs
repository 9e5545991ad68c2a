// Local container engine: registry login, multi-platform build, cleanup

mod docker;

pub use docker::ContainerCli;

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;

use crate::aws::RegistryCredentials;

/// Target platform of a multi-architecture build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Platform {
    LinuxAmd64,
    LinuxArm64,
}

impl Platform {
    /// Every image is built for exactly these platforms
    pub const ALL: [Platform; 2] = [Platform::LinuxAmd64, Platform::LinuxArm64];

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::LinuxAmd64 => "linux/amd64",
            Platform::LinuxArm64 => "linux/arm64",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comma-separated list as taken by `--platform`
pub fn platform_list(platforms: &[Platform]) -> String {
    platforms
        .iter()
        .map(Platform::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

/// A single build invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Build context directory
    pub context: PathBuf,
    /// Dockerfile, if not `<context>/Dockerfile`
    pub dockerfile: Option<PathBuf>,
    /// Fully qualified image reference (host/name:tag)
    pub image: String,
    pub platforms: Vec<Platform>,
    /// Resolved `KEY=VALUE` build arguments
    pub build_args: Vec<String>,
    /// Push to the registry as part of the build
    pub push: bool,
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Log in to `registry`, passing the password over stdin
    async fn login(&self, registry: &str, credentials: &RegistryCredentials) -> Result<()>;

    async fn build(&self, request: &BuildRequest) -> Result<()>;

    /// Remove dangling images without prompting
    async fn prune_dangling(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_platform_list() {
        assert_eq!(platform_list(&Platform::ALL), "linux/amd64,linux/arm64");
        assert_eq!(platform_list(&[Platform::LinuxArm64]), "linux/arm64");
        assert_eq!(platform_list(&[]), "");
    }

    #[test]
    fn test_platform_display() {
        assert_eq!(Platform::LinuxAmd64.to_string(), "linux/amd64");
        assert_eq!(Platform::LinuxArm64.to_string(), "linux/arm64");
    }
}
