// AWS account, region and ECR access
//
// Two backends implement the same traits: one shells out to the `aws` CLI,
// the other talks to AWS through the Rust SDK (feature `sdk`).

mod cli;
#[cfg(feature = "sdk")]
mod sdk;

pub use cli::AwsCli;
#[cfg(feature = "sdk")]
pub use sdk::SdkBackend;

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Account and region the image is pushed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsContext {
    pub account_id: String,
    pub region: String,
}

/// Username/password pair accepted by `docker login` for an ECR registry
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for RegistryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Resolves the caller's AWS account and configured region
#[async_trait]
pub trait ContextResolver: Send + Sync {
    async fn account_id(&self) -> Result<String>;
    async fn region(&self) -> Result<String>;
}

/// ECR repository and authentication operations
#[async_trait]
pub trait Registry: Send + Sync {
    /// Check whether a repository exists.
    ///
    /// Only a "repository not found" answer maps to `Ok(false)`; any other
    /// failure is returned as an error.
    async fn repository_exists(&self, name: &str, region: &str) -> Result<bool>;

    /// Create a repository.
    ///
    /// Returns true if created, false if it already existed.
    async fn create_repository(&self, name: &str, region: &str, scan_on_push: bool)
        -> Result<bool>;

    /// Fetch short-lived credentials for the registry in `region`
    async fn authorization(&self, region: &str) -> Result<RegistryCredentials>;
}

/// How AWS is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AwsBackend {
    #[default]
    Cli,
    Sdk,
}

impl AwsBackend {
    pub fn from_backend_str(backend: &str) -> Result<Self> {
        match backend {
            "cli" | "aws-cli" => Ok(AwsBackend::Cli),
            "sdk" => Ok(AwsBackend::Sdk),
            _ => bail!("Invalid AWS backend '{}'. Supported: cli, sdk", backend),
        }
    }
}

impl fmt::Display for AwsBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AwsBackend::Cli => write!(f, "cli"),
            AwsBackend::Sdk => write!(f, "sdk"),
        }
    }
}

/// Resolver and registry handles sharing one backend
pub struct AwsHandles {
    pub resolver: Arc<dyn ContextResolver>,
    pub registry: Arc<dyn Registry>,
}

/// Set up the selected backend
pub async fn connect(
    backend: AwsBackend,
    profile: Option<&str>,
    region: Option<&str>,
) -> Result<AwsHandles> {
    match backend {
        AwsBackend::Cli => {
            let cli = Arc::new(AwsCli::new(profile.map(str::to_string)));
            Ok(AwsHandles {
                resolver: cli.clone(),
                registry: cli,
            })
        }
        #[cfg(feature = "sdk")]
        AwsBackend::Sdk => {
            let sdk = Arc::new(SdkBackend::load(profile, region).await);
            Ok(AwsHandles {
                resolver: sdk.clone(),
                registry: sdk,
            })
        }
        #[cfg(not(feature = "sdk"))]
        AwsBackend::Sdk => {
            let _ = region;
            bail!("The sdk backend is not available: ecr-push was built without the 'sdk' feature")
        }
    }
}
