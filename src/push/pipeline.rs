use anyhow::anyhow;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::options::{resolve_build_args, PushOptions};
use crate::aws::{AwsContext, ContextResolver, Registry};
use crate::engine::{BuildRequest, ContainerEngine, Platform};
use crate::uri::RegistryUri;

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ResolveContext,
    ProvisionRepository,
    Authenticate,
    BuildAndPush,
    Prune,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ResolveContext => "Resolving AWS account and region",
            Stage::ProvisionRepository => "Provisioning ECR repository",
            Stage::Authenticate => "Registry login",
            Stage::BuildAndPush => "Multi-platform build and push",
            Stage::Prune => "Pruning dangling images",
        };
        f.write_str(name)
    }
}

/// First failure of a run, tagged with the stage it happened in
#[derive(Debug, Error)]
#[error("{stage} failed: {error:#}")]
pub struct PipelineError {
    pub stage: Stage,
    error: anyhow::Error,
}

impl PipelineError {
    fn at(stage: Stage) -> impl FnOnce(anyhow::Error) -> PipelineError {
        move |error| PipelineError { stage, error }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryStatus {
    Existing,
    Created,
}

/// Outcome of a full run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushReport {
    pub uri: RegistryUri,
    pub repository: RepositoryStatus,
    /// False when the best-effort prune failed or was skipped
    pub pruned: bool,
}

impl fmt::Display for PushReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pushed {}", self.uri)
    }
}

/// Make sure repository `name` exists, creating it if the registry says it is absent
pub async fn ensure_repository(
    registry: &dyn Registry,
    name: &str,
    region: &str,
    scan_on_push: bool,
) -> anyhow::Result<RepositoryStatus> {
    if registry.repository_exists(name, region).await? {
        debug!("ECR repository {} already exists", name);
        return Ok(RepositoryStatus::Existing);
    }

    info!("Creating ECR repository: {}", name);
    if registry
        .create_repository(name, region, scan_on_push)
        .await?
    {
        info!("Created ECR repository: {}", name);
        Ok(RepositoryStatus::Created)
    } else {
        // Lost a race against a concurrent creator; the repository is there now
        debug!("ECR repository {} appeared while creating it", name);
        Ok(RepositoryStatus::Existing)
    }
}

pub struct Pipeline {
    options: PushOptions,
    resolver: Arc<dyn ContextResolver>,
    registry: Arc<dyn Registry>,
    engine: Arc<dyn ContainerEngine>,
}

impl Pipeline {
    pub fn new(
        options: PushOptions,
        resolver: Arc<dyn ContextResolver>,
        registry: Arc<dyn Registry>,
        engine: Arc<dyn ContainerEngine>,
    ) -> Self {
        Self {
            options,
            resolver,
            registry,
            engine,
        }
    }

    async fn resolve_context(&self) -> Result<AwsContext, PipelineError> {
        let account_id = match &self.options.account_id {
            Some(account_id) => account_id.clone(),
            None => self
                .resolver
                .account_id()
                .await
                .map_err(PipelineError::at(Stage::ResolveContext))?,
        };
        if account_id.is_empty() {
            return Err(PipelineError::at(Stage::ResolveContext)(anyhow!(
                "Could not resolve the AWS account id. Check your AWS credentials."
            )));
        }

        let region = match &self.options.region {
            Some(region) => region.clone(),
            None => self
                .resolver
                .region()
                .await
                .map_err(PipelineError::at(Stage::ResolveContext))?,
        };
        if region.is_empty() {
            return Err(PipelineError::at(Stage::ResolveContext)(anyhow!(
                "No AWS region configured. Pass --region or set AWS_REGION."
            )));
        }

        debug!("Resolved AWS account {} in {}", account_id, region);
        Ok(AwsContext { account_id, region })
    }

    /// Resolve the account and region and build the image reference
    pub async fn resolve_uri(&self) -> Result<(AwsContext, RegistryUri), PipelineError> {
        let context = self.resolve_context().await?;
        let uri = RegistryUri::new(
            &context.account_id,
            &context.region,
            &self.options.image,
            &self.options.tag,
        )
        .map_err(|e| PipelineError::at(Stage::ResolveContext)(e.into()))?;
        Ok((context, uri))
    }

    async fn provision(&self, context: &AwsContext) -> Result<RepositoryStatus, PipelineError> {
        info!("{}: {}", Stage::ProvisionRepository, self.options.image);
        ensure_repository(
            self.registry.as_ref(),
            &self.options.image,
            &context.region,
            self.options.scan_on_push,
        )
        .await
        .map_err(PipelineError::at(Stage::ProvisionRepository))
    }

    async fn authenticate(
        &self,
        context: &AwsContext,
        uri: &RegistryUri,
    ) -> Result<(), PipelineError> {
        info!("{}: {}", Stage::Authenticate, uri.host());
        let fail = PipelineError::at(Stage::Authenticate);
        let result = async {
            let credentials = self.registry.authorization(&context.region).await?;
            self.engine.login(uri.host(), &credentials).await
        }
        .await;
        result.map_err(fail)
    }

    async fn build_and_push(&self, uri: &RegistryUri) -> Result<(), PipelineError> {
        let fail = PipelineError::at(Stage::BuildAndPush);

        let context = &self.options.context;
        if !context.is_dir() {
            return Err(fail(anyhow!(
                "Build context '{}' is not a directory",
                context.display()
            )));
        }

        let request = BuildRequest {
            context: context.clone(),
            dockerfile: self.options.dockerfile.clone(),
            image: uri.to_string(),
            platforms: Platform::ALL.to_vec(),
            build_args: resolve_build_args(&self.options.build_args, &super::env_var_non_empty),
            push: true,
        };

        info!("{}: {}", Stage::BuildAndPush, uri);
        self.engine.build(&request).await.map_err(fail)
    }

    /// Best effort; a failure is logged and reported, never returned
    async fn prune(&self) -> bool {
        info!("{}", Stage::Prune);
        match self.engine.prune_dangling().await {
            Ok(()) => true,
            Err(e) => {
                warn!("{} failed: {:#}", Stage::Prune, e);
                false
            }
        }
    }

    /// Ensure the repository exists, without building anything
    pub async fn ensure_repository(
        &self,
    ) -> Result<(RegistryUri, RepositoryStatus), PipelineError> {
        let (context, uri) = self.resolve_uri().await?;
        let status = self.provision(&context).await?;
        Ok((uri, status))
    }

    /// Log the container engine in to the registry, without building anything
    pub async fn login(&self) -> Result<RegistryUri, PipelineError> {
        let (context, uri) = self.resolve_uri().await?;
        self.authenticate(&context, &uri).await?;
        Ok(uri)
    }

    /// Run every stage in order, stopping at the first failure
    pub async fn run(&self) -> Result<PushReport, PipelineError> {
        let (context, uri) = self.resolve_uri().await?;
        let repository = self.provision(&context).await?;
        self.authenticate(&context, &uri).await?;
        self.build_and_push(&uri).await?;

        let pruned = if self.options.prune {
            self.prune().await
        } else {
            debug!("Skipping prune");
            false
        };

        Ok(PushReport {
            uri,
            repository,
            pruned,
        })
    }
}
