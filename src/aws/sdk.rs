use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_ecr::Client as EcrClient;
use base64::Engine;
use tracing::debug;

use super::{ContextResolver, Registry, RegistryCredentials};

/// Extract a clean error message from an AWS SDK error's Debug output
///
/// The AWS SDK errors have verbose Debug output, but we can extract just the
/// meaningful message by parsing for the `message: Some("...")` pattern.
fn format_sdk_error<E: std::fmt::Debug>(err: &E) -> String {
    let debug_str = format!("{:?}", err);

    // Pattern: message: Some("actual error message")
    if let Some(start) = debug_str.find("message: Some(\"") {
        let start = start + 15;
        if let Some(end) = debug_str[start..].find("\")") {
            return debug_str[start..start + end].to_string();
        }
    }

    // Fallback: a Message field, as in a JSON response body
    if let Some(start) = debug_str.find("\"Message\":\"") {
        let start = start + 11;
        if let Some(end) = debug_str[start..].find('"') {
            return debug_str[start..start + end].to_string();
        }
    }

    if debug_str.len() > 200 {
        let cut = (0..=200)
            .rev()
            .find(|i| debug_str.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}...", &debug_str[..cut])
    } else {
        debug_str
    }
}

/// Decode an ECR authorization token (base64 of "user:password")
fn decode_authorization_token(token: &str) -> Result<RegistryCredentials> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(token)
        .context("Failed to decode ECR token")?;

    let decoded_str = String::from_utf8(decoded).context("ECR token is not valid UTF-8")?;

    let (username, password) = decoded_str
        .split_once(':')
        .context("Invalid ECR token format")?;

    Ok(RegistryCredentials {
        username: username.to_string(),
        password: password.to_string(),
    })
}

/// AWS access through the Rust SDK and the default credential chain
pub struct SdkBackend {
    sdk_config: SdkConfig,
}

impl SdkBackend {
    pub async fn load(profile: Option<&str>, region: Option<&str>) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }

        Self {
            sdk_config: loader.load().await,
        }
    }

    fn ecr_client(&self, region: &str) -> EcrClient {
        let config = aws_sdk_ecr::config::Builder::from(&self.sdk_config)
            .region(Region::new(region.to_string()))
            .build();
        EcrClient::from_conf(config)
    }
}

#[async_trait]
impl ContextResolver for SdkBackend {
    async fn account_id(&self) -> Result<String> {
        let sts = aws_sdk_sts::Client::new(&self.sdk_config);
        let identity = sts
            .get_caller_identity()
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Failed to get caller identity: {}",
                    format_sdk_error(&e)
                )
            })?;

        Ok(identity.account().unwrap_or_default().to_string())
    }

    async fn region(&self) -> Result<String> {
        Ok(self
            .sdk_config
            .region()
            .map(|r| r.to_string())
            .unwrap_or_default())
    }
}

#[async_trait]
impl Registry for SdkBackend {
    async fn repository_exists(&self, name: &str, region: &str) -> Result<bool> {
        match self
            .ecr_client(region)
            .describe_repositories()
            .repository_names(name)
            .send()
            .await
        {
            Ok(response) => Ok(!response.repositories().is_empty()),
            Err(err) => {
                if let Some(service_err) = err.as_service_error() {
                    if service_err.is_repository_not_found_exception() {
                        return Ok(false);
                    }
                }
                Err(anyhow::anyhow!(
                    "Failed to check ECR repository existence for '{}': {}",
                    name,
                    format_sdk_error(&err)
                ))
            }
        }
    }

    async fn create_repository(
        &self,
        name: &str,
        region: &str,
        scan_on_push: bool,
    ) -> Result<bool> {
        let result = self
            .ecr_client(region)
            .create_repository()
            .repository_name(name)
            .image_scanning_configuration(
                aws_sdk_ecr::types::ImageScanningConfiguration::builder()
                    .scan_on_push(scan_on_push)
                    .build(),
            )
            .send()
            .await;

        match result {
            Ok(_) => Ok(true),
            Err(err) => {
                if let Some(service_err) = err.as_service_error() {
                    if service_err.is_repository_already_exists_exception() {
                        debug!("ECR repository {} was created concurrently", name);
                        return Ok(false);
                    }
                }
                Err(anyhow::anyhow!(
                    "Failed to create ECR repository '{}': {}",
                    name,
                    format_sdk_error(&err)
                ))
            }
        }
    }

    async fn authorization(&self, region: &str) -> Result<RegistryCredentials> {
        let response = self
            .ecr_client(region)
            .get_authorization_token()
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Failed to get ECR authorization token: {}",
                    format_sdk_error(&e)
                )
            })?;

        let token = response
            .authorization_data()
            .first()
            .context("No authorization data returned from ECR")?
            .authorization_token()
            .context("No authorization token in response")?;

        decode_authorization_token(token)
    }
}
