// ECR registry addressing

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UriError {
    #[error("Cannot build registry URI: {0} is empty")]
    EmptyComponent(&'static str),
}

/// Fully qualified image reference in an ECR registry
///
/// Renders as `{account}.dkr.ecr.{region}.amazonaws.com/{repository}:{tag}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryUri {
    host: String,
    repository: String,
    tag: String,
}

impl RegistryUri {
    pub fn new(
        account_id: &str,
        region: &str,
        repository: &str,
        tag: &str,
    ) -> Result<Self, UriError> {
        for (name, value) in [
            ("account id", account_id),
            ("region", region),
            ("image name", repository),
            ("tag", tag),
        ] {
            if value.is_empty() {
                return Err(UriError::EmptyComponent(name));
            }
        }

        Ok(Self {
            host: registry_host(account_id, region),
            repository: repository.to_string(),
            tag: tag.to_string(),
        })
    }

    /// Registry hostname, used as the login target
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn repository(&self) -> &str {
        &self.repository
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

impl fmt::Display for RegistryUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.host, self.repository, self.tag)
    }
}

/// Hostname of the private ECR registry for an account in a region
pub fn registry_host(account_id: &str, region: &str) -> String {
    format!("{}.dkr.ecr.{}.amazonaws.com", account_id, region)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_to_end_example() {
        let uri = RegistryUri::new("123456789012", "us-east-1", "browser-n8n-local", "latest")
            .unwrap();
        assert_eq!(
            uri.to_string(),
            "123456789012.dkr.ecr.us-east-1.amazonaws.com/browser-n8n-local:latest"
        );
        assert_eq!(uri.host(), "123456789012.dkr.ecr.us-east-1.amazonaws.com");
        assert_eq!(uri.repository(), "browser-n8n-local");
        assert_eq!(uri.tag(), "latest");
    }

    #[test]
    fn test_uri_shape_for_various_inputs() {
        let cases = [
            ("1", "eu-west-1", "a", "b"),
            ("459109751375", "ap-southeast-2", "team/service", "v1.2.3"),
            ("000000000000", "cn-north-1", "x-y_z", "sha-abc123"),
        ];

        for (account, region, image, tag) in cases {
            let uri = RegistryUri::new(account, region, image, tag).unwrap();
            assert_eq!(
                uri.to_string(),
                format!("{account}.dkr.ecr.{region}.amazonaws.com/{image}:{tag}")
            );
        }
    }

    #[test]
    fn test_empty_components_rejected() {
        assert_eq!(
            RegistryUri::new("", "us-east-1", "app", "latest"),
            Err(UriError::EmptyComponent("account id"))
        );
        assert_eq!(
            RegistryUri::new("123", "", "app", "latest"),
            Err(UriError::EmptyComponent("region"))
        );
        assert_eq!(
            RegistryUri::new("123", "us-east-1", "", "latest"),
            Err(UriError::EmptyComponent("image name"))
        );
        assert_eq!(
            RegistryUri::new("123", "us-east-1", "app", ""),
            Err(UriError::EmptyComponent("tag"))
        );
    }
}
