// AWS access through the `aws` command line tool

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::process::{Command, ExitStatus};
use tracing::debug;

use super::{ContextResolver, Registry, RegistryCredentials};

const REPOSITORY_NOT_FOUND: &str = "RepositoryNotFoundException";
const REPOSITORY_ALREADY_EXISTS: &str = "RepositoryAlreadyExistsException";

/// ECR logins always use this username; the token is the password
pub const ECR_USERNAME: &str = "AWS";

/// Captured result of an `aws` invocation
struct CliOutput {
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl CliOutput {
    fn failure_message(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            format!("exit status {}", self.status)
        } else {
            stderr.to_string()
        }
    }
}

pub struct AwsCli {
    program: String,
    profile: Option<String>,
}

impl AwsCli {
    pub fn new(profile: Option<String>) -> Self {
        Self {
            program: "aws".to_string(),
            profile,
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args);
        if let Some(profile) = &self.profile {
            cmd.arg("--profile").arg(profile);
        }
        cmd
    }

    fn caller_identity_command(&self) -> Command {
        self.command(&[
            "sts",
            "get-caller-identity",
            "--query",
            "Account",
            "--output",
            "text",
        ])
    }

    fn region_command(&self) -> Command {
        self.command(&["configure", "get", "region"])
    }

    fn describe_repository_command(&self, name: &str, region: &str) -> Command {
        self.command(&[
            "ecr",
            "describe-repositories",
            "--repository-names",
            name,
            "--region",
            region,
        ])
    }

    fn create_repository_command(&self, name: &str, region: &str, scan_on_push: bool) -> Command {
        let scanning = format!("scanOnPush={}", scan_on_push);
        self.command(&[
            "ecr",
            "create-repository",
            "--repository-name",
            name,
            "--image-scanning-configuration",
            &scanning,
            "--region",
            region,
        ])
    }

    fn login_password_command(&self, region: &str) -> Command {
        self.command(&["ecr", "get-login-password", "--region", region])
    }

    async fn run(&self, cmd: Command) -> Result<CliOutput> {
        debug!("Executing command: {:?}", cmd);

        let output = tokio::process::Command::from(cmd)
            .output()
            .await
            .with_context(|| {
                format!(
                    "Failed to execute {}. Is the AWS CLI installed?",
                    self.program
                )
            })?;

        Ok(CliOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }

    /// Run a command whose trimmed stdout is the answer
    async fn query(&self, cmd: Command, what: &str) -> Result<String> {
        let output = self.run(cmd).await?;
        if !output.status.success() {
            bail!("Failed to query {}: {}", what, output.failure_message());
        }
        Ok(output.stdout.trim().to_string())
    }
}

#[async_trait]
impl ContextResolver for AwsCli {
    async fn account_id(&self) -> Result<String> {
        self.query(self.caller_identity_command(), "AWS account id")
            .await
    }

    async fn region(&self) -> Result<String> {
        let output = self.run(self.region_command()).await?;

        // `aws configure get` exits non-zero with no output when the key is unset
        let region = output.stdout.trim();
        if !output.status.success() && region.is_empty() && output.stderr.trim().is_empty() {
            return Ok(String::new());
        }
        if !output.status.success() {
            bail!("Failed to query AWS region: {}", output.failure_message());
        }
        Ok(region.to_string())
    }
}

#[async_trait]
impl Registry for AwsCli {
    async fn repository_exists(&self, name: &str, region: &str) -> Result<bool> {
        let output = self
            .run(self.describe_repository_command(name, region))
            .await?;

        if output.status.success() {
            return Ok(true);
        }
        if output.stderr.contains(REPOSITORY_NOT_FOUND) {
            return Ok(false);
        }
        bail!(
            "Failed to check ECR repository existence for '{}': {}",
            name,
            output.failure_message()
        )
    }

    async fn create_repository(
        &self,
        name: &str,
        region: &str,
        scan_on_push: bool,
    ) -> Result<bool> {
        let output = self
            .run(self.create_repository_command(name, region, scan_on_push))
            .await?;

        if output.status.success() {
            return Ok(true);
        }
        if output.stderr.contains(REPOSITORY_ALREADY_EXISTS) {
            return Ok(false);
        }
        bail!(
            "Failed to create ECR repository '{}': {}",
            name,
            output.failure_message()
        )
    }

    async fn authorization(&self, region: &str) -> Result<RegistryCredentials> {
        let password = self
            .query(self.login_password_command(region), "ECR login password")
            .await?;
        if password.is_empty() {
            bail!("AWS CLI returned an empty ECR login password");
        }

        Ok(RegistryCredentials {
            username: ECR_USERNAME.to_string(),
            password,
        })
    }
}
