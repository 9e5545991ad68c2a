// Docker/Podman command line engine

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::process::{Command, Stdio};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use super::{platform_list, BuildRequest, ContainerEngine};
use crate::aws::RegistryCredentials;

pub struct ContainerCli {
    program: String,
}

impl ContainerCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn login_command(&self, registry: &str, username: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("login")
            .arg(registry)
            .arg("--username")
            .arg(username)
            .arg("--password-stdin");
        cmd
    }

    fn build_command(&self, request: &BuildRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("buildx").arg("build");

        cmd.arg("--platform").arg(platform_list(&request.platforms));
        cmd.arg("-t").arg(&request.image);

        if let Some(dockerfile) = &request.dockerfile {
            cmd.arg("-f").arg(dockerfile);
        }

        for arg in &request.build_args {
            cmd.arg("--build-arg").arg(arg);
        }

        if request.push {
            cmd.arg("--push");
        }

        cmd.arg(&request.context);
        cmd
    }

    fn prune_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(["image", "prune", "--force"]);
        cmd
    }

    /// Fail early with a readable message if the CLI or buildx is missing
    async fn check_buildx_available(&self) -> Result<()> {
        let cli_check = tokio::process::Command::new(&self.program)
            .arg("--version")
            .output()
            .await;
        if cli_check.is_err() {
            bail!(
                "{} CLI not found. Please install Docker or Podman.",
                self.program
            );
        }

        let buildx_check = tokio::process::Command::new(&self.program)
            .args(["buildx", "version"])
            .output()
            .await;
        match buildx_check {
            Ok(output) if output.status.success() => Ok(()),
            _ => bail!(
                "{} buildx not available. Multi-platform builds require buildx.",
                self.program
            ),
        }
    }

    async fn run_status(&self, cmd: Command, what: &str) -> Result<()> {
        debug!("Executing command: {:?}", cmd);

        let status = tokio::process::Command::from(cmd)
            .status()
            .await
            .with_context(|| format!("Failed to execute {} {}", self.program, what))?;

        if !status.success() {
            bail!("{} {} failed with status: {}", self.program, what, status);
        }
        Ok(())
    }
}

#[async_trait]
impl ContainerEngine for ContainerCli {
    async fn login(&self, registry: &str, credentials: &RegistryCredentials) -> Result<()> {
        let cmd = self.login_command(registry, &credentials.username);
        debug!("Executing command: {:?}", cmd);

        let mut child = tokio::process::Command::from(cmd)
            .stdin(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to execute {} login", self.program))?;

        // A login that exits early closes the pipe; its exit status explains why
        let written = match child.stdin.take() {
            Some(mut stdin) => {
                let result = stdin.write_all(credentials.password.as_bytes()).await;
                // Closing stdin signals end of password
                drop(stdin);
                result
            }
            None => Ok(()),
        };

        let status = child
            .wait()
            .await
            .with_context(|| format!("Failed to execute {} login", self.program))?;

        if !status.success() {
            bail!("{} login failed with status: {}", self.program, status);
        }

        written.context("Failed to pass password to login")?;
        Ok(())
    }

    async fn build(&self, request: &BuildRequest) -> Result<()> {
        self.check_buildx_available().await?;

        info!(
            "Building image with {} buildx for {}: {}",
            self.program,
            platform_list(&request.platforms),
            request.image
        );

        self.run_status(self.build_command(request), "buildx build")
            .await
    }

    async fn prune_dangling(&self) -> Result<()> {
        self.run_status(self.prune_command(), "image prune").await
    }
}
