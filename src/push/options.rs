// Command line arguments and merged push options

use anyhow::{bail, Result};
use clap::Args;
use std::path::PathBuf;
use tracing::warn;

use crate::aws::AwsBackend;
use crate::config::{load_project_config, ProjectPushConfig};

pub const DEFAULT_TAG: &str = "latest";
pub const DEFAULT_CONTAINER_CLI: &str = "docker";

/// Where the image goes; shared by every command
#[derive(Debug, Clone, Default, Args)]
pub struct TargetArgs {
    /// Image / ECR repository name (e.g., browser-n8n-local)
    pub image: Option<String>,

    /// Image tag
    #[arg(long, short)]
    pub tag: Option<String>,

    /// AWS region (defaults to AWS_REGION or the AWS CLI configuration)
    #[arg(long)]
    pub region: Option<String>,

    /// AWS account id (defaults to the caller identity)
    #[arg(long)]
    pub account_id: Option<String>,

    /// Named AWS profile
    #[arg(long)]
    pub profile: Option<String>,

    /// How AWS is reached (cli, sdk)
    #[arg(long)]
    pub aws_backend: Option<String>,

    /// Container CLI to use (docker or podman)
    #[arg(long)]
    pub container_cli: Option<String>,

    /// Build context and project directory
    #[arg(long, default_value = ".")]
    pub context: PathBuf,
}

/// Build and cleanup flags for the push command
#[derive(Debug, Clone, Default, Args)]
pub struct BuildArgs {
    /// Dockerfile, relative to the build context
    #[arg(long, short = 'f')]
    pub file: Option<String>,

    /// Build arguments. Can be specified multiple times.
    /// Format: KEY=VALUE or KEY (to pass from environment)
    #[arg(long = "build-arg")]
    pub build_args: Vec<String>,

    /// Create the repository without scan-on-push
    #[arg(long)]
    pub no_scan_on_push: bool,

    /// Keep dangling images after the push
    #[arg(long)]
    pub no_prune: bool,
}

/// Fully merged options for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushOptions {
    pub image: String,
    pub tag: String,
    pub region: Option<String>,
    pub account_id: Option<String>,
    pub profile: Option<String>,
    pub aws_backend: AwsBackend,
    pub container_cli: String,
    pub context: PathBuf,
    pub dockerfile: Option<PathBuf>,
    pub build_args: Vec<String>,
    pub scan_on_push: bool,
    pub prune: bool,
}

impl PushOptions {
    /// Merge CLI arguments with the project config found in the context directory
    /// and the process environment
    pub fn load(target: &TargetArgs, build: &BuildArgs) -> Result<Self> {
        let project_config = load_project_config(&target.context)?;
        Self::resolve(
            target,
            build,
            project_config.as_ref(),
            &super::env_var_non_empty,
        )
    }

    /// Configuration precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. Project config file (ecr-push.toml / .ecr-push.toml)
    /// 3. Environment variables
    /// 4. Defaults
    pub fn resolve(
        target: &TargetArgs,
        build: &BuildArgs,
        project_config: Option<&ProjectPushConfig>,
        env: &dyn Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let image_config = project_config.and_then(|c| c.image.clone()).unwrap_or_default();
        let aws_config = project_config.and_then(|c| c.aws.clone()).unwrap_or_default();

        let image = match target.image.clone().or(image_config.name) {
            Some(image) if !image.is_empty() => image,
            _ => bail!(
                "No image name given. Pass it as an argument or set image.name in {}",
                crate::config::CONFIG_FILE_NAME
            ),
        };

        let tag = target
            .tag
            .clone()
            .or(image_config.tag)
            .unwrap_or_else(|| DEFAULT_TAG.to_string());
        if tag.is_empty() {
            bail!("Image tag must not be empty");
        }

        let region = target
            .region
            .clone()
            .or(aws_config.region)
            .or_else(|| env("AWS_REGION"))
            .or_else(|| env("AWS_DEFAULT_REGION"));

        let profile = target
            .profile
            .clone()
            .or(aws_config.profile)
            .or_else(|| env("AWS_PROFILE"));

        let aws_backend = match target
            .aws_backend
            .clone()
            .or(aws_config.backend)
            .or_else(|| env("ECR_PUSH_AWS_BACKEND"))
        {
            Some(backend) => AwsBackend::from_backend_str(&backend)?,
            None => AwsBackend::default(),
        };

        let container_cli = target
            .container_cli
            .clone()
            .or(image_config.container_cli)
            .or_else(|| env("ECR_PUSH_CONTAINER_CLI"))
            .unwrap_or_else(|| DEFAULT_CONTAINER_CLI.to_string());

        let dockerfile = build
            .file
            .clone()
            .or(image_config.dockerfile)
            .map(|df| target.context.join(df));

        // Config values first, then CLI values appended
        let mut build_args = image_config.build_args.unwrap_or_default();
        build_args.extend(build.build_args.iter().cloned());

        let scan_on_push = if build.no_scan_on_push {
            false
        } else {
            aws_config.scan_on_push.unwrap_or(true)
        };

        let prune = if build.no_prune {
            false
        } else {
            image_config.prune.unwrap_or(true)
        };

        Ok(Self {
            image,
            tag,
            region,
            account_id: target.account_id.clone().or(aws_config.account_id),
            profile,
            aws_backend,
            container_cli,
            context: target.context.clone(),
            dockerfile,
            build_args,
            scan_on_push,
            prune,
        })
    }
}

/// Turn `KEY` entries into `KEY=VALUE` using the environment
///
/// Entries already in `KEY=VALUE` form pass through unchanged. A bare `KEY`
/// that is not set in the environment is dropped with a warning.
pub fn resolve_build_args(args: &[String], env: &dyn Fn(&str) -> Option<String>) -> Vec<String> {
    args.iter()
        .filter_map(|arg| {
            if arg.contains('=') {
                return Some(arg.clone());
            }
            match env(arg) {
                Some(value) => Some(format!("{}={}", arg, value)),
                None => {
                    warn!(
                        "Build argument '{}' is not set in the environment, skipping",
                        arg
                    );
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AwsConfig, ImageConfig};
    use std::collections::HashMap;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn target(image: &str) -> TargetArgs {
        TargetArgs {
            image: Some(image.to_string()),
            context: PathBuf::from("."),
            ..Default::default()
        }
    }

    fn project_config() -> ProjectPushConfig {
        ProjectPushConfig {
            version: Some(1),
            image: Some(ImageConfig {
                name: Some("from-config".to_string()),
                tag: Some("v7".to_string()),
                dockerfile: Some("Dockerfile.prod".to_string()),
                build_args: Some(vec!["FROM_CONFIG=1".to_string()]),
                container_cli: Some("podman".to_string()),
                prune: Some(false),
            }),
            aws: Some(AwsConfig {
                region: Some("eu-west-1".to_string()),
                account_id: Some("111111111111".to_string()),
                profile: Some("config-profile".to_string()),
                backend: Some("sdk".to_string()),
                scan_on_push: Some(false),
            }),
        }
    }

    #[test]
    fn test_defaults() {
        let options =
            PushOptions::resolve(&target("app"), &BuildArgs::default(), None, &no_env).unwrap();

        assert_eq!(options.image, "app");
        assert_eq!(options.tag, "latest");
        assert_eq!(options.region, None);
        assert_eq!(options.account_id, None);
        assert_eq!(options.profile, None);
        assert_eq!(options.aws_backend, AwsBackend::Cli);
        assert_eq!(options.container_cli, "docker");
        assert_eq!(options.context, PathBuf::from("."));
        assert_eq!(options.dockerfile, None);
        assert!(options.build_args.is_empty());
        assert!(options.scan_on_push);
        assert!(options.prune);
    }

    #[test]
    fn test_missing_image_is_an_error() {
        let result =
            PushOptions::resolve(&TargetArgs::default(), &BuildArgs::default(), None, &no_env);
        assert!(result.is_err());

        let result = PushOptions::resolve(&target(""), &BuildArgs::default(), None, &no_env);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_tag_is_an_error() {
        let mut args = target("app");
        args.tag = Some(String::new());
        let err = PushOptions::resolve(&args, &BuildArgs::default(), None, &no_env).unwrap_err();
        assert!(err.to_string().contains("tag"));

        let config = ProjectPushConfig {
            image: Some(ImageConfig {
                tag: Some(String::new()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let result =
            PushOptions::resolve(&target("app"), &BuildArgs::default(), Some(&config), &no_env);
        assert!(result.is_err());
    }

    #[test]
    fn test_project_config_fills_in() {
        let config = project_config();
        let target = TargetArgs {
            context: PathBuf::from("/src/app"),
            ..Default::default()
        };
        let options =
            PushOptions::resolve(&target, &BuildArgs::default(), Some(&config), &no_env).unwrap();

        assert_eq!(options.image, "from-config");
        assert_eq!(options.tag, "v7");
        assert_eq!(options.region.as_deref(), Some("eu-west-1"));
        assert_eq!(options.account_id.as_deref(), Some("111111111111"));
        assert_eq!(options.profile.as_deref(), Some("config-profile"));
        assert_eq!(options.aws_backend, AwsBackend::Sdk);
        assert_eq!(options.container_cli, "podman");
        assert_eq!(
            options.dockerfile,
            Some(PathBuf::from("/src/app/Dockerfile.prod"))
        );
        assert!(!options.scan_on_push);
        assert!(!options.prune);
    }

    #[test]
    fn test_cli_flags_override_project_config() {
        let config = project_config();
        let target = TargetArgs {
            image: Some("from-cli".to_string()),
            tag: Some("v8".to_string()),
            region: Some("us-east-2".to_string()),
            account_id: Some("222222222222".to_string()),
            profile: Some("cli-profile".to_string()),
            aws_backend: Some("cli".to_string()),
            container_cli: Some("docker".to_string()),
            context: PathBuf::from("ctx"),
        };
        let build = BuildArgs {
            file: Some("Other.Dockerfile".to_string()),
            build_args: vec!["FROM_CLI=2".to_string()],
            ..Default::default()
        };
        let options = PushOptions::resolve(&target, &build, Some(&config), &no_env).unwrap();

        assert_eq!(options.image, "from-cli");
        assert_eq!(options.tag, "v8");
        assert_eq!(options.region.as_deref(), Some("us-east-2"));
        assert_eq!(options.account_id.as_deref(), Some("222222222222"));
        assert_eq!(options.profile.as_deref(), Some("cli-profile"));
        assert_eq!(options.aws_backend, AwsBackend::Cli);
        assert_eq!(options.container_cli, "docker");
        assert_eq!(
            options.dockerfile,
            Some(PathBuf::from("ctx/Other.Dockerfile"))
        );
        // Build args are concatenated, config first
        assert_eq!(options.build_args, ["FROM_CONFIG=1", "FROM_CLI=2"]);
    }

    #[test]
    fn test_environment_is_lowest_precedence() {
        let env_map: HashMap<&str, &str> = [
            ("AWS_REGION", "sa-east-1"),
            ("AWS_DEFAULT_REGION", "ca-central-1"),
            ("AWS_PROFILE", "env-profile"),
            ("ECR_PUSH_CONTAINER_CLI", "nerdctl"),
            ("ECR_PUSH_AWS_BACKEND", "sdk"),
        ]
        .into_iter()
        .collect();
        let env = |key: &str| env_map.get(key).map(|v| v.to_string());

        let options =
            PushOptions::resolve(&target("app"), &BuildArgs::default(), None, &env).unwrap();
        assert_eq!(options.region.as_deref(), Some("sa-east-1"));
        assert_eq!(options.profile.as_deref(), Some("env-profile"));
        assert_eq!(options.container_cli, "nerdctl");
        assert_eq!(options.aws_backend, AwsBackend::Sdk);

        let config = project_config();
        let options =
            PushOptions::resolve(&target("app"), &BuildArgs::default(), Some(&config), &env)
                .unwrap();
        assert_eq!(options.region.as_deref(), Some("eu-west-1"));
        assert_eq!(options.container_cli, "podman");
    }

    #[test]
    fn test_default_region_env_fallback() {
        let env = |key: &str| (key == "AWS_DEFAULT_REGION").then(|| "ca-central-1".to_string());
        let options =
            PushOptions::resolve(&target("app"), &BuildArgs::default(), None, &env).unwrap();
        assert_eq!(options.region.as_deref(), Some("ca-central-1"));
    }

    #[test]
    fn test_invalid_backend_is_rejected() {
        let mut args = target("app");
        args.aws_backend = Some("terraform".to_string());
        assert!(PushOptions::resolve(&args, &BuildArgs::default(), None, &no_env).is_err());
    }

    #[test]
    fn test_opt_out_flags() {
        let build = BuildArgs {
            no_scan_on_push: true,
            no_prune: true,
            ..Default::default()
        };
        let options = PushOptions::resolve(&target("app"), &build, None, &no_env).unwrap();
        assert!(!options.scan_on_push);
        assert!(!options.prune);
    }

    #[test]
    fn test_load_reads_project_config_from_context() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::write(
            temp_dir.path().join(crate::config::CONFIG_FILE_NAME),
            "[image]\nname = \"on-disk\"\ntag = \"disk-tag\"\n",
        )
        .unwrap();

        let target = TargetArgs {
            context: temp_dir.path().to_path_buf(),
            ..Default::default()
        };
        let options = PushOptions::load(&target, &BuildArgs::default()).unwrap();
        assert_eq!(options.image, "on-disk");
        assert_eq!(options.tag, "disk-tag");
    }

    #[test]
    fn test_resolve_build_args() {
        let env = |key: &str| (key == "GIT_SHA").then(|| "abc123".to_string());
        let args = vec![
            "NODE_ENV=production".to_string(),
            "GIT_SHA".to_string(),
            "MISSING".to_string(),
            "EMPTY=".to_string(),
        ];

        assert_eq!(
            resolve_build_args(&args, &env),
            ["NODE_ENV=production", "GIT_SHA=abc123", "EMPTY="]
        );
    }
}
