use anyhow::Result;
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod aws;
mod config;
mod engine;
mod push;
mod uri;

use engine::ContainerCli;
use push::{BuildArgs, Pipeline, PushOptions, RepositoryStatus, TargetArgs};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ensure the repository, log in, build for amd64 and arm64, push and prune
    #[command(visible_alias = "p")]
    Push {
        #[command(flatten)]
        target: TargetArgs,
        #[command(flatten)]
        build: BuildArgs,
    },
    /// Print the registry URI the image would be pushed to
    Uri {
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Create the ECR repository if it does not exist
    #[command(name = "ensure-repo")]
    EnsureRepo {
        #[command(flatten)]
        target: TargetArgs,
        /// Create the repository without scan-on-push
        #[arg(long)]
        no_scan_on_push: bool,
    },
    /// Log the container engine in to the ECR registry
    Login {
        #[command(flatten)]
        target: TargetArgs,
    },
}

async fn build_pipeline(options: PushOptions) -> Result<Pipeline> {
    info!(
        "Using AWS {} backend and container CLI '{}'",
        options.aws_backend, options.container_cli
    );

    let handles = aws::connect(
        options.aws_backend,
        options.profile.as_deref(),
        options.region.as_deref(),
    )
    .await?;
    let engine = Arc::new(ContainerCli::new(options.container_cli.clone()));

    Ok(Pipeline::new(
        options,
        handles.resolver,
        handles.registry,
        engine,
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so `uri` output stays scriptable
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Push { target, build } => {
            let options = PushOptions::load(target, build)?;
            let report = build_pipeline(options).await?.run().await?;
            if report.repository == RepositoryStatus::Created {
                info!("Created repository {}", report.uri.repository());
            }
            if report.pruned {
                info!("Removed dangling images");
            }
            info!(
                "Pushed tag {} for {}",
                report.uri.tag(),
                engine::platform_list(&engine::Platform::ALL)
            );
            println!("{}", report);
        }
        Commands::Uri { target } => {
            let options = PushOptions::load(target, &BuildArgs::default())?;
            let (_, uri) = build_pipeline(options).await?.resolve_uri().await?;
            println!("{}", uri);
        }
        Commands::EnsureRepo {
            target,
            no_scan_on_push,
        } => {
            let build = BuildArgs {
                no_scan_on_push: *no_scan_on_push,
                ..Default::default()
            };
            let options = PushOptions::load(target, &build)?;
            let (uri, status) = build_pipeline(options).await?.ensure_repository().await?;
            match status {
                RepositoryStatus::Created => println!("Created repository {}", uri.repository()),
                RepositoryStatus::Existing => {
                    println!("Repository {} already exists", uri.repository())
                }
            }
        }
        Commands::Login { target } => {
            let options = PushOptions::load(target, &BuildArgs::default())?;
            let uri = build_pipeline(options).await?.login().await?;
            println!("Logged in to {}", uri.host());
        }
    }

    Ok(())
}
