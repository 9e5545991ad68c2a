// Push pipeline: resolve context, provision repository, login, build+push, prune

mod options;
mod pipeline;

pub use options::{BuildArgs, PushOptions, TargetArgs};
pub use pipeline::{Pipeline, RepositoryStatus};

/// Read an environment variable, treating empty strings as if the variable is not set.
pub(crate) fn env_var_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}
