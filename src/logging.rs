use crate::util::non_empty_env;
use anyhow::{anyhow, Context, Result};
use std::fs::{File, OpenOptions};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const LOG_PATH_ENV: &str = "SRE_CONSOLE_LOG_PATH";

/// Install the global subscriber. `RUST_LOG` wins over the default level;
/// output goes to stderr unless `SRE_CONSOLE_LOG_PATH` names a file.
pub fn init(verbose: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let installed = match resolve_log_path() {
        Some(path) => {
            let file = open_log_file(&path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };

    installed.map_err(|error| anyhow!("failed to install tracing subscriber: {error}"))
}

fn open_log_file(path: &str) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file '{path}'"))
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "sre_console=debug"
    } else {
        "sre_console=warn"
    }
}

fn resolve_log_path() -> Option<String> {
    non_empty_env(LOG_PATH_ENV)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_log_path_uses_env() {
        let _env_lock = crate::test_support::ENV_LOCK.blocking_lock();
        std::env::set_var(LOG_PATH_ENV, "/tmp/sre-console-test.log");
        assert_eq!(
            resolve_log_path().as_deref(),
            Some("/tmp/sre-console-test.log")
        );
        std::env::set_var(LOG_PATH_ENV, "  ");
        assert_eq!(resolve_log_path(), None);
        std::env::remove_var(LOG_PATH_ENV);
    }

    #[test]
    fn test_open_log_file_appends() {
        use std::io::Write;

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("console.log");
        let path = path.to_str().expect("utf8 path");

        writeln!(open_log_file(path).expect("open"), "first").expect("write");
        writeln!(open_log_file(path).expect("reopen"), "second").expect("write");

        let contents = std::fs::read_to_string(path).expect("read");
        assert_eq!(contents, "first\nsecond\n");
    }

    #[test]
    fn test_open_log_file_reports_missing_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing").join("console.log");
        let error = open_log_file(path.to_str().expect("utf8 path")).expect_err("should fail");
        assert!(error.to_string().contains("failed to open log file"));
    }

    #[test]
    fn test_default_directive_tracks_verbosity() {
        assert_eq!(default_directive(true), "sre_console=debug");
        assert_eq!(default_directive(false), "sre_console=warn");
    }
}
