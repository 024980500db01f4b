// In: src/cli.rs

//! Command-line arguments and how they combine with a config file.

use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;

use crate::config::RleConfig;
use crate::error::RleError;

#[derive(Parser, Debug)]
#[command(name = "rlepipe", version, about = "Run-length encode files to stdout using parallel workers", long_about = None)]
pub struct Cli {
    /// Input files, concatenated in the order given.
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,

    /// Number of worker threads.
    #[arg(short = 'j', long = "jobs", value_name = "THREADS")]
    pub jobs: Option<usize>,

    /// Bytes of input per chunk.
    #[arg(long, value_name = "BYTES")]
    pub chunk_size: Option<usize>,

    /// Capacity of the task queue, in chunks.
    #[arg(long, value_name = "CHUNKS")]
    pub queue_depth: Option<usize>,

    /// JSON file with run settings; flags given here take precedence.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Check every encoded chunk against its source bytes.
    #[arg(long)]
    pub verify: bool,

    /// Log more to stderr (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Builds the run configuration: defaults, then the config file, then flags.
    pub fn resolve_config(&self) -> Result<RleConfig, RleError> {
        let mut config = match &self.config {
            Some(path) => RleConfig::from_json_file(path)?,
            None => RleConfig::default(),
        };

        if let Some(jobs) = self.jobs {
            config.thread_count = jobs;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(depth) = self.queue_depth {
            config.queue_depth = Some(depth);
        }
        if self.verify {
            config.verify_chunks = true;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempdir::TempDir;

    #[test]
    fn test_files_and_flags_parse() {
        let cli = Cli::try_parse_from(["rlepipe", "-j", "4", "--chunk-size", "512", "a", "b"])
            .unwrap();
        assert_eq!(cli.files, vec![PathBuf::from("a"), PathBuf::from("b")]);

        let config = cli.resolve_config().unwrap();
        assert_eq!(config.thread_count, 4);
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.queue_capacity(), 8);
    }

    #[test]
    fn test_no_arguments_uses_defaults() {
        let cli = Cli::try_parse_from(["rlepipe"]).unwrap();
        assert!(cli.files.is_empty());
        assert_eq!(cli.resolve_config().unwrap(), RleConfig::default());
        assert_eq!(cli.log_level(), LevelFilter::Warn);
    }

    #[test]
    fn test_zero_jobs_is_rejected() {
        let cli = Cli::try_parse_from(["rlepipe", "-j", "0", "file"]).unwrap();
        assert!(matches!(cli.resolve_config(), Err(RleError::Config(_))));
    }

    #[test]
    fn test_non_numeric_jobs_is_a_parse_error() {
        assert!(Cli::try_parse_from(["rlepipe", "-j", "many"]).is_err());
    }

    #[test]
    fn test_flags_override_config_file() {
        let dir = TempDir::new("rlepipe-cli").unwrap();
        let path = dir.path().join("run.json");
        fs::write(&path, r#"{"thread_count": 2, "chunk_size": 64, "queue_depth": 5}"#).unwrap();

        let cli = Cli::try_parse_from([
            "rlepipe",
            "--config",
            path.to_str().unwrap(),
            "--chunk-size",
            "128",
            "--verify",
            "-vv",
        ])
        .unwrap();
        let config = cli.resolve_config().unwrap();
        assert_eq!(config.thread_count, 2);
        assert_eq!(config.chunk_size, 128);
        assert_eq!(config.queue_depth, Some(5));
        assert!(config.verify_chunks);
        assert_eq!(cli.log_level(), LevelFilter::Debug);
    }
}
