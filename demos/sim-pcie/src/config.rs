// Copyright (c) 2025 Graphcore Ltd. All rights reserved.

//! Application configuration.
//!
//! Settings are merged from, lowest priority first: built-in defaults, an
//! optional TOML file given with `--conf-file`, `LANES_*` environment
//! variables and the command line. Every setting is optional at each level so
//! that a value only overrides the level below when it has been given.

use std::path::{Path, PathBuf};

use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use lanes_engine::sim_error;
use lanes_engine::types::SimError;
use serde::{Deserialize, Serialize};

pub const ENV_PREFIX: &str = "LANES_";

pub const DEFAULT_STDOUT_LEVEL: log::Level = log::Level::Info;
pub const DEFAULT_LOG_FILE_LEVEL: log::Level = log::Level::Debug;
pub const DEFAULT_LOG_FILE_NAME: &str = "lanes.log";
pub const DEFAULT_PROGRESS_TICKS: u64 = 1000;
pub const DEFAULT_RANDOM_DMA_MAX_BYTES: u64 = 256;
pub const DEFAULT_SEED: u64 = 1;

/// Command-line arguments.
#[derive(Parser, Serialize, Deserialize, Clone, Debug, PartialEq)]
#[command(about = "PCIe/CXL fabric simulator")]
pub struct SimConfig {
    /// A TOML file of settings to apply beneath the environment and command
    /// line.
    #[arg(long)]
    #[serde(skip)]
    pub conf_file: Option<PathBuf>,

    /// The topology to simulate. The built-in reference topology is used if
    /// none is given.
    #[arg(long)]
    pub topology: Option<PathBuf>,

    /// Enable logging to the console.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub stdout: Option<bool>,

    /// Level of log message to display.
    #[arg(long)]
    pub stdout_level: Option<log::Level>,

    /// Set a regular expression for which entities should have logging level
    /// set to `--stdout-level`. Others will have level set to `Error`.
    #[arg(long)]
    pub stdout_filter_regex: Option<String>,

    /// Enable logging to a text file.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub log_file: Option<bool>,

    /// Level of log message to write to the log file.
    #[arg(long)]
    pub log_file_level: Option<log::Level>,

    /// Set a regular expression for which entities should have log file level
    /// set to `--log-file-level`. Others will have level set to `Error`.
    #[arg(long)]
    pub log_file_filter_regex: Option<String>,

    /// The filename log file output is written to.
    #[arg(long)]
    pub log_file_name: Option<String>,

    /// Show a progress bar for the completed DMA count.
    #[arg(long, num_args = 0..=1, default_missing_value = "true")]
    pub progress: Option<bool>,

    /// Number of ticks between updates to the progress bar.
    #[arg(long)]
    pub progress_ticks: Option<u64>,

    /// Configure a clock tick on which to terminate the simulation. Use 0 to
    /// run until completion.
    #[arg(long)]
    pub finish_tick: Option<u64>,

    /// Append this many random DMA operations to the program of every
    /// endpoint.
    #[arg(long)]
    pub random_dma_ops: Option<usize>,

    /// Largest random DMA transfer. Limited to the smallest link payload.
    #[arg(long)]
    pub random_dma_max_bytes: Option<u64>,

    /// Seed for random number generator.
    #[arg(long)]
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            conf_file: None,
            topology: None,
            stdout: Some(false),
            stdout_level: Some(DEFAULT_STDOUT_LEVEL),
            stdout_filter_regex: Some(String::new()),
            log_file: Some(false),
            log_file_level: Some(DEFAULT_LOG_FILE_LEVEL),
            log_file_filter_regex: Some(String::new()),
            log_file_name: Some(DEFAULT_LOG_FILE_NAME.to_string()),
            progress: Some(false),
            progress_ticks: Some(DEFAULT_PROGRESS_TICKS),
            finish_tick: Some(0),
            random_dma_ops: Some(0),
            random_dma_max_bytes: Some(DEFAULT_RANDOM_DMA_MAX_BYTES),
            seed: Some(DEFAULT_SEED),
        }
    }
}

/// Defaults overlaid with the configuration file (if any) and environment.
fn figment(conf_file: Option<&Path>) -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(SimConfig::default()));
    if let Some(conf_file) = conf_file {
        figment = figment.merge(Toml::file(conf_file));
    }
    figment.merge(Env::prefixed(ENV_PREFIX))
}

impl SimConfig {
    /// Parse the command line and merge it with every other source.
    pub fn parse_all_sources() -> Result<Self, SimError> {
        Self::resolve(Self::parse())
    }

    /// Merge `cli` over the defaults, configuration file and environment.
    pub fn resolve(cli: SimConfig) -> Result<Self, SimError> {
        if let Some(conf_file) = &cli.conf_file {
            if !conf_file.is_file() {
                return sim_error!("configuration file {} not found", conf_file.display());
            }
        }

        let mut config: SimConfig = figment(cli.conf_file.as_deref())
            .extract()
            .map_err(|e| SimError(format!("invalid configuration: {e}")))?;
        config.merge(cli);
        Ok(config)
    }

    fn merge(&mut self, cli: SimConfig) {
        macro_rules! take_given {
            ($($field:ident),+) => {
                $(
                    if cli.$field.is_some() {
                        self.$field = cli.$field;
                    }
                )+
            };
        }
        take_given!(
            conf_file,
            topology,
            stdout,
            stdout_level,
            stdout_filter_regex,
            log_file,
            log_file_level,
            log_file_filter_regex,
            log_file_name,
            progress,
            progress_ticks,
            finish_tick,
            random_dma_ops,
            random_dma_max_bytes,
            seed
        );
    }

    #[must_use]
    pub fn stdout(&self) -> bool {
        self.stdout.unwrap_or(false)
    }

    #[must_use]
    pub fn stdout_level(&self) -> log::Level {
        self.stdout_level.unwrap_or(DEFAULT_STDOUT_LEVEL)
    }

    #[must_use]
    pub fn stdout_filter_regex(&self) -> &str {
        self.stdout_filter_regex.as_deref().unwrap_or("")
    }

    #[must_use]
    pub fn log_file(&self) -> bool {
        self.log_file.unwrap_or(false)
    }

    #[must_use]
    pub fn log_file_level(&self) -> log::Level {
        self.log_file_level.unwrap_or(DEFAULT_LOG_FILE_LEVEL)
    }

    #[must_use]
    pub fn log_file_filter_regex(&self) -> &str {
        self.log_file_filter_regex.as_deref().unwrap_or("")
    }

    #[must_use]
    pub fn log_file_name(&self) -> &str {
        self.log_file_name.as_deref().unwrap_or(DEFAULT_LOG_FILE_NAME)
    }

    #[must_use]
    pub fn progress(&self) -> bool {
        self.progress.unwrap_or(false)
    }

    #[must_use]
    pub fn progress_ticks(&self) -> u64 {
        self.progress_ticks.unwrap_or(DEFAULT_PROGRESS_TICKS).max(1)
    }

    #[must_use]
    pub fn finish_tick(&self) -> u64 {
        self.finish_tick.unwrap_or(0)
    }

    #[must_use]
    pub fn random_dma_ops(&self) -> usize {
        self.random_dma_ops.unwrap_or(0)
    }

    #[must_use]
    pub fn random_dma_max_bytes(&self) -> u64 {
        self.random_dma_max_bytes.unwrap_or(DEFAULT_RANDOM_DMA_MAX_BYTES)
    }

    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed.unwrap_or(DEFAULT_SEED)
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    fn cli(args: &[&str]) -> SimConfig {
        let mut argv = vec!["sim-pcie"];
        argv.extend_from_slice(args);
        SimConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults() {
        Jail::expect_with(|_jail| {
            let config = SimConfig::resolve(cli(&[])).map_err(|e| e.0)?;
            assert!(!config.stdout());
            assert_eq!(config.stdout_level(), log::Level::Info);
            assert_eq!(config.finish_tick(), 0);
            assert_eq!(config.seed(), DEFAULT_SEED);
            assert_eq!(config.topology, None);
            Ok(())
        });
    }

    #[test]
    fn flag_without_value() {
        let config = cli(&["--stdout", "--stdout-level", "debug"]);
        assert_eq!(config.stdout, Some(true));
        assert_eq!(config.stdout_level, Some(log::Level::Debug));
        assert_eq!(cli(&["--stdout", "false"]).stdout, Some(false));
    }

    #[test]
    fn sources_in_priority_order() {
        Jail::expect_with(|jail| {
            jail.create_file("sim.toml", "finish_tick = 500\nseed = 7\nrandom_dma_ops = 3\n")
                .map_err(|e| e.to_string())?;
            jail.set_env("LANES_SEED", "9");
            jail.set_env("LANES_RANDOM_DMA_MAX_BYTES", "64");

            let config = SimConfig::resolve(cli(&["--conf-file", "sim.toml", "--random-dma-ops", "5"]))
                .map_err(|e| e.0)?;

            // File over defaults
            assert_eq!(config.finish_tick(), 500);
            // Environment over file
            assert_eq!(config.seed(), 9);
            assert_eq!(config.random_dma_max_bytes(), 64);
            // Command line over everything
            assert_eq!(config.random_dma_ops(), 5);
            Ok(())
        });
    }

    #[test]
    fn missing_conf_file() {
        Jail::expect_with(|_jail| {
            let error = SimConfig::resolve(cli(&["--conf-file", "missing.toml"])).unwrap_err();
            assert_eq!(error.to_string(), "Error: configuration file missing.toml not found");
            Ok(())
        });
    }

    #[test]
    fn bad_environment() {
        Jail::expect_with(|jail| {
            jail.set_env("LANES_FINISH_TICK", "soon");
            assert!(SimConfig::resolve(cli(&[])).is_err());
            Ok(())
        });
    }
}
