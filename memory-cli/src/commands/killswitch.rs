use clap::{Args, ValueEnum};
use memory_core::audit::AuditEngine;
use memory_core::config::Config;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::output::{Output, OutputFormat};

#[derive(Args)]
pub struct KillSwitchArgs {
    #[command(subcommand)]
    pub command: KillSwitchCommand,
}

#[derive(clap::Subcommand)]
pub enum KillSwitchCommand {
    /// Toggle a feature flag, persisting it to the config file and
    /// appending an audit record.
    Set {
        #[arg(value_enum)]
        flag: Flag,
        enabled: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Flag {
    AutoUpdateEnabled,
    FreshnessEnabled,
}

impl Flag {
    fn name(self) -> &'static str {
        match self {
            Flag::AutoUpdateEnabled => "auto_update_enabled",
            Flag::FreshnessEnabled => "freshness_enabled",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct KillSwitchResult {
    pub flag: String,
    pub enabled: bool,
}

impl Output for KillSwitchResult {
    fn write_human<W: std::io::Write>(&self, mut writer: W) -> anyhow::Result<()> {
        writeln!(writer, "{} = {}", self.flag, self.enabled)?;
        Ok(())
    }
}

/// Toggle `flag` both in the in-process [`Config`] and in the on-disk
/// copy at `config_path`, so the change survives the next process start.
/// The pipeline never re-reads config mid-run, so a kill switch only
/// takes effect for processes started after this call.
pub async fn run(
    args: KillSwitchArgs,
    config: &mut Config,
    config_path: &Path,
    engine: &AuditEngine,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let KillSwitchCommand::Set { flag, enabled } = args.command;
    match flag {
        Flag::AutoUpdateEnabled => config.features.auto_update_enabled = enabled,
        Flag::FreshnessEnabled => config.features.freshness_enabled = enabled,
    }

    persist(config, config_path)?;
    engine
        .record_kill_switch(flag.name(), enabled)
        .await
        .map_err(|e| anyhow::anyhow!("failed to record kill switch toggle: {e}"))?;

    format.print(&KillSwitchResult {
        flag: flag.name().to_string(),
        enabled,
    })
}

fn persist(config: &Config, path: &Path) -> anyhow::Result<()> {
    let rendered = toml::to_string_pretty(config)?;
    std::fs::write(path, rendered)?;
    Ok(())
}

/// Default config file path used when `--config` is not given, matching
/// [`Config::load`]'s own search order.
#[must_use]
pub fn default_config_path() -> PathBuf {
    for candidate in ["memory.toml", ".memory.toml"] {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return path;
        }
    }
    PathBuf::from("memory.toml")
}
