//! Human/JSON output dispatch: every command result implements
//! [`Output`] and is printed through whichever format the caller
//! requested.

use clap::ValueEnum;
use serde::Serialize;
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable, formatted for a terminal.
    Human,
    /// JSON, for scripting.
    Json,
}

pub trait Output {
    fn write_human<W: Write>(&self, writer: W) -> anyhow::Result<()>;

    fn write_json<W: Write>(&self, mut writer: W) -> anyhow::Result<()>
    where
        Self: Serialize,
    {
        serde_json::to_writer_pretty(&mut writer, self)?;
        writeln!(writer)?;
        Ok(())
    }
}

impl OutputFormat {
    pub fn print<T: Output + Serialize>(&self, data: &T) -> anyhow::Result<()> {
        match self {
            OutputFormat::Human => data.write_human(io::stdout()),
            OutputFormat::Json => data.write_json(io::stdout()),
        }
    }
}
