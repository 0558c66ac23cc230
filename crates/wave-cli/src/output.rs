//! Output modes for `wv` and the small helpers every command renders with.
//!
//! The mode comes from `--format` or `--json` when given; otherwise from the
//! value `wave_core::config` resolved (`FORMAT`, user config, then TTY
//! detection).

use std::io::{self, Write};

use clap::ValueEnum;
use serde::Serialize;
use wave_core::ErrorCode;

const RULE: &str = "────────────────────────────────────────────────────────────────────────";

pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}\n{RULE}")
}

/// `Key:` padded to a fixed column, then the value.
pub fn pretty_kv(w: &mut dyn Write, key: &str, value: impl AsRef<str>) -> io::Result<()> {
    writeln!(w, "{:<12} {}", format!("{key}:"), value.as_ref())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Sections and aligned columns for a terminal.
    Pretty,
    /// One `key=value` record per line.
    Text,
    /// Pretty-printed JSON on stdout.
    Json,
}

impl OutputMode {
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }

    /// Pick the mode from an explicit flag, else from the resolved config value.
    pub fn resolve(flag: Option<Self>, resolved: &str) -> Self {
        flag.unwrap_or(match resolved {
            "json" => Self::Json,
            "pretty" => Self::Pretty,
            _ => Self::Text,
        })
    }
}

/// Write `value` to stdout: serialized for JSON, through `text` or `pretty` otherwise.
pub fn render_mode<T: Serialize>(
    mode: OutputMode,
    value: &T,
    text: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
    pretty: impl FnOnce(&T, &mut dyn Write) -> io::Result<()>,
) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match mode {
        OutputMode::Json => {
            serde_json::to_writer_pretty(&mut out, value)?;
            writeln!(out)?;
        }
        OutputMode::Text => text(value, &mut out)?,
        OutputMode::Pretty => pretty(value, &mut out)?,
    }
    Ok(())
}

/// A failure tied to one delta of a log, reported with its error code.
#[derive(Debug, Serialize)]
pub struct DeltaFailure {
    pub code: &'static str,
    pub message: String,
    /// 1-based line of the offending delta.
    pub line: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'static str>,
}

impl DeltaFailure {
    pub fn new(code: ErrorCode, message: impl Into<String>, line: usize) -> Self {
        Self {
            code: code.code(),
            message: message.into(),
            line,
            hint: code.hint(),
        }
    }

    /// Report on stderr; JSON mode wraps the failure in `{"error": ...}`.
    pub fn report(&self, mode: OutputMode) -> anyhow::Result<()> {
        let stderr = io::stderr();
        let mut err = stderr.lock();
        if mode.is_json() {
            serde_json::to_writer_pretty(&mut err, &serde_json::json!({ "error": self }))?;
            writeln!(err)?;
            return Ok(());
        }
        writeln!(err, "error[{}]: line {}: {}", self.code, self.line, self.message)?;
        if let Some(hint) = self.hint {
            writeln!(err, "  hint: {hint}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_flag_beats_config() {
        assert_eq!(OutputMode::resolve(Some(OutputMode::Text), "json"), OutputMode::Text);
    }

    #[test]
    fn config_value_maps_to_mode() {
        assert_eq!(OutputMode::resolve(None, "json"), OutputMode::Json);
        assert_eq!(OutputMode::resolve(None, "pretty"), OutputMode::Pretty);
        assert_eq!(OutputMode::resolve(None, "anything"), OutputMode::Text);
    }

    #[test]
    fn kv_lines_share_a_column() {
        let mut buf = Vec::new();
        pretty_kv(&mut buf, "Seeds", "10").expect("write");
        pretty_kv(&mut buf, "Version", "4").expect("write");
        assert_eq!(
            String::from_utf8(buf).expect("utf8"),
            "Seeds:       10\nVersion:     4\n"
        );
    }

    #[test]
    fn version_gap_failure_carries_code_and_hint() {
        let failure = DeltaFailure::new(ErrorCode::VersionGap, "gap", 3);
        assert_eq!(failure.code, "E3001");
        assert!(failure.hint.is_some());
        let json = serde_json::to_value(&failure).expect("serialize");
        assert_eq!(json["line"], 3);
    }
}
