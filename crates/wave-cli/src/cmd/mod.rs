pub mod config;
pub mod history;
pub mod replay;
pub mod sim;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use wave_core::delta::TransformedWaveletDelta;

/// Read a delta log: one JSON delta per line, blank lines ignored.
pub fn load_deltas(path: &Path) -> Result<Vec<TransformedWaveletDelta>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let deltas = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(line_no, line)| {
            serde_json::from_str::<TransformedWaveletDelta>(line).with_context(|| {
                format!(
                    "[{}] {}:{}: not a delta",
                    wave_core::ErrorCode::LogParseError,
                    path.display(),
                    line_no + 1
                )
            })
        })
        .collect::<Result<Vec<_>>>()?;
    tracing::debug!(path = %path.display(), deltas = deltas.len(), "delta log loaded");
    Ok(deltas)
}

/// Render milliseconds since the epoch as RFC 3339, or the raw number when
/// out of range.
pub fn format_timestamp(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map_or_else(|| millis.to_string(), |t| t.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_render_utc() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(format_timestamp(i64::MAX), i64::MAX.to_string());
    }

    #[test]
    fn bad_line_names_position() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("log.jsonl");
        fs::write(&path, "\n{not json}\n").expect("write");
        let err = load_deltas(&path).expect_err("must fail");
        assert!(format!("{err}").contains(":2: not a delta"));
        assert!(format!("{err}").contains("E1002"));
    }
}
