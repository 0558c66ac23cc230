use std::fmt;

/// Machine-readable error codes surfaced by the CLI and wavelet views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    LogParseError,
    OperationMismatch,
    ContentMismatch,
    VersionGap,
    UnknownWavelet,
    WaveletFailed,
    WaveletClosed,
    HistoryUnavailable,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1001",
            Self::LogParseError => "E1002",
            Self::OperationMismatch => "E2001",
            Self::ContentMismatch => "E2002",
            Self::VersionGap => "E3001",
            Self::UnknownWavelet => "E4001",
            Self::WaveletFailed => "E4002",
            Self::WaveletClosed => "E4003",
            Self::HistoryUnavailable => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::LogParseError => "Delta log parse error",
            Self::OperationMismatch => "Operations are not composable",
            Self::ContentMismatch => "Deleted content does not match document",
            Self::VersionGap => "Delta applied out of version order",
            Self::UnknownWavelet => "Wavelet not open in this view",
            Self::WaveletFailed => "Wavelet failed permanently",
            Self::WaveletClosed => "Wavelet is closed or inaccessible",
            Self::HistoryUnavailable => "History fetch failed",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in .wave/config.toml and retry."),
            Self::LogParseError => {
                Some("Write one JSON delta per line, in increasing version order.")
            }
            Self::OperationMismatch | Self::ContentMismatch => {
                Some("Reopen the wavelet from a fresh snapshot; local state has diverged.")
            }
            Self::VersionGap => Some("Deliver deltas in strictly increasing version order."),
            Self::UnknownWavelet => Some("Open the wavelet before routing deltas to it."),
            Self::WaveletFailed => Some("Close the wavelet and reopen it from the server."),
            Self::WaveletClosed => None,
            Self::HistoryUnavailable => Some("History is truncated here; retry the fetch later."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::ErrorCode;
    use std::collections::HashSet;

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::ConfigParseError,
            ErrorCode::LogParseError,
            ErrorCode::OperationMismatch,
            ErrorCode::ContentMismatch,
            ErrorCode::VersionGap,
            ErrorCode::UnknownWavelet,
            ErrorCode::WaveletFailed,
            ErrorCode::WaveletClosed,
            ErrorCode::HistoryUnavailable,
            ErrorCode::InternalUnexpected,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn code_format_is_machine_friendly() {
        let code = ErrorCode::VersionGap.code();
        assert_eq!(code.len(), 5);
        assert!(code.starts_with('E'));
        assert!(code.chars().skip(1).all(|c| c.is_ascii_digit()));
    }
}
