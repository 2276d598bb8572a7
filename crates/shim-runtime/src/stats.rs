//! Per-run counters and the report returned by [`crate::Runtime::run`].

use serde::Serialize;
use shim_core::ExitCode;
use std::time::Duration;

/// Counters updated by the bridges while the guest runs.
///
/// The store is single-threaded, so these are plain integers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStats {
    /// Completed `poll` calls
    pub polls: u64,
    /// Calls into the resumption export
    pub resumes: u64,
    /// Races won by a pollable that settled as `Failed`
    pub failed_winners: u64,
    /// Bytes accepted by `fd_write` on stdout
    pub bytes_written: u64,
    /// Values relayed through `console.log`
    pub guest_logs: u64,
    /// Last code passed to `proc_exit` when it did not terminate the process
    pub exit_request: Option<ExitCode>,
}

/// Summary of one guest run.
///
/// # Examples
///
/// ```
/// use shim_core::ExitCode;
/// use shim_runtime::stats::{HostStats, RunReport};
/// use std::time::Duration;
///
/// let report = RunReport::new(ExitCode::from_i32(3), Duration::from_millis(12), 2, HostStats::default());
/// let json = serde_json::to_value(&report).unwrap();
/// assert_eq!(json["exit_code"], 3);
/// assert_eq!(json["pollables"], 2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Integer returned by the run entrypoint
    pub exit_code: ExitCode,
    /// Wall-clock time from instantiation to return
    pub elapsed_ms: u64,
    /// Pollables subscribed during the run
    pub pollables: usize,
    /// Completed `poll` calls
    pub polls: u64,
    /// Calls into the resumption export
    pub resumes: u64,
    /// Races won by a failed pollable
    pub failed_winners: u64,
    /// Bytes written to stdout
    pub bytes_written: u64,
    /// Guest log lines
    pub guest_logs: u64,
    /// Code reported by `proc_exit` in report mode
    pub exit_request: Option<ExitCode>,
}

impl RunReport {
    /// Builds a report from the final counters.
    #[must_use]
    pub fn new(exit_code: ExitCode, elapsed: Duration, pollables: usize, stats: HostStats) -> Self {
        Self {
            exit_code,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            pollables,
            polls: stats.polls,
            resumes: stats.resumes,
            failed_winners: stats.failed_winners,
            bytes_written: stats.bytes_written,
            guest_logs: stats.guest_logs,
            exit_request: stats.exit_request,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_copies_counters() {
        let stats = HostStats {
            polls: 4,
            resumes: 4,
            bytes_written: 11,
            guest_logs: 2,
            exit_request: Some(ExitCode::from_i32(42)),
            ..HostStats::default()
        };
        let report = RunReport::new(ExitCode::SUCCESS, Duration::from_secs(1), 5, stats);

        assert_eq!(report.elapsed_ms, 1000);
        assert_eq!(report.polls, 4);
        assert_eq!(report.resumes, 4);
        assert_eq!(report.bytes_written, 11);
        assert_eq!(report.exit_request, Some(ExitCode::from_i32(42)));
    }

    #[test]
    fn test_report_serializes_missing_exit_request_as_null() {
        let report = RunReport::new(ExitCode::SUCCESS, Duration::ZERO, 0, HostStats::default());
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["exit_request"].is_null());
        assert_eq!(json["elapsed_ms"], 0);
    }
}
