//! Human-readable statistics report.

use crate::colors::{BOLD, CYAN, DIM, GREEN, RED, RESET, YELLOW};
use courier_core::{RunStatistics, SendBudget, format_seconds};
use std::fmt::Write;

struct Palette {
    header: &'static str,
    value: &'static str,
    dim: &'static str,
    reset: &'static str,
}

impl Palette {
    fn new(use_colors: bool) -> Self {
        if use_colors {
            Self {
                header: BOLD,
                value: CYAN,
                dim: DIM,
                reset: RESET,
            }
        } else {
            Self {
                header: "",
                value: "",
                dim: "",
                reset: "",
            }
        }
    }

    fn section(&self, out: &mut String, accent: &str, title: &str) {
        let accent = if self.reset.is_empty() { "" } else { accent };
        let _ = writeln!(
            out,
            "{dim}───{reset} {header}{accent}{title}{reset}",
            dim = self.dim,
            header = self.header,
            reset = self.reset,
        );
    }

    fn line(&self, out: &mut String, label: &str, value: impl std::fmt::Display) {
        let _ = writeln!(
            out,
            "  • {label:<24}{value_color}{value}{reset}",
            value_color = self.value,
            reset = self.reset,
        );
    }
}

/// Renders the sent, failed and other sections of the statistics report.
///
/// Remaining time and messages are only listed for the limits `budget`
/// actually sets.
pub fn statistics_report(
    stats: &RunStatistics,
    budget: Option<&SendBudget>,
    use_colors: bool,
) -> String {
    let palette = Palette::new(use_colors);
    let rates = stats.rates();
    let mut out = String::new();

    palette.section(&mut out, GREEN, "Sent Message Statistics");
    palette.line(&mut out, "Messages Sent:", stats.messages_sent);
    palette.line(&mut out, "Time Spent Sending:", format_seconds(stats.time_sending));
    palette.line(
        &mut out,
        "Average Time to Send:",
        format_seconds(rates.average_send_time),
    );
    palette.line(
        &mut out,
        "Success Rate:",
        format!("{:.2}%", rates.success_rate),
    );

    palette.section(&mut out, RED, "Failed Message Statistics");
    palette.line(&mut out, "Messages Failed:", stats.messages_failed);
    palette.line(&mut out, "Times Failed/Retried:", stats.times_failed);
    palette.line(
        &mut out,
        "Time Spent Retrying:",
        format_seconds(stats.time_retrying),
    );
    palette.line(
        &mut out,
        "Average Time to Retry:",
        format_seconds(rates.average_retry_time),
    );

    palette.section(&mut out, YELLOW, "Other Statistics");
    palette.line(&mut out, "Time Spent Waiting:", format_seconds(rates.time_waited));
    palette.line(
        &mut out,
        "Average Time Waiting:",
        format_seconds(rates.average_wait_time),
    );
    palette.line(&mut out, "Time Running:", format_seconds(stats.time_running));
    palette.line(&mut out, "Roster Position:", stats.current_position);
    if let Some(budget) = budget {
        if let Some(remaining) = budget.remaining_time(stats.time_running) {
            palette.line(&mut out, "Remaining Time:", format_seconds(remaining));
        }
        if let Some(remaining) = budget.remaining_messages(stats.messages_sent) {
            palette.line(&mut out, "Remaining Messages:", remaining);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RunStatistics {
        RunStatistics {
            time_running: 90.0,
            messages_sent: 3,
            messages_failed: 1,
            times_failed: 4,
            time_sending: 6.0,
            time_retrying: 8.0,
            current_position: 4,
        }
    }

    #[test]
    fn test_plain_report_has_every_section() {
        let report = statistics_report(&sample(), None, false);

        assert!(report.contains("Sent Message Statistics"));
        assert!(report.contains("Failed Message Statistics"));
        assert!(report.contains("Other Statistics"));
        assert!(report.contains("Messages Sent:"));
        assert!(report.contains("1m 30s"));
        assert!(!report.contains('\x1b'));
        assert!(!report.contains("Remaining"));
    }

    #[test]
    fn test_remaining_lines_follow_budget() {
        let budget = SendBudget::new(Some(120.0), Some(10), 3, 0.0, 0.0).unwrap();
        let report = statistics_report(&sample(), Some(&budget), false);

        assert!(report.contains("Remaining Time:"));
        assert!(report.contains("Remaining Messages:"));

        let unlimited = SendBudget::unpaced(3);
        let report = statistics_report(&sample(), Some(&unlimited), false);
        assert!(!report.contains("Remaining"));
    }

    #[test]
    fn test_colored_report_uses_ansi() {
        let report = statistics_report(&sample(), None, true);
        assert!(report.contains(CYAN));
        assert!(report.contains(RESET));
    }
}
