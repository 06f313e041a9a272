// src/monitor/patterns.rs

//! Line matchers for the load tool's log output.
//!
//! Every line is run through [`Matcher::ALL`] in order. Matchers are
//! independent: a single line can produce zero, one or several events.
//! Nothing here touches a process or a file, so the table can be tested with
//! plain strings.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::types::ExecutionStatus;

/// Typed result of one matcher hitting one line.
#[derive(Debug, Clone, PartialEq)]
pub enum LogEvent {
    /// Non-terminal phase change (`Running`, `Parsing`, `GeneratingReports`).
    PhaseChanged(ExecutionStatus),
    /// Canonical success signal, carrying the report location.
    ReportsGenerated(String),
    /// Build failure or failed assertions.
    HardFailure(String),
    /// `[ERROR] <text>`; `fatal` when the line also signals a failure.
    ErrorLine { message: String, fatal: bool },
    Progress(f64),
    Users { waiting: u64, active: u64, done: u64 },
    Requests { total: u64, ok: u64, ko: u64 },
    MeanResponseTime(f64),
    P95ResponseTime(f64),
    Throughput(f64),
}

impl LogEvent {
    /// Events after which the rest of the line and batch are skipped.
    pub fn is_definitive(&self) -> bool {
        matches!(
            self,
            LogEvent::ReportsGenerated(_)
                | LogEvent::HardFailure(_)
                | LogEvent::ErrorLine { fatal: true, .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    SimulationStarted,
    ParsingLogs,
    GeneratingReports,
    ReportsGenerated,
    BuildFailure,
    ErrorLine,
    ProgressBar,
    UserStats,
    RequestStats,
    MeanResponseTime,
    P95ResponseTime,
    Throughput,
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static log pattern must compile")
}

static SIMULATION_STARTED: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\[INFO\] Running simulation|Simulation \S+ started"));
static PARSING_LOGS: LazyLock<Regex> = LazyLock::new(|| compile(r"Parsing log file\(s\)\.{3}"));
static GENERATING_REPORTS: LazyLock<Regex> =
    LazyLock::new(|| compile(r"Generating reports\.{3}"));
static REPORTS_GENERATED: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"Reports generated(?: in \S+)?, please open the following file:\s+(\S.*)")
});
static BUILD_FAILURE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\[INFO\]\s+BUILD FAILURE|Gatling simulation assertions failed")
});
static ERROR_LINE: LazyLock<Regex> = LazyLock::new(|| compile(r"\[ERROR\](.+)"));
static PROGRESS_BAR: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\[([#\-\s]+)\]\s+(\d+(?:\.\d+)?)%"));
static USER_STATS: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"waiting:\s+(\d+)\s+/\s+active:\s+(\d+)\s+/\s+done:\s+(\d+)")
});
static REQUEST_STATS: LazyLock<Regex> =
    LazyLock::new(|| compile(r">\s+Global\s+\|\s+(\d+)\s+\|\s+(\d+)\s+\|\s+(\d+)"));
static MEAN_RESPONSE_TIME: LazyLock<Regex> =
    LazyLock::new(|| compile(r">\s+mean response time \(ms\)\s+\|\s+(\d+(?:\.\d+)?)"));
static P95_RESPONSE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    compile(r">\s+response time 95th percentile \(ms\)\s+\|\s+([0-9][0-9,]*(?:\.\d+)?)")
});
static THROUGHPUT: LazyLock<Regex> =
    LazyLock::new(|| compile(r">\s+mean throughput \(rps\)\s+\|\s+(\d+(?:\.\d+)?)"));

impl Matcher {
    /// Evaluation order for every line.
    pub const ALL: [Matcher; 12] = [
        Matcher::SimulationStarted,
        Matcher::ParsingLogs,
        Matcher::GeneratingReports,
        Matcher::ReportsGenerated,
        Matcher::BuildFailure,
        Matcher::ErrorLine,
        Matcher::ProgressBar,
        Matcher::UserStats,
        Matcher::RequestStats,
        Matcher::MeanResponseTime,
        Matcher::P95ResponseTime,
        Matcher::Throughput,
    ];

    fn regex(self) -> &'static Regex {
        match self {
            Matcher::SimulationStarted => &SIMULATION_STARTED,
            Matcher::ParsingLogs => &PARSING_LOGS,
            Matcher::GeneratingReports => &GENERATING_REPORTS,
            Matcher::ReportsGenerated => &REPORTS_GENERATED,
            Matcher::BuildFailure => &BUILD_FAILURE,
            Matcher::ErrorLine => &ERROR_LINE,
            Matcher::ProgressBar => &PROGRESS_BAR,
            Matcher::UserStats => &USER_STATS,
            Matcher::RequestStats => &REQUEST_STATS,
            Matcher::MeanResponseTime => &MEAN_RESPONSE_TIME,
            Matcher::P95ResponseTime => &P95_RESPONSE_TIME,
            Matcher::Throughput => &THROUGHPUT,
        }
    }

    /// Run this matcher against one line.
    pub fn extract(self, line: &str) -> Option<LogEvent> {
        let caps = self.regex().captures(line)?;

        match self {
            Matcher::SimulationStarted => Some(LogEvent::PhaseChanged(ExecutionStatus::Running)),
            Matcher::ParsingLogs => Some(LogEvent::PhaseChanged(ExecutionStatus::Parsing)),
            Matcher::GeneratingReports => {
                Some(LogEvent::PhaseChanged(ExecutionStatus::GeneratingReports))
            }
            Matcher::ReportsGenerated => {
                Some(LogEvent::ReportsGenerated(caps[1].trim().to_string()))
            }
            Matcher::BuildFailure => Some(LogEvent::HardFailure(line.trim().to_string())),
            Matcher::ErrorLine => {
                let message = caps[1].trim().to_string();
                let fatal = line.contains("FAILURE") || message.to_lowercase().contains("failed");
                Some(LogEvent::ErrorLine { message, fatal })
            }
            Matcher::ProgressBar => float_at(&caps, 2).map(LogEvent::Progress),
            Matcher::UserStats => Some(LogEvent::Users {
                waiting: int_at(&caps, 1)?,
                active: int_at(&caps, 2)?,
                done: int_at(&caps, 3)?,
            }),
            Matcher::RequestStats => Some(LogEvent::Requests {
                total: int_at(&caps, 1)?,
                ok: int_at(&caps, 2)?,
                ko: int_at(&caps, 3)?,
            }),
            Matcher::MeanResponseTime => float_at(&caps, 1).map(LogEvent::MeanResponseTime),
            Matcher::P95ResponseTime => caps[1]
                .replace(',', "")
                .parse()
                .ok()
                .map(LogEvent::P95ResponseTime),
            Matcher::Throughput => float_at(&caps, 1).map(LogEvent::Throughput),
        }
    }
}

fn int_at(caps: &Captures<'_>, idx: usize) -> Option<u64> {
    caps.get(idx)?.as_str().parse().ok()
}

fn float_at(caps: &Captures<'_>, idx: usize) -> Option<f64> {
    caps.get(idx)?.as_str().parse().ok()
}

/// Parse one log line into events, in matcher order.
///
/// Stops after the first definitive event (completion or hard failure).
pub fn parse_line(line: &str) -> Vec<LogEvent> {
    let line = line.trim();
    let mut events = Vec::new();
    if line.is_empty() {
        return events;
    }

    for matcher in Matcher::ALL {
        if let Some(event) = matcher.extract(line) {
            let definitive = event.is_definitive();
            events.push(event);
            if definitive {
                break;
            }
        }
    }

    events
}
