// src/assemble/command.rs

use std::fmt;

use crate::config::ToolConfig;
use crate::submission::SubmissionSpec;

/// A fully resolved program invocation. Never passed through a shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                write!(f, " '{}'", arg)?;
            } else {
                write!(f, " {}", arg)?;
            }
        }
        Ok(())
    }
}

/// Build the tool invocation for one submission.
///
/// `feeder_file` is the bare file name; the tool resolves it against its
/// own resources directory.
pub fn build_command(spec: &SubmissionSpec, tool: &ToolConfig, feeder_file: &str) -> ToolCommand {
    let params = &spec.parameters;

    let mut args = tool.args.clone();
    args.push(format!("-DbaseUrl={}", spec.base_url));
    args.push(format!("-Dvu={}", params.virtual_users));
    args.push(format!("-Dduration={}", params.duration_seconds));
    args.push(format!("-Drps={}", format_number(params.rps)));
    args.push("-DfeederType=csv".to_string());
    args.push(format!("-DcsvFile={}", feeder_file));
    args.push(format!("-Dheaders={}", join_headers(spec)));

    if let Some(assertions) = &spec.assertions {
        args.push("-DenableAssertions=true".to_string());
        if let Some(fail_pct) = assertions.fail_pct_lt {
            args.push(format!("-DfailPctLt={}", format_number(fail_pct)));
        }
        if let Some(p95) = assertions.p95_lt_ms {
            args.push(format!("-Dp95Lt={}", format_number(p95)));
        }
    }

    ToolCommand {
        program: tool.program.clone(),
        args,
    }
}

/// `k:v,k2:v2`, in key order.
fn join_headers(spec: &SubmissionSpec) -> String {
    spec.headers
        .iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Whole numbers keep one decimal (`10.0`) so the tool always sees a float.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{:.1}", value)
    } else {
        value.to_string()
    }
}
