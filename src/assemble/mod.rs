// src/assemble/mod.rs

//! Turns a [`SubmissionSpec`] into what the external load tool consumes: a
//! feeder file enumerating the endpoints and a command line carrying the
//! test parameters.

pub mod command;
pub mod feeder;

use std::path::PathBuf;

use tracing::info;

use crate::config::ToolConfig;
use crate::errors::Result;
use crate::submission::SubmissionSpec;
use crate::types::ExecutionId;

pub use command::{ToolCommand, build_command};
pub use feeder::{feeder_file_name, render_feeder, write_feeder};

/// Output of [`assemble`].
#[derive(Debug, Clone, PartialEq)]
pub struct Assembly {
    pub command: ToolCommand,
    pub feeder_file: PathBuf,
}

/// Validate `spec`, write its feeder file and build the command.
///
/// Fails with `InvalidSubmission` before touching the filesystem if the
/// submission is structurally unusable.
pub fn assemble(spec: &SubmissionSpec, tool: &ToolConfig, execution_id: &ExecutionId) -> Result<Assembly> {
    spec.validate()?;

    let feeder_file = write_feeder(&tool.feeder_path(), execution_id, &spec.endpoints)?;
    let command = build_command(spec, tool, &feeder_file_name(execution_id));

    info!(
        %execution_id,
        endpoints = spec.endpoints.len(),
        vu = spec.parameters.virtual_users,
        duration_s = spec.parameters.duration_seconds,
        "assembled load tool invocation"
    );

    Ok(Assembly { command, feeder_file })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EngineError;

    fn tool(root: &std::path::Path) -> ToolConfig {
        ToolConfig {
            program: "tool".to_string(),
            args: vec![],
            working_dir: root.to_path_buf(),
            feeder_dir: PathBuf::from("resources"),
        }
    }

    #[test]
    fn writes_feeder_under_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        let spec = SubmissionSpec::from_json_str(
            r#"{ "base_url": "http://localhost:8080", "endpoints": [{ "path": "/" }] }"#,
        )
        .unwrap();
        let id = ExecutionId::new("exec-1");

        let assembly = assemble(&spec, &tool(dir.path()), &id).unwrap();
        assert_eq!(assembly.feeder_file, dir.path().join("resources").join("endpoints_exec-1.csv"));
        assert!(assembly.feeder_file.is_file());
        assert!(assembly.command.args.contains(&"-DcsvFile=endpoints_exec-1.csv".to_string()));
    }

    #[test]
    fn rejected_spec_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let spec = SubmissionSpec::from_json_str(r#"{ "base_url": "http://localhost" }"#).unwrap();

        let err = assemble(&spec, &tool(dir.path()), &ExecutionId::new("x")).unwrap_err();
        assert!(matches!(err, EngineError::InvalidSubmission(_)));
        assert!(!dir.path().join("resources").exists());
    }
}
