// src/assemble/feeder.rs

//! CSV feeder file listing the endpoints of one execution.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

use crate::errors::Result;
use crate::submission::EndpointSpec;
use crate::types::ExecutionId;

const HEADER: [&str; 4] = ["name", "url", "method", "headers"];

/// `endpoints_<execution-id>.csv`
pub fn feeder_file_name(execution_id: &ExecutionId) -> String {
    format!("endpoints_{}.csv", execution_id)
}

/// Write the feeder file into `dir`, creating the directory if needed.
pub fn write_feeder(dir: &Path, execution_id: &ExecutionId, endpoints: &[EndpointSpec]) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating feeder directory {:?}", dir))?;

    let path = dir.join(feeder_file_name(execution_id));
    let contents = render_feeder(endpoints)?;
    fs::write(&path, contents).with_context(|| format!("writing feeder file {:?}", path))?;

    debug!(%execution_id, path = ?path, rows = endpoints.len(), "feeder file written");
    Ok(path)
}

/// Render the feeder as RFC 4180 CSV. The headers column holds each
/// endpoint's headers as a JSON object.
pub fn render_feeder(endpoints: &[EndpointSpec]) -> Result<String> {
    let mut out = String::new();
    push_row(&mut out, HEADER);

    for endpoint in endpoints {
        let headers = serde_json::to_string(&endpoint.headers)?;
        push_row(
            &mut out,
            [
                endpoint.name.as_str(),
                endpoint.path.as_str(),
                endpoint.method.as_str(),
                headers.as_str(),
            ],
        );
    }

    Ok(out)
}

fn push_row<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    for (idx, field) in fields.into_iter().enumerate() {
        if idx > 0 {
            out.push(',');
        }
        push_field(out, field);
    }
    out.push_str("\r\n");
}

fn push_field(out: &mut String, field: &str) {
    let needs_quotes = field.contains([',', '"', '\n', '\r']);
    if !needs_quotes {
        out.push_str(field);
        return;
    }
    out.push('"');
    for c in field.chars() {
        if c == '"' {
            out.push('"');
        }
        out.push(c);
    }
    out.push('"');
}
