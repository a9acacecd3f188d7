//! JSON output for the CLI
//!
//! One JSON object per line on stdout, UTF-8 only:
//! - `{"status":"ok","data":...}`
//! - `{"status":"error","code":...,"message":...}`

use std::io::{self, Write};

use serde::Serialize;
use serde_json::Value;

use super::errors::CliResult;

fn write_line(value: &Value) -> CliResult<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, value)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

/// Builds a success response.
pub fn ok_response(data: impl Serialize) -> CliResult<Value> {
    Ok(serde_json::json!({
        "status": "ok",
        "data": serde_json::to_value(data)?
    }))
}

/// Builds an error response.
pub fn error_response(code: &str, message: &str) -> Value {
    serde_json::json!({
        "status": "error",
        "code": code,
        "message": message
    })
}

/// Write a success response to stdout
pub fn write_response(data: impl Serialize) -> CliResult<()> {
    write_line(&ok_response(data)?)
}

/// Write an error response to stdout
pub fn write_error(code: &str, message: &str) -> CliResult<()> {
    write_line(&error_response(code, message))
}
