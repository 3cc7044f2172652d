//! Argument helpers shared by the MCP tool handlers

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{from_value, Value};

use crate::mcp::protocol::{error_codes, Response};

/// Helper function to extract a required argument from a JSON object
pub fn get_required_arg<T: DeserializeOwned>(
    args: &Value,
    key: &str,
    req_id: &Value,
) -> Result<T, Response> {
    from_value(args.get(key).cloned().unwrap_or(Value::Null)).map_err(|_| {
        Response::error(
            req_id.clone(),
            error_codes::INVALID_PARAMS,
            format!("Missing or invalid required argument: '{}'", key),
        )
    })
}

/// Like `get_required_arg`, but absent or null is `None`.
pub fn get_optional_arg<T: DeserializeOwned>(
    args: &Value,
    key: &str,
    req_id: &Value,
) -> Result<Option<T>, Response> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => from_value(v.clone()).map(Some).map_err(|_| {
            Response::error(
                req_id.clone(),
                error_codes::INVALID_PARAMS,
                format!("Invalid optional argument: '{}'", key),
            )
        }),
    }
}

/// Optional `timeout_secs` of the write tools, at least 1 when given.
pub fn get_timeout_arg(args: &Value, req_id: &Value) -> Result<Option<Duration>, Response> {
    match get_optional_arg::<u64>(args, "timeout_secs", req_id)? {
        Some(0) => Err(Response::error(
            req_id.clone(),
            error_codes::INVALID_PARAMS,
            "'timeout_secs' must be at least 1".into(),
        )),
        secs => Ok(secs.map(Duration::from_secs)),
    }
}
