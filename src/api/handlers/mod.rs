//! Method handlers: thin adapters between the dispatcher and the Media
//! Controller. Each handler decodes its typed params (unknown fields are
//! rejected), makes a single controller call, and reshapes the result into
//! the documented response envelope.

pub mod camera;
pub mod external;
pub mod recording;
pub mod snapshot;
pub mod storage;
pub mod streams;
pub mod subscription;
pub mod system;

use crate::api::error::RpcError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

static DEVICE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new("^camera[0-9]+$").expect("device id pattern is valid"));

/// Decode keyword params into the method's typed shape. All param structs
/// carry `deny_unknown_fields`, so a stray field is a −32602 naming it.
pub(crate) fn parse_params<T: DeserializeOwned>(params: Value) -> Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| RpcError::invalid_params(e.to_string()))
}

/// Methods that accept no params still reject unknown fields.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct NoParams {}

/// Shared paging shape for the list methods.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PageParams {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub(crate) const DEFAULT_PAGE_LIMIT: usize = 50;

impl PageParams {
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_LIMIT)
    }

    pub fn offset(&self) -> usize {
        self.offset.unwrap_or(0)
    }
}

/// Device identifiers are `camera<N>`; anything else is refused before the
/// controller is consulted.
pub(crate) fn validate_device(device: &str) -> Result<(), RpcError> {
    if DEVICE_ID.is_match(device) {
        Ok(())
    } else {
        Err(RpcError::invalid_params(format!(
            "field 'device' must match ^camera[0-9]+$, got '{device}'"
        )))
    }
}

/// Serialize a typed result into the response envelope.
pub(crate) fn ok<T: Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_pattern_is_strict() {
        assert!(validate_device("camera0").is_ok());
        assert!(validate_device("camera42").is_ok());
        for bad in ["camera", "cam0", "camera-1", "camera0x", "CAMERA0", "/dev/video0", ""] {
            let err = validate_device(bad).unwrap_err();
            assert_eq!(err.code, -32602, "{bad} must be rejected");
        }
    }

    #[test]
    fn unknown_param_fields_are_rejected() {
        let err = parse_params::<NoParams>(serde_json::json!({"extra": 1})).unwrap_err();
        assert_eq!(err.code, -32602);
        assert!(err.data.details.contains("extra"));
    }

    #[test]
    fn paging_defaults() {
        let p: PageParams = parse_params(serde_json::json!({})).unwrap();
        assert_eq!(p.limit(), DEFAULT_PAGE_LIMIT);
        assert_eq!(p.offset(), 0);
    }
}
