//! JSON wire boundary for calls addressed to an engine worker.
//!
//! Hosts that speak the serialised protocol send `{"method": …, "args": […]}`
//! objects.  [`WorkerCall::try_from`] turns one into a typed call; an unknown
//! method name or an argument that does not deserialise is rejected here and
//! never reaches the worker.
//!
//! ```
//! use serde_json::json;
//! use translations_engine::protocol::{WireCall, WorkerCall};
//!
//! let call = WireCall::new("match", vec![json!("en-fr/model.bin")]);
//! let call = WorkerCall::try_from(call).unwrap();
//! assert!(matches!(call, WorkerCall::Match { .. }));
//! ```

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::types::{EngineOptions, InferenceRequest, RequestId, RunOptions};

// ---------------------------------------------------------------------------
// ProtocolError
// ---------------------------------------------------------------------------

/// A call could not be decoded at the wire boundary.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum ProtocolError {
    /// The method name is not part of the worker protocol.
    #[error("method not found: {0}")]
    MethodNotFound(String),

    /// The message or one of its arguments has the wrong shape.
    #[error("malformed call to `{method}`: {reason}")]
    Malformed { method: String, reason: String },
}

// ---------------------------------------------------------------------------
// WireCall
// ---------------------------------------------------------------------------

/// Untyped method-name + argument-array message as it arrives off the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireCall {
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
}

impl WireCall {
    pub fn new(method: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            args,
        }
    }

    /// Parse a serialised call.
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed {
            method: "<unknown>".into(),
            reason: e.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// WorkerCall
// ---------------------------------------------------------------------------

/// Every call an engine worker accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerCall {
    InitializeEngine {
        runtime: Vec<u8>,
        options: EngineOptions,
    },
    Run {
        request: InferenceRequest,
        request_id: RequestId,
        options: RunOptions,
    },
    Match {
        key: String,
    },
    Put {
        key: String,
        body: Vec<u8>,
    },
}

impl WorkerCall {
    /// Wire name of the call.
    pub fn method(&self) -> &'static str {
        match self {
            WorkerCall::InitializeEngine { .. } => "initializeEngine",
            WorkerCall::Run { .. } => "run",
            WorkerCall::Match { .. } => "match",
            WorkerCall::Put { .. } => "put",
        }
    }
}

impl TryFrom<WireCall> for WorkerCall {
    type Error = ProtocolError;

    fn try_from(call: WireCall) -> Result<Self, Self::Error> {
        let WireCall { method, args } = call;
        match method.as_str() {
            "initializeEngine" => Ok(WorkerCall::InitializeEngine {
                runtime: required(&method, &args, 0)?,
                options: optional(&method, &args, 1)?,
            }),
            "run" => Ok(WorkerCall::Run {
                request: required(&method, &args, 0)?,
                request_id: required(&method, &args, 1)?,
                options: optional(&method, &args, 2)?,
            }),
            "match" => Ok(WorkerCall::Match {
                key: required(&method, &args, 0)?,
            }),
            "put" => Ok(WorkerCall::Put {
                key: required(&method, &args, 0)?,
                body: optional(&method, &args, 1)?,
            }),
            _ => Err(ProtocolError::MethodNotFound(method)),
        }
    }
}

fn required<T: DeserializeOwned>(
    method: &str,
    args: &[Value],
    index: usize,
) -> Result<T, ProtocolError> {
    let value = args.get(index).ok_or_else(|| ProtocolError::Malformed {
        method: method.into(),
        reason: format!("missing argument {index}"),
    })?;
    decode(method, value, index)
}

/// Missing or `null` arguments fall back to `T::default()`.
fn optional<T: DeserializeOwned + Default>(
    method: &str,
    args: &[Value],
    index: usize,
) -> Result<T, ProtocolError> {
    match args.get(index) {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => decode(method, value, index),
    }
}

fn decode<T: DeserializeOwned>(method: &str, value: &Value, index: usize) -> Result<T, ProtocolError> {
    T::deserialize(value).map_err(|e| ProtocolError::Malformed {
        method: method.into(),
        reason: format!("argument {index}: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
