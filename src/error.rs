//! The error taxonomy for the monitor evaluation engine.
//!
//! Each stage of the pipeline (config parsing, probing, expression
//! evaluation, emission) gets its own error type, per the policy in the
//! design: config errors reject a sensor at construction, everything else
//! is local to one monitor and does not interfere with the rest of the
//! pass.

use thiserror::Error;

/// Failures while parsing a sensor or monitor out of its JSON description.
///
/// A `ConfigError` always means the sensor was rejected; it is never
/// produced mid-pass.
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("monitor is missing a `name`")]
    MissingName,
    #[error("monitor has none of `system`, `oid`, `op`")]
    MissingCommand,
    #[error("sensor is missing required field `{0}`")]
    MissingSensorField(&'static str),
    #[error("sensor `monitors` must be a non-empty array")]
    EmptyMonitors,
    #[error("field `{field}` has the wrong JSON type (expected {expected})")]
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    #[error("unknown snmp_version `{0}`, expected \"1\" or \"2c\"")]
    BadSnmpVersion(String),
    #[error("invalid peer address `{0}`")]
    BadPeerAddress(String),
    #[error("couldn't parse `op` expression: {0}")]
    BadExpression(String),
}

/// Failures while asking a probe (shell command or SNMP GET) for a value.
///
/// A `ProbeError` never propagates past the monitor it belongs to: the
/// engine logs it and stores an absent value.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("couldn't spawn shell command: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("shell command produced no output")]
    NoOutput,
    #[error("sensor has no SNMP session configured")]
    NoSnmpSession,
    #[error("SNMP request failed: {0}")]
    Snmp(String),
}

/// Failures from the arithmetic expression evaluator.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("couldn't parse expression `{expr}`: {source}")]
    Parse {
        expr: String,
        #[source]
        source: evalexpr::EvalexprError,
    },
    #[error("vector operands have mismatched lengths ({a} vs {b})")]
    SizeMismatch { a: usize, b: usize },
    #[error("evaluation failed: {0}")]
    Evaluation(#[from] evalexpr::EvalexprError),
    #[error("result was not finite (NaN or infinite)")]
    NonFinite,
}

/// Failures while handing finished records to the downstream sink.
#[derive(Debug, Error)]
pub enum EmitError {
    #[error("sink rejected record for monitor `{monitor}`: {reason}")]
    Rejected { monitor: String, reason: String },
}
