//! A monitor evaluation engine for a fleet-polling network/host sensor
//! agent.
//!
//! Each sensor declares an ordered list of *monitors*: small probes that
//! either run a shell command, GET an SNMP OID, or evaluate an arithmetic
//! expression over the results of earlier monitors in the same sensor.
//! One [`sensor::Sensor::run_pass`] walks the list once, probing,
//! splitting, evaluating and emitting as it goes; a separate
//! [`trap::TrapListener`] turns inbound SNMP TRAP/TRAP2/INFORM PDUs into
//! the same record shape.
//!
//! This crate is a library: what schedules passes, where sensor
//! configuration comes from on disk, and the concrete downstream bus
//! client are all external collaborators, represented here only by the
//! [`sink::MessageSink`] trait and an in-memory reference implementation
//! used in tests.
//!
//! ## Modules
//!
//! | Module | Responsibility |
//! |---|---|
//! | [`value`] | The tagged `Value` type: number, string, or split vector |
//! | [`error`] | The `ConfigError`/`ProbeError`/`EvalError`/`EmitError` taxonomy |
//! | [`expr`] | Arithmetic expressions over named variables |
//! | [`monitor`] | Parsing one monitor out of its JSON description |
//! | [`resolver`] | Ordering `op` monitors against the monitors they reference |
//! | [`probe`] | The shell and SNMP GET probe adapters |
//! | [`sensor`] | A configured sensor and its one-pass evaluation engine |
//! | [`emit`] | Rendering an evaluated value into one or more records |
//! | [`sink`] | The downstream publish contract |
//! | [`trap`] | The SNMP trap listener |

pub mod emit;
pub mod error;
pub mod expr;
pub mod monitor;
pub mod probe;
pub mod resolver;
pub mod sensor;
pub mod sink;
pub mod trap;
pub mod value;

pub use emit::Record;
pub use error::{ConfigError, EmitError, EvalError, ProbeError};
pub use monitor::Monitor;
pub use sensor::Sensor;
pub use sink::MessageSink;
pub use value::Value;
