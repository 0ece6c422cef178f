//! The one-way message a dispatcher hands to a backend.
//!
//! Arguments are bound once, in the order a backend declared them, and travel as a
//! positional list. Backends read them back with an [`ArgCursor`].

use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request field a backend parameter is bound from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RequestField {
    JobId,
    TrainFile1,
    TrainFile2,
    TestFile1,
    TestFile2,
    UseAutoSplit,
}

impl RequestField {
    /// Field name as it appears in the inbound payload.
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::JobId => "jobId",
            Self::TrainFile1 => "trainFile1",
            Self::TrainFile2 => "trainFile2",
            Self::TestFile1 => "testFile1",
            Self::TestFile2 => "testFile2",
            Self::UseAutoSplit => "useAutoSplit",
        }
    }

    /// Type of value this field carries.
    #[must_use]
    pub fn kind(self) -> ParamKind {
        match self {
            Self::UseAutoSplit => ParamKind::Flag,
            _ => ParamKind::Text,
        }
    }
}

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    Text,
    Flag,
}

/// A bound argument value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum ArgValue {
    Text(String),
    Flag(bool),
    /// Optional parameter with no value and no default.
    Absent,
}

impl ArgValue {
    #[must_use]
    pub fn kind(&self) -> Option<ParamKind> {
        match self {
            Self::Text(_) => Some(ParamKind::Text),
            Self::Flag(_) => Some(ParamKind::Flag),
            Self::Absent => None,
        }
    }
}

/// One positional argument, tagged with the parameter name it was bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundArg {
    pub name: String,
    pub value: ArgValue,
}

/// Compute class a backend needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "snake_case")]
pub enum ComputeClass {
    Gpu { model: String },
    Cpu { cores: f32 },
}

/// Where and for how long a backend runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEnvironment {
    pub compute: ComputeClass,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

/// A launched job: which capability to run, where, and with what arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobInvocation {
    pub job_id: String,
    /// Canonical model type token (aliases already resolved).
    pub model_type: String,
    pub capability: String,
    pub environment: ExecutionEnvironment,
    pub args: Vec<BoundArg>,
}

impl JobInvocation {
    #[must_use]
    pub fn arguments(&self) -> ArgCursor<'_> {
        ArgCursor { args: &self.args, position: 0 }
    }
}

/// Positional reader over an invocation's arguments.
///
/// Each read names the parameter it expects at that position; a mismatch means the
/// dispatcher and backend disagree on the contract and the job is rejected.
#[derive(Debug)]
pub struct ArgCursor<'a> {
    args: &'a [BoundArg],
    position: usize,
}

impl<'a> ArgCursor<'a> {
    fn next(&mut self, name: &str) -> TrainingResult<&'a ArgValue> {
        let arg = self.args.get(self.position).ok_or_else(|| {
            TrainingError::InvalidInvocation(format!(
                "missing argument #{} ('{name}')",
                self.position
            ))
        })?;
        if arg.name != name {
            return Err(TrainingError::InvalidInvocation(format!(
                "argument #{} is '{}', expected '{name}'",
                self.position, arg.name
            )));
        }
        self.position += 1;
        Ok(&arg.value)
    }

    pub fn required_text(&mut self, name: &str) -> TrainingResult<&'a str> {
        match self.next(name)? {
            ArgValue::Text(s) => Ok(s.as_str()),
            other => Err(TrainingError::InvalidInvocation(format!(
                "argument '{name}' must be text, got {other:?}"
            ))),
        }
    }

    pub fn optional_text(&mut self, name: &str) -> TrainingResult<Option<&'a str>> {
        match self.next(name)? {
            ArgValue::Text(s) => Ok(Some(s.as_str())),
            ArgValue::Absent => Ok(None),
            ArgValue::Flag(_) => Err(TrainingError::InvalidInvocation(format!(
                "argument '{name}' must be text"
            ))),
        }
    }

    pub fn flag(&mut self, name: &str) -> TrainingResult<bool> {
        match self.next(name)? {
            ArgValue::Flag(b) => Ok(*b),
            other => Err(TrainingError::InvalidInvocation(format!(
                "argument '{name}' must be a flag, got {other:?}"
            ))),
        }
    }

    /// Fails if arguments remain unread.
    pub fn finish(self) -> TrainingResult<()> {
        if self.position == self.args.len() {
            Ok(())
        } else {
            Err(TrainingError::InvalidInvocation(format!(
                "{} unexpected trailing argument(s)",
                self.args.len() - self.position
            )))
        }
    }
}
