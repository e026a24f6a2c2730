//! Error types for the fallible parts of the runtime.
//!
//! Programmer errors (fetching a missing component, a missing resource, a new
//! component type after the registry froze) panic at the call site. Everything
//! here is a configuration or I/O problem the caller can report or recover from.

use thiserror::Error;

/// Problems found while ordering systems.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("system `{system}` in stage `{stage}` depends on `{dependency}`, which is not registered")]
    UnknownSystem {
        stage: String,
        system: String,
        dependency: String,
    },

    #[error("dependency cycle in stage `{stage}` between: {}", .systems.join(", "))]
    Cycle { stage: String, systems: Vec<String> },

    #[error("unknown stage `{0}`")]
    UnknownStage(String),

    #[error("stage `{0}` already exists")]
    DuplicateStage(String),
}

/// Problems reading or writing scene files.
#[derive(Debug, Error)]
pub enum SceneError {
    #[error("scene I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed scene JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Problems loading a [`RuntimeConfig`](crate::config::RuntimeConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_message_lists_members() {
        let err = ScheduleError::Cycle {
            stage: "update".into(),
            systems: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "dependency cycle in stage `update` between: a, b");
    }

    #[test]
    fn json_errors_convert() {
        let parse = serde_json::from_str::<u32>("nope").unwrap_err();
        let err: SceneError = parse.into();
        assert!(matches!(err, SceneError::Json(_)));
    }
}
