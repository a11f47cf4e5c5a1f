//! Job definitions and the name→implementation registry.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::JobContext;
use crate::error::RegistryError;

/// A structured payload-validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub field: String,
    pub message: String,
}

impl Violation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Render a violation list into one line (for logs and job errors).
pub fn describe_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// A named, schema-validated unit of work.
///
/// `run` executes on a dedicated worker thread and may block it for the
/// whole computation. Everything the job needs must arrive in the payload;
/// the host only sees "accepts validated payload, returns a result or
/// fails".
pub trait Job: Send + Sync + 'static {
    /// Unique registry name.
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// Check the payload before any queueing or dispatch happens.
    fn validate(&self, _payload: &Value) -> Result<(), Vec<Violation>> {
        Ok(())
    }

    /// Execute the job. Errors are surfaced verbatim to the caller.
    fn run(&self, payload: Value, ctx: &JobContext) -> anyhow::Result<Value>;
}

/// Deserialize a payload into its typed form, mapping failure to a
/// violation list. Jobs declare their schema as a serde struct and call
/// this from both `validate` and `run`.
pub fn parse_payload<T: DeserializeOwned>(payload: &Value) -> Result<T, Vec<Violation>> {
    serde_json::from_value(payload.clone())
        .map_err(|err| vec![Violation::new("payload", err.to_string())])
}

/// Name→definition mapping.
///
/// Built mutably at startup, then frozen behind an `Arc` and shared by the
/// host and every worker runtime, so both sides always resolve the same
/// implementations.
#[derive(Default)]
pub struct JobRegistry {
    jobs: HashMap<String, Arc<dyn Job>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: HashMap::new(),
        }
    }

    /// Register a job. Errors instead of silently replacing an earlier
    /// registration under the same name.
    pub fn register(&mut self, job: Arc<dyn Job>) -> Result<(), RegistryError> {
        let name = job.name().to_string();
        if self.jobs.contains_key(&name) {
            return Err(RegistryError::DuplicateJob { name });
        }
        tracing::debug!(job = %name, "registered job");
        self.jobs.insert(name, job);
        Ok(())
    }

    /// Get a job by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Job>> {
        self.jobs.get(name).cloned()
    }

    /// Check if a job exists.
    pub fn has(&self, name: &str) -> bool {
        self.jobs.contains_key(name)
    }

    /// All registered job names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.jobs.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("jobs", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug)]
    struct NoopJob {
        name: String,
    }

    impl Job for NoopJob {
        fn name(&self) -> &str {
            &self.name
        }
        fn run(&self, payload: Value, _ctx: &JobContext) -> anyhow::Result<Value> {
            Ok(payload)
        }
    }

    #[test]
    fn register_and_get() {
        let mut registry = JobRegistry::new();
        registry
            .register(Arc::new(NoopJob {
                name: "noop".to_string(),
            }))
            .unwrap();

        assert!(registry.has("noop"));
        assert!(!registry.has("missing"));
        assert_eq!(registry.get("noop").unwrap().name(), "noop");
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = JobRegistry::new();
        registry
            .register(Arc::new(NoopJob {
                name: "noop".to_string(),
            }))
            .unwrap();

        let err = registry
            .register(Arc::new(NoopJob {
                name: "noop".to_string(),
            }))
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn names_are_sorted() {
        let mut registry = JobRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry
                .register(Arc::new(NoopJob {
                    name: name.to_string(),
                }))
                .unwrap();
        }
        assert_eq!(registry.names(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn parse_payload_reports_violations() {
        #[derive(Debug, Deserialize)]
        struct Payload {
            #[allow(dead_code)]
            msg: String,
        }

        let ok: Result<Payload, _> = parse_payload(&serde_json::json!({ "msg": "hi" }));
        assert!(ok.is_ok());

        let err: Result<Payload, _> = parse_payload(&serde_json::json!({ "msg": 123 }));
        let violations = err.unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "payload");
    }

    #[test]
    fn describe_violations_joins_fields() {
        let violations = vec![
            Violation::new("msg", "expected a string"),
            Violation::new("count", "must be positive"),
        ];
        assert_eq!(
            describe_violations(&violations),
            "msg: expected a string; count: must be positive"
        );
    }
}
