//! Echo job — returns the payload's message unchanged.

use serde::Deserialize;
use serde_json::Value;

use crate::context::JobContext;
use crate::registry::{Job, Violation, describe_violations, parse_payload};

#[derive(Debug, Deserialize)]
struct EchoPayload {
    msg: String,
}

/// The smallest job that exercises the whole pipeline: validation,
/// dispatch, execution, reply.
#[derive(Debug, Default)]
pub struct EchoJob;

impl Job for EchoJob {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Returns the message from the payload"
    }

    fn validate(&self, payload: &Value) -> Result<(), Vec<Violation>> {
        parse_payload::<EchoPayload>(payload).map(|_| ())
    }

    fn run(&self, payload: Value, _ctx: &JobContext) -> anyhow::Result<Value> {
        let payload: EchoPayload = parse_payload(&payload)
            .map_err(|violations| anyhow::anyhow!(describe_violations(&violations)))?;
        Ok(Value::String(payload.msg))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use serde_json::json;
    use std::sync::Arc;

    fn ctx() -> JobContext {
        JobContext::new("test".to_string(), Arc::new(EventBus::new()))
    }

    #[test]
    fn echoes_the_message() {
        let result = EchoJob.run(json!({ "msg": "hi" }), &ctx()).unwrap();
        assert_eq!(result, json!("hi"));
    }

    #[test]
    fn rejects_non_string_message() {
        assert!(EchoJob.validate(&json!({ "msg": 123 })).is_err());
        assert!(EchoJob.validate(&json!({})).is_err());
        assert!(EchoJob.validate(&json!({ "msg": "ok" })).is_ok());
    }
}
