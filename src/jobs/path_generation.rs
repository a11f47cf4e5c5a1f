//! Learning-path generation — orders units so every prerequisite is met.
//!
//! The payload describes a skill graph (skills may group child skills),
//! learning units that require and provide skills, the learner's prior
//! knowledge, and a set of goal skills. The job returns a unit sequence
//! reaching the goals, picking the cheapest applicable unit at each step.

use std::collections::{HashMap, HashSet};

use anyhow::bail;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::context::JobContext;
use crate::registry::{Job, Violation, describe_violations, parse_payload};

#[derive(Debug, Clone, Deserialize)]
struct Skill {
    id: String,
    /// Child skill ids; a parent is satisfied once all children are.
    #[serde(default)]
    children: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct LearningUnit {
    id: String,
    #[serde(default)]
    requires: Vec<String>,
    #[serde(default)]
    provides: Vec<String>,
    #[serde(default = "default_cost")]
    cost: f64,
}

fn default_cost() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
struct PathPayload {
    #[serde(default)]
    skills: Vec<Skill>,
    units: Vec<LearningUnit>,
    /// Skill ids the learner already has.
    #[serde(default)]
    knowledge: Vec<String>,
    /// Skill ids the path must reach.
    goals: Vec<String>,
}

/// Graph search over prerequisite skills.
#[derive(Debug, Default)]
pub struct PathGenerationJob;

impl Job for PathGenerationJob {
    fn name(&self) -> &str {
        "path-generation"
    }

    fn description(&self) -> &str {
        "Generates a learning path based on skills and goals"
    }

    fn validate(&self, payload: &Value) -> Result<(), Vec<Violation>> {
        let payload: PathPayload = parse_payload(payload)?;
        if payload.goals.is_empty() {
            return Err(vec![Violation::new("goals", "at least one goal skill is required")]);
        }
        Ok(())
    }

    fn run(&self, payload: Value, _ctx: &JobContext) -> anyhow::Result<Value> {
        let payload: PathPayload = parse_payload(&payload)
            .map_err(|violations| anyhow::anyhow!(describe_violations(&violations)))?;
        let plan = plan_path(&payload)?;
        Ok(json!({ "path": plan.units, "cost": plan.cost }))
    }
}

struct Plan {
    units: Vec<String>,
    cost: f64,
}

/// A skill is satisfied when it is known directly, or when it groups
/// children and every child is satisfied. The visiting set breaks cycles
/// in malformed skill graphs.
fn satisfied(
    skill: &str,
    known: &HashSet<String>,
    children: &HashMap<&str, &Vec<String>>,
    visiting: &mut HashSet<String>,
) -> bool {
    if known.contains(skill) {
        return true;
    }
    let Some(child_ids) = children.get(skill) else {
        return false;
    };
    if child_ids.is_empty() || !visiting.insert(skill.to_string()) {
        return false;
    }
    let all = child_ids
        .iter()
        .all(|child| satisfied(child, known, children, visiting));
    visiting.remove(skill);
    all
}

fn plan_path(payload: &PathPayload) -> anyhow::Result<Plan> {
    let children: HashMap<&str, &Vec<String>> = payload
        .skills
        .iter()
        .map(|skill| (skill.id.as_str(), &skill.children))
        .collect();
    let mut known: HashSet<String> = payload.knowledge.iter().cloned().collect();
    let is_met = |skill: &str, known: &HashSet<String>| {
        satisfied(skill, known, &children, &mut HashSet::new())
    };

    let mut applied: HashSet<usize> = HashSet::new();
    let mut order = Vec::new();
    let mut total_cost = 0.0;

    loop {
        if payload.goals.iter().all(|goal| is_met(goal, &known)) {
            return Ok(Plan {
                units: order,
                cost: total_cost,
            });
        }

        // Cheapest unit whose prerequisites hold and which teaches
        // something new; ties break by id for deterministic output.
        let candidate = payload
            .units
            .iter()
            .enumerate()
            .filter(|(index, unit)| {
                !applied.contains(index)
                    && unit.requires.iter().all(|skill| is_met(skill, &known))
                    && unit.provides.iter().any(|skill| !known.contains(skill))
            })
            .min_by(|(_, a), (_, b)| {
                a.cost
                    .partial_cmp(&b.cost)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.id.cmp(&b.id))
            });

        let Some((index, unit)) = candidate else {
            let missing: Vec<&str> = payload
                .goals
                .iter()
                .filter(|goal| !is_met(goal, &known))
                .map(|goal| goal.as_str())
                .collect();
            bail!("no unit can make progress toward goals: {missing:?}");
        };

        applied.insert(index);
        known.extend(unit.provides.iter().cloned());
        order.push(unit.id.clone());
        total_cost += unit.cost;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventBus;
    use std::sync::Arc;

    fn ctx() -> JobContext {
        JobContext::new("test".to_string(), Arc::new(EventBus::new()))
    }

    fn unit(id: &str, requires: &[&str], provides: &[&str], cost: f64) -> Value {
        json!({
            "id": id,
            "requires": requires,
            "provides": provides,
            "cost": cost,
        })
    }

    #[test]
    fn orders_units_along_prerequisites() {
        let payload = json!({
            "units": [
                unit("advanced", &["basics"], &["mastery"], 1.0),
                unit("intro", &[], &["basics"], 1.0),
            ],
            "goals": ["mastery"],
        });
        let result = PathGenerationJob.run(payload, &ctx()).unwrap();
        assert_eq!(result["path"], json!(["intro", "advanced"]));
        assert_eq!(result["cost"], json!(2.0));
    }

    #[test]
    fn prior_knowledge_skips_units() {
        let payload = json!({
            "units": [
                unit("advanced", &["basics"], &["mastery"], 1.0),
                unit("intro", &[], &["basics"], 1.0),
            ],
            "knowledge": ["basics"],
            "goals": ["mastery"],
        });
        let result = PathGenerationJob.run(payload, &ctx()).unwrap();
        assert_eq!(result["path"], json!(["advanced"]));
    }

    #[test]
    fn prefers_the_cheaper_alternative() {
        let payload = json!({
            "units": [
                unit("lecture", &[], &["basics"], 3.0),
                unit("video", &[], &["basics"], 1.0),
            ],
            "goals": ["basics"],
        });
        let result = PathGenerationJob.run(payload, &ctx()).unwrap();
        assert_eq!(result["path"], json!(["video"]));
        assert_eq!(result["cost"], json!(1.0));
    }

    #[test]
    fn grouped_skill_is_met_by_its_children() {
        let payload = json!({
            "skills": [
                { "id": "algebra", "children": ["add", "multiply"] },
            ],
            "units": [
                unit("adding", &[], &["add"], 1.0),
                unit("multiplying", &[], &["multiply"], 1.0),
            ],
            "goals": ["algebra"],
        });
        let result = PathGenerationJob.run(payload, &ctx()).unwrap();
        assert_eq!(result["path"], json!(["adding", "multiplying"]));
    }

    #[test]
    fn unreachable_goal_is_a_job_failure() {
        let payload = json!({
            "units": [unit("intro", &["ghost"], &["basics"], 1.0)],
            "goals": ["basics"],
        });
        let err = PathGenerationJob.run(payload, &ctx()).unwrap_err();
        assert!(err.to_string().contains("no unit can make progress"));
    }

    #[test]
    fn empty_goals_fail_validation() {
        let err = PathGenerationJob
            .validate(&json!({ "units": [], "goals": [] }))
            .unwrap_err();
        assert_eq!(err[0].field, "goals");
    }
}
