// SPDX-License-Identifier: MIT

//! Readiness rules
//!
//! A step whose incoming edges are all `always` waits for every upstream
//! step (AND). A single conditional incoming edge switches the step to OR:
//! it is ready as soon as one incoming edge has a completed source and a
//! holding condition.

use serde_json::Value;
use std::collections::HashSet;

use super::model::{Edge, Workflow};
use crate::sdk::schema::merge_objects;
use crate::sdk::step::JoinPolicy;
use crate::tessel::workflow::condition::evaluate;
use crate::tessel::workflow::execution::WorkflowExecution;

impl Workflow {
    /// Steps eligible to launch, in declaration order
    pub fn get_ready_steps(&self, execution: &WorkflowExecution) -> Vec<String> {
        self.step_ids()
            .iter()
            .filter(|id| self.is_step_ready(id, execution))
            .cloned()
            .collect()
    }

    pub fn is_step_ready(&self, step_id: &str, execution: &WorkflowExecution) -> bool {
        if execution.step(step_id).is_some() {
            return false;
        }
        if self.start_step_id() == Some(step_id) {
            return true;
        }

        let incoming: Vec<&Edge> = self.incoming_edges(step_id).collect();
        if incoming.is_empty() {
            return false;
        }

        if incoming.iter().all(|e| e.condition.is_always()) {
            incoming.iter().all(|e| execution.is_completed(&e.from_step))
        } else {
            incoming.iter().any(|e| self.edge_is_active(e, execution))
        }
    }

    /// Source completed and condition holds
    pub fn edge_is_active(&self, edge: &Edge, execution: &WorkflowExecution) -> bool {
        match execution.output_of(&edge.from_step) {
            Some(output) => evaluate(&edge.condition, output, &execution.state),
            None => false,
        }
    }

    /// Steps that never ran and never can, while nothing else is pending
    ///
    /// Only a conditional branch that was not taken is skipped: an OR step
    /// whose sources have all settled, or were skipped, without activating
    /// it. AND joins with a missing dependency, orphans, and end steps while
    /// no end step has completed are stranded.
    pub fn stranded_steps(&self, execution: &WorkflowExecution) -> Vec<String> {
        let skipped = self.skipped_steps(execution);
        self.step_ids()
            .iter()
            .filter(|id| execution.step(id).is_none())
            .filter(|id| !skipped.contains(id.as_str()))
            .filter(|id| !self.is_step_ready(id, execution))
            .cloned()
            .collect()
    }

    fn skipped_steps(&self, execution: &WorkflowExecution) -> HashSet<&str> {
        let end_reached = self
            .end_step_ids()
            .iter()
            .any(|id| execution.is_completed(id));
        let mut skipped: HashSet<&str> = HashSet::new();

        loop {
            let before = skipped.len();
            for id in self.step_ids() {
                if skipped.contains(id.as_str())
                    || execution.step(id).is_some()
                    || (self.is_end_step(id) && !end_reached)
                    || self.is_step_ready(id, execution)
                {
                    continue;
                }

                let incoming: Vec<&Edge> = self.incoming_edges(id).collect();
                if incoming.iter().all(|e| e.condition.is_always()) {
                    continue;
                }
                let settled = incoming.iter().all(|e| {
                    skipped.contains(e.from_step.as_str())
                        || execution
                            .status_of(&e.from_step)
                            .is_some_and(|status| status.is_settled())
                });
                if settled {
                    skipped.insert(id.as_str());
                }
            }
            if skipped.len() == before {
                return skipped;
            }
        }
    }

    /// Input for a step about to launch
    ///
    /// The start step gets the run's input. Other steps get the output of
    /// the first satisfied dependency in declaration order, or the merge of
    /// every satisfied dependency under `JoinPolicy::Merge`. The run's input
    /// is the fallback when no dependency is satisfied.
    pub fn prepare_input(
        &self,
        step_id: &str,
        execution: &WorkflowExecution,
        initial_input: &Value,
    ) -> Value {
        if self.start_step_id() == Some(step_id) {
            return initial_input.clone();
        }

        let mut sources: Vec<&str> = Vec::new();
        for edge in self.incoming_edges(step_id) {
            if !sources.contains(&edge.from_step.as_str()) && self.edge_is_active(edge, execution)
            {
                sources.push(&edge.from_step);
            }
        }
        let outputs = sources.iter().filter_map(|s| execution.output_of(s));

        let join = self
            .step(step_id)
            .map(|s| s.metadata().join)
            .unwrap_or_default();
        match join {
            JoinPolicy::Merge if !sources.is_empty() => merge_objects(outputs),
            _ => outputs
                .into_iter()
                .next()
                .cloned()
                .unwrap_or_else(|| initial_input.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::step::{Step, StepConfig, StepMetadata};
    use crate::tessel::steps::PassthroughStep;
    use crate::tessel::workflow::condition::{EdgeCondition, Operator};
    use crate::tessel::workflow::execution::StepExecution;
    use serde_json::{json, Map};
    use std::sync::Arc;

    fn step(id: &str) -> Arc<dyn Step> {
        Arc::new(PassthroughStep::new(id))
    }

    fn complete(exec: &mut WorkflowExecution, id: &str, output: Value) {
        let mut record = StepExecution::pending(id);
        record.start(json!({}));
        record.complete(output, 0);
        exec.step_executions.insert(id.to_string(), record);
    }

    fn run(exec: &mut WorkflowExecution, id: &str) {
        let mut record = StepExecution::pending(id);
        record.start(json!({}));
        exec.step_executions.insert(id.to_string(), record);
    }

    /// start -> {a, b} -> c
    fn fan_in(conditions: [Option<EdgeCondition>; 2]) -> Workflow {
        let mut wf = Workflow::new("fan-in");
        for id in ["start", "a", "b", "c"] {
            wf.add_step(step(id)).unwrap();
        }
        let [to_a, to_b] = conditions;
        wf.add_edge("start", "a", None).unwrap();
        wf.add_edge("start", "b", None).unwrap();
        wf.add_edge("a", "c", to_a).unwrap();
        wf.add_edge("b", "c", to_b).unwrap();
        wf.set_start_step("start").unwrap();
        wf.add_end_step("c");
        wf
    }

    fn priority_edges() -> [Option<EdgeCondition>; 2] {
        [
            Some(EdgeCondition::state("priority", Operator::Eq, json!("urgent"))),
            Some(EdgeCondition::state("priority", Operator::Eq, json!("normal"))),
        ]
    }

    #[test]
    fn test_start_step_ready_once() {
        let wf = fan_in([None, None]);
        let mut exec = WorkflowExecution::new(&wf.id, Map::new());
        assert_eq!(wf.get_ready_steps(&exec), vec!["start".to_string()]);

        run(&mut exec, "start");
        assert!(wf.get_ready_steps(&exec).is_empty());
    }

    #[test]
    fn test_fan_in_and_waits_for_all() {
        let wf = fan_in([None, None]);
        let mut exec = WorkflowExecution::new(&wf.id, Map::new());
        complete(&mut exec, "start", json!({}));
        assert_eq!(wf.get_ready_steps(&exec), vec!["a", "b"]);

        complete(&mut exec, "a", json!({"from": "a"}));
        assert!(!wf.get_ready_steps(&exec).contains(&"c".to_string()));

        complete(&mut exec, "b", json!({"from": "b"}));
        assert_eq!(wf.get_ready_steps(&exec), vec!["c"]);
    }

    #[test]
    fn test_fan_in_or_on_state() {
        let wf = fan_in(priority_edges());
        let mut state = Map::new();
        state.insert("priority".into(), json!("urgent"));
        let mut exec = WorkflowExecution::new(&wf.id, state);

        complete(&mut exec, "start", json!({}));
        complete(&mut exec, "a", json!({"from": "a"}));
        assert_eq!(wf.get_ready_steps(&exec), vec!["b", "c"]);
    }

    #[test]
    fn test_mixed_edges_use_or() {
        let wf = fan_in([
            None,
            Some(EdgeCondition::output("ok", Operator::Eq, json!(true))),
        ]);
        let mut exec = WorkflowExecution::new(&wf.id, Map::new());
        complete(&mut exec, "start", json!({}));
        complete(&mut exec, "a", json!({}));
        assert!(wf.is_step_ready("c", &exec));
    }

    #[test]
    fn test_output_condition_uses_source_output() {
        let wf = fan_in([
            Some(EdgeCondition::output("ok", Operator::Eq, json!(true))),
            Some(EdgeCondition::output("ok", Operator::Eq, json!(true))),
        ]);
        let mut exec = WorkflowExecution::new(&wf.id, Map::new());
        complete(&mut exec, "start", json!({}));
        complete(&mut exec, "a", json!({"ok": false}));
        assert!(!wf.is_step_ready("c", &exec));

        complete(&mut exec, "b", json!({"ok": true}));
        assert!(wf.is_step_ready("c", &exec));
        assert_eq!(wf.prepare_input("c", &exec, &json!({})), json!({"ok": true}));
    }

    #[test]
    fn test_unreached_end_step_is_stranded() {
        let wf = fan_in(priority_edges());
        let mut state = Map::new();
        state.insert("priority".into(), json!("low"));
        let mut exec = WorkflowExecution::new(&wf.id, state);
        complete(&mut exec, "start", json!({}));
        complete(&mut exec, "a", json!({}));
        complete(&mut exec, "b", json!({}));

        assert!(wf.get_ready_steps(&exec).is_empty());
        assert_eq!(wf.stranded_steps(&exec), vec!["c".to_string()]);
    }

    #[test]
    fn test_orphan_is_stranded() {
        let mut wf = fan_in([None, None]);
        wf.add_step(step("orphan")).unwrap();
        let mut exec = WorkflowExecution::new(&wf.id, Map::new());
        for id in ["start", "a", "b", "c"] {
            complete(&mut exec, id, json!({}));
        }
        assert_eq!(wf.stranded_steps(&exec), vec!["orphan".to_string()]);
    }

    /// start -gated-> branch -> after, with no end step
    fn gated_chain(after: Option<EdgeCondition>) -> Workflow {
        let mut wf = Workflow::new("skip");
        for id in ["start", "branch", "after"] {
            wf.add_step(step(id)).unwrap();
        }
        wf.add_edge(
            "start",
            "branch",
            Some(EdgeCondition::output("go", Operator::Eq, json!(true))),
        )
        .unwrap();
        wf.add_edge("branch", "after", after).unwrap();
        wf.set_start_step("start").unwrap();
        wf
    }

    #[test]
    fn test_untaken_branch_skip_propagates_through_conditions() {
        let wf = gated_chain(Some(EdgeCondition::output("ok", Operator::Eq, json!(true))));
        let mut exec = WorkflowExecution::new(&wf.id, Map::new());
        complete(&mut exec, "start", json!({"go": false}));
        assert!(wf.stranded_steps(&exec).is_empty());
    }

    #[test]
    fn test_and_join_behind_skipped_branch_is_stranded() {
        let wf = gated_chain(None);
        let mut exec = WorkflowExecution::new(&wf.id, Map::new());
        complete(&mut exec, "start", json!({"go": false}));
        assert_eq!(wf.stranded_steps(&exec), vec!["after".to_string()]);
    }

    #[test]
    fn test_and_join_of_exclusive_branches_is_stranded() {
        let mut wf = Workflow::new("router");
        for id in ["start", "urgent", "normal", "collect"] {
            wf.add_step(step(id)).unwrap();
        }
        let [to_urgent, to_normal] = priority_edges();
        wf.add_edge("start", "urgent", to_urgent).unwrap();
        wf.add_edge("start", "normal", to_normal).unwrap();
        wf.add_edge("urgent", "collect", None).unwrap();
        wf.add_edge("normal", "collect", None).unwrap();
        wf.set_start_step("start").unwrap();
        wf.add_end_step("collect");

        let mut state = Map::new();
        state.insert("priority".into(), json!("urgent"));
        let mut exec = WorkflowExecution::new(&wf.id, state);
        complete(&mut exec, "start", json!({}));
        complete(&mut exec, "urgent", json!({}));

        assert!(wf.get_ready_steps(&exec).is_empty());
        assert_eq!(wf.stranded_steps(&exec), vec!["collect".to_string()]);
    }

    #[test]
    fn test_prepare_input_first_wins() {
        let wf = fan_in([None, None]);
        let mut exec = WorkflowExecution::new(&wf.id, Map::new());
        let initial = json!({"message": "hi"});
        assert_eq!(wf.prepare_input("start", &exec, &initial), initial);

        complete(&mut exec, "start", json!({"s": 1}));
        complete(&mut exec, "b", json!({"from": "b"}));
        complete(&mut exec, "a", json!({"from": "a"}));
        assert_eq!(wf.prepare_input("c", &exec, &initial), json!({"from": "a"}));
    }

    #[test]
    fn test_prepare_input_merge() {
        let mut wf = Workflow::new("merge");
        let mut config = StepConfig::new("join", "passthrough");
        config.metadata = StepMetadata::named("join").with_join(JoinPolicy::Merge);
        wf.add_step(step("a")).unwrap();
        wf.add_step(step("b")).unwrap();
        wf.add_step(Arc::new(PassthroughStep::from_config(&config)))
            .unwrap();
        wf.add_edge("a", "join", None).unwrap();
        wf.add_edge("b", "join", None).unwrap();

        let mut exec = WorkflowExecution::new(&wf.id, Map::new());
        complete(&mut exec, "a", json!({"title": "t", "shared": 1}));
        complete(&mut exec, "b", json!({"body": "b", "shared": 2}));

        assert_eq!(
            wf.prepare_input("join", &exec, &json!({})),
            json!({"title": "t", "body": "b", "shared": 2})
        );
    }

    #[test]
    fn test_prepare_input_fallback() {
        let wf = fan_in([None, None]);
        let exec = WorkflowExecution::new(&wf.id, Map::new());
        let initial = json!({"message": "hi"});
        assert_eq!(wf.prepare_input("c", &exec, &initial), initial);
    }
}
