// SPDX-License-Identifier: MIT

//! Structural validation of a workflow graph

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use super::model::{Edge, Workflow};
use crate::sdk::step::JoinPolicy;
use crate::tessel::workflow::condition::{ConditionType, Operator};

/// Outcome of `Workflow::validate`
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub has_cycles: bool,
    pub unreachable_steps: Vec<String>,
}

impl ValidationResult {
    fn error(&mut self, message: String) {
        self.errors.push(message);
    }

    fn warning(&mut self, message: String) {
        self.warnings.push(message);
    }
}

impl Workflow {
    /// Check the graph, collecting every problem instead of stopping at the first
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        self.check_endpoints(&mut result);
        self.check_edge_references(&mut result);
        self.check_cycles(&mut result);
        self.check_reachability(&mut result);
        self.check_schemas(&mut result);
        self.check_conditions(&mut result);

        result.is_valid = result.errors.is_empty();
        if !result.is_valid {
            log::debug!(
                "Workflow {} failed validation: {}",
                self.id,
                result.errors.join("; ")
            );
        }
        result
    }

    fn check_endpoints(&self, result: &mut ValidationResult) {
        if self.step_ids().is_empty() {
            result.error("Workflow has no steps".to_string());
        }

        match self.start_step_id() {
            None => result.error("No start step set".to_string()),
            Some(start) if !self.has_step(start) => {
                result.error(format!("Start step '{}' does not exist", start))
            }
            Some(_) => {}
        }

        for end in self.end_step_ids() {
            if !self.has_step(end) {
                result.error(format!("End step '{}' does not exist", end));
            }
        }
    }

    fn check_edge_references(&self, result: &mut ValidationResult) {
        for edge in self.edges() {
            for id in [&edge.from_step, &edge.to_step] {
                if !self.has_step(id) {
                    result.error(format!(
                        "Edge {} -> {} references unknown step '{}'",
                        edge.from_step, edge.to_step, id
                    ));
                }
            }
        }
    }

    fn check_cycles(&self, result: &mut ValidationResult) {
        let Some(start) = self.valid_start() else {
            return;
        };

        let mut visited = HashSet::new();
        let mut path = Vec::new();
        if let Some(cycle) = self.find_cycle(start, &mut visited, &mut path) {
            result.has_cycles = true;
            result.error(format!("Cycle detected: {}", cycle.join(" -> ")));
        }
    }

    /// Depth-first search; `path` doubles as the recursion stack
    fn find_cycle<'a>(
        &'a self,
        step: &'a str,
        visited: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<&'a str>> {
        if let Some(pos) = path.iter().position(|s| *s == step) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(step);
            return Some(cycle);
        }
        if !visited.insert(step) {
            return None;
        }

        path.push(step);
        for next in self.get_step_dependents(step) {
            if let Some(cycle) = self.find_cycle(next, visited, path) {
                return Some(cycle);
            }
        }
        path.pop();
        None
    }

    fn check_reachability(&self, result: &mut ValidationResult) {
        let Some(start) = self.valid_start() else {
            return;
        };

        let reached = self.reachable_from(start);
        for id in self.step_ids() {
            if !reached.contains(id.as_str()) {
                result.warning(format!(
                    "Step '{}' is unreachable from start step '{}'",
                    id, start
                ));
                result.unreachable_steps.push(id.clone());
            }
        }
    }

    fn check_schemas(&self, result: &mut ValidationResult) {
        for edge in self.edges() {
            let (Some(from), Some(to)) = (self.step(&edge.from_step), self.step(&edge.to_step))
            else {
                continue;
            };

            let upstream = from.output_schema();
            let downstream = to.input_schema();
            let compatible = match to.metadata().join {
                JoinPolicy::First => upstream.is_compatible_with(downstream),
                JoinPolicy::Merge => downstream.is_open() || upstream.is_subset_of(downstream),
            };

            if compatible {
                continue;
            }
            if upstream.is_open() {
                result.warning(format!(
                    "Output of '{}' is undeclared; input of '{}' is only checked at run time",
                    edge.from_step, edge.to_step
                ));
            } else {
                result.error(format!(
                    "Schema mismatch on edge {} -> {}: output of '{}' does not match input of '{}'",
                    edge.from_step, edge.to_step, edge.from_step, edge.to_step
                ));
            }
        }
    }

    fn check_conditions(&self, result: &mut ValidationResult) {
        for edge in self.edges() {
            if !edge.condition.is_always() && edge.condition.field.is_none() {
                result.error(format!(
                    "Edge {} -> {} has a conditional edge without a field",
                    edge.from_step, edge.to_step
                ));
            }
        }

        for id in self.step_ids() {
            self.check_conflicting_incoming(id, result);

            if !self.is_end_step(id) && self.outgoing_edges(id).next().is_none() {
                result.warning(format!(
                    "Step '{}' has no outgoing edges and is not an end step",
                    id
                ));
            }
        }

        if let Some(start) = self.valid_start() {
            let mut memo = HashMap::new();
            for end in self.end_step_ids() {
                if !self.has_step(end) {
                    continue;
                }
                let mut visiting = HashSet::new();
                if self
                    .required_pins(end, start, &mut memo, &mut visiting)
                    .is_none()
                {
                    result.error(format!(
                        "End step '{}' cannot be reached under the edge conditions",
                        end
                    ));
                }
            }
        }
    }

    /// Warn when incoming `==` conditions pin one field to different values
    fn check_conflicting_incoming(&self, step_id: &str, result: &mut ValidationResult) {
        let mut pinned: BTreeMap<(String, &str), Vec<&Value>> = BTreeMap::new();

        for edge in self.incoming_edges(step_id) {
            let cond = &edge.condition;
            if cond.operator != Operator::Eq || cond.condition_type == ConditionType::Always {
                continue;
            }
            let (Some(field), Some(value)) = (cond.field.as_deref(), cond.value.as_ref()) else {
                continue;
            };

            let values = pinned.entry((pin_scope(edge), field)).or_default();
            if !values.contains(&value) {
                values.push(value);
            }
        }

        for ((scope, field), values) in pinned {
            if values.len() > 1 {
                result.warning(format!(
                    "Step '{}' has contradictory conditions on {}.{}: only one incoming path can fire",
                    step_id, scope, field
                ));
            }
        }
    }

    /// `==` constraints that must all hold for `step_id` to run, or `None`
    /// when no combination of edge conditions lets it run
    ///
    /// An AND join needs every branch at once, so branches pinning one field
    /// to different values make it dead. An OR step keeps the pins its live
    /// alternatives agree on.
    fn required_pins<'a>(
        &'a self,
        step_id: &'a str,
        start: &'a str,
        memo: &mut HashMap<&'a str, Option<Pins<'a>>>,
        visiting: &mut HashSet<&'a str>,
    ) -> Option<Pins<'a>> {
        if step_id == start {
            return Some(Pins::new());
        }
        if let Some(known) = memo.get(step_id) {
            return known.clone();
        }
        // a back edge never enables a step
        if !visiting.insert(step_id) {
            return None;
        }

        let incoming: Vec<&'a Edge> = self.incoming_edges(step_id).collect();
        let pins = if incoming.is_empty() {
            None
        } else if incoming.iter().all(|e| e.condition.is_always()) {
            let mut joined = Some(Pins::new());
            for edge in incoming.iter().copied() {
                let branch = self.required_pins(edge.from_step.as_str(), start, memo, visiting);
                joined = match (joined, branch) {
                    (Some(acc), Some(branch)) => combine(acc, branch),
                    _ => None,
                };
            }
            joined
        } else {
            let mut alternatives = Vec::new();
            for edge in incoming.iter().copied() {
                let source = self.required_pins(edge.from_step.as_str(), start, memo, visiting);
                if let Some(alternative) = source.and_then(|pins| with_condition(pins, edge)) {
                    alternatives.push(alternative);
                }
            }
            agreed(alternatives)
        };

        visiting.remove(step_id);
        memo.insert(step_id, pins.clone());
        pins
    }

    fn valid_start(&self) -> Option<&str> {
        self.start_step_id().filter(|s| self.has_step(s))
    }

    /// Breadth-first traversal over forward edges
    fn reachable_from<'a>(&'a self, start: &'a str) -> BTreeSet<&'a str> {
        let mut seen = BTreeSet::from([start]);
        let mut queue = VecDeque::from([start]);

        while let Some(step) = queue.pop_front() {
            for edge in self.outgoing_edges(step) {
                if self.has_step(&edge.to_step) && seen.insert(edge.to_step.as_str()) {
                    queue.push_back(edge.to_step.as_str());
                }
            }
        }
        seen
    }
}

/// Pinned values keyed by (`state` or `{step}.output`, field)
type Pins<'a> = BTreeMap<(String, &'a str), &'a Value>;

fn pin_scope(edge: &Edge) -> String {
    match edge.condition.condition_type {
        ConditionType::OutputBased => format!("{}.output", edge.from_step),
        _ => "state".to_string(),
    }
}

/// Union of two pin sets, `None` on a conflicting field
fn combine<'a>(mut acc: Pins<'a>, other: Pins<'a>) -> Option<Pins<'a>> {
    for (key, value) in other {
        match acc.get(&key) {
            Some(current) if !same_value(current, value) => return None,
            Some(_) => {}
            None => {
                acc.insert(key, value);
            }
        }
    }
    Some(acc)
}

/// Pins of the source plus the edge's own `==` constraint
fn with_condition<'a>(source: Pins<'a>, edge: &'a Edge) -> Option<Pins<'a>> {
    let cond = &edge.condition;
    if !cond.is_satisfiable() {
        return None;
    }
    match (cond.operator, cond.field.as_deref(), cond.value.as_ref()) {
        (Operator::Eq, Some(field), Some(value)) if !cond.is_always() => {
            combine(source, Pins::from([((pin_scope(edge), field), value)]))
        }
        _ => Some(source),
    }
}

/// Pins shared by every alternative, `None` without alternatives
fn agreed(alternatives: Vec<Pins<'_>>) -> Option<Pins<'_>> {
    let mut rest = alternatives.into_iter();
    let first = rest.next()?;
    Some(rest.fold(first, |acc, alternative| {
        acc.into_iter()
            .filter(|(key, value)| {
                alternative
                    .get(key)
                    .is_some_and(|other| same_value(value, other))
            })
            .collect()
    }))
}

fn same_value(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdk::schema::{FieldKind, Schema};
    use crate::sdk::step::{Step, StepConfig, StepMetadata};
    use crate::tessel::steps::PassthroughStep;
    use crate::tessel::workflow::condition::EdgeCondition;
    use serde_json::json;
    use std::sync::Arc;

    fn step(id: &str) -> Arc<dyn Step> {
        Arc::new(PassthroughStep::new(id))
    }

    fn typed(id: &str, input: Schema, output: Schema) -> Arc<dyn Step> {
        let mut config = StepConfig::new(id, "passthrough");
        config.input_schema = input;
        config.output_schema = output;
        Arc::new(PassthroughStep::from_config(&config))
    }

    fn chain(ids: &[&str]) -> Workflow {
        let mut wf = Workflow::new("chain");
        for id in ids {
            wf.add_step(step(id)).unwrap();
        }
        for pair in ids.windows(2) {
            wf.add_edge(pair[0], pair[1], None).unwrap();
        }
        wf.set_start_step(ids[0]).unwrap();
        wf.add_end_step(ids[ids.len() - 1]);
        wf
    }

    #[test]
    fn test_valid_chain() {
        let result = chain(&["a", "b", "c"]).validate();
        assert!(result.is_valid, "{:?}", result.errors);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        assert!(!result.has_cycles);
    }

    #[test]
    fn test_empty_workflow() {
        let mut wf = Workflow::new("empty");
        wf.add_end_step("ghost");
        let result = wf.validate();

        assert!(!result.is_valid);
        assert!(result.errors.contains(&"Workflow has no steps".to_string()));
        assert!(result.errors.contains(&"No start step set".to_string()));
        assert!(result
            .errors
            .contains(&"End step 'ghost' does not exist".to_string()));
    }

    #[test]
    fn test_cycle_reported_with_path() {
        let mut wf = chain(&["a", "b", "c"]);
        wf.add_edge("c", "b", None).unwrap();
        let result = wf.validate();

        assert!(!result.is_valid);
        assert!(result.has_cycles);
        assert!(result
            .errors
            .contains(&"Cycle detected: b -> c -> b".to_string()));
    }

    #[test]
    fn test_unreachable_step_is_warning() {
        let mut wf = chain(&["a", "b"]);
        wf.add_step(step("orphan")).unwrap();
        wf.add_end_step("orphan");
        let result = wf.validate();

        assert_eq!(result.unreachable_steps, vec!["orphan".to_string()]);
        assert!(result.warnings.iter().any(|w| w.contains("orphan")));
        // the orphan is also a dead end step
        assert!(result
            .errors
            .contains(&"End step 'orphan' cannot be reached under the edge conditions".to_string()));
    }

    #[test]
    fn test_schema_mismatch() {
        let text = Schema::new().field("text", FieldKind::String);
        let count = Schema::new().field("count", FieldKind::Integer);

        let mut wf = Workflow::new("schemas");
        wf.add_step(typed("a", Schema::new(), text.clone())).unwrap();
        wf.add_step(typed("b", count, Schema::new())).unwrap();
        wf.add_step(typed("c", text, Schema::new())).unwrap();
        wf.add_edge("a", "b", None).unwrap();
        wf.add_edge("a", "c", None).unwrap();
        wf.set_start_step("a").unwrap();
        wf.add_end_step("b").add_end_step("c");

        let result = wf.validate();
        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("Schema mismatch on edge a -> b"));
    }

    #[test]
    fn test_merge_join_accepts_partial_upstream() {
        let title = Schema::new().field("title", FieldKind::String);
        let joined = Schema::new()
            .field("title", FieldKind::String)
            .field("body", FieldKind::String);

        let mut config = StepConfig::new("join", "passthrough");
        config.input_schema = joined;
        config.metadata = StepMetadata::named("join").with_join(JoinPolicy::Merge);

        let mut wf = Workflow::new("merge");
        wf.add_step(typed("a", Schema::new(), title)).unwrap();
        wf.add_step(Arc::new(PassthroughStep::from_config(&config)))
            .unwrap();
        wf.add_edge("a", "join", None).unwrap();
        wf.set_start_step("a").unwrap();
        wf.add_end_step("join");

        assert!(wf.validate().is_valid);
    }

    #[test]
    fn test_contradictory_conditions_warn() {
        let mut wf = Workflow::new("router");
        for id in ["start", "urgent", "normal", "collect"] {
            wf.add_step(step(id)).unwrap();
        }
        wf.add_edge("start", "urgent", None).unwrap();
        wf.add_edge("start", "normal", None).unwrap();
        wf.add_edge(
            "urgent",
            "collect",
            Some(EdgeCondition::state("priority", Operator::Eq, json!("urgent"))),
        )
        .unwrap();
        wf.add_edge(
            "normal",
            "collect",
            Some(EdgeCondition::state("priority", Operator::Eq, json!("normal"))),
        )
        .unwrap();
        wf.set_start_step("start").unwrap();
        wf.add_end_step("collect");

        let result = wf.validate();
        assert!(result.is_valid, "{:?}", result.errors);
        assert!(result
            .warnings
            .iter()
            .any(|w| w.contains("contradictory conditions on state.priority")));
    }

    #[test]
    fn test_dead_end_step_and_fieldless_condition() {
        let mut wf = chain(&["a", "b"]);
        wf.add_step(step("c")).unwrap();
        wf.add_edge(
            "a",
            "c",
            Some(EdgeCondition::state("tag", Operator::In, json!([]))),
        )
        .unwrap();
        wf.add_end_step("c");
        wf.push_edge(Edge {
            id: "bad".into(),
            from_step: "b".into(),
            to_step: "c".into(),
            condition: EdgeCondition {
                condition_type: ConditionType::OutputBased,
                ..EdgeCondition::default()
            },
        })
        .unwrap();

        let result = wf.validate();
        assert!(!result.is_valid);
        assert!(result
            .errors
            .contains(&"Edge b -> c has a conditional edge without a field".to_string()));
        assert!(result
            .errors
            .contains(&"End step 'c' cannot be reached under the edge conditions".to_string()));
        assert!(result.unreachable_steps.is_empty());
    }

    /// start -> {urgent, normal} -> collect, routed on `state.priority`
    fn exclusive_branches(join_condition: Option<EdgeCondition>) -> Workflow {
        let mut wf = Workflow::new("exclusive");
        for id in ["start", "urgent", "normal", "collect"] {
            wf.add_step(step(id)).unwrap();
        }
        wf.add_edge(
            "start",
            "urgent",
            Some(EdgeCondition::state("priority", Operator::Eq, json!("urgent"))),
        )
        .unwrap();
        wf.add_edge(
            "start",
            "normal",
            Some(EdgeCondition::state("priority", Operator::Eq, json!("normal"))),
        )
        .unwrap();
        wf.add_edge("urgent", "collect", None).unwrap();
        wf.add_edge("normal", "collect", join_condition).unwrap();
        wf.set_start_step("start").unwrap();
        wf.add_end_step("collect");
        wf
    }

    #[test]
    fn test_and_join_of_exclusive_branches_is_dead() {
        let result = exclusive_branches(None).validate();

        assert!(!result.is_valid);
        assert_eq!(
            result.errors,
            vec!["End step 'collect' cannot be reached under the edge conditions".to_string()]
        );
    }

    #[test]
    fn test_or_join_of_exclusive_branches_is_live() {
        let join = EdgeCondition::output("ok", Operator::NotEq, json!(false));
        let result = exclusive_branches(Some(join)).validate();
        assert!(result.is_valid, "{:?}", result.errors);
    }

    #[test]
    fn test_and_join_on_one_output_is_dead() {
        let mut wf = Workflow::new("review");
        for id in ["review", "publish", "archive", "done"] {
            wf.add_step(step(id)).unwrap();
        }
        wf.add_edge(
            "review",
            "publish",
            Some(EdgeCondition::output("approved", Operator::Eq, json!(true))),
        )
        .unwrap();
        wf.add_edge(
            "review",
            "archive",
            Some(EdgeCondition::output("approved", Operator::Eq, json!(false))),
        )
        .unwrap();
        wf.add_edge("publish", "done", None).unwrap();
        wf.add_edge("archive", "done", None).unwrap();
        wf.set_start_step("review").unwrap();
        wf.add_end_step("done");

        assert!(!wf.validate().is_valid);

        // the same field on different outputs does not conflict
        let mut other = Workflow::new("split");
        for id in ["a", "b", "c", "d", "done"] {
            other.add_step(step(id)).unwrap();
        }
        other.add_edge("a", "b", None).unwrap();
        other
            .add_edge(
                "a",
                "c",
                Some(EdgeCondition::output("go", Operator::Eq, json!(1))),
            )
            .unwrap();
        other
            .add_edge(
                "b",
                "d",
                Some(EdgeCondition::output("go", Operator::Eq, json!(2))),
            )
            .unwrap();
        other.add_edge("c", "done", None).unwrap();
        other.add_edge("d", "done", None).unwrap();
        other.set_start_step("a").unwrap();
        other.add_end_step("done");
        assert!(other.validate().is_valid);
    }

    #[test]
    fn test_undeclared_output_into_typed_input_warns() {
        let text = Schema::new().field("text", FieldKind::String);

        let mut wf = Workflow::new("open");
        wf.add_step(step("a")).unwrap();
        wf.add_step(typed("b", text, Schema::new())).unwrap();
        wf.add_edge("a", "b", None).unwrap();
        wf.set_start_step("a").unwrap();
        wf.add_end_step("b");

        let result = wf.validate();
        assert!(result.is_valid, "{:?}", result.errors);
        assert!(result.warnings.contains(
            &"Output of 'a' is undeclared; input of 'b' is only checked at run time".to_string()
        ));
    }

    #[test]
    fn test_sink_without_end_warns() {
        let mut wf = chain(&["a", "b"]);
        wf.add_step(step("side")).unwrap();
        wf.add_edge("a", "side", None).unwrap();

        let result = wf.validate();
        assert!(result.is_valid);
        assert!(result
            .warnings
            .contains(&"Step 'side' has no outgoing edges and is not an end step".to_string()));
    }
}
