//! Reassembly of streamed tool-call fragments.
//!
//! Chat-completion APIs stream a tool call as a series of fragments keyed by
//! index: the id and name usually arrive once, the JSON argument string
//! arrives in arbitrary slices. The accumulator merges fragments per index
//! and, at the end of a run, parses each record into a [`ToolCallRecord`].

use std::collections::{BTreeMap, HashSet};

use serde_json::{Map, Value};

use crate::types::{CallChannel, MalformedCall, ToolCallFragment, ToolCallRecord};

/// Where the accumulator is within a tool-call run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    /// Nothing buffered.
    Idle,
    /// Fragments buffered, waiting for the run to end.
    Accumulating,
    /// The last run was flushed. Behaves like `Idle`.
    Flushed,
}

#[derive(Debug, Clone, Copy)]
enum Field {
    Id,
    Name,
    Arguments,
}

#[derive(Debug, Clone, Copy)]
enum MergeRule {
    /// Keep the first non-empty value; later values are ignored.
    FirstNonEmpty,
    /// Concatenate every value in arrival order.
    Append,
}

const MERGE_RULES: [(Field, MergeRule); 3] = [
    (Field::Id, MergeRule::FirstNonEmpty),
    (Field::Name, MergeRule::FirstNonEmpty),
    (Field::Arguments, MergeRule::Append),
];

impl MergeRule {
    fn apply(self, slot: &mut String, incoming: &str) {
        match self {
            Self::FirstNonEmpty => {
                if slot.is_empty() {
                    slot.push_str(incoming);
                }
            }
            Self::Append => slot.push_str(incoming),
        }
    }
}

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

impl PartialCall {
    fn merge(&mut self, fragment: &ToolCallFragment) {
        for (field, rule) in MERGE_RULES {
            let (slot, incoming) = match field {
                Field::Id => (&mut self.id, &fragment.id),
                Field::Name => (&mut self.name, &fragment.name),
                Field::Arguments => (&mut self.arguments, &fragment.arguments),
            };
            if let Some(incoming) = incoming {
                rule.apply(slot, incoming);
            }
        }
    }

    fn complete(self, id: String) -> Result<ToolCallRecord, MalformedCall> {
        let name = self.name.trim().to_string();

        if name.is_empty() {
            return Err(MalformedCall {
                id,
                name: None,
                reason: "tool call has no name".into(),
            });
        }

        let raw = self.arguments.trim();
        let arguments = if raw.is_empty() {
            Map::new()
        } else {
            match serde_json::from_str::<Value>(raw) {
                Ok(Value::Object(map)) => map,
                Ok(_) => {
                    return Err(MalformedCall {
                        id,
                        name: Some(name),
                        reason: "arguments are not a JSON object".into(),
                    });
                }
                Err(e) => {
                    return Err(MalformedCall {
                        id,
                        name: Some(name),
                        reason: format!("invalid JSON arguments: {e}"),
                    });
                }
            }
        };

        Ok(ToolCallRecord {
            id,
            name,
            arguments,
            channel: CallChannel::ExplicitDelta,
        })
    }
}

/// Merges tool-call fragments into complete records.
///
/// One accumulator lives for a whole turn. Ids it synthesizes stay unique
/// across every run it flushes.
#[derive(Debug)]
pub struct DeltaAccumulator {
    calls: BTreeMap<u32, PartialCall>,
    state: AccumulatorState,
    runs: u32,
    issued: HashSet<String>,
}

impl Default for DeltaAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl DeltaAccumulator {
    /// Create an idle accumulator.
    pub fn new() -> Self {
        Self {
            calls: BTreeMap::new(),
            state: AccumulatorState::Idle,
            runs: 0,
            issued: HashSet::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> AccumulatorState {
        self.state
    }

    /// Whether fragments are buffered.
    pub fn is_accumulating(&self) -> bool {
        self.state == AccumulatorState::Accumulating
    }

    /// Merge one fragment.
    pub fn push(&mut self, fragment: ToolCallFragment) {
        self.state = AccumulatorState::Accumulating;
        self.calls.entry(fragment.index).or_default().merge(&fragment);
    }

    /// End the current run, in ascending index order.
    ///
    /// Every buffered record comes back either complete or as a
    /// [`MalformedCall`] carrying its id. A record without an id gets
    /// `call_{index}`, or `call_{index}_{run}` when an earlier run already
    /// used that id. Calling this while idle returns nothing.
    pub fn flush(&mut self) -> Vec<Result<ToolCallRecord, MalformedCall>> {
        if !self.is_accumulating() {
            return Vec::new();
        }
        self.state = AccumulatorState::Flushed;
        self.runs += 1;
        let mut flushed = Vec::with_capacity(self.calls.len());
        for (index, mut call) in std::mem::take(&mut self.calls) {
            let id = if call.id.is_empty() {
                self.synthesize_id(index)
            } else {
                std::mem::take(&mut call.id)
            };
            self.issued.insert(id.clone());
            flushed.push(call.complete(id));
        }
        flushed
    }

    fn synthesize_id(&self, index: u32) -> String {
        let first = format!("call_{index}");
        if !self.issued.contains(&first) {
            return first;
        }
        (self.runs..)
            .map(|run| format!("call_{index}_{run}"))
            .find(|id| !self.issued.contains(id))
            .unwrap_or(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flush_ok(acc: &mut DeltaAccumulator) -> Vec<ToolCallRecord> {
        acc.flush()
            .into_iter()
            .map(|r| r.expect("record should be complete"))
            .collect()
    }

    #[test]
    fn test_state_transitions() {
        let mut acc = DeltaAccumulator::new();
        assert_eq!(acc.state(), AccumulatorState::Idle);
        assert!(acc.flush().is_empty());

        acc.push(ToolCallFragment::new(0).with_name("echo"));
        assert_eq!(acc.state(), AccumulatorState::Accumulating);

        assert_eq!(acc.flush().len(), 1);
        assert_eq!(acc.state(), AccumulatorState::Flushed);
        assert!(acc.flush().is_empty());

        acc.push(ToolCallFragment::new(0).with_name("echo"));
        assert!(acc.is_accumulating());
    }

    #[test]
    fn test_fragments_merge() {
        let mut acc = DeltaAccumulator::new();
        acc.push(
            ToolCallFragment::new(0)
                .with_id("call_abc")
                .with_name("calculate_bmi")
                .with_arguments("{\"w\":70,"),
        );
        acc.push(ToolCallFragment::new(0).with_arguments("\"h\":1.75}"));

        let records = flush_ok(&mut acc);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "call_abc");
        assert_eq!(records[0].name, "calculate_bmi");
        assert_eq!(json!(records[0].arguments), json!({"w": 70, "h": 1.75}));
        assert_eq!(records[0].channel, CallChannel::ExplicitDelta);
    }

    #[test]
    fn test_first_non_empty_wins() {
        let mut acc = DeltaAccumulator::new();
        acc.push(ToolCallFragment::new(0).with_id("").with_name(""));
        acc.push(ToolCallFragment::new(0).with_id("call_1").with_name("echo"));
        acc.push(ToolCallFragment::new(0).with_id("call_2").with_name("echo"));

        let records = flush_ok(&mut acc);
        assert_eq!(records[0].id, "call_1");
        assert_eq!(records[0].name, "echo");
    }

    #[test]
    fn test_missing_id_synthesized() {
        let mut acc = DeltaAccumulator::new();
        acc.push(ToolCallFragment::new(3).with_name("echo"));
        let records = flush_ok(&mut acc);
        assert_eq!(records[0].id, "call_3");
        assert!(records[0].arguments.is_empty());
    }

    #[test]
    fn test_synthesized_ids_unique_across_runs() {
        let mut acc = DeltaAccumulator::new();
        let mut ids = Vec::new();
        for _ in 0..3 {
            acc.push(ToolCallFragment::new(0).with_name("echo").with_arguments("{}"));
            ids.extend(flush_ok(&mut acc).into_iter().map(|r| r.id));
        }
        assert_eq!(ids, vec!["call_0", "call_0_2", "call_0_3"]);
    }

    #[test]
    fn test_synthesized_id_avoids_provider_ids() {
        let mut acc = DeltaAccumulator::new();
        acc.push(ToolCallFragment::new(0).with_id("call_1").with_name("echo"));
        assert_eq!(flush_ok(&mut acc)[0].id, "call_1");

        acc.push(ToolCallFragment::new(1).with_name("echo"));
        assert_eq!(flush_ok(&mut acc)[0].id, "call_1_2");
    }

    #[test]
    fn test_ascending_index_order() {
        let mut acc = DeltaAccumulator::new();
        acc.push(ToolCallFragment::new(2).with_name("c"));
        acc.push(ToolCallFragment::new(0).with_name("a"));
        acc.push(ToolCallFragment::new(1).with_name("b"));
        acc.push(ToolCallFragment::new(0).with_arguments("{}"));

        let names: Vec<_> = flush_ok(&mut acc).into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_malformed_calls_keep_their_id() {
        let mut acc = DeltaAccumulator::new();
        acc.push(ToolCallFragment::new(0).with_id("bad_json").with_name("echo").with_arguments("{\"a\":"));
        acc.push(ToolCallFragment::new(1).with_id("not_object").with_name("echo").with_arguments("[1, 2]"));
        acc.push(ToolCallFragment::new(2).with_arguments("{}"));

        let flushed = acc.flush();
        assert_eq!(flushed.len(), 3);

        let err = flushed[0].as_ref().unwrap_err();
        assert_eq!(err.id, "bad_json");
        assert!(err.reason.starts_with("invalid JSON arguments"));

        let err = flushed[1].as_ref().unwrap_err();
        assert_eq!(err.id, "not_object");
        assert_eq!(err.name.as_deref(), Some("echo"));

        let err = flushed[2].as_ref().unwrap_err();
        assert_eq!(err.id, "call_2");
        assert_eq!(err.name, None);
    }

    #[test]
    fn test_rechunking_gives_same_records() {
        let args = r#"{"query": "naïve café", "limit": 5, "tags": ["a", "b"]}"#;

        let mut whole = DeltaAccumulator::new();
        whole.push(ToolCallFragment::new(0).with_name("search").with_arguments(args));
        whole.push(ToolCallFragment::new(1).with_name("echo").with_arguments("{\"text\":\"hi\"}"));

        let mut split = DeltaAccumulator::new();
        split.push(ToolCallFragment::new(0).with_name("search"));
        split.push(ToolCallFragment::new(1).with_name("echo"));
        for c in args.chars() {
            split.push(ToolCallFragment::new(0).with_arguments(c.to_string()));
        }
        for c in "{\"text\":\"hi\"}".chars() {
            split.push(ToolCallFragment::new(1).with_arguments(c.to_string()));
        }

        assert_eq!(flush_ok(&mut whole), flush_ok(&mut split));
    }
}
