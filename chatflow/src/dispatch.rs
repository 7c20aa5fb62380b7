//! Orchestration for routing inbound units through steps.
//!
//! Per unit: decode the token, collapse loops against the step's identity,
//! resolve, then either forward the unit to the chosen branch or stamp every
//! branch with a routing token and send a new prompt.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, instrument, warn};

use crate::core::branches::{arity, enumerate};
use crate::core::codec::{self, check_len, stamp};
use crate::core::collapse::collapse;
use crate::core::resolver::{Trail, resolve};
use crate::core::types::{
    Branch, BranchIndex, MAIN_OUTPUT, RoutingDecision, RoutingToken, StepIdentity, VisitedPath,
};
use crate::definition::{StepDefinition, Workflow};
use crate::error::RoutingError;
use crate::io::config::DispatchConfig;
use crate::io::prompt::{PromptRenderer, StampedAction};
use crate::io::transport::{Forward, Transport};
use crate::io::units::{InboundUnit, recorded_path};

/// Item emitted on an output port.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputItem {
    pub json: Value,
    /// Batch position of the unit that produced this item.
    pub source: usize,
}

/// Terminal state of one unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum UnitOutcome {
    Forwarded {
        source: usize,
        branch: BranchIndex,
        output: usize,
        path: VisitedPath,
    },
    PromptSent {
        source: usize,
        actions: usize,
    },
    Failed {
        source: usize,
        error: String,
    },
}

/// Accumulated outputs of one step, one list per output port.
///
/// Items keep the relative order of the units that produced them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepOutputs {
    pub outputs: Vec<Vec<OutputItem>>,
    pub outcomes: Vec<UnitOutcome>,
}

impl StepOutputs {
    fn new(arity: usize) -> Self {
        Self {
            outputs: vec![Vec::new(); arity],
            outcomes: Vec::new(),
        }
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome, UnitOutcome::Failed { .. }))
            .count()
    }
}

/// Routing state of a unit after decode, collapse, and resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Visited path after loop collapse.
    pub path: VisitedPath,
    /// Choices consumed by `path`; prefix of every token in a new prompt.
    pub prefix: RoutingToken,
    pub decision: RoutingDecision,
}

/// Result of dispatching a single unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched {
    Forwarded(Forward),
    PromptSent { response: Value, actions: usize },
}

/// Routes units for one step. Holds no per-unit state.
pub struct StepDispatcher<'a, T: Transport> {
    step: &'a StepIdentity,
    definition: &'a StepDefinition,
    branches: Vec<Branch>,
    transport: &'a T,
    config: &'a DispatchConfig,
    renderer: PromptRenderer,
}

impl<'a, T: Transport> StepDispatcher<'a, T> {
    pub fn new(
        step: &'a StepIdentity,
        definition: &'a StepDefinition,
        transport: &'a T,
        config: &'a DispatchConfig,
    ) -> Self {
        Self {
            step,
            definition,
            branches: enumerate(definition),
            transport,
            config,
            renderer: PromptRenderer::new(),
        }
    }

    /// Decode, collapse, and resolve without side effects.
    ///
    /// The visited path is the unit's `prior_path`, else the path an earlier
    /// forward recorded in its data under `path_field`. Malformed tokens and
    /// choices naming a branch this step does not have are logged and treated
    /// as unresolved.
    pub fn route(&self, unit: &InboundUnit) -> Route {
        let token = match codec::decode(unit.raw_token()) {
            Ok(token) => token,
            Err(err) => {
                warn!(step = %self.step, %err, "ignoring malformed routing token");
                RoutingToken::default()
            }
        };
        let prior = unit
            .prior_path
            .clone()
            .or_else(|| recorded_path(&unit.data, &self.config.path_field))
            .unwrap_or_default();
        let (path, token) = collapse(prior, token, self.step);
        let trail = Trail::bind(&path, &token);

        let decision = match resolve(&token, &path) {
            RoutingDecision::Resolved(_) if self.branches.is_empty() => RoutingDecision::Unresolved,
            RoutingDecision::Resolved(branch) if branch.get() >= self.branches.len() => {
                warn!(
                    step = %self.step,
                    %branch,
                    branches = self.branches.len(),
                    "routing token selects a missing branch"
                );
                RoutingDecision::Unresolved
            }
            decision => decision,
        };
        debug!(step = %self.step, depth = trail.depth(), ?decision, "routed unit");

        Route {
            path,
            prefix: trail.consumed(),
            decision,
        }
    }

    /// Route one unit and perform its transport call.
    pub fn dispatch(&self, unit: InboundUnit) -> Result<Dispatched, RoutingError> {
        let route = self.route(&unit);
        match route.decision {
            RoutingDecision::Resolved(branch) => self
                .forward(unit, route.path, branch)
                .map(Dispatched::Forwarded),
            RoutingDecision::Unresolved => self.prompt(&unit, &route.prefix),
        }
    }

    /// Stamp every branch with `prefix` plus its own index.
    pub fn stamp_actions(&self, prefix: &RoutingToken) -> Result<Vec<StampedAction>, RoutingError> {
        self.branches
            .iter()
            .map(|branch| {
                let token = stamp(prefix, branch.index);
                check_len(&token, self.config.payload_limit_bytes)?;
                Ok(StampedAction {
                    row: branch.row,
                    label: branch.label.clone(),
                    token,
                    extra: branch.extra.clone(),
                })
            })
            .collect()
    }

    /// Dispatch `unit` and record the result in `outputs`.
    ///
    /// With `continue_on_fail`, a failing unit's error becomes an item on the
    /// main output; otherwise the error is returned and the batch aborts.
    #[instrument(skip_all, fields(step = %self.step, source = source))]
    pub fn process(
        &self,
        source: usize,
        unit: InboundUnit,
        outputs: &mut StepOutputs,
    ) -> Result<(), RoutingError> {
        match self.dispatch(unit) {
            Ok(Dispatched::Forwarded(forward)) => {
                outputs.outcomes.push(UnitOutcome::Forwarded {
                    source,
                    branch: forward.branch,
                    output: forward.output,
                    path: forward.path,
                });
                outputs.outputs[forward.output].push(OutputItem {
                    json: forward.data,
                    source,
                });
            }
            Ok(Dispatched::PromptSent { response, actions }) => {
                outputs.outcomes.push(UnitOutcome::PromptSent { source, actions });
                outputs.outputs[MAIN_OUTPUT].push(OutputItem {
                    json: response,
                    source,
                });
            }
            Err(err) if self.config.continue_on_fail => {
                warn!(%err, "unit failed, continuing");
                outputs.outputs[MAIN_OUTPUT].push(OutputItem {
                    json: json!({ "error": err.to_string() }),
                    source,
                });
                outputs.outcomes.push(UnitOutcome::Failed {
                    source,
                    error: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }

    /// Process units in order; `source` numbers them from zero.
    pub fn run(&self, units: Vec<InboundUnit>) -> Result<StepOutputs, RoutingError> {
        let mut outputs = self.empty_outputs();
        for (source, unit) in units.into_iter().enumerate() {
            self.process(source, unit, &mut outputs)?;
        }
        Ok(outputs)
    }

    fn empty_outputs(&self) -> StepOutputs {
        StepOutputs::new(arity(self.definition))
    }

    fn forward(
        &self,
        unit: InboundUnit,
        mut path: VisitedPath,
        branch: BranchIndex,
    ) -> Result<Forward, RoutingError> {
        path.push(self.step.clone());
        let forward = Forward {
            step: self.step.clone(),
            branch,
            output: branch.output(),
            data: with_path(unit.data, &self.config.path_field, &path),
            path,
        };
        self.transport
            .forward(&forward)
            .map_err(|err| self.transport_error(&err))?;
        Ok(forward)
    }

    fn prompt(&self, unit: &InboundUnit, prefix: &RoutingToken) -> Result<Dispatched, RoutingError> {
        let actions = self.stamp_actions(prefix)?;
        let count = actions.len();
        let request = self
            .renderer
            .render(
                self.step,
                self.definition,
                &unit.data,
                actions,
                self.config.default_parse_mode,
            )
            .map_err(|err| RoutingError::Render {
                step: self.step.clone(),
                message: format!("{err:#}"),
            })?;
        let response = self
            .transport
            .send_prompt(&request)
            .map_err(|err| self.transport_error(&err))?;
        Ok(Dispatched::PromptSent {
            response,
            actions: count,
        })
    }

    fn transport_error(&self, err: &anyhow::Error) -> RoutingError {
        RoutingError::Transport {
            step: self.step.clone(),
            message: format!("{err:#}"),
        }
    }
}

/// Write `path` into the unit's data under `field`.
///
/// Non-object data is kept under `value`.
fn with_path(data: Value, field: &str, path: &[StepIdentity]) -> Value {
    let mut object = match data {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    let path = path
        .iter()
        .map(|step| Value::String(step.to_string()))
        .collect();
    object.insert(field.to_string(), Value::Array(path));
    Value::Object(object)
}

/// A unit that could not be routed at all.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitFailure {
    pub source: usize,
    pub step: StepIdentity,
    pub error: String,
}

/// Outputs of a whole batch, keyed by step.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub steps: BTreeMap<StepIdentity, StepOutputs>,
    pub failures: Vec<UnitFailure>,
}

impl BatchReport {
    /// Units that ended in a failure, routed or not.
    pub fn failed_units(&self) -> usize {
        self.failures.len() + self.steps.values().map(StepOutputs::failed).sum::<usize>()
    }
}

/// Dispatch a batch of units against a workflow, in batch order.
///
/// Units naming a step the workflow does not define fail on their own and
/// never abort the batch.
pub fn dispatch_batch<T: Transport>(
    workflow: &Workflow,
    units: Vec<InboundUnit>,
    transport: &T,
    config: &DispatchConfig,
) -> Result<BatchReport, RoutingError> {
    let mut dispatchers: BTreeMap<&StepIdentity, StepDispatcher<'_, T>> = BTreeMap::new();
    let mut report = BatchReport::default();

    for (source, unit) in units.into_iter().enumerate() {
        let Some((step, definition)) = workflow.steps.get_key_value(&unit.step) else {
            let err = RoutingError::UnknownStep(unit.step.clone());
            warn!(source, %err, "unit names an unknown step");
            report.failures.push(UnitFailure {
                source,
                step: unit.step,
                error: err.to_string(),
            });
            continue;
        };
        let dispatcher = dispatchers
            .entry(step)
            .or_insert_with(|| StepDispatcher::new(step, definition, transport, config));
        let outputs = report
            .steps
            .entry(step.clone())
            .or_insert_with(|| dispatcher.empty_outputs());
        dispatcher.process(source, unit, outputs)?;
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{
        RecordingTransport, plain_step, step_with_buttons, step_with_rows, unit, workflow,
    };

    fn dispatcher<'a>(
        step: &'a StepIdentity,
        definition: &'a StepDefinition,
        transport: &'a RecordingTransport,
        config: &'a DispatchConfig,
    ) -> StepDispatcher<'a, RecordingTransport> {
        StepDispatcher::new(step, definition, transport, config)
    }

    #[test]
    fn first_prompt_stamps_one_token_per_branch() {
        let step = StepIdentity::from("ask");
        let definition = step_with_buttons(&["a", "b", "c"]);
        let transport = RecordingTransport::new();
        let config = DispatchConfig::default();

        let outputs = dispatcher(&step, &definition, &transport, &config)
            .run(vec![unit("ask", None, &[])])
            .expect("run");

        assert_eq!(transport.last_tokens(), vec!["0", "1", "2"]);
        assert_eq!(
            outputs.outcomes,
            vec![UnitOutcome::PromptSent {
                source: 0,
                actions: 3
            }]
        );
        assert_eq!(outputs.outputs.len(), 4);
        assert_eq!(outputs.outputs[MAIN_OUTPUT].len(), 1);
        assert_eq!(outputs.outputs[MAIN_OUTPUT][0].json["ok"], true);
    }

    #[test]
    fn prompt_tokens_extend_consumed_history() {
        let step = StepIdentity::from("second");
        let definition = step_with_buttons(&["a", "b", "c"]);
        let transport = RecordingTransport::new();
        let config = DispatchConfig::default();

        dispatcher(&step, &definition, &transport, &config)
            .run(vec![unit("second", Some("1"), &["first"])])
            .expect("run");

        assert_eq!(transport.last_tokens(), vec!["1,0", "1,1", "1,2"]);
    }

    #[test]
    fn answered_step_forwards_with_updated_path() {
        let step = StepIdentity::from("a");
        let definition = step_with_buttons(&["left", "right"]);
        let transport = RecordingTransport::new();
        let config = DispatchConfig::default();

        let outputs = dispatcher(&step, &definition, &transport, &config)
            .run(vec![unit("a", Some("1"), &[])])
            .expect("run");

        assert!(transport.prompts.borrow().is_empty());
        let forwards = transport.forwards.borrow();
        assert_eq!(forwards.len(), 1);
        assert_eq!(forwards[0].branch, BranchIndex::new(1));
        assert_eq!(forwards[0].output, 2);
        assert_eq!(forwards[0].path, vec![StepIdentity::from("a")]);
        assert_eq!(outputs.outputs[2].len(), 1);
        assert_eq!(outputs.outputs[2][0].json["path"], json!(["a"]));
        assert!(outputs.outputs[MAIN_OUTPUT].is_empty());
    }

    #[test]
    fn branch_zero_forwards_instead_of_prompting() {
        let step = StepIdentity::from("a");
        let definition = step_with_buttons(&["left", "right"]);
        let transport = RecordingTransport::new();
        let config = DispatchConfig::default();

        let outputs = dispatcher(&step, &definition, &transport, &config)
            .run(vec![unit("a", Some("0"), &[])])
            .expect("run");

        assert_eq!(outputs.outputs[1].len(), 1);
        assert!(transport.prompts.borrow().is_empty());
    }

    #[test]
    fn revisit_collapses_and_prompts_again() {
        let step = StepIdentity::from("a");
        let definition = step_with_buttons(&["left", "right"]);
        let transport = RecordingTransport::new();
        let config = DispatchConfig::default();
        let d = dispatcher(&step, &definition, &transport, &config);

        let route = d.route(&unit("a", Some("1"), &["a"]));
        assert!(route.path.is_empty());
        assert!(route.prefix.is_empty());
        assert_eq!(route.decision, RoutingDecision::Unresolved);

        d.run(vec![unit("a", Some("1"), &["a"])]).expect("run");
        assert_eq!(transport.last_tokens(), vec!["0", "1"]);
    }

    #[test]
    fn malformed_token_prompts_from_scratch() {
        let step = StepIdentity::from("a");
        let definition = step_with_buttons(&["left", "right"]);
        let transport = RecordingTransport::new();
        let config = DispatchConfig::default();

        let outputs = dispatcher(&step, &definition, &transport, &config)
            .run(vec![unit("a", Some("left"), &[])])
            .expect("malformed token must not fail the batch");

        assert_eq!(outputs.failed(), 0);
        assert_eq!(transport.last_tokens(), vec!["0", "1"]);
    }

    #[test]
    fn out_of_range_choice_prompts_with_consumed_prefix() {
        let step = StepIdentity::from("b");
        let definition = step_with_buttons(&["left", "right"]);
        let transport = RecordingTransport::new();
        let config = DispatchConfig::default();

        dispatcher(&step, &definition, &transport, &config)
            .run(vec![unit("b", Some("1,5"), &["a"])])
            .expect("run");

        assert_eq!(transport.last_tokens(), vec!["1,0", "1,1"]);
    }

    #[test]
    fn step_without_keyboard_always_prompts() {
        let step = StepIdentity::from("note");
        let definition = plain_step();
        let transport = RecordingTransport::new();
        let config = DispatchConfig::default();

        let outputs = dispatcher(&step, &definition, &transport, &config)
            .run(vec![unit("note", Some("0"), &[])])
            .expect("run");

        assert_eq!(outputs.outputs.len(), 1);
        assert_eq!(
            outputs.outcomes,
            vec![UnitOutcome::PromptSent {
                source: 0,
                actions: 0
            }]
        );
        assert!(transport.forwards.borrow().is_empty());
    }

    #[test]
    fn transport_failure_aborts_without_continue_on_fail() {
        let step = StepIdentity::from("a");
        let definition = step_with_buttons(&["left"]);
        let transport = RecordingTransport::failing_on(&[0]);
        let config = DispatchConfig::default();

        let err = dispatcher(&step, &definition, &transport, &config)
            .run(vec![unit("a", None, &[]), unit("a", None, &[])])
            .expect_err("should abort");

        assert!(matches!(err, RoutingError::Transport { .. }));
        assert!(transport.prompts.borrow().is_empty());
    }

    #[test]
    fn transport_failure_is_recorded_with_continue_on_fail() {
        let step = StepIdentity::from("a");
        let definition = step_with_buttons(&["left"]);
        let transport = RecordingTransport::failing_on(&[0]);
        let config = DispatchConfig {
            continue_on_fail: true,
            ..DispatchConfig::default()
        };

        let outputs = dispatcher(&step, &definition, &transport, &config)
            .run(vec![unit("a", None, &[]), unit("a", None, &[])])
            .expect("run");

        assert_eq!(outputs.failed(), 1);
        let main = &outputs.outputs[MAIN_OUTPUT];
        assert_eq!(main.len(), 2);
        assert_eq!(main[0].source, 0);
        assert!(
            main[0].json["error"]
                .as_str()
                .expect("error string")
                .contains("scripted transport failure")
        );
        assert_eq!(main[1].source, 1);
        assert_eq!(transport.prompts.borrow().len(), 1);
    }

    #[test]
    fn oversized_token_fails_closed() {
        let step = StepIdentity::from("deep");
        let definition = step_with_buttons(&["a", "b"]);
        let transport = RecordingTransport::new();
        let config = DispatchConfig {
            payload_limit_bytes: 3,
            ..DispatchConfig::default()
        };

        let err = dispatcher(&step, &definition, &transport, &config)
            .run(vec![unit("deep", Some("1,1"), &["x", "y"])])
            .expect_err("token too long");

        assert_eq!(err, RoutingError::PayloadTooLarge { len: 5, limit: 3 });
        assert!(transport.prompts.borrow().is_empty());
    }

    #[test]
    fn render_failure_is_a_unit_failure() {
        let step = StepIdentity::from("a");
        let definition = step_with_buttons(&["left"]);
        let transport = RecordingTransport::new();
        let config = DispatchConfig {
            continue_on_fail: true,
            ..DispatchConfig::default()
        };
        let mut no_chat = unit("a", None, &[]);
        no_chat.data = json!({});

        let outputs = dispatcher(&step, &definition, &transport, &config)
            .run(vec![no_chat])
            .expect("run");

        assert_eq!(outputs.failed(), 1);
        assert!(
            outputs.outputs[MAIN_OUTPUT][0].json["error"]
                .as_str()
                .expect("error string")
                .contains("chat_id rendered empty")
        );
    }

    #[test]
    fn path_recorded_in_data_sets_resolution_depth() {
        let step = StepIdentity::from("support");
        let definition = step_with_rows(&[&["Call me"], &["Back"]]);
        let transport = RecordingTransport::new();
        let config = DispatchConfig::default();
        let mut answered = unit("support", Some("1,0"), &[]);
        answered.data = json!({"chat_id": 1, "path": ["menu"]});

        let outputs = dispatcher(&step, &definition, &transport, &config)
            .run(vec![answered])
            .expect("run");

        assert_eq!(
            outputs.outcomes,
            vec![UnitOutcome::Forwarded {
                source: 0,
                branch: BranchIndex::new(0),
                output: 1,
                path: vec![StepIdentity::from("menu"), StepIdentity::from("support")],
            }]
        );
        assert_eq!(outputs.outputs[1][0].json["path"], json!(["menu", "support"]));
    }

    #[test]
    fn explicit_prior_path_wins_over_recorded_path() {
        let step = StepIdentity::from("b");
        let definition = step_with_buttons(&["left", "right"]);
        let transport = RecordingTransport::new();
        let config = DispatchConfig {
            path_field: "trail".to_string(),
            ..DispatchConfig::default()
        };
        let mut answered = unit("b", Some("1,0"), &["a"]);
        answered.data = json!({"chat_id": 1, "trail": ["x", "y"]});

        let route = dispatcher(&step, &definition, &transport, &config).route(&answered);

        assert_eq!(route.path, vec![StepIdentity::from("a")]);
        assert_eq!(route.decision, RoutingDecision::Resolved(BranchIndex::new(0)));
    }

    #[test]
    fn forward_wraps_non_object_data() {
        let data = with_path(json!(5), "trail", &[StepIdentity::from("a")]);
        assert_eq!(data, json!({"value": 5, "trail": ["a"]}));
    }

    #[test]
    fn batch_reports_unknown_steps_and_keeps_branch_order() {
        let wf = workflow(vec![("ask", step_with_buttons(&["yes", "no"]))]);
        let transport = RecordingTransport::new();
        let config = DispatchConfig::default();

        let report = dispatch_batch(
            &wf,
            vec![
                unit("ask", Some("1"), &[]),
                unit("missing", None, &[]),
                unit("ask", Some("0"), &[]),
                unit("ask", Some("1"), &[]),
            ],
            &transport,
            &config,
        )
        .expect("batch");

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].source, 1);
        assert_eq!(report.failures[0].error, "unknown step 'missing'");
        assert_eq!(report.failed_units(), 1);

        let ask = &report.steps[&StepIdentity::from("ask")];
        let sources: Vec<usize> = ask.outputs[2].iter().map(|item| item.source).collect();
        assert_eq!(sources, vec![0, 3]);
        assert_eq!(ask.outputs[1][0].source, 2);
    }
}
