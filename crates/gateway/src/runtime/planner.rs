//! Planner — produces the next `Action` from a `RunState`, either by
//! replaying a pending parsed decision or by one low-temperature model
//! call through the structured-output parser.
//!
//! The planner never executes tools and has no persistence effects.

use std::sync::Arc;

use hearth_domain::agent::{Action, Decision, Mode, RunState};
use hearth_domain::config::AgentConfig;
use hearth_providers::ModelClient;

use super::dispatcher::Dispatcher;
use super::formatters::tools_list_text;
use super::prompts::build_task_messages;
use super::protocol::parse_model_output;

pub struct Planner {
    dispatcher: Arc<Dispatcher>,
}

fn decision_to_action(decision: Decision) -> Action {
    match decision {
        Decision::ToolCall { tool, args } => Action::tool_call(tool, args),
        Decision::NeedInfo { questions } => Action::need_info(questions),
        Decision::Final { message } => Action::final_message(message),
        // Safe fallback: an empty final answer.
        Decision::Invalid => Action::final_message(""),
    }
}

impl Planner {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// Decide the next action. Consumes `state.pending_decision` when
    /// set; otherwise, in task mode with a model available, asks the
    /// model under the JSON-only contract.
    pub async fn next(
        &self,
        state: &mut RunState,
        model: Option<&dyn ModelClient>,
        config: &AgentConfig,
    ) -> Action {
        if let Some(decision) = state.take_pending_decision() {
            return decision_to_action(decision);
        }

        if state.mode == Mode::Task || state.mode == Mode::Scheduling {
            if let (Some(model), Some(task)) = (model, state.task.as_ref()) {
                let tools_text = tools_list_text(&self.dispatcher.definitions());
                let previous: Vec<_> = state
                    .history
                    .iter()
                    .rev()
                    .take(4)
                    .rev()
                    .cloned()
                    .collect();
                let messages =
                    build_task_messages(&config.name, &tools_text, &previous, &state.message);
                let raw = match model.chat(&messages, 0.3, None).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        tracing::warn!(error = %e, "planner model call failed");
                        return Action::final_message("");
                    }
                };
                let allowed = self.dispatcher.tool_names();
                let decision = parse_model_output(
                    &raw,
                    task.last_assistant_output.as_deref(),
                    Some(&allowed),
                    &config.intention_phrases,
                );
                return decision_to_action(decision);
            }
        }

        Action::final_message("")
    }
}
