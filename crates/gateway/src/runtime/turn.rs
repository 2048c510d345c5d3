//! Turn orchestration — the top-level loop that turns one user message
//! into a reply: mode routing, chat mode, the agentic
//! plan -> act -> observe -> reflect cycle, the task-mode overlay, the
//! legacy single-pass fallback, and progress-event emission.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use hearth_domain::agent::{Action, Decision, JsonObject, Mode, RunContext, RunState};
use hearth_domain::chat::Message;
use hearth_domain::config::Config;
use hearth_domain::event::{ProgressEvent, StepPhase};
use hearth_domain::task::TaskState;
use hearth_providers::{ModelClient, ToolChoice};

use super::agentic::{parse_plan_step, parse_reflect_step, NextAction, PlannedCall, TurnTrace};
use super::dispatcher::Dispatcher;
use super::executor::Executor;
use super::formatters::{result_summary, tools_list_text};
use super::metrics::Metrics;
use super::planner::Planner;
use super::prompts;
use super::protocol::{extract_json_object, parse_final_response, parse_model_output};
use super::task_store::{TaskStore, TransitionOpts};
use super::validator::Validator;
use super::{strip_markdown_emphasis, truncate_str};

const APOLOGY: &str = "I had trouble answering. Please try again.";
const TOO_MANY_STEPS: &str = "Too many steps; please try again with a shorter request.";
const TOO_MANY_TOOL_ATTEMPTS: &str =
    "Maximum tool attempts reached for this task. Please start over.";
const JSON_ONLY_RETRY: &str =
    "Please respond with only a JSON object (tool_call, need_info, or final). No other text.";

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// One inbound chat request, already resolved by the intake layer to
/// identities, a history window, and persona/preference snippets.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub household_id: i64,
    pub user_id: Option<i64>,
    pub message: String,
    pub history: Vec<Message>,
    /// Client explicitly requested the task path.
    pub task_mode: bool,
    /// Persona override; the default persona is used when absent.
    pub persona: Option<String>,
    /// Stored user preferences, injected into system prompts.
    pub preferences: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub message: String,
    pub actions: Vec<Value>,
}

fn emit(progress: Option<&ProgressSender>, event: ProgressEvent) {
    if let Some(tx) = progress {
        let _ = tx.send(event);
    }
}

fn emit_step_output(
    progress: Option<&ProgressSender>,
    phase: StepPhase,
    content: &str,
    tool: Option<&str>,
    max: usize,
) {
    if content.is_empty() {
        return;
    }
    emit(
        progress,
        ProgressEvent::StepOutput {
            phase,
            content: truncate_str(content.trim(), max),
            tool: tool.map(str::to_owned),
        },
    );
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// TurnRuntime
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything a turn needs, wired once at startup.
pub struct TurnRuntime {
    pub config: Arc<Config>,
    pub model: Option<Arc<dyn ModelClient>>,
    pub dispatcher: Arc<Dispatcher>,
    pub planner: Planner,
    pub executor: Executor,
    pub validator: Validator,
    pub tasks: Arc<TaskStore>,
    pub metrics: Arc<Metrics>,
}

impl TurnRuntime {
    /// Streaming entry point: run the turn and terminate the stream
    /// with exactly one `done` event. Returns the outcome so the caller
    /// can persist it even if the stream consumer is gone.
    pub async fn run_streamed(&self, req: TurnRequest, progress: ProgressSender) -> TurnOutcome {
        let outcome = self.run_turn(req, Some(&progress)).await;
        let _ = progress.send(ProgressEvent::Done {
            message: outcome.message.clone(),
            actions: outcome.actions.clone(),
            error: None,
        });
        outcome
    }

    /// Blocking entry point: returns only the final outcome.
    pub async fn run_turn(
        &self,
        req: TurnRequest,
        progress: Option<&ProgressSender>,
    ) -> TurnOutcome {
        let Some(model) = self.model.clone() else {
            tracing::warn!("turn requested with no model configured");
            return TurnOutcome {
                message: APOLOGY.into(),
                actions: Vec::new(),
            };
        };
        let model = model.as_ref();

        // Task overlay: only when the client asked for it and the
        // message reads as scheduling intent.
        if req.task_mode && self.scheduling_intent(model, &req.message).await {
            let outcome = self.run_task_turn(model, &req).await;
            return self.finish(outcome);
        }

        let mode = self.classify_mode(model, &req.message).await;
        tracing::debug!(?mode, "mode routed");

        let outcome = match mode {
            Mode::Chat => TurnOutcome {
                message: self.run_chat_mode(model, &req, progress).await,
                actions: Vec::new(),
            },
            Mode::Reflection => TurnOutcome {
                message: self.run_reflection(model, &req).await,
                actions: Vec::new(),
            },
            _ => self.run_agentic_turn(model, &req, mode, progress).await,
        };
        self.finish(outcome)
    }

    fn finish(&self, mut outcome: TurnOutcome) -> TurnOutcome {
        outcome.message = strip_markdown_emphasis(&outcome.message).trim().to_owned();
        outcome
    }

    // ── Mode routing ─────────────────────────────────────────────────

    async fn scheduling_intent(&self, model: &dyn ModelClient, message: &str) -> bool {
        if message.trim().is_empty() {
            return false;
        }
        if let Some(intent) = deterministic_scheduling_intent(message) {
            return intent;
        }
        let messages = prompts::build_scheduling_intent_messages(message);
        match model.chat(&messages, 0.0, Some(64)).await {
            Ok(raw) => extract_json_object(&raw)
                .and_then(|obj| obj.get("scheduling_intent").and_then(Value::as_bool))
                .unwrap_or(false),
            Err(e) => {
                tracing::warn!(error = %e, "scheduling intent call failed");
                false
            }
        }
    }

    async fn classify_mode(&self, model: &dyn ModelClient, message: &str) -> Mode {
        if let Some(mode) = deterministic_mode(message) {
            return mode;
        }
        let messages = prompts::build_mode_router_messages(message);
        match model.chat(&messages, 0.0, Some(64)).await {
            Ok(raw) => extract_json_object(&raw)
                .and_then(|obj| {
                    obj.get("mode")
                        .and_then(Value::as_str)
                        .and_then(parse_mode)
                })
                .unwrap_or(Mode::Chat),
            Err(e) => {
                tracing::warn!(error = %e, "mode router call failed, defaulting to chat");
                Mode::Chat
            }
        }
    }

    // ── Chat / reflection modes ──────────────────────────────────────

    /// Chat mode: one model call, no plan/reflect, no tools. Tokens
    /// stream to the caller when the client supports it.
    async fn run_chat_mode(
        &self,
        model: &dyn ModelClient,
        req: &TurnRequest,
        progress: Option<&ProgressSender>,
    ) -> String {
        let messages = prompts::build_chat_messages(
            &self.config.agent.name,
            req.persona.as_deref(),
            req.preferences.as_deref(),
            &req.history,
            &req.message,
        );
        let raw = self
            .model_call_streaming(model, &messages, 0.45, progress)
            .await;
        match raw {
            Ok(raw) => {
                let reply = parse_final_response(&raw);
                if reply.is_empty() {
                    raw.trim().to_owned()
                } else {
                    reply
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "chat mode failed");
                APOLOGY.into()
            }
        }
    }

    async fn run_reflection(&self, model: &dyn ModelClient, req: &TurnRequest) -> String {
        let mut last_user = String::new();
        let mut last_assistant = String::new();
        for message in req.history.iter().rev() {
            match message.role {
                hearth_domain::chat::Role::User if last_user.is_empty() => {
                    last_user = message.content.clone();
                }
                hearth_domain::chat::Role::Assistant if last_assistant.is_empty() => {
                    last_assistant = message.content.clone();
                }
                _ => {}
            }
            if !last_user.is_empty() && !last_assistant.is_empty() {
                break;
            }
        }
        if last_assistant.is_empty() {
            return self.run_chat_mode(model, req, None).await;
        }
        let messages = prompts::build_reflection_messages(&last_user, &last_assistant);
        match model.chat(&messages, 0.3, None).await {
            Ok(raw) => raw.trim().to_owned(),
            Err(e) => {
                tracing::warn!(error = %e, "reflection failed");
                "I couldn't evaluate that. Please try again.".into()
            }
        }
    }

    /// One model call, streaming tokens to the caller when possible.
    async fn model_call_streaming(
        &self,
        model: &dyn ModelClient,
        messages: &[Message],
        temperature: f32,
        progress: Option<&ProgressSender>,
    ) -> hearth_domain::Result<String> {
        if progress.is_some() && model.supports_streaming() {
            use futures_util::StreamExt;
            match model.stream(messages, temperature).await {
                Ok(mut chunks) => {
                    let mut buf = String::new();
                    let mut failed = false;
                    while let Some(chunk) = chunks.next().await {
                        match chunk {
                            Ok(text) => {
                                emit(progress, ProgressEvent::Token { text: text.clone() });
                                buf.push_str(&text);
                            }
                            Err(e) => {
                                tracing::warn!(error = %e, "stream broke mid-reply");
                                failed = true;
                                break;
                            }
                        }
                    }
                    if !failed {
                        return Ok(buf);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "stream failed, falling back to sync call");
                }
            }
        }
        model
            .chat(
                messages,
                temperature,
                Some(self.config.model.chat_max_tokens),
            )
            .await
    }

    // ── Agentic turn ─────────────────────────────────────────────────

    async fn run_agentic_turn(
        &self,
        model: &dyn ModelClient,
        req: &TurnRequest,
        mode: Mode,
        progress: Option<&ProgressSender>,
    ) -> TurnOutcome {
        let agent = &self.config.agent;
        let mut allowed: Vec<String> = self.dispatcher.tool_names().into_iter().collect();
        if mode == Mode::Research {
            // Research never touches the codebase tools.
            allowed.retain(|t| !t.starts_with("codebase."));
        }
        allowed.sort();

        let definitions: Vec<_> = self
            .dispatcher
            .definitions()
            .into_iter()
            .filter(|d| allowed.contains(&d.name))
            .collect();
        let system_short =
            prompts::agent_loop_system_prompt(&agent.name, &tools_list_text(&definitions));

        // Step 1: plan + first action (JSON).
        let plan_messages = vec![
            Message::system(format!("{system_short}\n\n{}", prompts::plan_instruction())),
            Message::user(&req.message),
        ];
        let plan_raw = match model.chat(&plan_messages, 0.3, None).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "plan call failed, falling back to legacy path");
                return self.run_legacy_turn(model, req).await;
            }
        };
        let plan = parse_plan_step(&plan_raw, Some(&allowed));

        if plan.next_action == NextAction::AskUser && !plan.question_to_user.is_empty() {
            return TurnOutcome {
                message: plan.question_to_user,
                actions: Vec::new(),
            };
        }

        let goal = plan.goal.clone().unwrap_or_else(|| req.message.clone());

        // Show the client what the model decided.
        let mut plan_lines = Vec::new();
        if let Some(goal) = &plan.goal {
            plan_lines.push(format!("Goal: {goal}"));
        }
        if !plan.plan.is_empty() {
            plan_lines.push(format!("Plan: {}", plan.plan.iter().take(10).cloned().collect::<Vec<_>>().join(" / ")));
        }
        if !plan.tool_calls.is_empty() {
            let parts: Vec<String> = plan
                .tool_calls
                .iter()
                .take(8)
                .map(|tc| {
                    let args = serde_json::to_string(&tc.arguments).unwrap_or_default();
                    format!("{}({})", tc.name, truncate_str(&args, 80))
                })
                .collect();
            plan_lines.push(format!("Tools: {}", parts.join(", ")));
        }
        plan_lines.push(format!(
            "Next action: {}",
            format!("{:?}", plan.next_action).to_lowercase()
        ));
        if !plan.response_outline.is_empty() {
            plan_lines.push(format!(
                "Outline: {}",
                plan.response_outline.iter().take(5).cloned().collect::<Vec<_>>().join(" | ")
            ));
        }
        emit_step_output(
            progress,
            StepPhase::Plan,
            &plan_lines.join("\n"),
            None,
            agent.plan_output_max,
        );
        emit(
            progress,
            ProgressEvent::Status {
                text: "Plan ready. Running tools…".into(),
            },
        );

        let mut ctx = RunContext::new(req.household_id, req.user_id);
        ctx.allowed_tools = Some(allowed.iter().cloned().collect());

        let mut trace = TurnTrace::new();
        self.execute_planned_calls(&plan.tool_calls, &ctx, &mut trace, progress)
            .await;

        // Planner said respond and no tools ran: writer from the goal.
        if trace.is_empty() {
            emit(
                progress,
                ProgressEvent::Status {
                    text: "Writing the answer…".into(),
                },
            );
            let writer_messages = prompts::build_writer_messages(
                &agent.name,
                req.persona.as_deref(),
                req.preferences.as_deref(),
                &goal,
                &[],
                &plan.response_outline,
                &req.message,
                true,
            );
            let message = match self
                .model_call_streaming(model, &writer_messages, 0.45, progress)
                .await
            {
                Ok(raw) => finalize_reply(&raw),
                Err(e) => {
                    tracing::warn!(error = %e, "writer (no tools) failed");
                    self.metrics.record_run(false);
                    return TurnOutcome {
                        message: APOLOGY.into(),
                        actions: Vec::new(),
                    };
                }
            };
            self.metrics.record_run(true);
            return TurnOutcome {
                message,
                actions: Vec::new(),
            };
        }

        // Step 3: reflect/act loop.
        let mut last_outline = plan.response_outline.clone();
        let mut wants_more_tools = false;
        for _ in 0..agent.max_iterations {
            wants_more_tools = false;
            emit(
                progress,
                ProgressEvent::Status {
                    text: "Processing results…".into(),
                },
            );
            let reflect_messages = vec![
                Message::system(format!(
                    "{system_short}\n\n{}",
                    prompts::reflect_instruction(&trace.to_observation_json())
                )),
                Message::user(
                    "Reflect on the observation above and output JSON with next_action and \
                     tool_calls (or null if done).",
                ),
            ];
            let reflect_raw = match model.chat(&reflect_messages, 0.3, None).await {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(error = %e, "reflect call failed, writing with current facts");
                    break;
                }
            };
            let reflect = parse_reflect_step(&reflect_raw, Some(&allowed));

            let mut reflect_lines = Vec::new();
            if let Some(text) = &reflect.reflection {
                reflect_lines.push(text.clone());
            }
            reflect_lines.push(format!(
                "Next action: {}",
                format!("{:?}", reflect.next_action).to_lowercase()
            ));
            if !reflect.tool_calls.is_empty() {
                reflect_lines.push(format!(
                    "More tools: {}",
                    reflect
                        .tool_calls
                        .iter()
                        .map(|tc| tc.name.clone())
                        .collect::<Vec<_>>()
                        .join(", ")
                ));
            }
            emit_step_output(
                progress,
                StepPhase::Reflect,
                &reflect_lines.join("\n"),
                None,
                agent.reflect_output_max,
            );

            if !reflect.response_outline.is_empty() {
                last_outline = reflect.response_outline.clone();
            }
            if reflect.next_action == NextAction::AskUser && !reflect.question_to_user.is_empty() {
                self.metrics.record_run(true);
                return TurnOutcome {
                    message: reflect.question_to_user,
                    actions: Vec::new(),
                };
            }
            if reflect.next_action == NextAction::Respond || reflect.tool_calls.is_empty() {
                break;
            }
            wants_more_tools = true;
            self.execute_planned_calls(&reflect.tool_calls, &ctx, &mut trace, progress)
                .await;
        }

        // The loop burned every iteration and still wanted more tools:
        // budget exhaustion is terminal for the turn.
        if wants_more_tools {
            tracing::warn!(iterations = agent.max_iterations, "iteration cap exhausted");
            self.metrics.record_run(false);
            return TurnOutcome {
                message: TOO_MANY_STEPS.into(),
                actions: Vec::new(),
            };
        }

        // Step 4: writer from goal + accumulated facts.
        emit(
            progress,
            ProgressEvent::Status {
                text: "Writing the answer…".into(),
            },
        );
        let facts = trace.to_facts_list();
        let writer_messages = prompts::build_writer_messages(
            &agent.name,
            req.persona.as_deref(),
            req.preferences.as_deref(),
            &goal,
            &facts,
            &last_outline,
            &req.message,
            false,
        );
        match self
            .model_call_streaming(model, &writer_messages, 0.45, progress)
            .await
        {
            Ok(raw) => {
                self.metrics.record_run(true);
                TurnOutcome {
                    message: finalize_reply(&raw),
                    actions: Vec::new(),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "writer call failed");
                self.metrics.record_run(false);
                TurnOutcome {
                    message: "I had trouble finishing that. Please try again.".into(),
                    actions: Vec::new(),
                }
            }
        }
    }

    async fn execute_planned_calls(
        &self,
        calls: &[PlannedCall],
        ctx: &RunContext,
        trace: &mut TurnTrace,
        progress: Option<&ProgressSender>,
    ) {
        for call in calls {
            emit(
                progress,
                ProgressEvent::ToolStart {
                    tool: call.name.clone(),
                },
            );
            let result = self
                .dispatcher
                .execute(&call.name, &call.arguments, &ctx.caller_id, ctx)
                .await;
            self.metrics.record_tool_call(result.success);

            let out = result.output.clone().unwrap_or_else(|| {
                let mut map = JsonObject::new();
                map.insert("success".into(), Value::Bool(false));
                map.insert(
                    "error".into(),
                    Value::String(result.error.clone().unwrap_or_default()),
                );
                map
            });
            let summary = result_summary(&call.name, &out);
            emit_step_output(
                progress,
                StepPhase::ToolResult,
                &summary,
                Some(&call.name),
                self.config.agent.tool_output_max,
            );
            emit(
                progress,
                ProgressEvent::ToolDone {
                    tool: call.name.clone(),
                },
            );
            trace.append_tool_call(
                &call.name,
                call.arguments.clone(),
                result.success,
                summary,
                result.error,
            );
        }
    }

    // ── Legacy single-pass fallback ──────────────────────────────────

    /// One tool round through native tool calling (or the structured
    /// JSON path), then a final text call. Used only after the plan
    /// step fails; when this also fails, the turn fails.
    async fn run_legacy_turn(&self, model: &dyn ModelClient, req: &TurnRequest) -> TurnOutcome {
        let definitions = self.dispatcher.definitions();
        let mut messages = prompts::build_chat_messages(
            &self.config.agent.name,
            req.persona.as_deref(),
            req.preferences.as_deref(),
            &req.history,
            &req.message,
        );
        let ctx = RunContext::new(req.household_id, req.user_id);

        if model.supports_tool_calls() {
            let (content, tool_calls) = match model
                .chat_with_tools(&messages, &definitions, 0.7, ToolChoice::Auto)
                .await
            {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(error = %e, "legacy path failed");
                    self.metrics.record_run(false);
                    return TurnOutcome {
                        message: APOLOGY.into(),
                        actions: Vec::new(),
                    };
                }
            };
            if tool_calls.is_empty() {
                self.metrics.record_run(true);
                return TurnOutcome {
                    message: content.trim().to_owned(),
                    actions: Vec::new(),
                };
            }
            messages.push(Message::assistant(content));
            for call in &tool_calls {
                let args = call.arguments.as_object().cloned().unwrap_or_default();
                let result = self
                    .dispatcher
                    .execute(&call.tool_name, &args, &ctx.caller_id, &ctx)
                    .await;
                self.metrics.record_tool_call(result.success);
                let body = serde_json::to_string(&result).unwrap_or_default();
                messages.push(Message::tool_result(&call.call_id, body));
            }
            match model
                .chat_with_tools(&messages, &definitions, 0.7, ToolChoice::None)
                .await
            {
                Ok((content, _)) => {
                    self.metrics.record_run(true);
                    TurnOutcome {
                        message: content.trim().to_owned(),
                        actions: Vec::new(),
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "legacy final call failed");
                    self.metrics.record_run(false);
                    TurnOutcome {
                        message: APOLOGY.into(),
                        actions: Vec::new(),
                    }
                }
            }
        } else {
            // Structured JSON fallback for clients without native tools.
            let tools_text = tools_list_text(&definitions);
            let task_messages = prompts::build_task_messages(
                &self.config.agent.name,
                &tools_text,
                &req.history,
                &req.message,
            );
            let raw = match model.chat(&task_messages, 0.3, None).await {
                Ok(raw) => raw,
                Err(e) => {
                    tracing::warn!(error = %e, "structured fallback failed");
                    self.metrics.record_run(false);
                    return TurnOutcome {
                        message: APOLOGY.into(),
                        actions: Vec::new(),
                    };
                }
            };
            let allowed = self.dispatcher.tool_names();
            let decision = parse_model_output(
                &raw,
                None,
                Some(&allowed),
                &self.config.agent.intention_phrases,
            );
            let message = match decision {
                Decision::ToolCall { tool, args } => {
                    let result = self.dispatcher.execute(&tool, &args, &ctx.caller_id, &ctx).await;
                    self.metrics.record_tool_call(result.success);
                    if result.success {
                        task_result_message(&tool, &result.output.unwrap_or_default())
                    } else {
                        result.error.unwrap_or_else(|| APOLOGY.into())
                    }
                }
                Decision::NeedInfo { questions } if !questions.is_empty() => questions.join(" "),
                Decision::Final { message } if !message.is_empty() => message,
                _ => raw.trim().to_owned(),
            };
            self.metrics.record_run(true);
            TurnOutcome {
                message,
                actions: Vec::new(),
            }
        }
    }

    // ── Task-mode overlay ────────────────────────────────────────────

    async fn run_task_turn(&self, model: &dyn ModelClient, req: &TurnRequest) -> TurnOutcome {
        let chat_id = req
            .user_id
            .map_or_else(|| "0".to_owned(), |id| id.to_string());
        let fail = |message: &str| TurnOutcome {
            message: message.to_owned(),
            actions: Vec::new(),
        };

        let mut task = match self.tasks.get_or_create(&chat_id) {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!(error = %e, "task store unavailable");
                self.metrics.record_run(false);
                return fail(APOLOGY);
            }
        };

        if !self.tasks.can_make_turn(&task) {
            let _ = self
                .tasks
                .transition(&mut task, TaskState::Failed, TransitionOpts::default());
            self.tasks.clear_active(&chat_id);
            self.metrics.record_run(false);
            return fail(TOO_MANY_STEPS);
        }

        // One planner-shaped model call under the JSON-only contract.
        let definitions = self.dispatcher.definitions();
        let tools_text = tools_list_text(&definitions);
        let previous: Vec<Message> = req.history.iter().rev().take(4).rev().cloned().collect();
        let messages = prompts::build_task_messages(
            &self.config.agent.name,
            &tools_text,
            &previous,
            &req.message,
        );
        let raw = match model.chat(&messages, 0.3, None).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "task model call failed");
                self.metrics.record_run(false);
                return fail(APOLOGY);
            }
        };
        let allowed = self.dispatcher.tool_names();
        let decision = parse_model_output(
            &raw,
            task.last_assistant_output.as_deref(),
            Some(&allowed),
            &self.config.agent.intention_phrases,
        );
        let current_state = task.state;
        let _ = self.tasks.transition(
            &mut task,
            current_state,
            TransitionOpts {
                increment_turn: true,
                last_assistant_output: Some(raw),
                ..Default::default()
            },
        );

        if decision == Decision::Invalid {
            let _ = self
                .tasks
                .transition(&mut task, TaskState::Failed, TransitionOpts::default());
            self.tasks.clear_active(&chat_id);
            self.metrics.record_run(false);
            return fail(JSON_ONLY_RETRY);
        }

        // One plan -> act -> validate cycle via the pending decision.
        let mut state = RunState::new(&req.message, Mode::Task);
        state.history = req.history.clone();
        state.task = Some(task.clone());
        state.pending_decision = Some(decision);

        let mut ctx = RunContext::new(req.household_id, req.user_id);
        ctx.allowed_tools = Some(allowed);

        let action = self
            .planner
            .next(&mut state, Some(model), &self.config.agent)
            .await;
        let is_tool_call = action.tool().is_some();
        if is_tool_call && !self.tasks.can_execute_tool(&task) {
            self.tasks.clear_active(&chat_id);
            let _ = self
                .tasks
                .transition(&mut task, TaskState::Failed, TransitionOpts::default());
            self.metrics.record_run(false);
            return fail(TOO_MANY_TOOL_ATTEMPTS);
        }

        let observation = self.executor.run(action.clone(), &ctx).await;
        if is_tool_call {
            self.metrics.record_tool_call(observation.success);
        }

        let validation = self.validator.check(&state, &observation);
        if !validation.passed {
            tracing::warn!(reason = ?validation.error, "validator rejected task output");
            self.metrics.record_run(false);
            return fail(&validation.error.unwrap_or_else(|| "Blocked by policy.".into()));
        }

        // Commit.
        match &action {
            Action::ToolCall { tool, .. } => {
                let _ = self.tasks.transition(
                    &mut task,
                    TaskState::Done,
                    TransitionOpts {
                        increment_tool_attempt: true,
                        ..Default::default()
                    },
                );
                self.tasks.clear_active(&chat_id);
                self.metrics.record_run(true);
                let message = if observation.success {
                    task_result_message(tool, &observation.output.unwrap_or_default())
                } else {
                    observation
                        .error
                        .unwrap_or_else(|| "Something went wrong.".into())
                };
                TurnOutcome {
                    message,
                    actions: Vec::new(),
                }
            }
            Action::NeedInfo { .. } => {
                let _ = self.tasks.transition(
                    &mut task,
                    TaskState::NeedsInfo,
                    TransitionOpts::default(),
                );
                self.metrics.record_run(true);
                TurnOutcome {
                    message: observation
                        .message
                        .unwrap_or_else(|| "Please provide the requested information.".into()),
                    actions: Vec::new(),
                }
            }
            Action::Final { message } => {
                let _ = self
                    .tasks
                    .transition(&mut task, TaskState::Done, TransitionOpts::default());
                self.tasks.clear_active(&chat_id);
                self.metrics.record_run(true);
                let trimmed = message.trim();
                TurnOutcome {
                    message: if trimmed.is_empty() {
                        "Done.".into()
                    } else {
                        trimmed.to_owned()
                    },
                    actions: Vec::new(),
                }
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn finalize_reply(raw: &str) -> String {
    let reply = parse_final_response(raw);
    if reply.is_empty() {
        raw.trim().to_owned()
    } else {
        reply
    }
}

fn parse_mode(s: &str) -> Option<Mode> {
    match s.trim().to_lowercase().as_str() {
        "scheduling" => Some(Mode::Scheduling),
        "task" => Some(Mode::Task),
        "research" => Some(Mode::Research),
        "coding" => Some(Mode::Coding),
        "reflection" => Some(Mode::Reflection),
        "chat" => Some(Mode::Chat),
        _ => None,
    }
}

/// Deterministic first-pass router. Returns None when the message is
/// ambiguous and the model should decide.
fn deterministic_mode(message: &str) -> Option<Mode> {
    let lower = message.trim().to_lowercase();
    if lower.is_empty() {
        return Some(Mode::Chat);
    }
    const GREETINGS: [&str; 8] = [
        "hello", "hi", "hey", "good morning", "good evening", "thanks", "thank you", "hoi",
    ];
    let word_count = lower.split_whitespace().count();
    if word_count <= 4 && GREETINGS.iter().any(|g| lower.starts_with(g)) {
        return Some(Mode::Chat);
    }
    const SCHEDULING: [&str; 6] = [
        "remind", "reminder", "every morning", "every day at", "timer", "herinner",
    ];
    if SCHEDULING.iter().any(|k| lower.contains(k)) {
        return Some(Mode::Scheduling);
    }
    const RESEARCH: [&str; 7] = [
        "search", "look up", "find me", "compare prices", "zoek", "best price", "shop for",
    ];
    if RESEARCH.iter().any(|k| lower.contains(k)) {
        return Some(Mode::Research);
    }
    const CODING: [&str; 5] = ["codebase", "source file", "this repo", "function in", "grep"];
    if CODING.iter().any(|k| lower.contains(k)) {
        return Some(Mode::Coding);
    }
    None
}

fn deterministic_scheduling_intent(message: &str) -> Option<bool> {
    let lower = message.trim().to_lowercase();
    const STRONG: [&str; 5] = ["remind me", "set a reminder", "set a timer", "every day at", "herinner me"];
    if STRONG.iter().any(|k| lower.contains(k)) {
        return Some(true);
    }
    None
}

/// Turn a task-mode tool result into a short user-facing confirmation.
fn task_result_message(tool: &str, output: &JsonObject) -> String {
    match tool {
        "cron.add" => {
            if let Some(job_id) = output.get("jobId").and_then(Value::as_str) {
                let short: String = job_id.chars().take(8).collect();
                return format!("Reminder scheduled. (job {short}…)");
            }
        }
        "cron.list" => {
            if let Some(jobs) = output.get("jobs").and_then(Value::as_array) {
                let n = jobs.len();
                return if n == 1 {
                    "You have 1 scheduled job.".into()
                } else {
                    format!("You have {n} scheduled jobs.")
                };
            }
        }
        "cron.remove" => {
            if output.get("success") == Some(&Value::Bool(true)) {
                return "Job removed.".into();
            }
        }
        "cron.run" => {
            if output.get("success") == Some(&Value::Bool(true)) {
                return "Job executed.".into();
            }
        }
        "cron.runs" => {
            if let Some(runs) = output.get("runs").and_then(Value::as_array) {
                return format!("Last {} run(s).", runs.len());
            }
        }
        _ => {}
    }
    output
        .get("result")
        .map(|v| v.to_string())
        .unwrap_or_else(|| serde_json::to_string(output).unwrap_or_else(|_| "Done.".into()))
}
