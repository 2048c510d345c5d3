//! Executor — runs one `Action` and produces an `Observation`.
//!
//! Tool calls go through the dispatcher with wall-clock latency
//! recorded; need_info and final synthesize their observations
//! directly. Timeouts belong to the tool implementations.

use std::sync::Arc;
use std::time::Instant;

use hearth_domain::agent::{Action, Observation, RunContext};

use super::dispatcher::Dispatcher;

pub struct Executor {
    dispatcher: Arc<Dispatcher>,
}

impl Executor {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub async fn run(&self, action: Action, ctx: &RunContext) -> Observation {
        match &action {
            Action::ToolCall { tool, args } => {
                let start = Instant::now();
                let result = self
                    .dispatcher
                    .execute(tool, args, &ctx.caller_id, ctx)
                    .await;
                let latency_ms = start.elapsed().as_millis() as u64;
                Observation::from_tool_result(action, result, latency_ms)
            }
            Action::NeedInfo { .. } => Observation::need_info(action),
            Action::Final { .. } => Observation::final_message(action),
        }
    }
}
