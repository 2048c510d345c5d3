//! Prompt builders for every model call the runtime makes: persona,
//! chat mode, mode routing, the plan/reflect/writer steps, and the
//! JSON-only task contract.

use hearth_domain::chat::Message;

/// Base persona text used when the caller supplies none.
pub fn persona_prompt(name: &str) -> String {
    format!(
        "You are {name}, a personal assistant running on a home device. \
         You help with reminders, the family agenda, research, and small coding questions. \
         Be warm, direct, and brief. Answer in the user's language."
    )
}

/// Assemble the system text from the persona (caller-supplied or
/// default) plus any stored user preferences.
pub fn system_text(name: &str, persona: Option<&str>, preferences: Option<&str>) -> String {
    let mut text = persona
        .map(str::to_owned)
        .unwrap_or_else(|| persona_prompt(name));
    if let Some(preferences) = preferences {
        if !preferences.trim().is_empty() {
            text.push_str("\n\nUser preferences:\n");
            text.push_str(preferences.trim());
        }
    }
    text
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chat mode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn build_chat_messages(
    name: &str,
    persona: Option<&str>,
    preferences: Option<&str>,
    history: &[Message],
    user_message: &str,
) -> Vec<Message> {
    let mut messages = vec![Message::system(system_text(name, persona, preferences))];
    messages.extend(history.iter().cloned());
    messages.push(Message::user(user_message));
    messages
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Mode routing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn build_mode_router_messages(user_message: &str) -> Vec<Message> {
    let system = "You are a mode classifier. Choose exactly one mode for the user's message.\n\
        - scheduling: reminders, timers, recurring jobs, \"remind me\", \"every morning\"\n\
        - task: a concrete action to perform on the user's behalf\n\
        - research: look something up online, compare products, find current facts\n\
        - coding: questions about a codebase, files, or source code\n\
        - reflection: evaluate or critique the previous answer\n\
        - chat: everything else (small talk, opinions, general knowledge)\n\
        Respond with exactly one JSON object: \
        {\"mode\": \"scheduling\"|\"task\"|\"research\"|\"coding\"|\"reflection\"|\"chat\", \
        \"confidence\": 0.0-1.0}. No other text.";
    vec![Message::system(system), Message::user(user_message)]
}

pub fn build_scheduling_intent_messages(user_message: &str) -> Vec<Message> {
    let system = "Decide whether the user's message asks to schedule, change, or inspect a \
        reminder or recurring job. Respond with exactly one JSON object: \
        {\"scheduling_intent\": true|false}. No other text.";
    vec![Message::system(system), Message::user(user_message)]
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Agentic loop
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn agent_loop_system_prompt(name: &str, tools_list_text: &str) -> String {
    format!(
        "You are {name} in agent mode. You must respond with exactly one JSON object. \
         No other text.\n\nAvailable tools:\n{tools_list_text}"
    )
}

pub fn plan_instruction() -> &'static str {
    "Plan the turn. Output JSON with fields:\n\
     - goal: one sentence, what the user wants\n\
     - plan: list of short step strings\n\
     - next_action: \"tool\" | \"respond\" | \"ask_user\" | \"revise_plan\"\n\
     - tool_calls: list of {name, arguments} when next_action is \"tool\", else null\n\
     - response_outline: optional list of answer sections\n\
     - question_to_user: the question, when next_action is \"ask_user\""
}

pub fn reflect_instruction(observation_json: &str) -> String {
    format!(
        "Observation log of tool calls so far (JSON):\n{observation_json}\n\n\
         Reflect and decide. Output JSON with fields:\n\
         - reflection: one or two sentences on what the results mean\n\
         - next_action: \"tool\" | \"respond\" | \"ask_user\"\n\
         - tool_calls: list of {{name, arguments}} for further calls, else null\n\
         - response_outline: optional updated list of answer sections\n\
         - question_to_user: the question, when next_action is \"ask_user\""
    )
}

/// Writer prompt: persona + goal + facts only, never the full
/// conversation, so planning and tool noise cannot leak into the reply.
#[allow(clippy::too_many_arguments)]
pub fn build_writer_messages(
    name: &str,
    persona: Option<&str>,
    preferences: Option<&str>,
    goal: &str,
    facts: &[String],
    response_outline: &[String],
    user_message: &str,
    no_tools_used: bool,
) -> Vec<Message> {
    let mut system = system_text(name, persona, preferences);
    system.push_str(
        "\n\nWrite the final reply to the user. Use only the goal and the facts below. \
         Do not mention tools, plans, or internal steps. Plain text, no markdown emphasis.",
    );

    let mut content = format!("Goal: {goal}\n");
    if no_tools_used || facts.is_empty() {
        content.push_str("No tools were used; answer directly.\n");
    } else {
        content.push_str("Facts:\n");
        for fact in facts {
            content.push_str(&format!("- {fact}\n"));
        }
    }
    if !response_outline.is_empty() {
        content.push_str(&format!("Outline: {}\n", response_outline.join(" | ")));
    }
    content.push_str(&format!("User message: {user_message}"));

    vec![Message::system(system), Message::user(content)]
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task mode (JSON-only contract)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn build_task_messages(
    name: &str,
    tools_list_text: &str,
    previous: &[Message],
    user_message: &str,
) -> Vec<Message> {
    let system = format!(
        "You are {name} handling a scheduling task. Respond with exactly one JSON object and \
         no other text:\n\
         - {{\"type\":\"tool_call\",\"tool\":\"<name>\",\"args\":{{...}}}} to act\n\
         - {{\"type\":\"need_info\",\"questions\":[\"...\"]}} when details are missing\n\
         - {{\"type\":\"final\",\"message\":\"...\"}} to answer without a tool\n\n\
         Available tools:\n{tools_list_text}"
    );
    let mut messages = vec![Message::system(system)];
    messages.extend(previous.iter().cloned());
    messages.push(Message::user(user_message));
    messages
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reflection mode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn build_reflection_messages(last_user: &str, last_assistant: &str) -> Vec<Message> {
    let system = "You evaluate an assistant's answer for gaps, risks, and what might be missing. \
        Reply in 1-2 short paragraphs: what is solid, what could be wrong or incomplete, and \
        what the user might still need. Use the same language as the user. Be concise.";
    let content = format!(
        "User asked:\n{last_user}\n\nAssistant replied:\n{last_assistant}\n\n\
         Evaluate this answer. What is missing or risky?"
    );
    vec![Message::system(system), Message::user(content)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_domain::chat::Role;

    #[test]
    fn chat_messages_sandwich_history() {
        let history = vec![Message::user("earlier"), Message::assistant("reply")];
        let messages = build_chat_messages("hearth", None, None, &history, "now");
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[3].content, "now");
    }

    #[test]
    fn system_text_prefers_supplied_persona_and_appends_preferences() {
        let text = system_text("hearth", Some("You are Spark."), Some("metric units"));
        assert!(text.starts_with("You are Spark."));
        assert!(text.contains("User preferences:\nmetric units"));

        let default_text = system_text("hearth", None, None);
        assert!(default_text.contains("You are hearth"));
        assert!(!default_text.contains("User preferences"));
    }

    #[test]
    fn writer_includes_facts_and_outline() {
        let messages = build_writer_messages(
            "hearth",
            None,
            None,
            "find tiles",
            &["web.search: 1) Tile World | https://t.example".into()],
            &["options".into(), "prices".into()],
            "find me garden tiles",
            false,
        );
        let user = &messages[1].content;
        assert!(user.contains("Goal: find tiles"));
        assert!(user.contains("- web.search:"));
        assert!(user.contains("Outline: options | prices"));
    }

    #[test]
    fn writer_without_tools_says_so() {
        let messages =
            build_writer_messages("hearth", None, None, "say hi", &[], &[], "hello", true);
        assert!(messages[1].content.contains("No tools were used"));
    }

    #[test]
    fn task_messages_pin_json_contract() {
        let messages = build_task_messages("hearth", "- cron.add: add a job", &[], "remind me");
        assert!(messages[0].content.contains("exactly one JSON object"));
        assert!(messages[0].content.contains("cron.add"));
    }

    #[test]
    fn reflect_instruction_embeds_observation() {
        let text = reflect_instruction("[{\"tool\":\"web.search\"}]");
        assert!(text.contains("web.search"));
        assert!(text.contains("next_action"));
    }
}
