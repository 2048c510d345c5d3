//! Tool formatting for agent prompts and the turn trace.
//!
//! Builds the tools list for the plan prompt and compresses tool
//! results into short, shape-aware summaries for the observation log.

use serde_json::Value;

use hearth_domain::agent::JsonObject;
use hearth_domain::chat::ToolDefinition;

/// Max chars for search result summaries in the trace.
const SEARCH_SUMMARY_MAX: usize = 2800;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools list for the plan prompt
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn tool_category(name: &str) -> &'static str {
    if name.starts_with("codebase.") {
        "Codebase"
    } else if name.starts_with("cron.") {
        "Reminders/Scheduling"
    } else if name.starts_with("agenda.") {
        "Agenda"
    } else if name.starts_with("web.") {
        "Web/Research"
    } else if name.starts_with("github.") {
        "Code search"
    } else {
        "Other"
    }
}

/// Compact `name, required, optional?` parameter list from a JSON schema.
fn format_tool_params(parameters: &Value) -> String {
    let Some(props) = parameters.get("properties").and_then(Value::as_object) else {
        return String::new();
    };
    let required: Vec<&str> = parameters
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    props
        .keys()
        .map(|key| {
            if required.contains(&key.as_str()) {
                key.clone()
            } else {
                format!("{key}?")
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build `- name(params): description` lines grouped by category.
pub fn tools_list_text(definitions: &[ToolDefinition]) -> String {
    const ORDER: [&str; 6] = [
        "Codebase",
        "Web/Research",
        "Reminders/Scheduling",
        "Agenda",
        "Code search",
        "Other",
    ];
    let mut sections: Vec<(usize, Vec<String>)> = ORDER.iter().map(|_| (0, Vec::new())).collect();
    for def in definitions {
        let cat = tool_category(&def.name);
        let idx = ORDER.iter().position(|c| *c == cat).unwrap_or(ORDER.len() - 1);
        let desc: String = def.description.chars().take(120).collect();
        let params = format_tool_params(&def.parameters);
        let line = if params.is_empty() {
            format!("- {}: {desc}", def.name)
        } else {
            format!("- {}({params}): {desc}", def.name)
        };
        sections[idx].0 += 1;
        sections[idx].1.push(line);
    }
    let rendered: Vec<String> = ORDER
        .iter()
        .zip(sections)
        .filter(|(_, (count, _))| *count > 0)
        .map(|(cat, (_, lines))| format!("{cat}:\n{}", lines.join("\n")))
        .collect();
    if rendered.is_empty() {
        "No tools.".to_owned()
    } else {
        rendered.join("\n\n")
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Result summaries for the trace
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn str_field<'a>(obj: &'a JsonObject, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| obj.get(*k).and_then(Value::as_str))
}

fn format_search_results(result: &JsonObject, max_items: usize) -> String {
    let query = str_field(result, &["query"]).unwrap_or_default();
    let mut lines = Vec::new();
    if !query.is_empty() {
        lines.push(format!("Query: {query}"));
    }
    let items = result
        .get("results")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    for (i, item) in items.iter().take(max_items).enumerate() {
        let Some(item) = item.as_object() else { continue };
        let title: String = str_field(item, &["title", "name"])
            .unwrap_or_default()
            .trim()
            .chars()
            .take(120)
            .collect();
        let url = str_field(item, &["url", "href", "link"]).unwrap_or_default().trim();
        let snippet: String = str_field(item, &["snippet", "body", "description"])
            .unwrap_or_default()
            .trim()
            .chars()
            .take(150)
            .collect();
        if !title.is_empty() || !url.is_empty() {
            if url.is_empty() {
                lines.push(format!("{}) {title}", i + 1));
            } else {
                lines.push(format!("{}) {title} | {url}", i + 1));
            }
        }
        if !snippet.is_empty() && lines.join("\n").len() < SEARCH_SUMMARY_MAX - 180 {
            lines.push(format!("   {snippet}"));
        }
        if lines.join("\n").len() >= SEARCH_SUMMARY_MAX {
            break;
        }
    }
    if lines.is_empty() {
        format!("{} results", items.len())
    } else {
        let mut out = lines.join("\n");
        out.truncate(SEARCH_SUMMARY_MAX);
        out
    }
}

/// Shape-aware summary of a tool result for the turn trace. Search
/// results keep enough detail (titles, URLs) for the writer; bulk data
/// compresses to counts.
pub fn result_summary(tool_name: &str, result: &JsonObject) -> String {
    if result.get("success") == Some(&Value::Bool(false)) {
        let error = str_field(result, &["error"]).unwrap_or("unknown");
        let mut out = format!("error: {error}");
        out.truncate(150);
        return out;
    }

    match tool_name {
        "web.search" => return format_search_results(result, 10),
        "web.shopping_search" => return format_search_results(result, 5),
        "github.search" => return format_search_results(result, 5),
        _ => {}
    }

    // Common shapes.
    if let Some(content) = str_field(result, &["content"]) {
        return if content.len() > 100 {
            format!("{} chars", content.len())
        } else {
            content.replace('\n', " ")
        };
    }
    if result.contains_key("path") {
        if let Some(entries) = result.get("entries").and_then(Value::as_array) {
            return format!("{} entries", entries.len());
        }
    }
    if let Some(matches) = result.get("matches").and_then(Value::as_array) {
        return format!("{} matches", matches.len());
    }
    if let Some(results) = result.get("results").and_then(Value::as_array) {
        return format!("{} results", results.len());
    }
    if let Some(jobs) = result.get("jobs").and_then(Value::as_array) {
        return format!("{} jobs", jobs.len());
    }
    if let Some(events) = result.get("events").and_then(Value::as_array) {
        return format!("{} events", events.len());
    }
    if let Some(job_id) = str_field(result, &["jobId"]) {
        let short: String = job_id.chars().take(8).collect();
        return format!("job {short} scheduled");
    }
    if let Some(message) = str_field(result, &["message"]) {
        return message.chars().take(80).collect();
    }
    "ok".to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> JsonObject {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn tools_list_groups_by_category() {
        let defs = vec![
            ToolDefinition {
                name: "cron.add".into(),
                description: "Add a scheduled job".into(),
                parameters: json!({"type": "object", "properties": {"schedule": {}, "label": {}}, "required": ["schedule"]}),
            },
            ToolDefinition {
                name: "web.search".into(),
                description: "Search the web".into(),
                parameters: json!({"type": "object", "properties": {"query": {}}, "required": ["query"]}),
            },
        ];
        let text = tools_list_text(&defs);
        assert!(text.contains("Reminders/Scheduling:"));
        assert!(text.contains("Web/Research:"));
        assert!(text.contains("- cron.add(schedule, label?)"));
        assert!(text.contains("- web.search(query)"));
        // Research section comes before scheduling in the fixed order.
        assert!(text.find("Web/Research").unwrap() < text.find("Reminders/Scheduling").unwrap());
    }

    #[test]
    fn tools_list_empty_is_explicit() {
        assert_eq!(tools_list_text(&[]), "No tools.");
    }

    #[test]
    fn search_summary_includes_titles_and_urls() {
        let result = obj(json!({
            "success": true,
            "query": "garden tiles",
            "results": [
                {"title": "Tile World", "url": "https://tiles.example/1", "snippet": "Great tiles"},
                {"title": "Cheap Tiles", "url": "https://tiles.example/2", "snippet": "Bargains"},
            ],
        }));
        let summary = result_summary("web.search", &result);
        assert!(summary.starts_with("Query: garden tiles"));
        assert!(summary.contains("1) Tile World | https://tiles.example/1"));
        assert!(summary.contains("2) Cheap Tiles | https://tiles.example/2"));
    }

    #[test]
    fn file_read_summary_is_char_count() {
        let result = obj(json!({"success": true, "path": "src/lib.rs", "content": "x".repeat(5000)}));
        assert_eq!(result_summary("codebase.read_file", &result), "5000 chars");
    }

    #[test]
    fn short_content_is_inlined() {
        let result = obj(json!({"success": true, "content": "fn main() {}"}));
        assert_eq!(result_summary("codebase.read_file", &result), "fn main() {}");
    }

    #[test]
    fn directory_summary_is_entry_count() {
        let result = obj(json!({"success": true, "path": ".", "entries": [{}, {}, {}]}));
        assert_eq!(result_summary("codebase.list_directory", &result), "3 entries");
    }

    #[test]
    fn error_results_summarize_the_error() {
        let result = obj(json!({"success": false, "error": "unknown tool"}));
        assert_eq!(result_summary("anything", &result), "error: unknown tool");
    }

    #[test]
    fn job_add_summary_truncates_id() {
        let result = obj(json!({"jobId": "0123456789abcdef", "job": {}}));
        assert_eq!(result_summary("cron.add", &result), "job 01234567 scheduled");
    }
}
