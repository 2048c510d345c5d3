//! Tool dispatcher — the single call surface over the closed tool set.
//!
//! `execute` always returns a [`ToolResult`]: unknown tools, allow-list
//! rejections, validation failures, and handler errors all collapse to
//! the same envelope. It never raises.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};

use hearth_domain::agent::{JsonObject, RunContext, ToolResult};
use hearth_domain::chat::ToolDefinition;
use hearth_domain::job::{JobPatch, JobSpec};

use super::agenda::{parse_event_time, AgendaStore};
use super::jobs::JobEngine;

pub struct Dispatcher {
    jobs: Arc<JobEngine>,
    agenda: Arc<AgendaStore>,
    http: reqwest::Client,
    workspace_root: Option<PathBuf>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Argument helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn req_str<'a>(args: &'a JsonObject, key: &str) -> Result<&'a str, String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("{key} required"))
}

fn opt_str<'a>(args: &'a JsonObject, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn opt_usize(args: &JsonObject, key: &str) -> Option<usize> {
    args.get(key).and_then(Value::as_u64).map(|v| v as usize)
}

type HandlerResult = Result<JsonObject, String>;

impl Dispatcher {
    pub fn new(
        jobs: Arc<JobEngine>,
        agenda: Arc<AgendaStore>,
        http: reqwest::Client,
        workspace_root: Option<PathBuf>,
    ) -> Self {
        Self {
            jobs,
            agenda,
            http,
            workspace_root,
        }
    }

    /// Names of every registered tool.
    pub fn tool_names(&self) -> HashSet<String> {
        [
            "cron.add",
            "cron.update",
            "cron.remove",
            "cron.list",
            "cron.run",
            "cron.runs",
            "agenda.list",
            "agenda.add",
            "agenda.update",
            "agenda.delete",
            "codebase.read_file",
            "codebase.list_directory",
            "codebase.search",
            "web.search",
            "web.shopping_search",
            "web.fetch_url",
            "github.search",
        ]
        .into_iter()
        .map(str::to_owned)
        .collect()
    }

    /// Execute one tool call scoped to a caller identity.
    pub async fn execute(
        &self,
        tool_name: &str,
        args: &JsonObject,
        caller_id: &str,
        ctx: &RunContext,
    ) -> ToolResult {
        if !ctx.tool_allowed(tool_name) {
            return ToolResult::err(format!("Tool not allowed: {tool_name}"));
        }
        let result = match tool_name {
            "cron.add" => self.cron_add(caller_id, args),
            "cron.update" => self.cron_update(caller_id, args),
            "cron.remove" => self.cron_remove(caller_id, args),
            "cron.list" => self.jobs.list(caller_id).map_err(|e| e.to_string()),
            "cron.run" => self.cron_run(caller_id, args).await,
            "cron.runs" => self.cron_runs(caller_id, args),
            "agenda.list" => self.agenda_list(caller_id, args),
            "agenda.add" => self.agenda_add(caller_id, args),
            "agenda.update" => self.agenda_update(caller_id, args),
            "agenda.delete" => self.agenda_delete(caller_id, args),
            "codebase.read_file" => self.codebase_read(args).await,
            "codebase.list_directory" => self.codebase_list(args).await,
            "codebase.search" => self.codebase_search(args).await,
            "web.search" => {
                match req_str(args, "query") {
                    Ok(q) => hearth_tools::web::search(&self.http, q, opt_usize(args, "max_results")).await,
                    Err(e) => Err(e),
                }
            }
            "web.shopping_search" => {
                match req_str(args, "query") {
                    Ok(q) => {
                        hearth_tools::web::shopping_search(&self.http, q, opt_usize(args, "max_results"))
                            .await
                    }
                    Err(e) => Err(e),
                }
            }
            "web.fetch_url" => {
                match req_str(args, "url") {
                    Ok(url) => {
                        let max_chars = opt_usize(args, "max_chars").unwrap_or(4000);
                        hearth_tools::web::fetch_url(&self.http, url, max_chars).await
                    }
                    Err(e) => Err(e),
                }
            }
            "github.search" => {
                match req_str(args, "query") {
                    Ok(q) => hearth_tools::web::github_search(&self.http, q).await,
                    Err(e) => Err(e),
                }
            }
            _ => {
                tracing::warn!(tool = tool_name, "unknown tool");
                Err(format!("Unknown tool: {tool_name}"))
            }
        };
        match result {
            Ok(output) => {
                tracing::info!(tool = tool_name, caller = caller_id, "tool executed");
                ToolResult::ok(output)
            }
            Err(error) => {
                tracing::info!(tool = tool_name, caller = caller_id, error = %error, "tool failed");
                ToolResult::err(error)
            }
        }
    }

    // ── Scheduling handlers ──────────────────────────────────────────

    fn cron_add(&self, caller_id: &str, args: &JsonObject) -> HandlerResult {
        let spec: JobSpec = serde_json::from_value(Value::Object(args.clone()))
            .map_err(|e| format!("invalid job spec: {e}"))?;
        self.jobs.add(caller_id, spec).map_err(|e| e.to_string())
    }

    fn cron_update(&self, caller_id: &str, args: &JsonObject) -> HandlerResult {
        let job_id = req_str(args, "jobId")?.to_owned();
        let mut patch_args = args.clone();
        patch_args.remove("jobId");
        let patch: JobPatch = serde_json::from_value(Value::Object(patch_args))
            .map_err(|e| format!("invalid job patch: {e}"))?;
        self.jobs
            .update(caller_id, &job_id, patch)
            .map_err(|e| e.to_string())
    }

    fn cron_remove(&self, caller_id: &str, args: &JsonObject) -> HandlerResult {
        let job_id = req_str(args, "jobId")?;
        self.jobs.remove(caller_id, job_id).map_err(|e| e.to_string())
    }

    async fn cron_run(&self, caller_id: &str, args: &JsonObject) -> HandlerResult {
        let job_id = req_str(args, "jobId")?;
        self.jobs
            .run_now(caller_id, job_id)
            .await
            .map_err(|e| e.to_string())
    }

    fn cron_runs(&self, caller_id: &str, args: &JsonObject) -> HandlerResult {
        let job_id = req_str(args, "jobId")?;
        let limit = opt_usize(args, "limit").unwrap_or(100);
        self.jobs
            .runs(caller_id, job_id, limit)
            .map_err(|e| e.to_string())
    }

    // ── Agenda handlers ──────────────────────────────────────────────

    fn agenda_list(&self, caller_id: &str, args: &JsonObject) -> HandlerResult {
        let tz = opt_str(args, "timezone").unwrap_or("UTC");
        let start = parse_event_time(req_str(args, "start")?, tz)?;
        let end = parse_event_time(req_str(args, "end")?, tz)?;
        if start >= end {
            return Err("start must be before end".into());
        }
        let events = self.agenda.list_range(caller_id, start, end);
        let mut out = JsonObject::new();
        out.insert("count".into(), json!(events.len()));
        out.insert("events".into(), serde_json::to_value(events).unwrap_or_default());
        Ok(out)
    }

    fn agenda_add(&self, caller_id: &str, args: &JsonObject) -> HandlerResult {
        let tz = opt_str(args, "timezone").unwrap_or("UTC");
        let title = req_str(args, "title")?;
        let start_at = parse_event_time(req_str(args, "start_at")?, tz)?;
        let end_at = match opt_str(args, "end_at") {
            Some(raw) => Some(parse_event_time(raw, tz)?),
            None => None,
        };
        let all_day = args.get("all_day").and_then(Value::as_bool).unwrap_or(false);
        let notes = opt_str(args, "notes").map(str::to_owned);
        let event = self
            .agenda
            .add(caller_id, title, start_at, end_at, all_day, notes)
            .map_err(|e| e.to_string())?;
        let mut out = JsonObject::new();
        out.insert("event".into(), serde_json::to_value(event).unwrap_or_default());
        Ok(out)
    }

    fn agenda_update(&self, caller_id: &str, args: &JsonObject) -> HandlerResult {
        let tz = opt_str(args, "timezone").unwrap_or("UTC");
        let id = req_str(args, "id")?;
        let title = opt_str(args, "title").map(str::to_owned);
        let notes = opt_str(args, "notes").map(str::to_owned);
        let start_at = match opt_str(args, "start_at") {
            Some(raw) => Some(parse_event_time(raw, tz)?),
            None => None,
        };
        let end_at = match opt_str(args, "end_at") {
            Some(raw) => Some(parse_event_time(raw, tz)?),
            None => None,
        };
        let updated = self
            .agenda
            .update(caller_id, id, |event| {
                if let Some(title) = title {
                    event.title = title;
                }
                if let Some(start_at) = start_at {
                    event.start_at = start_at;
                }
                if let Some(end_at) = end_at {
                    event.end_at = Some(end_at);
                }
                if let Some(notes) = notes {
                    event.notes = Some(notes);
                }
            })
            .map_err(|e| e.to_string())?;
        match updated {
            Some(event) => {
                let mut out = JsonObject::new();
                out.insert("event".into(), serde_json::to_value(event).unwrap_or_default());
                Ok(out)
            }
            None => Err("event not found".into()),
        }
    }

    fn agenda_delete(&self, caller_id: &str, args: &JsonObject) -> HandlerResult {
        let id = req_str(args, "id")?;
        if self.agenda.delete(caller_id, id).map_err(|e| e.to_string())? {
            let mut out = JsonObject::new();
            out.insert("success".into(), json!(true));
            Ok(out)
        } else {
            Err("event not found".into())
        }
    }

    // ── Codebase handlers ────────────────────────────────────────────

    fn workspace(&self) -> Result<&PathBuf, String> {
        self.workspace_root
            .as_ref()
            .ok_or_else(|| "codebase tools are not configured (no workspace root)".to_owned())
    }

    async fn codebase_read(&self, args: &JsonObject) -> HandlerResult {
        let root = self.workspace()?;
        hearth_tools::codebase::read_file(root, req_str(args, "path")?).await
    }

    async fn codebase_list(&self, args: &JsonObject) -> HandlerResult {
        let root = self.workspace()?;
        let path = opt_str(args, "path").unwrap_or(".");
        hearth_tools::codebase::list_directory(root, path).await
    }

    async fn codebase_search(&self, args: &JsonObject) -> HandlerResult {
        let root = self.workspace()?;
        let pattern = req_str(args, "pattern")?;
        let path = opt_str(args, "path").unwrap_or(".");
        hearth_tools::codebase::search(root, pattern, path).await
    }

    // ── Definitions for the model ────────────────────────────────────

    /// Tool definitions exposed to the model, schemas included.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs = vec![
            ToolDefinition {
                name: "cron.add".into(),
                description: "Add a scheduled job: a one-off reminder (at), a recurring interval (every), or a calendar expression (cron).".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "schedule": {
                            "type": "object",
                            "description": "When to run: at (ISO8601 with offset), every (everyMs >= 60000), or cron (5-field expr + IANA tz)",
                            "properties": {
                                "kind": {"type": "string", "enum": ["at", "every", "cron"]},
                                "at": {"type": "string", "description": "ISO8601 with offset (e.g. +01:00 or Z), for kind=at"},
                                "everyMs": {"type": "integer", "description": "Milliseconds between runs (min 60000), for kind=every"},
                                "expr": {"type": "string", "description": "5-field cron: min hour day month weekday, for kind=cron"},
                                "tz": {"type": "string", "description": "IANA timezone, for kind=cron"},
                            },
                            "required": ["kind"],
                        },
                        "sessionTarget": {"type": "string", "enum": ["main", "isolated"], "description": "main=systemEvent, isolated=agentTurn"},
                        "payload": {
                            "type": "object",
                            "description": "main: {kind:'systemEvent', text}; isolated: {kind:'agentTurn', message, delivery?}",
                            "properties": {
                                "kind": {"type": "string", "enum": ["systemEvent", "agentTurn"]},
                                "text": {"type": "string"},
                                "message": {"type": "string"},
                                "delivery": {"type": "object"},
                            },
                        },
                        "wakeMode": {"type": "string", "enum": ["now", "next-heartbeat"]},
                        "label": {"type": "string"},
                    },
                    "required": ["schedule", "sessionTarget", "payload"],
                }),
            },
            ToolDefinition {
                name: "cron.update".into(),
                description: "Update an existing scheduled job by jobId.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "jobId": {"type": "string"},
                        "schedule": {"type": "object"},
                        "sessionTarget": {"type": "string", "enum": ["main", "isolated"]},
                        "payload": {"type": "object"},
                        "wakeMode": {"type": "string", "enum": ["now", "next-heartbeat"]},
                        "label": {"type": "string"},
                    },
                    "required": ["jobId"],
                }),
            },
            ToolDefinition {
                name: "cron.remove".into(),
                description: "Remove a scheduled job by jobId.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {"jobId": {"type": "string"}},
                    "required": ["jobId"],
                }),
            },
            ToolDefinition {
                name: "cron.list".into(),
                description: "List the caller's scheduled jobs.".into(),
                parameters: json!({"type": "object", "properties": {}}),
            },
            ToolDefinition {
                name: "cron.run".into(),
                description: "Run a scheduled job once, immediately.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {"jobId": {"type": "string"}},
                    "required": ["jobId"],
                }),
            },
            ToolDefinition {
                name: "cron.runs".into(),
                description: "Run history for a job.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "jobId": {"type": "string"},
                        "limit": {"type": "integer", "description": "Max records (default 100)"},
                    },
                    "required": ["jobId"],
                }),
            },
            ToolDefinition {
                name: "agenda.list".into(),
                description: "List agenda events between start and end.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "start": {"type": "string", "description": "ISO date or datetime"},
                        "end": {"type": "string", "description": "ISO date or datetime"},
                        "timezone": {"type": "string", "description": "IANA timezone (default UTC)"},
                    },
                    "required": ["start", "end"],
                }),
            },
            ToolDefinition {
                name: "agenda.add".into(),
                description: "Add an event to the agenda.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "start_at": {"type": "string"},
                        "end_at": {"type": "string"},
                        "all_day": {"type": "boolean"},
                        "notes": {"type": "string"},
                        "timezone": {"type": "string"},
                    },
                    "required": ["title", "start_at"],
                }),
            },
            ToolDefinition {
                name: "agenda.update".into(),
                description: "Update an agenda event by id.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "id": {"type": "string"},
                        "title": {"type": "string"},
                        "start_at": {"type": "string"},
                        "end_at": {"type": "string"},
                        "notes": {"type": "string"},
                        "timezone": {"type": "string"},
                    },
                    "required": ["id"],
                }),
            },
            ToolDefinition {
                name: "agenda.delete".into(),
                description: "Delete an agenda event by id.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {"id": {"type": "string"}},
                    "required": ["id"],
                }),
            },
            ToolDefinition {
                name: "web.search".into(),
                description: "Search the web for current information. Returns merged, deduplicated results with titles, URLs, and snippets.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string"},
                        "max_results": {"type": "integer", "description": "Default 5, max 15"},
                    },
                    "required": ["query"],
                }),
            },
            ToolDefinition {
                name: "web.shopping_search".into(),
                description: "Search the web with purchase intent (prices, shops, products).".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string"},
                        "max_results": {"type": "integer"},
                    },
                    "required": ["query"],
                }),
            },
            ToolDefinition {
                name: "web.fetch_url".into(),
                description: "Fetch the text content of a web page (http/https only).".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "url": {"type": "string"},
                        "max_chars": {"type": "integer", "description": "Default 4000"},
                    },
                    "required": ["url"],
                }),
            },
            ToolDefinition {
                name: "github.search".into(),
                description: "Search code repositories by topic or name.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {"query": {"type": "string"}},
                    "required": ["query"],
                }),
            },
        ];

        if self.workspace_root.is_some() {
            defs.push(ToolDefinition {
                name: "codebase.read_file".into(),
                description: "Read a file from the configured workspace.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {"path": {"type": "string"}},
                    "required": ["path"],
                }),
            });
            defs.push(ToolDefinition {
                name: "codebase.list_directory".into(),
                description: "List a directory in the configured workspace.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {"path": {"type": "string", "description": "Default '.'"}},
                }),
            });
            defs.push(ToolDefinition {
                name: "codebase.search".into(),
                description: "Regex search across workspace files.".into(),
                parameters: json!({
                    "type": "object",
                    "properties": {
                        "pattern": {"type": "string"},
                        "path": {"type": "string"},
                    },
                    "required": ["pattern"],
                }),
            });
        }

        defs
    }
}
