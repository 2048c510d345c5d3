//! Web lookup tools: search, shopping search, page fetch, and a code
//! repository search.
//!
//! Search uses the DuckDuckGo HTML endpoint (no API key). Fetches are
//! bounded: http/https only, no loopback hosts, hard timeout, capped
//! output size.

use std::time::Duration;

use regex::Regex;
use serde_json::{json, Map, Value};

const USER_AGENT: &str = "Hearth/0.1";
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RESULTS_DEFAULT: usize = 5;
const MAX_RESULTS_LIMIT: usize = 15;
const MAX_SNIPPET_LEN: usize = 300;
/// Multi-query research: query variations, merged and deduped by URL.
const TOP_PER_VARIATION: usize = 5;
const MAX_MERGED_RESULTS: usize = 10;

type ToolOutput = Result<Map<String, Value>, String>;

fn ok(value: Value) -> ToolOutput {
    match value {
        Value::Object(map) => Ok(map),
        _ => unreachable!("tool outputs are objects"),
    }
}

pub fn http_client() -> Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| e.to_string())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// URL safety
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Only http/https; no loopback or file targets.
pub fn is_safe_url(url: &str) -> bool {
    let u = url.trim().to_ascii_lowercase();
    if !(u.starts_with("http://") || u.starts_with("https://")) {
        return false;
    }
    !(u.contains("localhost") || u.contains("127.0.0.1") || u.contains("file:"))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Query variations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Three variations for better coverage; shopping mode biases toward
/// purchase/price phrasing.
fn query_variations(query: &str, shopping: bool) -> Vec<String> {
    let q = query.trim();
    if q.is_empty() {
        return Vec::new();
    }
    if shopping {
        vec![q.to_owned(), format!("{q} buy"), format!("{q} price")]
    } else {
        vec![
            q.to_owned(),
            format!("{q} overview"),
            format!("{q} latest"),
        ]
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// HTML extraction
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn strip_tags(html: &str) -> String {
    let no_script = Regex::new(r"(?is)<script[^>]*>.*?</script>")
        .unwrap()
        .replace_all(html, " ");
    let no_style = Regex::new(r"(?is)<style[^>]*>.*?</style>")
        .unwrap()
        .replace_all(&no_script, " ");
    let no_tags = Regex::new(r"<[^>]+>").unwrap().replace_all(&no_style, " ");
    Regex::new(r"\s+")
        .unwrap()
        .replace_all(&no_tags, " ")
        .trim()
        .to_owned()
}

/// Parse DuckDuckGo HTML results into `{title, url, snippet}` triples.
fn parse_search_results(html: &str, limit: usize) -> Vec<Value> {
    let link_re =
        Regex::new(r#"(?is)<a[^>]*class="result__a"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#).unwrap();
    let snippet_re =
        Regex::new(r#"(?is)<a[^>]*class="result__snippet"[^>]*>(.*?)</a>"#).unwrap();

    let snippets: Vec<String> = snippet_re
        .captures_iter(html)
        .map(|c| {
            let mut s = strip_tags(&c[1]);
            s.truncate(MAX_SNIPPET_LEN);
            s
        })
        .collect();

    link_re
        .captures_iter(html)
        .take(limit)
        .enumerate()
        .map(|(i, c)| {
            let mut title = strip_tags(&c[2]);
            title.truncate(200);
            json!({
                "title": title,
                "url": c[1].to_string(),
                "snippet": snippets.get(i).cloned().unwrap_or_default(),
            })
        })
        .collect()
}

async fn duckduckgo(client: &reqwest::Client, query: &str, limit: usize) -> Vec<Value> {
    let url = "https://html.duckduckgo.com/html/";
    let resp = client.get(url).query(&[("q", query)]).send().await;
    match resp {
        Ok(r) => match r.text().await {
            Ok(html) => parse_search_results(&html, limit),
            Err(e) => {
                tracing::warn!(error = %e, "search response unreadable");
                Vec::new()
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "search request failed");
            Vec::new()
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

async fn search_merged(
    client: &reqwest::Client,
    query: &str,
    max_results: usize,
    shopping: bool,
) -> ToolOutput {
    let query = query.trim();
    if query.is_empty() {
        return Err("query is required".into());
    }
    let mut seen = std::collections::HashSet::new();
    let mut merged: Vec<Value> = Vec::new();
    for variation in query_variations(query, shopping) {
        for result in duckduckgo(client, &variation, TOP_PER_VARIATION).await {
            let url = result["url"].as_str().unwrap_or("").trim().to_owned();
            if url.is_empty() {
                continue;
            }
            let norm = url.trim_end_matches('/').to_ascii_lowercase();
            if !seen.insert(norm) {
                continue;
            }
            merged.push(result);
            if merged.len() >= MAX_MERGED_RESULTS {
                break;
            }
        }
        if merged.len() >= MAX_MERGED_RESULTS {
            break;
        }
    }
    let cap = max_results.clamp(1, MAX_RESULTS_LIMIT);
    merged.truncate(cap);
    ok(json!({
        "success": true,
        "query": query,
        "results": merged,
    }))
}

/// `web.search` — merged, deduplicated web results.
pub async fn search(client: &reqwest::Client, query: &str, max_results: Option<usize>) -> ToolOutput {
    search_merged(client, query, max_results.unwrap_or(MAX_RESULTS_DEFAULT), false).await
}

/// `web.shopping_search` — purchase-biased query variations.
pub async fn shopping_search(
    client: &reqwest::Client,
    query: &str,
    max_results: Option<usize>,
) -> ToolOutput {
    search_merged(client, query, max_results.unwrap_or(MAX_RESULTS_DEFAULT), true).await
}

/// `web.fetch_url` — fetch a page and return its visible text.
pub async fn fetch_url(client: &reqwest::Client, url: &str, max_chars: usize) -> ToolOutput {
    let url = url.trim();
    if url.is_empty() {
        return Err("url is required".into());
    }
    if !is_safe_url(url) {
        return Err("only http/https URLs allowed; no localhost or file".into());
    }
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(|e| e.to_string())?
        .error_for_status()
        .map_err(|e| e.to_string())?;
    let html = resp.text().await.map_err(|e| e.to_string())?;
    let mut text = strip_tags(&html);
    if text.len() > max_chars {
        let mut end = max_chars;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        text.truncate(end);
        text.push_str("...");
    }
    ok(json!({
        "success": true,
        "url": url,
        "content": text,
    }))
}

/// `github.search` — top repositories for a query.
pub async fn github_search(client: &reqwest::Client, query: &str) -> ToolOutput {
    let query = query.trim();
    if query.is_empty() {
        return Err("query is required".into());
    }
    let resp = client
        .get("https://api.github.com/search/repositories")
        .query(&[("q", query), ("per_page", "5")])
        .header("Accept", "application/vnd.github+json")
        .send()
        .await
        .map_err(|e| e.to_string())?
        .error_for_status()
        .map_err(|e| e.to_string())?;
    let body: Value = resp.json().await.map_err(|e| e.to_string())?;
    let results: Vec<Value> = body["items"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|item| {
                    json!({
                        "name": item["full_name"].as_str().unwrap_or(""),
                        "url": item["html_url"].as_str().unwrap_or(""),
                        "description": item["description"].as_str().unwrap_or(""),
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    ok(json!({
        "success": true,
        "query": query,
        "results": results,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_url_filtering() {
        assert!(is_safe_url("https://example.com/page"));
        assert!(is_safe_url("http://example.com"));
        assert!(!is_safe_url("ftp://example.com"));
        assert!(!is_safe_url("file:///etc/passwd"));
        assert!(!is_safe_url("http://localhost:8080"));
        assert!(!is_safe_url("http://127.0.0.1/x"));
    }

    #[test]
    fn strip_tags_drops_script_and_style() {
        let html = "<html><script>var x = 1;</script><style>.a{}</style><p>Hello <b>world</b></p>";
        assert_eq!(strip_tags(html), "Hello world");
    }

    #[test]
    fn parse_search_results_extracts_title_url_snippet() {
        let html = r##"
            <a rel="nofollow" class="result__a" href="https://example.com/one">First <b>Hit</b></a>
            <a class="result__snippet" href="#">A short description</a>
            <a rel="nofollow" class="result__a" href="https://example.com/two">Second</a>
        "##;
        let results = parse_search_results(html, 10);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["title"], "First Hit");
        assert_eq!(results[0]["url"], "https://example.com/one");
        assert_eq!(results[0]["snippet"], "A short description");
        assert_eq!(results[1]["url"], "https://example.com/two");
    }

    #[test]
    fn query_variations_shapes() {
        assert!(query_variations("  ", false).is_empty());
        let plain = query_variations("rust async", false);
        assert_eq!(plain.len(), 3);
        assert_eq!(plain[0], "rust async");
        let shop = query_variations("garden tiles", true);
        assert!(shop.iter().any(|q| q.ends_with("buy")));
    }
}
