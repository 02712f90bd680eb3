//! `web_fetch` and `web_search` — network access tools (spec.md §4.5.12).
//!
//! `web_fetch` follows the multi-URL prompt contract of the gemini-cli tool
//! (parse URLs out of a free-form prompt, rewrite GitHub blob URLs to raw
//! content, strip HTML tags, 100,000-char-per-URL cap), using `reqwest` +
//! `html2text` for the actual fetch/strip the way `sven-tools` does it.
//! `web_search` is a thin dispatch over an injectable search backend; with
//! none configured it reports `WEB_SEARCH_NOT_CONFIGURED` rather than
//! silently no-op'ing.

use super::{Tool, ToolErrorType, ToolResult};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

const URL_FETCH_TIMEOUT_SECS: u64 = 30;
const MAX_CONTENT_LENGTH: usize = 100_000;
const MAX_URLS: usize = 20;

fn parse_urls_from_prompt(prompt: &str) -> (Vec<String>, Vec<String>) {
    let mut valid = Vec::new();
    let mut errors = Vec::new();
    for token in prompt.split_whitespace() {
        if token.contains("://") {
            if token.starts_with("http://") || token.starts_with("https://") {
                valid.push(token.to_string());
            } else {
                errors.push(format!("Unsupported protocol: {token}"));
            }
        }
    }
    (valid, errors)
}

fn convert_github_url(url: &str) -> String {
    if url.contains("github.com") && url.contains("/blob/") {
        url.replace("github.com", "raw.githubusercontent.com")
            .replace("/blob/", "/")
    } else {
        url.to_string()
    }
}

fn html_to_text(html: &str) -> String {
    html2text::from_read(html.as_bytes(), 100)
}

async fn fetch_one(client: &reqwest::Client, url: &str) -> Result<String, String> {
    let fetch_url = convert_github_url(url);

    let response = client
        .get(&fetch_url)
        .header("User-Agent", "Mozilla/5.0 (compatible; PawanAgent/1.0)")
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                format!("Request timed out after {URL_FETCH_TIMEOUT_SECS} seconds")
            } else {
                format!("Request error: {e}")
            }
        })?;

    if !response.status().is_success() {
        return Err(format!(
            "HTTP {}: {}",
            response.status().as_u16(),
            response.status().canonical_reason().unwrap_or("")
        ));
    }

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();

    let body = response.text().await.map_err(|e| format!("Request error: {e}"))?;

    let mut text = if content_type.contains("text/html") {
        html_to_text(&body)
    } else {
        body
    };

    if text.len() > MAX_CONTENT_LENGTH {
        text.truncate(MAX_CONTENT_LENGTH);
        text.push_str("\n\n[Content truncated...]");
    }

    Ok(text)
}

pub struct WebFetchTool {
    client: reqwest::Client,
}

impl WebFetchTool {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(URL_FETCH_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .expect("reqwest client builder with static config");
        Self { client }
    }
}

impl Default for WebFetchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebFetchTool {
    fn name(&self) -> &str {
        "web_fetch"
    }

    fn description(&self) -> &str {
        "Fetch and process content from up to 20 URLs embedded in a prompt. Converts HTML to \
         plain text, rewrites GitHub blob URLs to raw content, and truncates each page to \
         100,000 characters."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": {
                    "type": "string",
                    "description": "A prompt containing one or more http(s) URLs and processing instructions"
                }
            },
            "required": ["prompt"]
        })
    }

    async fn invoke(&self, args: Value) -> ToolResult {
        let prompt = match args["prompt"].as_str() {
            Some(p) if !p.trim().is_empty() => p,
            _ => {
                return ToolResult::err(
                    "Prompt cannot be empty. Include URL(s) and instructions.",
                    ToolErrorType::InvalidInput,
                )
            }
        };

        let (urls, parse_errors) = parse_urls_from_prompt(prompt);

        if !parse_errors.is_empty() {
            return ToolResult::err(
                format!("Error(s) in prompt URLs:\n- {}", parse_errors.join("\n- ")),
                ToolErrorType::InvalidUrl,
            );
        }

        if urls.is_empty() {
            return ToolResult::err(
                "No valid URLs found in prompt. URLs must start with http:// or https://",
                ToolErrorType::NoUrlsFound,
            );
        }

        if urls.len() > MAX_URLS {
            return ToolResult::err(
                format!("Too many URLs ({}). Maximum is {MAX_URLS}.", urls.len()),
                ToolErrorType::TooManyUrls,
            );
        }

        let mut results = Vec::new();
        let mut errors = Vec::new();

        for url in &urls {
            match fetch_one(&self.client, url).await {
                Ok(content) => results.push((url.clone(), content)),
                Err(error) => errors.push(json!({"url": url, "error": error})),
            }
        }

        if results.is_empty() && !errors.is_empty() {
            return ToolResult::ok_with_data(
                "Failed to fetch all URLs.",
                "Failed to fetch all URLs.",
                json!({"success": false, "errors": errors, "message": "Failed to fetch all URLs."}),
            );
        }

        let formatted_content = results
            .iter()
            .map(|(url, content)| format!("--- Content from {url} ---\n{content}"))
            .collect::<Vec<_>>()
            .join("\n\n");

        let message = if errors.is_empty() {
            format!("Successfully fetched {} URL(s).", results.len())
        } else {
            format!("Fetched {} URL(s), {} failed.", results.len(), errors.len())
        };

        ToolResult::ok_with_data(
            formatted_content,
            message.clone(),
            json!({
                "success": true,
                "urls_fetched": results.len(),
                "errors": errors,
                "message": message,
            }),
        )
    }
}

/// Injectable search backend so the agent runtime can wire up whatever
/// provider is configured (or none at all) without `web.rs` depending on a
/// specific API.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn search(&self, query: &str, count: usize) -> Result<String, String>;
}

pub struct WebSearchTool {
    backend: Option<Box<dyn SearchBackend>>,
}

impl WebSearchTool {
    pub fn new() -> Self {
        Self { backend: None }
    }

    pub fn with_backend(backend: Box<dyn SearchBackend>) -> Self {
        Self { backend: Some(backend) }
    }
}

impl Default for WebSearchTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for current information. Requires a configured search backend."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string", "description": "Search query"},
                "count": {"type": "integer", "description": "Number of results (default 5, max 10)"}
            },
            "required": ["query"]
        })
    }

    async fn invoke(&self, args: Value) -> ToolResult {
        let query = match args["query"].as_str() {
            Some(q) if !q.trim().is_empty() => q,
            _ => return ToolResult::err("Query cannot be empty.", ToolErrorType::InvalidInput),
        };
        let count = args["count"].as_u64().unwrap_or(5).clamp(1, 10) as usize;

        let Some(backend) = &self.backend else {
            return ToolResult::err(
                "Web search is not configured for this session.",
                ToolErrorType::WebSearchNotConfigured,
            );
        };

        match backend.search(query, count).await {
            Ok(results) => ToolResult::ok(results, format!("Searched for \"{query}\".")),
            Err(e) => ToolResult::err(format!("Search error: {e}"), ToolErrorType::WebSearchFailed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_urls_and_ignores_prose() {
        let (urls, errors) = parse_urls_from_prompt("summarize https://example.com and https://rust-lang.org");
        assert_eq!(urls, vec!["https://example.com", "https://rust-lang.org"]);
        assert!(errors.is_empty());
    }

    #[test]
    fn rejects_unsupported_protocol() {
        let (urls, errors) = parse_urls_from_prompt("check ftp://example.com/file");
        assert!(urls.is_empty());
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn rewrites_github_blob_url_to_raw() {
        let raw = convert_github_url("https://github.com/rust-lang/rust/blob/main/README.md");
        assert_eq!(raw, "https://raw.githubusercontent.com/rust-lang/rust/main/README.md");
    }

    #[test]
    fn html_to_text_strips_tags() {
        let text = html_to_text("<html><body><h1>Hello</h1><p>World</p></body></html>");
        assert!(text.contains("Hello"));
        assert!(text.contains("World"));
        assert!(!text.contains("<h1>"));
    }

    #[tokio::test]
    async fn fetch_rejects_empty_prompt() {
        let tool = WebFetchTool::new();
        let result = tool.invoke(json!({"prompt": "   "})).await;
        assert_eq!(result.error.unwrap().error_type, ToolErrorType::InvalidInput);
    }

    #[tokio::test]
    async fn fetch_rejects_prompt_with_no_urls() {
        let tool = WebFetchTool::new();
        let result = tool.invoke(json!({"prompt": "just some text"})).await;
        assert_eq!(result.error.unwrap().error_type, ToolErrorType::NoUrlsFound);
    }

    #[tokio::test]
    async fn search_reports_not_configured_by_default() {
        let tool = WebSearchTool::new();
        let result = tool.invoke(json!({"query": "rust async book"})).await;
        assert_eq!(result.error.unwrap().error_type, ToolErrorType::WebSearchNotConfigured);
    }

    struct EchoBackend;
    #[async_trait]
    impl SearchBackend for EchoBackend {
        async fn search(&self, query: &str, _count: usize) -> Result<String, String> {
            Ok(format!("results for {query}"))
        }
    }

    #[tokio::test]
    async fn search_uses_configured_backend() {
        let tool = WebSearchTool::with_backend(Box::new(EchoBackend));
        let result = tool.invoke(json!({"query": "rust"})).await;
        assert!(!result.is_error());
    }
}
