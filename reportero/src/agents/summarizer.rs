// Summarizer Agent: Turns retrieved news items into a readable report

use crate::models::NewsItem;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

const VERIFY_FOOTER: &str = "\nPlease verify details with the linked sources.";

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, query: &str, items: &[NewsItem]) -> Result<String>;
}

fn no_results(query: &str) -> String {
    format!("No recent articles found for '{}'. Try a different query.", query)
}

/// Deterministic numbered digest of the top five items.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextSummarizer;

#[async_trait]
impl Summarizer for TextSummarizer {
    async fn summarize(&self, query: &str, items: &[NewsItem]) -> Result<String> {
        if items.is_empty() {
            return Ok(no_results(query));
        }

        let mut lines = vec![format!("Recent developments for '{}':", query)];
        for (i, item) in items.iter().take(5).enumerate() {
            let title = item.title.trim();
            let url = item.url.trim();
            let source = if item.source.is_empty() { "source" } else { item.source.as_str() };
            if !title.is_empty() && !url.is_empty() {
                lines.push(format!("{}. {} — {}\n   {}", i + 1, title, source, url));
            }
        }
        lines.push(VERIFY_FOOTER.to_string());
        Ok(lines.join("\n"))
    }
}

/// Report written by an OpenAI-compatible chat completion endpoint.
pub struct LlmSummarizer {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Deserialize)]
struct NewsReport {
    summary: String,
    #[serde(default)]
    links: Vec<String>,
}

impl LlmSummarizer {
    pub fn new(base_url: &str, api_key: String, model: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }

    fn prompt(query: &str, items: &[NewsItem]) -> String {
        let bullets: Vec<String> = items
            .iter()
            .take(6)
            .filter(|it| !it.title.trim().is_empty())
            .map(|it| {
                format!(
                    "- {} — {}\n  {}\n  {}",
                    it.title.trim(),
                    it.source.trim(),
                    it.snippet.trim(),
                    it.url.trim()
                )
            })
            .collect();

        format!(
            "Topic: {}\n\nArticles (title — source, snippet, url):\n{}\n\n\
             Respond only with valid JSON using the keys:\n\
             {{ \"summary\": string, \"links\": string[] }}",
            query,
            bullets.join("\n")
        )
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, query: &str, items: &[NewsItem]) -> Result<String> {
        if items.is_empty() {
            return Ok(no_results(query));
        }
        info!("Summarizer: Creating summary for query: {}", query);

        let body = json!({
            "model": self.model,
            "temperature": 0.3,
            "messages": [
                {
                    "role": "system",
                    "content": "You are a news analyst. Given a set of recent articles, write a \
                                concise, useful report (2-5 paragraphs) covering context, risks, \
                                signals to watch and likely catalysts. Do not repeat the titles; \
                                return only JSON with 'summary' (string) and 'links' (array of URLs)."
                },
                { "role": "user", "content": Self::prompt(query, items) }
            ]
        });

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("LLM API error {}: {}", status, text));
        }

        let completion: Value = resp.json().await?;
        let content = completion["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("{}");
        Ok(render_report(content, items))
    }
}

/// Format the model output, falling back to the raw text plus the item URLs
/// when it is not the requested JSON.
pub fn render_report(content: &str, items: &[NewsItem]) -> String {
    let trimmed = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let report = match serde_json::from_str::<NewsReport>(trimmed) {
        Ok(report) => report,
        Err(e) => {
            warn!("LLM output was not a JSON report: {}", e);
            NewsReport {
                summary: content.to_string(),
                links: items.iter().map(|it| it.url.clone()).collect(),
            }
        }
    };

    let mut lines = vec![report.summary.trim().to_string()];
    let links: Vec<String> = report.links.into_iter().filter(|u| !u.is_empty()).collect();
    if !links.is_empty() {
        lines.push("\nLinks:".to_string());
        lines.extend(links);
    }
    lines.push(VERIFY_FOOTER.to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str, url: &str, source: &str) -> NewsItem {
        NewsItem {
            title: title.into(),
            url: url.into(),
            snippet: "snippet".into(),
            source: source.into(),
        }
    }

    #[tokio::test]
    async fn text_summary_lists_top_five() {
        let items: Vec<NewsItem> = (1..=7)
            .map(|i| item(&format!("Story {}", i), &format!("https://news/{}", i), "Wire"))
            .collect();

        let summary = TextSummarizer.summarize("rust", &items).await.unwrap();
        assert!(summary.starts_with("Recent developments for 'rust':"));
        assert!(summary.contains("1. Story 1 — Wire\n   https://news/1"));
        assert!(summary.contains("5. Story 5"));
        assert!(!summary.contains("Story 6"));
        assert!(summary.ends_with("Please verify details with the linked sources."));
    }

    #[tokio::test]
    async fn empty_results_say_so() {
        let summary = TextSummarizer.summarize("nothing", &[]).await.unwrap();
        assert_eq!(summary, "No recent articles found for 'nothing'. Try a different query.");
    }

    #[test]
    fn renders_json_report() {
        let content = "```json\n{\"summary\": \"Markets calm.\", \"links\": [\"https://a\", \"\"]}\n```";
        let report = render_report(content, &[]);
        assert_eq!(
            report,
            "Markets calm.\n\nLinks:\nhttps://a\n\nPlease verify details with the linked sources."
        );
    }

    #[test]
    fn falls_back_to_raw_text() {
        let items = vec![item("A", "https://a", "Wire")];
        let report = render_report("Plain prose answer", &items);
        assert!(report.starts_with("Plain prose answer\n\nLinks:\nhttps://a"));
    }
}
