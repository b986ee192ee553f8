// Retriever Agent: Collects recent news from public RSS/Atom feeds

use crate::models::NewsItem;
use anyhow::Result;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{info, warn};

#[async_trait]
pub trait NewsSource: Send + Sync {
    async fn search(&self, query: &str, max_items: usize) -> Result<Vec<NewsItem>>;
}

struct Feed {
    name: &'static str,
    base_url: &'static str,
    params: &'static [(&'static str, &'static str)],
}

const FEEDS: &[Feed] = &[
    Feed {
        name: "Google News",
        base_url: "https://news.google.com/rss/search",
        params: &[("hl", "en-US"), ("gl", "US"), ("ceid", "US:en")],
    },
    Feed {
        name: "Bing News",
        base_url: "https://www.bing.com/news/search",
        params: &[("format", "rss")],
    },
];

pub struct RssNewsSource {
    client: reqwest::Client,
}

impl RssNewsSource {
    pub fn new(user_agent: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("Mozilla/5.0 {}", user_agent))
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }

    async fn fetch(&self, feed: &Feed, query: &str) -> Result<Vec<NewsItem>> {
        let mut params = vec![("q", query)];
        params.extend(feed.params.iter().copied());
        let url = reqwest::Url::parse_with_params(feed.base_url, &params)?;

        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(parse_feed(&body, feed.name))
    }
}

#[async_trait]
impl NewsSource for RssNewsSource {
    async fn search(&self, query: &str, max_items: usize) -> Result<Vec<NewsItem>> {
        info!("Retriever: Searching for: {}", query);

        let mut batches = Vec::with_capacity(FEEDS.len());
        for feed in FEEDS {
            match self.fetch(feed, query).await {
                Ok(items) => batches.push(items),
                Err(e) => warn!("{} fetch failed: {}", feed.name, e),
            }
        }

        let items = merge_unique(batches, max_items);
        info!("Retriever: {} items for '{}'", items.len(), query);
        Ok(items)
    }
}

/// Concatenate batches in order, dropping repeats by URL (or title when the
/// URL is empty), and stop at `max_items`.
pub fn merge_unique(batches: Vec<Vec<NewsItem>>, max_items: usize) -> Vec<NewsItem> {
    let mut seen = HashSet::new();
    let mut combined = Vec::new();

    for item in batches.into_iter().flatten() {
        if combined.len() >= max_items {
            break;
        }
        let key = if item.url.is_empty() { item.title.clone() } else { item.url.clone() };
        if !key.is_empty() && seen.insert(key) {
            combined.push(item);
        }
    }
    combined
}

static RSS_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<item\b[^>]*>(.*?)</item>").unwrap());
static ATOM_ENTRY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<entry\b[^>]*>(.*?)</entry>").unwrap());
static TITLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<title\b[^>]*>(.*?)</title>").unwrap());
static LINK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<link\b[^>]*>(.*?)</link>").unwrap());
static DESCRIPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<description\b[^>]*>(.*?)</description>").unwrap());
static SUMMARY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<summary\b[^>]*>(.*?)</summary>").unwrap());
static ATOM_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<link\b[^>]*?\bhref\s*=\s*["']([^"']*)["']"#).unwrap());
static CDATA: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!\[CDATA\[(.*?)\]\]>").unwrap());

/// Extract items from an RSS 2.0 or Atom document. Entries without both a
/// title and a link are skipped; unparseable input yields nothing.
pub fn parse_feed(content: &str, source_name: &str) -> Vec<NewsItem> {
    let item = |title: String, url: String, snippet: String| {
        (!title.is_empty() && !url.is_empty()).then(|| NewsItem {
            title,
            url,
            snippet,
            source: source_name.to_string(),
        })
    };

    if content.contains("<channel") {
        return RSS_ITEM
            .captures_iter(content)
            .filter_map(|c| {
                let body = c.get(1)?.as_str();
                item(
                    element_text(&TITLE, body),
                    element_text(&LINK, body),
                    element_text(&DESCRIPTION, body),
                )
            })
            .collect();
    }

    ATOM_ENTRY
        .captures_iter(content)
        .filter_map(|c| {
            let body = c.get(1)?.as_str();
            let href = ATOM_LINK
                .captures(body)
                .and_then(|l| l.get(1))
                .map(|m| decode_text(m.as_str()))
                .unwrap_or_default();
            item(element_text(&TITLE, body), href, element_text(&SUMMARY, body))
        })
        .collect()
}

fn element_text(pattern: &Regex, body: &str) -> String {
    pattern
        .captures(body)
        .and_then(|c| c.get(1))
        .map(|m| decode_text(m.as_str()))
        .unwrap_or_default()
}

fn decode_text(raw: &str) -> String {
    let unwrapped = CDATA.replace_all(raw, "$1");
    html_escape::decode_html_entities(&unwrapped).trim().to_string()
}
