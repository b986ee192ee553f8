// News Workflow: retrieve -> summarize -> optionally email

use anyhow::{anyhow, Context, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use super::mailer::{Mailer, SmtpMailer};
use super::retriever::{NewsSource, RssNewsSource};
use super::summarizer::{LlmSummarizer, Summarizer, TextSummarizer};
use crate::config::Config;
use crate::models::{SourceRef, WorkflowParams, WorkflowResult};
use crate::protocol::{ProtocolEngine, NEWS_WORKFLOW_ACTION};

pub struct NewsWorkflow {
    source: Arc<dyn NewsSource>,
    summarizer: Arc<dyn Summarizer>,
    mailer: Option<Arc<dyn Mailer>>,
    max_items: usize,
}

impl NewsWorkflow {
    pub fn new(
        source: Arc<dyn NewsSource>,
        summarizer: Arc<dyn Summarizer>,
        mailer: Option<Arc<dyn Mailer>>,
        max_items: usize,
    ) -> Self {
        Self {
            source,
            summarizer,
            mailer,
            max_items,
        }
    }

    /// Wire the live collaborators: RSS retrieval, an LLM summary when an API
    /// key is configured (plain text otherwise) and SMTP delivery when set up.
    pub fn from_config(config: &Config) -> Result<Self> {
        let source = Arc::new(RssNewsSource::new(&config.news_user_agent)?);

        let summarizer: Arc<dyn Summarizer> = match &config.openai_api_key {
            Some(key) => Arc::new(LlmSummarizer::new(
                &config.openai_base_url,
                key.clone(),
                config.openai_model.clone(),
            )?),
            None => Arc::new(TextSummarizer),
        };

        let mailer: Option<Arc<dyn Mailer>> = match &config.smtp {
            Some(smtp) => Some(Arc::new(SmtpMailer::new(smtp)?)),
            None => None,
        };

        Ok(Self::new(source, summarizer, mailer, config.news_max_items))
    }

    pub async fn run(&self, params: Value) -> Result<WorkflowResult> {
        let params: WorkflowParams =
            serde_json::from_value(params).context("invalid workflow.news params")?;
        let query = params
            .query()
            .ok_or_else(|| anyhow!("missing 'query' or 'topic'"))?
            .to_string();
        info!("Running news workflow for: {}", query);

        let items = self.source.search(&query, self.max_items).await?;
        let summary = self.summarizer.summarize(&query, &items).await?;

        let mut emailed = false;
        if let Some(to) = params.email_to() {
            let mailer = self.mailer.as_ref().ok_or_else(|| {
                anyhow!("SMTP config missing. Set SMTP_HOST, SMTP_USER, SMTP_PASSWORD in .env")
            })?;
            mailer
                .send(to, &format!("News summary: {}", query), &summary)
                .await
                .with_context(|| format!("failed to email summary to {}", to))?;
            emailed = true;
        }

        Ok(WorkflowResult {
            sources: items.iter().map(SourceRef::from).collect(),
            query,
            status: "workflow completed".to_string(),
            summary,
            emailed,
        })
    }

    /// Serve the workflow as the `workflow.news` action.
    pub fn register(self: Arc<Self>, engine: &ProtocolEngine) {
        engine.register_handler(NEWS_WORKFLOW_ACTION, move |params| {
            let workflow = self.clone();
            async move {
                let result = workflow.run(params).await?;
                Ok::<_, anyhow::Error>(serde_json::to_value(result)?)
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewsItem;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct FixedSource(Vec<NewsItem>);

    #[async_trait]
    impl NewsSource for FixedSource {
        async fn search(&self, _query: &str, max_items: usize) -> Result<Vec<NewsItem>> {
            Ok(self.0.iter().take(max_items).cloned().collect())
        }
    }

    #[derive(Default)]
    struct RecordingMailer(Mutex<Vec<(String, String)>>);

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send(&self, to: &str, subject: &str, _body: &str) -> Result<()> {
            self.0.lock().unwrap().push((to.to_string(), subject.to_string()));
            Ok(())
        }
    }

    fn items() -> Vec<NewsItem> {
        vec![NewsItem {
            title: "Quarterly results".into(),
            url: "https://example.com/q".into(),
            snippet: "Numbers".into(),
            source: "Google News".into(),
        }]
    }

    fn workflow(mailer: Option<Arc<dyn Mailer>>) -> NewsWorkflow {
        NewsWorkflow::new(Arc::new(FixedSource(items())), Arc::new(TextSummarizer), mailer, 6)
    }

    #[tokio::test]
    async fn topic_is_accepted_as_query() {
        let result = workflow(None).run(json!({"topic": "earnings"})).await.unwrap();
        assert_eq!(result.query, "earnings");
        assert_eq!(result.status, "workflow completed");
        assert!(!result.emailed);
        assert_eq!(result.sources[0].url, "https://example.com/q");
        assert!(result.summary.contains("Quarterly results"));
    }

    #[tokio::test]
    async fn emails_when_requested() {
        let mailer = Arc::new(RecordingMailer::default());
        let result = workflow(Some(mailer.clone() as Arc<dyn Mailer>))
            .run(json!({"query": "earnings", "email_to": "desk@example.com"}))
            .await
            .unwrap();

        assert!(result.emailed);
        let sent = mailer.0.lock().unwrap();
        assert_eq!(sent[0], ("desk@example.com".to_string(), "News summary: earnings".to_string()));
    }

    #[tokio::test]
    async fn email_without_smtp_fails() {
        let err = workflow(None)
            .run(json!({"query": "earnings", "email_to": "desk@example.com"}))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("SMTP config missing"));
    }

    #[tokio::test]
    async fn blank_query_fails() {
        let err = workflow(None).run(json!({"query": "  "})).await.unwrap_err();
        assert!(err.to_string().contains("missing 'query' or 'topic'"));
    }
}
