pub mod mailer;
pub mod retriever;
pub mod summarizer;
pub mod workflow;

pub use mailer::{Mailer, SmtpMailer};
pub use retriever::{NewsSource, RssNewsSource};
pub use summarizer::{LlmSummarizer, Summarizer, TextSummarizer};
pub use workflow::NewsWorkflow;
