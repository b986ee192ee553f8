// Mailer Agent: Delivers workflow reports by email

use crate::config::SmtpConfig;
use anyhow::Result;
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::time::Duration;
use tracing::info;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let from: Mailbox = config.from.parse()?;
        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };
        let transport = builder
            .port(config.port)
            .credentials(creds)
            .timeout(Some(Duration::from_secs(15)))
            .build();

        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(to.parse::<Mailbox>()?)
            .subject(subject)
            .body(body.to_string())?;

        self.transport.send(email).await?;
        info!("Emailed '{}' to {}", subject, to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smtp(from: &str) -> SmtpConfig {
        SmtpConfig {
            host: "smtp.example.com".into(),
            port: 587,
            user: "bot@example.com".into(),
            password: "secret".into(),
            from: from.into(),
            starttls: false,
        }
    }

    #[test]
    fn rejects_invalid_sender_address() {
        assert!(SmtpMailer::new(&smtp("not an address")).is_err());
    }

    #[tokio::test]
    async fn builds_without_connecting() {
        let mailer = SmtpMailer::new(&smtp("Reportero <bot@example.com>")).unwrap();
        assert_eq!(mailer.from.email.to_string(), "bot@example.com");
    }
}
