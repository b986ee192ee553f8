use anyhow::{bail, Context, Result};
use std::time::Duration;

use crate::protocol::{AgentInfo, Capability};

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from: String,
    pub starttls: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerLink {
    pub agent_id: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: [u8; 4],
    pub port: u16,
    pub agent_id: String,
    pub agent_name: String,
    pub capabilities: Vec<Capability>,
    pub endpoint: String,
    pub peers: Vec<PeerLink>,
    pub request_timeout: Duration,
    pub news_max_items: usize,
    pub news_user_agent: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: String,
    pub smtp: Option<SmtpConfig>,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup; invalid identity or
    /// capability settings are fatal.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let agent_id = var("AGENT_ID", "reportero").trim().to_string();
        if agent_id.is_empty() {
            bail!("AGENT_ID must not be empty");
        }

        let capabilities = parse_capabilities(&var(
            "AGENT_CAPABILITIES",
            "data_retrieval,data_analysis,task_execution",
        ))?;

        let request_timeout_secs: f64 = var("REQUEST_TIMEOUT_SECS", "30")
            .parse()
            .context("REQUEST_TIMEOUT_SECS must be a number")?;
        if !request_timeout_secs.is_finite() || request_timeout_secs <= 0.0 {
            bail!("REQUEST_TIMEOUT_SECS must be greater than zero");
        }

        let host = var("HOST", "0.0.0.0")
            .parse::<std::net::Ipv4Addr>()
            .context("HOST must be an IPv4 address")?
            .octets();

        let smtp = match (lookup("SMTP_HOST"), lookup("SMTP_USER"), lookup("SMTP_PASSWORD")) {
            (Some(host), Some(user), Some(password))
                if !host.is_empty() && !user.is_empty() && !password.is_empty() =>
            {
                Some(SmtpConfig {
                    host,
                    port: var("SMTP_PORT", "587").parse().context("SMTP_PORT must be a port number")?,
                    from: lookup("SMTP_FROM").filter(|f| !f.is_empty()).unwrap_or_else(|| user.clone()),
                    user,
                    password,
                    starttls: matches!(
                        var("SMTP_STARTTLS", "true").to_lowercase().as_str(),
                        "1" | "true" | "yes" | "on"
                    ),
                })
            }
            _ => None,
        };

        Ok(Config {
            host,
            port: var("PORT", "8000").parse().context("PORT must be a port number")?,
            agent_name: var("AGENT_NAME", "Reportero"),
            endpoint: lookup("AGENT_ENDPOINT").unwrap_or_else(|| format!("agent://{}", agent_id)),
            peers: parse_peers(&var("A2A_PEERS", ""))?,
            agent_id,
            capabilities,
            request_timeout: Duration::from_secs_f64(request_timeout_secs),
            news_max_items: var("NEWS_MAX_ITEMS", "6")
                .parse()
                .context("NEWS_MAX_ITEMS must be a positive integer")?,
            news_user_agent: var("NEWS_USER_AGENT", "Reportero/1.0 (+https://localhost)"),
            openai_api_key: lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()),
            openai_model: var("OPENAI_MODEL", "gpt-4o-mini"),
            openai_base_url: var("OPENAI_BASE_URL", "https://api.openai.com/v1"),
            smtp,
            log_level: var("LOG_LEVEL", "info"),
        })
    }

    pub fn identity(&self) -> AgentInfo {
        AgentInfo::new(
            self.agent_id.clone(),
            self.agent_name.clone(),
            self.capabilities.clone(),
            self.endpoint.clone(),
        )
    }
}

fn parse_capabilities(raw: &str) -> Result<Vec<Capability>> {
    let capabilities = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<Capability>().map_err(anyhow::Error::msg))
        .collect::<Result<Vec<_>>>()
        .context("invalid AGENT_CAPABILITIES")?;

    if capabilities.is_empty() {
        bail!("AGENT_CAPABILITIES must list at least one capability");
    }
    Ok(capabilities)
}

// "peer-a=ws://host:8000,peer-b=ws://other:8000"
fn parse_peers(raw: &str) -> Result<Vec<PeerLink>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((id, url)) if !id.trim().is_empty() && !url.trim().is_empty() => Ok(PeerLink {
                agent_id: id.trim().to_string(),
                url: url.trim().to_string(),
            }),
            _ => bail!("invalid A2A_PEERS entry '{}', expected agent_id=url", entry),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_describe_a_news_agent() {
        let config = config(&[]).unwrap();
        assert_eq!(config.port, 8000);
        assert_eq!(config.agent_id, "reportero");
        assert_eq!(config.endpoint, "agent://reportero");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.capabilities.len(), 3);
        assert!(config.smtp.is_none());
        assert!(config.peers.is_empty());
    }

    #[test]
    fn invalid_identity_fails_startup() {
        assert!(config(&[("AGENT_ID", "  ")]).is_err());
        assert!(config(&[("AGENT_CAPABILITIES", "reasoning,flying")]).is_err());
        assert!(config(&[("AGENT_CAPABILITIES", " , ")]).is_err());
        assert!(config(&[("REQUEST_TIMEOUT_SECS", "0")]).is_err());
    }

    #[test]
    fn smtp_requires_host_user_and_password() {
        let partial = config(&[("SMTP_HOST", "smtp.example.com"), ("SMTP_USER", "bot")]).unwrap();
        assert!(partial.smtp.is_none());

        let full = config(&[
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USER", "bot@example.com"),
            ("SMTP_PASSWORD", "secret"),
            ("SMTP_STARTTLS", "off"),
        ])
        .unwrap();
        let smtp = full.smtp.unwrap();
        assert_eq!(smtp.from, "bot@example.com");
        assert_eq!(smtp.port, 587);
        assert!(!smtp.starttls);
    }

    #[test]
    fn parses_peer_links() {
        let config = config(&[("A2A_PEERS", "analyst=ws://analyst:8000, fetcher=ws://f:9000")]).unwrap();
        assert_eq!(
            config.peers,
            vec![
                PeerLink { agent_id: "analyst".into(), url: "ws://analyst:8000".into() },
                PeerLink { agent_id: "fetcher".into(), url: "ws://f:9000".into() },
            ]
        );
        assert!(parse_peers("broken").is_err());
    }
}
