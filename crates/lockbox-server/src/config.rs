use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

use lockbox_api::envelopes::ConversationPolicy;
use lockbox_crypto::ProviderMode;
use lockbox_gateway::dispatcher::DEFAULT_PUSH_TIMEOUT;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "changeme",
    "secret",
];

#[derive(Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub crypto_provider: ProviderMode,
    pub allow_insecure_crypto: bool,
    pub conversation_policy: ConversationPolicy,
    pub push_timeout: Duration,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from any key lookup. Unset keys take their
    /// defaults; malformed values are an error, never silently defaulted.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = lookup("LOCKBOX_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("LOCKBOX_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let host = var("LOCKBOX_HOST", "0.0.0.0");
        let port: u16 = var("LOCKBOX_PORT", "8000")
            .parse()
            .context("LOCKBOX_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", host, port))?;

        let crypto_provider: ProviderMode = var("LOCKBOX_CRYPTO_PROVIDER", "pq")
            .parse()
            .map_err(anyhow::Error::msg)
            .context("LOCKBOX_CRYPTO_PROVIDER")?;

        let allow_insecure_crypto = parse_bool(
            "LOCKBOX_ALLOW_INSECURE_CRYPTO",
            &var("LOCKBOX_ALLOW_INSECURE_CRYPTO", "false"),
        )?;

        let conversation_policy = if parse_bool(
            "LOCKBOX_STRICT_CONVERSATIONS",
            &var("LOCKBOX_STRICT_CONVERSATIONS", "false"),
        )? {
            ConversationPolicy::Strict
        } else {
            ConversationPolicy::Open
        };

        let push_timeout = match lookup("LOCKBOX_PUSH_TIMEOUT_MS") {
            Some(raw) => {
                let ms: u64 = raw
                    .parse()
                    .context("LOCKBOX_PUSH_TIMEOUT_MS must be a whole number of milliseconds")?;
                if ms == 0 {
                    bail!("LOCKBOX_PUSH_TIMEOUT_MS must be greater than zero");
                }
                Duration::from_millis(ms)
            }
            None => DEFAULT_PUSH_TIMEOUT,
        };

        Ok(Self {
            addr,
            db_path: var("LOCKBOX_DB_PATH", "lockbox.db").into(),
            jwt_secret,
            crypto_provider,
            allow_insecure_crypto,
            conversation_policy,
            push_timeout,
        })
    }
}

fn parse_bool(key: &str, raw: &str) -> anyhow::Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("{} must be true or false, got '{}'", key, other),
    }
}
