use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use nova_api::context::{ContextConfig, DEFAULT_EXCERPT_CHARS, DEFAULT_PERSONA, DEFAULT_UPLOAD_MARKER};
use nova_provider::completions::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use nova_provider::{ProviderConfig, SamplingParams};

/// Session secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "your-secret-key",
    "your_secret_key_here",
];

const DEFAULT_MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is not set")]
    Missing(&'static str),

    #[error("{0} is still a placeholder")]
    Placeholder(&'static str),

    #[error("{name} has an invalid value '{value}'")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub static_dir: PathBuf,
    pub secret_key: String,
    pub max_upload_bytes: usize,
    pub provider: ProviderConfig,
    pub sampling: SamplingParams,
    pub context: ContextConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source; `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let api_key = var("NOVA_API_KEY")
            .or_else(|| var("PERPLEXITY_API_KEY"))
            .ok_or(ConfigError::Missing("NOVA_API_KEY"))?;

        let secret_key = var("NOVA_SECRET_KEY")
            .or_else(|| var("SECRET_KEY"))
            .ok_or(ConfigError::Missing("NOVA_SECRET_KEY"))?;
        if PLACEHOLDER_SECRETS.contains(&secret_key.as_str()) {
            return Err(ConfigError::Placeholder("NOVA_SECRET_KEY"));
        }

        let timeout = parse_opt::<u64>("NOVA_PROVIDER_TIMEOUT_SECS", var("NOVA_PROVIDER_TIMEOUT_SECS"))?
            .map(Duration::from_secs);

        let provider = ProviderConfig {
            base_url: var("NOVA_PROVIDER_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into()),
            api_key,
            model: var("NOVA_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into()),
            timeout,
            max_retries: parse_or("NOVA_PROVIDER_MAX_RETRIES", var("NOVA_PROVIDER_MAX_RETRIES"), 0)?,
        };

        let defaults = SamplingParams::default();
        let sampling = SamplingParams {
            temperature: parse_or("NOVA_TEMPERATURE", var("NOVA_TEMPERATURE"), defaults.temperature)?,
            top_p: parse_or("NOVA_TOP_P", var("NOVA_TOP_P"), defaults.top_p)?,
            presence_penalty: parse_or(
                "NOVA_PRESENCE_PENALTY",
                var("NOVA_PRESENCE_PENALTY"),
                defaults.presence_penalty,
            )?,
            frequency_penalty: parse_or(
                "NOVA_FREQUENCY_PENALTY",
                var("NOVA_FREQUENCY_PENALTY"),
                defaults.frequency_penalty,
            )?,
        };

        let context = ContextConfig {
            persona: var("NOVA_PERSONA").unwrap_or_else(|| DEFAULT_PERSONA.into()),
            include_documents: parse_bool("NOVA_INCLUDE_DOCUMENTS", var("NOVA_INCLUDE_DOCUMENTS"), true)?,
            excerpt_chars: parse_or("NOVA_EXCERPT_CHARS", var("NOVA_EXCERPT_CHARS"), DEFAULT_EXCERPT_CHARS)?,
            upload_marker: DEFAULT_UPLOAD_MARKER.into(),
            merge_consecutive_roles: parse_bool(
                "NOVA_MERGE_CONSECUTIVE_ROLES",
                var("NOVA_MERGE_CONSECUTIVE_ROLES"),
                false,
            )?,
        };

        Ok(Self {
            host: var("NOVA_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or("PORT", var("PORT"), 5000)?,
            db_path: var("NOVA_DB_PATH").unwrap_or_else(|| "chats.db".into()).into(),
            static_dir: var("NOVA_STATIC_DIR").unwrap_or_else(|| "static".into()).into(),
            secret_key,
            max_upload_bytes: parse_or(
                "NOVA_MAX_UPLOAD_BYTES",
                var("NOVA_MAX_UPLOAD_BYTES"),
                DEFAULT_MAX_UPLOAD_BYTES,
            )?,
            provider,
            sampling,
            context,
        })
    }
}

fn parse_opt<T: FromStr>(name: &'static str, raw: Option<String>) -> Result<Option<T>, ConfigError> {
    raw.map(|value| {
        value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value })
    })
    .transpose()
}

fn parse_or<T: FromStr>(name: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    Ok(parse_opt(name, raw)?.unwrap_or(default))
}

fn parse_bool(name: &'static str, raw: Option<String>, default: bool) -> Result<bool, ConfigError> {
    match raw.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(_) => Err(ConfigError::Invalid {
            name,
            value: raw.unwrap_or_default(),
        }),
    }
}

/// 32 random bytes, hex encoded.
pub fn generate_secret() -> String {
    let bytes: [u8; 32] = rand::random();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn defaults_apply_with_only_secrets_set() {
        let config = load(&[("NOVA_API_KEY", "pplx-abc"), ("NOVA_SECRET_KEY", "s3cr3t")]).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.db_path, PathBuf::from("chats.db"));
        assert_eq!(config.provider.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.provider.max_retries, 0);
        assert!(config.provider.timeout.is_none());
        assert_eq!(config.sampling, SamplingParams::default());
        assert_eq!(config.context.excerpt_chars, 1000);
        assert!(config.context.include_documents);
        assert!(!config.context.merge_consecutive_roles);
        assert_eq!(config.max_upload_bytes, 16 * 1024 * 1024);
    }

    #[test]
    fn missing_api_key_fails_fast() {
        let err = load(&[("NOVA_SECRET_KEY", "s3cr3t")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("NOVA_API_KEY")));

        let err = load(&[("NOVA_API_KEY", "  "), ("NOVA_SECRET_KEY", "s3cr3t")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("NOVA_API_KEY")));
    }

    #[test]
    fn legacy_names_are_accepted() {
        let config = load(&[("PERPLEXITY_API_KEY", "pplx-abc"), ("SECRET_KEY", "s3cr3t")]).unwrap();
        assert_eq!(config.provider.api_key, "pplx-abc");
        assert_eq!(config.secret_key, "s3cr3t");
    }

    #[test]
    fn placeholder_secret_is_rejected() {
        let err = load(&[("NOVA_API_KEY", "k"), ("NOVA_SECRET_KEY", "dev-secret-change-me")]).unwrap_err();
        assert!(matches!(err, ConfigError::Placeholder(_)));
    }

    #[test]
    fn overrides_and_invalid_values() {
        let config = load(&[
            ("NOVA_API_KEY", "k"),
            ("NOVA_SECRET_KEY", "s"),
            ("PORT", "8080"),
            ("NOVA_PROVIDER_TIMEOUT_SECS", "30"),
            ("NOVA_PROVIDER_MAX_RETRIES", "2"),
            ("NOVA_TEMPERATURE", "0.2"),
            ("NOVA_INCLUDE_DOCUMENTS", "off"),
            ("NOVA_MERGE_CONSECUTIVE_ROLES", "true"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.provider.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.provider.max_retries, 2);
        assert_eq!(config.sampling.temperature, 0.2);
        assert!(!config.context.include_documents);
        assert!(config.context.merge_consecutive_roles);

        let err = load(&[("NOVA_API_KEY", "k"), ("NOVA_SECRET_KEY", "s"), ("PORT", "http")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "PORT", .. }));
    }

    #[test]
    fn generated_secret_is_64_hex_chars() {
        let secret = generate_secret();
        assert_eq!(secret.len(), 64);
        assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(secret, generate_secret());
    }
}
