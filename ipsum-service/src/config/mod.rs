use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

/// Value shipped in the sample `.env`; treated the same as no key at all.
pub const API_KEY_PLACEHOLDER: &str = "your_mistral_api_key_here";

const DEFAULT_MISTRAL_API_URL: &str = "https://api.mistral.ai/v1";
const DEFAULT_MISTRAL_MODEL: &str = "mistral-large-latest";
const DEFAULT_UPSTREAM_TIMEOUT_SECONDS: u64 = 120;

/// 50 requests per IP every 15 minutes.
const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 50;
const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: u64 = 15 * 60;

#[derive(Debug, Clone)]
pub struct IpsumConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub upstream: UpstreamConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Test,
    Prod,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "test" => Ok(Environment::Test),
            "prod" | "production" => Ok(Environment::Prod),
            other => Err(format!("Unknown environment: {}", other)),
        }
    }
}

/// Chat-completion provider settings.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Empty when not configured; requests then fail with a configuration error.
    pub api_key: Secret<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests: u32,
    pub window_seconds: u64,
    /// Key clients on `X-Forwarded-For` instead of the socket peer.
    pub trust_proxy: bool,
}

impl IpsumConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let environment: Environment = env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "dev".to_string())
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;
        let is_prod = environment == Environment::Prod;

        Ok(IpsumConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("ipsum-service"), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            upstream: UpstreamConfig {
                // A missing key is not fatal: health reports it and
                // generation answers with a configuration error.
                api_key: Secret::new(env::var("MISTRAL_API_KEY").unwrap_or_default()),
                base_url: get_env("MISTRAL_API_URL", Some(DEFAULT_MISTRAL_API_URL), is_prod)?,
                model: get_env("MISTRAL_MODEL", Some(DEFAULT_MISTRAL_MODEL), is_prod)?,
                timeout_seconds: parse_env(
                    "MISTRAL_TIMEOUT_SECONDS",
                    DEFAULT_UPSTREAM_TIMEOUT_SECONDS,
                    is_prod,
                )?,
            },
            security: SecurityConfig {
                allowed_origins: parse_origins(&get_env(
                    "APP_URL",
                    Some("http://localhost:4200"),
                    is_prod,
                )?),
            },
            rate_limit: RateLimitConfig {
                requests: parse_env("RATE_LIMIT_REQUESTS", DEFAULT_RATE_LIMIT_REQUESTS, is_prod)?,
                window_seconds: parse_env(
                    "RATE_LIMIT_WINDOW_SECONDS",
                    DEFAULT_RATE_LIMIT_WINDOW_SECONDS,
                    is_prod,
                )?,
                trust_proxy: parse_env("TRUST_PROXY", false, false)?,
            },
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: T, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr + ToString,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(&default.to_string()), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("Invalid {}: {}", key, e)))
}

/// `APP_URL` may list several origins separated by commas.
fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_environment_names() {
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Prod);
        assert_eq!("Development".parse::<Environment>().unwrap(), Environment::Dev);
        assert!("staging".parse::<Environment>().is_err());
    }

    #[test]
    fn splits_origin_list() {
        assert_eq!(
            parse_origins("http://a.test, http://b.test,,"),
            vec!["http://a.test".to_string(), "http://b.test".to_string()]
        );
    }

    #[test]
    fn default_used_outside_prod() {
        let value = get_env("IPSUM_TEST_SURELY_UNSET_VAR", Some("fallback"), false).unwrap();
        assert_eq!(value, "fallback");
    }

    #[test]
    fn missing_var_fails_in_prod() {
        let err = get_env("IPSUM_TEST_SURELY_UNSET_VAR", Some("fallback"), true).unwrap_err();
        assert!(matches!(err, AppError::ConfigError(_)));
    }

    #[test]
    fn parse_env_falls_back_to_typed_default() {
        let value: u32 = parse_env("IPSUM_TEST_SURELY_UNSET_NUMBER", 50, false).unwrap();
        assert_eq!(value, 50);
    }
}
