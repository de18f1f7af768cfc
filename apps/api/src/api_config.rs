use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use ipnet::IpNet;
use tracing_subscriber::EnvFilter;
use warden_core::{AppError, PrincipalId};

#[derive(Debug, Clone)]
pub struct SmtpRuntimeConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

#[derive(Debug, Clone)]
pub enum EmailProviderConfig {
    Console,
    Smtp(SmtpRuntimeConfig),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres { database_url: String },
    Memory,
}

/// Principal and session seeded into the in-memory identity directory.
#[derive(Debug, Clone)]
pub struct DevSeedConfig {
    pub email: String,
    pub session_token: String,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub migrate_only: bool,
    pub store_backend: StoreBackend,
    pub identity_provider_url: Option<String>,
    pub identity_provider_timeout: Duration,
    pub api_host: String,
    pub api_port: u16,
    pub public_base_url: String,
    pub invitation_ttl_hours: i64,
    pub guard_timeout: Duration,
    pub audit_allowed_sample_rate: f64,
    pub trusted_proxies: Vec<IpNet>,
    pub bootstrap_system_admin_id: Option<PrincipalId>,
    pub email_provider: EmailProviderConfig,
    pub dev_seed: Option<DevSeedConfig>,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");

        let store_backend = match env::var("STORE_BACKEND")
            .unwrap_or_else(|_| "postgres".to_owned())
            .as_str()
        {
            "postgres" => StoreBackend::Postgres {
                database_url: required_non_empty_env("DATABASE_URL")?,
            },
            "memory" => StoreBackend::Memory,
            other => {
                return Err(AppError::Validation(format!(
                    "STORE_BACKEND must be either 'postgres' or 'memory', got '{other}'"
                )));
            }
        };
        if migrate_only && store_backend == StoreBackend::Memory {
            return Err(AppError::Validation(
                "migrate requires STORE_BACKEND=postgres".to_owned(),
            ));
        }

        let identity_provider_url = optional_env("IDENTITY_PROVIDER_URL");
        if identity_provider_url.is_none() && matches!(store_backend, StoreBackend::Postgres { .. })
        {
            return Err(AppError::Validation(
                "IDENTITY_PROVIDER_URL is required with the postgres backend".to_owned(),
            ));
        }

        let identity_provider_timeout =
            Duration::from_millis(parsed_env("IDENTITY_PROVIDER_TIMEOUT_MS", 1_500_u64)?);
        let api_host = env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
        let api_port = parsed_env("API_PORT", 3001_u16)?;
        let public_base_url = env::var("PUBLIC_BASE_URL")
            .unwrap_or_else(|_| "http://localhost:3000".to_owned())
            .trim_end_matches('/')
            .to_owned();

        let invitation_ttl_hours = parsed_env("INVITATION_TTL_HOURS", 168_i64)?;
        if invitation_ttl_hours <= 0 {
            return Err(AppError::Validation(
                "INVITATION_TTL_HOURS must be positive".to_owned(),
            ));
        }

        let guard_timeout = Duration::from_millis(parsed_env("GUARD_TIMEOUT_MS", 2_000_u64)?);
        let audit_allowed_sample_rate =
            parse_sample_rate(&env::var("AUDIT_ALLOWED_SAMPLE_RATE").unwrap_or_default())?;
        let trusted_proxies =
            parse_trusted_proxies(&env::var("TRUSTED_PROXY_CIDRS").unwrap_or_default())?;
        let bootstrap_system_admin_id = optional_env("BOOTSTRAP_SYSTEM_ADMIN_ID")
            .map(|value| PrincipalId::parse(&value))
            .transpose()?;

        let email_provider = match env::var("EMAIL_PROVIDER")
            .unwrap_or_else(|_| "console".to_owned())
            .as_str()
        {
            "console" => EmailProviderConfig::Console,
            "smtp" => {
                let port = required_non_empty_env("SMTP_PORT")?
                    .parse::<u16>()
                    .map_err(|error| AppError::Validation(format!("invalid SMTP_PORT: {error}")))?;
                EmailProviderConfig::Smtp(SmtpRuntimeConfig {
                    host: required_non_empty_env("SMTP_HOST")?,
                    port,
                    username: required_non_empty_env("SMTP_USERNAME")?,
                    password: required_non_empty_env("SMTP_PASSWORD")?,
                    from_address: required_non_empty_env("SMTP_FROM_ADDRESS")?,
                })
            }
            other => {
                return Err(AppError::Validation(format!(
                    "EMAIL_PROVIDER must be either 'console' or 'smtp', got '{other}'"
                )));
            }
        };

        let dev_seed = match (
            optional_env("DEV_SEED_EMAIL"),
            optional_env("DEV_SEED_SESSION_TOKEN"),
        ) {
            (Some(email), Some(session_token)) => Some(DevSeedConfig {
                email,
                session_token,
            }),
            (None, None) => None,
            _ => {
                return Err(AppError::Validation(
                    "DEV_SEED_EMAIL and DEV_SEED_SESSION_TOKEN must be set together".to_owned(),
                ));
            }
        };
        if dev_seed.is_some() && identity_provider_url.is_some() {
            return Err(AppError::Validation(
                "DEV_SEED_* only applies to the in-memory identity directory".to_owned(),
            ));
        }

        Ok(Self {
            migrate_only,
            store_backend,
            identity_provider_url,
            identity_provider_timeout,
            api_host,
            api_port,
            public_base_url,
            invitation_ttl_hours,
            guard_timeout,
            audit_allowed_sample_rate,
            trusted_proxies,
            bootstrap_system_admin_id,
            email_provider,
            dev_seed,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

/// Parses a comma separated list of CIDR networks; bare addresses are host routes.
pub fn parse_trusted_proxies(value: &str) -> Result<Vec<IpNet>, AppError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            IpNet::from_str(entry)
                .or_else(|_| IpAddr::from_str(entry).map(IpNet::from))
                .map_err(|error| {
                    AppError::Validation(format!("invalid TRUSTED_PROXY_CIDRS entry '{entry}': {error}"))
                })
        })
        .collect()
}

/// Parses the allowed-decision sample rate; empty means "audit everything".
pub fn parse_sample_rate(value: &str) -> Result<f64, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(1.0);
    }

    let rate = value.parse::<f64>().map_err(|error| {
        AppError::Validation(format!("invalid AUDIT_ALLOWED_SAMPLE_RATE '{value}': {error}"))
    })?;
    if !(0.0..=1.0).contains(&rate) {
        return Err(AppError::Validation(format!(
            "AUDIT_ALLOWED_SAMPLE_RATE must be between 0.0 and 1.0, got {rate}"
        )));
    }

    Ok(rate)
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parsed_env<T>(name: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_env(name) {
        Some(value) => value
            .parse::<T>()
            .map_err(|error| AppError::Validation(format!("invalid {name} '{value}': {error}"))),
        None => Ok(default),
    }
}

fn required_env(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn required_non_empty_env(name: &str) -> Result<String, AppError> {
    let value = required_env(name)?;
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("{name} must not be empty")));
    }

    Ok(value)
}
