use std::{str::FromStr, time::Duration};

use anyhow::Context;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    Postgres,
    Memory,
}

impl FromStr for SessionBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "memory" | "mem" => Ok(Self::Memory),
            other => anyhow::bail!("unknown session backend {other:?}"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Cookie name carrying the session id.
    pub name: String,
    pub ttl_secs: u64,
    pub backend: SessionBackend,
    pub csrf_secret: String,
}

/// Upper bound on `SESSION_TTL_SECS`: one year.
pub const MAX_SESSION_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// RFC 6265 cookie-name token: visible ASCII minus separators.
fn is_cookie_name(name: &str) -> bool {
    !name.is_empty()
        && name.bytes().all(|b| {
            b.is_ascii_graphic() && !b"()<>@,;:\\\"/[]?={}".contains(&b)
        })
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            is_cookie_name(&self.name),
            "SESSION_NAME {:?} is not a valid cookie name",
            self.name
        );
        anyhow::ensure!(
            (1..=MAX_SESSION_TTL_SECS).contains(&self.ttl_secs),
            "SESSION_TTL_SECS must be within 1..={MAX_SESSION_TTL_SECS}"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    pub secure: bool,
    pub http_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    pub default_size: i64,
    pub max_size: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinioConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub session: SessionConfig,
    pub cookie: CookieConfig,
    pub pagination: PaginationConfig,
    pub minio: MinioConfig,
    pub request_timeout_secs: u64,
    /// Account that is registered as, or promoted to, admin.
    pub admin_email: Option<String>,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL")?;

        let session = SessionConfig {
            name: std::env::var("SESSION_NAME").unwrap_or_else(|_| "session-id".into()),
            ttl_secs: env_or("SESSION_TTL_SECS", 60 * 60 * 24),
            backend: match std::env::var("SESSION_BACKEND") {
                Ok(v) => v.parse()?,
                Err(_) => SessionBackend::Postgres,
            },
            csrf_secret: std::env::var("CSRF_SECRET").context("CSRF_SECRET")?,
        };
        session.validate()?;

        let cookie = CookieConfig {
            secure: env_or("COOKIE_SECURE", true),
            http_only: env_or("COOKIE_HTTP_ONLY", true),
        };

        let pagination = PaginationConfig {
            default_size: env_or("PAGINATION_DEFAULT_SIZE", 10),
            max_size: env_or("PAGINATION_MAX_SIZE", 100),
        };
        anyhow::ensure!(
            pagination.default_size >= 1 && pagination.default_size <= pagination.max_size,
            "PAGINATION_DEFAULT_SIZE must be within 1..=PAGINATION_MAX_SIZE"
        );

        let minio = MinioConfig {
            endpoint: std::env::var("MINIO_ENDPOINT").context("MINIO_ENDPOINT")?,
            bucket: std::env::var("MINIO_BUCKET").unwrap_or_else(|_| "avatars".into()),
            access_key: std::env::var("MINIO_ACCESS_KEY").context("MINIO_ACCESS_KEY")?,
            secret_key: std::env::var("MINIO_SECRET_KEY").context("MINIO_SECRET_KEY")?,
            region: std::env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".into()),
        };

        Ok(Self {
            database_url,
            session,
            cookie,
            pagination,
            minio,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 5),
            admin_email: std::env::var("ADMIN_EMAIL")
                .ok()
                .map(|e| e.trim().to_lowercase())
                .filter(|e| !e.is_empty()),
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_session_backend() {
        assert_eq!("postgres".parse::<SessionBackend>().unwrap(), SessionBackend::Postgres);
        assert_eq!(" Memory ".parse::<SessionBackend>().unwrap(), SessionBackend::Memory);
        assert!("redis".parse::<SessionBackend>().is_err());
    }

    fn session(name: &str, ttl_secs: u64) -> SessionConfig {
        SessionConfig {
            name: name.into(),
            ttl_secs,
            backend: SessionBackend::Memory,
            csrf_secret: String::new(),
        }
    }

    #[test]
    fn session_ttl_is_bounded() {
        assert!(session("session-id", 3600).validate().is_ok());
        assert!(session("session-id", MAX_SESSION_TTL_SECS).validate().is_ok());
        assert!(session("session-id", 0).validate().is_err());
        assert!(session("session-id", MAX_SESSION_TTL_SECS + 1).validate().is_err());
        assert!(session("session-id", u64::MAX).validate().is_err());
    }

    #[test]
    fn session_name_must_be_cookie_token() {
        assert!(session("sid_v2", 60).validate().is_ok());
        for bad in ["", "a;b", "a=b", "has space", "quo\"te", "t\tab", "ünï"] {
            assert!(session(bad, 60).validate().is_err(), "{bad:?}");
        }
    }
}
