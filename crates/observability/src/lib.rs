// crates/observability/src/lib.rs
//! Logging and error reporting setup shared by Thalia binaries.
//!
//! `init` installs a `tracing` registry with an env-driven filter, a text or
//! JSON formatter, and, when a Sentry DSN is configured, a Sentry layer.
//! `error!` events (exhausted reconnects, poisoned locks) become Sentry
//! events; `warn!` events such as individual socket failures are attached
//! to them as breadcrumbs.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "warn,thalia_channel=info,thalia_jobs=info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilityConfig {
    pub default_filter: String,
    /// Emit newline-delimited JSON instead of human-readable lines.
    pub json: bool,
    /// SENTRY_DSN env var. None = Sentry disabled.
    pub sentry_dsn: Option<String>,
    pub environment: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            default_filter: DEFAULT_FILTER.to_string(),
            json: false,
            sentry_dsn: None,
            environment: None,
        }
    }
}

impl ObservabilityConfig {
    /// Read `THALIA_LOG_JSON`, `SENTRY_DSN` and `SENTRY_ENVIRONMENT`.
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let json = lookup("THALIA_LOG_JSON")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let non_empty = |v: String| (!v.trim().is_empty()).then_some(v);
        Self {
            json,
            sentry_dsn: lookup("SENTRY_DSN").and_then(non_empty),
            environment: lookup("SENTRY_ENVIRONMENT").and_then(non_empty),
            ..Self::default()
        }
    }
}

/// Keeps the Sentry client alive; events are flushed when dropped.
#[must_use = "dropping the guard disables error reporting"]
pub struct ObservabilityGuard {
    sentry: Option<sentry::ClientInitGuard>,
}

impl ObservabilityGuard {
    pub fn sentry_enabled(&self) -> bool {
        self.sentry.as_ref().is_some_and(|g| g.is_enabled())
    }
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &ObservabilityConfig) -> anyhow::Result<ObservabilityGuard> {
    let sentry_guard = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                environment: config.environment.clone().map(Into::into),
                ..Default::default()
            },
        ))
    });

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let (json_layer, text_layer) = if config.json {
        (Some(tracing_subscriber::fmt::layer().json()), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer().with_target(true)))
    };
    let sentry_layer = sentry_guard.as_ref().map(|_| sentry_tracing::layer());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_layer)
        .try_init()?;

    tracing::debug!(
        json = config.json,
        sentry = sentry_guard.is_some(),
        "observability initialized"
    );

    Ok(ObservabilityGuard {
        sentry: sentry_guard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_without_env() {
        let config = ObservabilityConfig::from_vars(|_| None);
        assert_eq!(config, ObservabilityConfig::default());
        assert_eq!(config.default_filter, DEFAULT_FILTER);
    }

    #[test]
    fn test_json_flag_and_sentry() {
        let config = ObservabilityConfig::from_vars(|name| match name {
            "THALIA_LOG_JSON" => Some("TRUE".into()),
            "SENTRY_DSN" => Some("https://key@sentry.example.com/1".into()),
            "SENTRY_ENVIRONMENT" => Some("  ".into()),
            _ => None,
        });
        assert!(config.json);
        assert_eq!(
            config.sentry_dsn.as_deref(),
            Some("https://key@sentry.example.com/1")
        );
        assert_eq!(config.environment, None);
    }

    #[test]
    fn test_init_twice_fails() {
        let config = ObservabilityConfig::default();
        let first = init(&config);
        assert!(first.is_ok());
        assert!(!first.unwrap().sentry_enabled());
        assert!(init(&config).is_err());
    }
}
