use config::{Config, File};
use serde::Deserialize;
use std::env;

/// TTL for a lock entry, matching the reference value from the lock engine design.
pub const DEFAULT_LOCK_TTL_MS: i64 = 300_000;

/// Minimum interval between remote HEAD checks within a single graph read.
pub const DEFAULT_HEAD_CHECK_MIN_INTERVAL_MS: i64 = 20_000;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub kv: KvConfig,
    pub remote: RemoteConfig,
    pub sweeper: SweeperConfig,
    pub lock: LockConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KvConfig {
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

fn default_pool_size() -> u32 {
    8
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteConfig {
    pub api_base: String,
    pub token: Option<String>,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_head_check_min_interval_ms")]
    pub head_check_min_interval_ms: i64,
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_head_check_min_interval_ms() -> i64 {
    DEFAULT_HEAD_CHECK_MIN_INTERVAL_MS
}

#[derive(Debug, Deserialize, Clone)]
pub struct SweeperConfig {
    pub shared_secret: String,
    #[serde(default = "default_sweeper_interval_ms")]
    pub interval_ms: u64,
}

fn default_sweeper_interval_ms() -> u64 {
    60_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct LockConfig {
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: i64,
}

fn default_ttl_ms() -> i64 {
    DEFAULT_LOCK_TTL_MS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
            },
            kv: KvConfig {
                url: "redis://127.0.0.1:6379".to_string(),
                pool_size: default_pool_size(),
            },
            remote: RemoteConfig {
                api_base: "https://api.github.com".to_string(),
                token: None,
                request_timeout_ms: default_request_timeout_ms(),
                head_check_min_interval_ms: default_head_check_min_interval_ms(),
            },
            sweeper: SweeperConfig {
                shared_secret: "change-me".to_string(),
                interval_ms: default_sweeper_interval_ms(),
            },
            lock: LockConfig {
                default_ttl_ms: default_ttl_ms(),
            },
        }
    }
}

impl AppConfig {
    /// Load configuration with 12-factor app compliant env var support.
    ///
    /// Priority order (highest to lowest):
    /// 1. `PORT` / `HOST` / `KV_URL` / `REMOTE_API_BASE` / `REMOTE_TOKEN` /
    ///    `SWEEPER_SHARED_SECRET` / `LOCK_TTL_MS` env vars
    /// 2. Config files (`config/default.toml`, `config/{run_mode}.toml`)
    /// 3. Hardcoded defaults (port 8080, in-memory-friendly TTLs)
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());
        let defaults = Self::default();

        let mut builder = Config::builder()
            .set_default("server.host", defaults.server.host)?
            .set_default("server.port", i64::from(defaults.server.port))?
            .set_default("kv.url", defaults.kv.url)?
            .set_default("kv.pool_size", i64::from(defaults.kv.pool_size))?
            .set_default("remote.api_base", defaults.remote.api_base)?
            .set_default(
                "remote.request_timeout_ms",
                defaults.remote.request_timeout_ms as i64,
            )?
            .set_default(
                "remote.head_check_min_interval_ms",
                defaults.remote.head_check_min_interval_ms,
            )?
            .set_default("sweeper.shared_secret", defaults.sweeper.shared_secret)?
            .set_default("sweeper.interval_ms", defaults.sweeper.interval_ms as i64)?
            .set_default("lock.default_ttl_ms", defaults.lock.default_ttl_ms)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false));

        // 12-factor app standard: PORT and HOST env vars
        if let Ok(port) = env::var("PORT") {
            if let Ok(p) = port.parse::<i64>() {
                builder = builder.set_override("server.port", p)?;
            }
        }
        if let Ok(host) = env::var("HOST") {
            builder = builder.set_override("server.host", host)?;
        }
        if let Ok(url) = env::var("KV_URL") {
            builder = builder.set_override("kv.url", url)?;
        }
        if let Ok(api_base) = env::var("REMOTE_API_BASE") {
            builder = builder.set_override("remote.api_base", api_base)?;
        }
        if let Ok(token) = env::var("REMOTE_TOKEN") {
            builder = builder.set_override("remote.token", token)?;
        }
        if let Ok(secret) = env::var("SWEEPER_SHARED_SECRET") {
            builder = builder.set_override("sweeper.shared_secret", secret)?;
        }
        if let Ok(ttl) = env::var("LOCK_TTL_MS") {
            if let Ok(ms) = ttl.parse::<i64>() {
                builder = builder.set_override("lock.default_ttl_ms", ms)?;
            }
        }

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_reference_ttl() {
        let config = AppConfig::default();
        assert_eq!(config.lock.default_ttl_ms, 300_000);
    }

    #[test]
    fn load_honors_port_and_host_env_overrides() {
        // SAFETY: test-only, single-threaded execution within this test function.
        unsafe {
            std::env::set_var("PORT", "9999");
            std::env::set_var("HOST", "127.0.0.1");
        }
        let config = AppConfig::load().expect("config loads with env overrides");
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.host, "127.0.0.1");
        unsafe {
            std::env::remove_var("PORT");
            std::env::remove_var("HOST");
        }
    }
}
