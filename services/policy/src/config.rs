use crate::bundle::CompilerSettings;
use crate::store::StoreConfig;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use warden_authz::{DEFAULT_BUNDLE_NAME, validate_name};

pub const DEFAULT_BIND: &str = "0.0.0.0:8443";
pub const DEFAULT_METRICS_BIND: &str = "0.0.0.0:8080";
pub const DEFAULT_CHANGES_LIMIT: u64 = 1000;
pub const DEFAULT_CHANGE_RETENTION_MAX_ROWS: i64 = 10_000;
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_BUNDLE_DEBOUNCE_MS: u64 = 250;
pub const DEFAULT_BUNDLE_RETRY_INITIAL_MS: u64 = 100;
pub const DEFAULT_BUNDLE_RETRY_MAX_MS: u64 = 30_000;
pub const DEFAULT_RESOLVER_CACHE_CAPACITY: usize = 10_000;
/// Largest accepted `changes_limit` and `change_retention_max_rows`.
pub const MAX_CHANGE_WINDOW: u64 = 1_000_000;

/// A named bundle the compiler publishes; `namespace: None` means global.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BundleTarget {
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
}

impl BundleTarget {
    pub fn global(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
        }
    }

    pub fn scoped(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: Some(namespace.into()),
        }
    }
}

// Policy service configuration sourced from environment variables, optionally
// overridden by a YAML file.
#[derive(Debug, Clone)]
pub struct PolicyServiceConfig {
    pub bind_addr: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub store_timeout_ms: u64,
    pub bundle_debounce_ms: u64,
    pub bundle_retry_initial_ms: u64,
    pub bundle_retry_max_ms: u64,
    pub strict_rule_validation: bool,
    pub changes_limit: u64,
    pub change_retention_max_rows: Option<i64>,
    pub resolver_cache_capacity: usize,
    /// Extra bundle targets; the global `authz` bundle always exists.
    pub bundles: Vec<BundleTarget>,
}

#[derive(Debug, Deserialize)]
struct PolicyServiceConfigOverride {
    bind_addr: Option<String>,
    metrics_bind: Option<String>,
    store_timeout_ms: Option<u64>,
    bundle_debounce_ms: Option<u64>,
    bundle_retry_initial_ms: Option<u64>,
    bundle_retry_max_ms: Option<u64>,
    strict_rule_validation: Option<bool>,
    changes_limit: Option<u64>,
    change_retention_max_rows: Option<i64>,
    resolver_cache_capacity: Option<usize>,
    bundles: Option<Vec<BundleTarget>>,
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("parse {key}")),
        Err(_) => Ok(default),
    }
}

/// Boolean switch from the environment. Accepts `true`/`false`, `1`/`0`,
/// `yes`/`no` and `on`/`off`, case-insensitively.
fn env_flag(key: &str, default: bool) -> Result<bool> {
    let Ok(value) = std::env::var(key) else {
        return Ok(default);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => bail!("parse {key}: expected true/false, 1/0, yes/no or on/off, got {other:?}"),
    }
}

impl Default for PolicyServiceConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8443)),
            metrics_bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            store_timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
            bundle_debounce_ms: DEFAULT_BUNDLE_DEBOUNCE_MS,
            bundle_retry_initial_ms: DEFAULT_BUNDLE_RETRY_INITIAL_MS,
            bundle_retry_max_ms: DEFAULT_BUNDLE_RETRY_MAX_MS,
            strict_rule_validation: false,
            changes_limit: DEFAULT_CHANGES_LIMIT,
            change_retention_max_rows: Some(DEFAULT_CHANGE_RETENTION_MAX_ROWS),
            resolver_cache_capacity: DEFAULT_RESOLVER_CACHE_CAPACITY,
            bundles: Vec::new(),
        }
    }
}

impl PolicyServiceConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let bind_addr = std::env::var("WARDEN_BIND")
            .unwrap_or_else(|_| DEFAULT_BIND.to_string())
            .parse()
            .with_context(|| "parse WARDEN_BIND")?;
        let metrics_bind = std::env::var("WARDEN_METRICS_BIND")
            .unwrap_or_else(|_| DEFAULT_METRICS_BIND.to_string())
            .parse()
            .with_context(|| "parse WARDEN_METRICS_BIND")?;
        let config = Self {
            bind_addr,
            metrics_bind,
            store_timeout_ms: env_or("WARDEN_STORE_TIMEOUT_MS", defaults.store_timeout_ms)?,
            bundle_debounce_ms: env_or("WARDEN_BUNDLE_DEBOUNCE_MS", defaults.bundle_debounce_ms)?,
            bundle_retry_max_ms: env_or(
                "WARDEN_BUNDLE_RETRY_MAX_MS",
                defaults.bundle_retry_max_ms,
            )?,
            strict_rule_validation: env_flag("WARDEN_STRICT_RULES", false)?,
            changes_limit: env_or("WARDEN_CHANGES_LIMIT", defaults.changes_limit)?,
            ..defaults
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_env()?;
        if let Ok(path) = std::env::var("WARDEN_CONFIG") {
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read WARDEN_CONFIG: {path}"))?;
            let override_cfg: PolicyServiceConfigOverride = serde_yaml::from_str(&contents)
                .with_context(|| "parse policy service config yaml")?;
            config.apply(override_cfg)?;
            config.validate()?;
        }
        Ok(config)
    }

    fn apply(&mut self, override_cfg: PolicyServiceConfigOverride) -> Result<()> {
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.store_timeout_ms {
            self.store_timeout_ms = value;
        }
        if let Some(value) = override_cfg.bundle_debounce_ms {
            self.bundle_debounce_ms = value;
        }
        if let Some(value) = override_cfg.bundle_retry_initial_ms {
            self.bundle_retry_initial_ms = value;
        }
        if let Some(value) = override_cfg.bundle_retry_max_ms {
            self.bundle_retry_max_ms = value;
        }
        if let Some(value) = override_cfg.strict_rule_validation {
            self.strict_rule_validation = value;
        }
        if let Some(value) = override_cfg.changes_limit {
            self.changes_limit = value;
        }
        if let Some(value) = override_cfg.change_retention_max_rows {
            self.change_retention_max_rows = Some(value);
        }
        if let Some(value) = override_cfg.resolver_cache_capacity {
            self.resolver_cache_capacity = value;
        }
        if let Some(bundles) = override_cfg.bundles {
            self.bundles = bundles;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.store_timeout_ms == 0 {
            bail!("store_timeout_ms must be positive");
        }
        if self.changes_limit == 0 || self.changes_limit > MAX_CHANGE_WINDOW {
            bail!(
                "changes_limit must be between 1 and {MAX_CHANGE_WINDOW}, got {}",
                self.changes_limit
            );
        }
        if let Some(rows) = self.change_retention_max_rows {
            if !(0..=MAX_CHANGE_WINDOW as i64).contains(&rows) {
                bail!(
                    "change_retention_max_rows must be between 0 and {MAX_CHANGE_WINDOW}, got {rows}"
                );
            }
        }
        if self.bundle_retry_initial_ms == 0 || self.bundle_retry_max_ms < self.bundle_retry_initial_ms
        {
            bail!(
                "bundle retry bounds invalid: initial {}ms, max {}ms",
                self.bundle_retry_initial_ms,
                self.bundle_retry_max_ms
            );
        }
        let mut seen = HashSet::new();
        for target in &self.bundles {
            validate_name("bundle name", &target.name)?;
            if let Some(namespace) = &target.namespace {
                validate_name("namespace", namespace)?;
            }
            if target.name == DEFAULT_BUNDLE_NAME && target.namespace.is_some() {
                bail!("bundle {DEFAULT_BUNDLE_NAME} is reserved for the global bundle");
            }
            if !seen.insert(target.name.as_str()) {
                bail!("bundle {} declared twice", target.name);
            }
        }
        Ok(())
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            changes_limit: self.changes_limit,
            change_retention_max_rows: self.change_retention_max_rows,
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn compiler_settings(&self) -> CompilerSettings {
        CompilerSettings {
            debounce: Duration::from_millis(self.bundle_debounce_ms),
            retry_initial: Duration::from_millis(self.bundle_retry_initial_ms),
            retry_max: Duration::from_millis(self.bundle_retry_max_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct EnvGuard {
        key: &'static str,
        prev: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let prev = std::env::var(key).ok();
            unsafe {
                std::env::set_var(key, value);
            }
            Self { key, prev }
        }

        fn unset(key: &'static str) -> Self {
            let prev = std::env::var(key).ok();
            unsafe {
                std::env::remove_var(key);
            }
            Self { key, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.prev {
                Some(value) => unsafe {
                    std::env::set_var(self.key, value);
                },
                None => unsafe {
                    std::env::remove_var(self.key);
                },
            }
        }
    }

    const KEYS: [&str; 8] = [
        "WARDEN_BIND",
        "WARDEN_METRICS_BIND",
        "WARDEN_STORE_TIMEOUT_MS",
        "WARDEN_BUNDLE_DEBOUNCE_MS",
        "WARDEN_BUNDLE_RETRY_MAX_MS",
        "WARDEN_STRICT_RULES",
        "WARDEN_CHANGES_LIMIT",
        "WARDEN_CONFIG",
    ];

    fn clear_env() -> Vec<EnvGuard> {
        KEYS.iter().copied().map(EnvGuard::unset).collect()
    }

    fn write_yaml(name: &str, contents: &str) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("warden-{}-{name}.yaml", std::process::id()));
        fs::write(&path, contents).expect("write yaml");
        path
    }

    #[test]
    #[serial]
    fn from_env_uses_defaults() {
        let _guards = clear_env();
        let config = PolicyServiceConfig::from_env().expect("config");
        assert_eq!(config.bind_addr, DEFAULT_BIND.parse().expect("addr"));
        assert_eq!(config.metrics_bind, DEFAULT_METRICS_BIND.parse().expect("addr"));
        assert_eq!(config.store_timeout(), Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS));
        assert!(!config.strict_rule_validation);
        assert!(config.bundles.is_empty());
    }

    #[test]
    #[serial]
    fn from_env_reads_overrides() {
        let _guards = clear_env();
        let _g1 = EnvGuard::set("WARDEN_BIND", "127.0.0.1:9000");
        let _g2 = EnvGuard::set("WARDEN_STORE_TIMEOUT_MS", "50");
        let _g3 = EnvGuard::set("WARDEN_STRICT_RULES", "true");
        let _g4 = EnvGuard::set("WARDEN_CHANGES_LIMIT", "5");
        let config = PolicyServiceConfig::from_env().expect("config");
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.store_timeout_ms, 50);
        assert!(config.strict_rule_validation);
        assert_eq!(config.store_config().changes_limit, 5);
    }

    #[test]
    #[serial]
    fn from_env_rejects_malformed_values() {
        let _guards = clear_env();
        let _g = EnvGuard::set("WARDEN_BUNDLE_DEBOUNCE_MS", "soon");
        let err = PolicyServiceConfig::from_env().expect_err("bad number");
        assert!(err.to_string().contains("WARDEN_BUNDLE_DEBOUNCE_MS"));
    }

    #[test]
    #[serial]
    fn yaml_overrides_env_and_declares_bundles() {
        let _guards = clear_env();
        let path = write_yaml(
            "bundles",
            "bind_addr: 127.0.0.1:7000\nstrict_rule_validation: true\nbundles:\n  - name: proj1-bundle\n    namespace: proj1\n  - name: everything\n",
        );
        let _g = EnvGuard::set("WARDEN_CONFIG", path.to_str().expect("path"));
        let config = PolicyServiceConfig::from_env_or_yaml().expect("config");
        assert_eq!(config.bind_addr.port(), 7000);
        assert!(config.strict_rule_validation);
        assert_eq!(
            config.bundles,
            vec![
                BundleTarget::scoped("proj1-bundle", "proj1"),
                BundleTarget::global("everything"),
            ]
        );
        let _ = fs::remove_file(path);
    }

    #[test]
    #[serial]
    fn yaml_rejects_reserved_or_duplicate_bundles() {
        let _guards = clear_env();
        let path = write_yaml("reserved", "bundles:\n  - name: authz\n    namespace: p\n");
        let _g = EnvGuard::set("WARDEN_CONFIG", path.to_str().expect("path"));
        assert!(PolicyServiceConfig::from_env_or_yaml().is_err());
        let _ = fs::remove_file(path);

        let path = write_yaml("duplicate", "bundles:\n  - name: b\n  - name: b\n");
        let _g = EnvGuard::set("WARDEN_CONFIG", path.to_str().expect("path"));
        let err = PolicyServiceConfig::from_env_or_yaml().expect_err("duplicate");
        assert!(err.to_string().contains("declared twice"));
        let _ = fs::remove_file(path);
    }

    #[test]
    fn validate_checks_retry_bounds() {
        let config = PolicyServiceConfig {
            bundle_retry_initial_ms: 500,
            bundle_retry_max_ms: 100,
            ..PolicyServiceConfig::default()
        };
        assert!(config.validate().is_err());
        PolicyServiceConfig::default().validate().expect("defaults valid");
    }

    #[test]
    fn validate_bounds_change_window() {
        let oversized = PolicyServiceConfig {
            changes_limit: u64::MAX,
            ..PolicyServiceConfig::default()
        };
        let err = oversized.validate().expect_err("limit too large");
        assert!(err.to_string().contains("changes_limit"));

        let negative = PolicyServiceConfig {
            change_retention_max_rows: Some(-5),
            ..PolicyServiceConfig::default()
        };
        assert!(negative.validate().is_err());

        PolicyServiceConfig {
            changes_limit: MAX_CHANGE_WINDOW,
            change_retention_max_rows: None,
            ..PolicyServiceConfig::default()
        }
        .validate()
        .expect("upper bound accepted");
    }

    #[test]
    #[serial]
    fn strict_rules_flag_accepts_common_spellings() {
        let _guards = clear_env();
        for (value, expected) in [("1", true), ("ON", true), ("yes", true), ("0", false), ("False", false)] {
            let _g = EnvGuard::set("WARDEN_STRICT_RULES", value);
            let config = PolicyServiceConfig::from_env().expect("config");
            assert_eq!(config.strict_rule_validation, expected, "WARDEN_STRICT_RULES={value}");
        }
        let _g = EnvGuard::set("WARDEN_STRICT_RULES", "maybe");
        let err = PolicyServiceConfig::from_env().expect_err("unknown flag");
        assert!(err.to_string().contains("WARDEN_STRICT_RULES"));
    }
}
