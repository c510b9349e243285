use std::{env, net::SocketAddr, str::FromStr, time::Duration};

use thiserror::Error;

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
/// 导出任务默认 30 分钟过期
pub const DEFAULT_EXPORT_TTL_SECS: u64 = 30 * 60;
/// 每 5 分钟清理一次过期导出任务
pub const DEFAULT_CLEANUP_INTERVAL_SECS: u64 = 5 * 60;
/// 载入请求的 JSON 上限：256 MiB
pub const DEFAULT_MAX_JSON_BYTES: usize = 256 * 1024 * 1024;

/// 服务配置，全部来自环境变量，缺失时使用默认值
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub export_ttl: Duration,
    pub cleanup_interval: Duration,
    pub max_json_bytes: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 通过任意查找函数读取配置，测试时可以不依赖进程环境
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = parse_or(&lookup, "HKL_BIND_ADDR", DEFAULT_BIND_ADDR)?;
        let export_ttl: u64 = parse_or(&lookup, "HKL_EXPORT_TTL_SECS", DEFAULT_EXPORT_TTL_SECS)?;
        let cleanup_interval: u64 = parse_or(
            &lookup,
            "HKL_CLEANUP_INTERVAL_SECS",
            DEFAULT_CLEANUP_INTERVAL_SECS,
        )?;
        let max_json_bytes = parse_or(&lookup, "HKL_MAX_JSON_BYTES", DEFAULT_MAX_JSON_BYTES)?;

        if cleanup_interval == 0 {
            return Err(ConfigError::Invalid {
                key: "HKL_CLEANUP_INTERVAL_SECS".to_string(),
                value: "0".to_string(),
                reason: "清理间隔必须大于 0".to_string(),
            });
        }

        Ok(Self {
            bind_addr,
            export_ttl: Duration::from_secs(export_ttl),
            cleanup_interval: Duration::from_secs(cleanup_interval),
            max_json_bytes,
        })
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            export_ttl: Duration::from_secs(DEFAULT_EXPORT_TTL_SECS),
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECS),
            max_json_bytes: DEFAULT_MAX_JSON_BYTES,
        }
    }
}

fn parse_or<T, D>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: D,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    D: ToString,
{
    let raw = lookup(key)
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| default.to_string());
    raw.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
        key: key.to_string(),
        value: raw.clone(),
        reason: err.to_string(),
    })
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("环境变量 {key}={value} 无效: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = AppConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn overrides_are_parsed() {
        let config = AppConfig::from_lookup(lookup(&[
            ("HKL_BIND_ADDR", "0.0.0.0:9000"),
            ("HKL_EXPORT_TTL_SECS", "60"),
            ("HKL_CLEANUP_INTERVAL_SECS", " 10 "),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.export_ttl, Duration::from_secs(60));
        assert_eq!(config.cleanup_interval, Duration::from_secs(10));
    }

    #[test]
    fn malformed_values_are_errors() {
        let err = AppConfig::from_lookup(lookup(&[("HKL_EXPORT_TTL_SECS", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "HKL_EXPORT_TTL_SECS"));

        assert!(AppConfig::from_lookup(lookup(&[("HKL_CLEANUP_INTERVAL_SECS", "0")])).is_err());
        assert!(AppConfig::from_lookup(lookup(&[("HKL_BIND_ADDR", "localhost")])).is_err());
    }
}
