use serde::Deserialize;

/// Top-level coordination-layer configuration, deserializable from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub queue: QueueConfig,
    pub mutex: MutexConfig,
}

/// Queue-engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Prefix for every key the engine writes, so several engines can share
    /// one store without colliding.
    pub namespace: String,
    /// Period of the delay-scheduler loop (promotion of due delayed messages
    /// and reclaim of expired claims).
    pub scheduler_tick_ms: u64,
    /// How long a worker's claim call blocks when the ready list is empty.
    /// This is also the upper bound on how long a worker takes to observe
    /// cancellation.
    pub claim_block_ms: u64,
}

/// Lease-mutex defaults. Individual mutexes can override these via
/// `MutexOptions`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MutexConfig {
    /// Lease TTL in milliseconds.
    pub ttl_ms: u64,
    /// Sleep between acquire attempts in the blocking `lock` path.
    pub retry_interval_ms: u64,
    /// Acquire attempts before `lock` gives up with `LockError::NotAcquired`.
    pub max_attempts: u32,
    pub auto_renew: bool,
    /// Renewal period; must be strictly shorter than `ttl_ms`.
    pub renew_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            namespace: "amarra".to_string(),
            scheduler_tick_ms: 1_000,
            claim_block_ms: 1_000,
        }
    }
}

impl Default for MutexConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 10_000,
            retry_interval_ms: 500,
            max_attempts: 32,
            auto_renew: true,
            renew_interval_ms: 3_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.queue.namespace, "amarra");
        assert_eq!(config.queue.scheduler_tick_ms, 1_000);
        assert_eq!(config.queue.claim_block_ms, 1_000);
        assert_eq!(config.mutex.ttl_ms, 10_000);
        assert_eq!(config.mutex.max_attempts, 32);
        assert!(config.mutex.auto_renew);
    }

    #[test]
    fn toml_parsing_with_overrides() {
        let toml_str = r#"
            [queue]
            namespace = "orders"
            scheduler_tick_ms = 250

            [mutex]
            ttl_ms = 2000
            renew_interval_ms = 500
        "#;
        let config: CoordinatorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.queue.namespace, "orders");
        assert_eq!(config.queue.scheduler_tick_ms, 250);
        assert_eq!(config.mutex.ttl_ms, 2_000);
        assert_eq!(config.mutex.renew_interval_ms, 500);
    }

    #[test]
    fn toml_parsing_empty_uses_defaults() {
        let config: CoordinatorConfig = toml::from_str("").unwrap();
        assert_eq!(config.queue.namespace, "amarra");
        assert_eq!(config.mutex.retry_interval_ms, 500);
    }

    #[test]
    fn toml_parsing_partial_config() {
        let toml_str = r#"
            [queue]
            claim_block_ms = 100
        "#;
        let config: CoordinatorConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.queue.claim_block_ms, 100);
        // Untouched sections keep their defaults
        assert_eq!(config.queue.namespace, "amarra");
        assert_eq!(config.mutex.ttl_ms, 10_000);
    }
}
