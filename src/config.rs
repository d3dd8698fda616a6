//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了秒杀核心的配置结构和解析逻辑。

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::path::Path;

/// 秒杀核心配置
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub order: OrderConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Redis连接配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct RedisConfig {
    /// 连接字符串（redis:// 或 rediss://）
    pub connection_string: SecretString,
    /// 建立连接超时时间（毫秒）
    pub connection_timeout_ms: u64,
    /// 单条命令超时时间（毫秒）
    pub command_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            connection_string: SecretString::new("redis://127.0.0.1:6379".into()),
            connection_timeout_ms: 5000,
            command_timeout_ms: 5000,
        }
    }
}

/// 持久化数据库配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 数据库连接URL（sqlite/mysql/postgres）
    pub url: String,
    /// 连接池最大连接数
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 10,
        }
    }
}

/// 订单流水线配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct OrderConfig {
    /// 待持久化订单队列容量，满则拒绝下单
    pub queue_capacity: usize,
    /// 持久化阶段按用户加锁的持有时间（秒）
    pub user_lock_ttl_secs: u64,
}

impl Default for OrderConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024 * 1024,
            user_lock_ttl_secs: 10,
        }
    }
}

/// 缓存策略配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct CacheConfig {
    /// 正常值的物理过期时间（秒）
    pub value_ttl_secs: u64,
    /// 空值墓碑的过期时间（秒），应远小于正常TTL
    pub null_ttl_secs: u64,
    /// 逻辑过期时间（秒），用于热点数据
    pub logical_ttl_secs: u64,
    /// 重建互斥锁的持有时间（秒）
    pub rebuild_lock_ttl_secs: u64,
    /// 互斥重建策略的重试间隔（毫秒）
    pub mutex_retry_interval_ms: u64,
    /// 互斥重建策略的最大重试次数，耗尽后返回锁错误
    pub mutex_max_retries: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            value_ttl_secs: 30 * 60,
            null_ttl_secs: 2 * 60,
            logical_ttl_secs: 20,
            rebuild_lock_ttl_secs: 10,
            mutex_retry_interval_ms: 50,
            mutex_max_retries: 100,
        }
    }
}

impl Config {
    /// 从toml文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// 从toml字符串解析配置
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> crate::error::Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| crate::error::FlashError::Config(e.to_string()))?;
        config
            .validate()
            .map_err(crate::error::FlashError::Config)?;
        Ok(config)
    }

    /// 校验配置合法性
    pub fn validate(&self) -> std::result::Result<(), String> {
        let conn = self.redis.connection_string.expose_secret();
        if !conn.starts_with("redis://") && !conn.starts_with("rediss://") {
            return Err(format!("Invalid redis connection string scheme: {}", conn));
        }
        if self.order.queue_capacity == 0 {
            return Err("order.queue_capacity must be greater than 0".to_string());
        }
        if self.order.user_lock_ttl_secs == 0 {
            return Err("order.user_lock_ttl_secs must be greater than 0".to_string());
        }
        if self.cache.null_ttl_secs >= self.cache.value_ttl_secs {
            return Err("cache.null_ttl_secs should be shorter than cache.value_ttl_secs".to_string());
        }
        if self.cache.mutex_max_retries == 0 {
            return Err("cache.mutex_max_retries must be greater than 0".to_string());
        }
        Ok(())
    }
}
