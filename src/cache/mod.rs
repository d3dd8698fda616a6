//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了旁路缓存客户端，提供三种读穿策略：
//! 缓存空值（防穿透）、互斥重建（防击穿、强一致）、
//! 逻辑过期后台重建（防击穿、低延迟）。

use crate::config::CacheConfig;
use crate::error::{FlashError, Result};
use crate::lock::RedisLock;
use crate::store::KvStore;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// 带逻辑过期时间的缓存条目
///
/// 物理上永不过期，过期判断完全由expire_at承担
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimedValue<T> {
    pub data: T,
    pub expire_at: DateTime<Utc>,
}

/// 旁路缓存客户端
///
/// 所有策略都以"key前缀 + id + 回源加载器 + TTL"为参数；
/// 加载器返回None表示数据源中确认不存在
#[derive(Clone)]
pub struct CacheClient {
    store: Arc<dyn KvStore>,
    config: CacheConfig,
}

impl CacheClient {
    pub fn new(store: Arc<dyn KvStore>, config: CacheConfig) -> Self {
        Self { store, config }
    }

    /// 序列化任意值写入缓存并设置物理TTL
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(value)?;
        self.store.set_ex(key, &json, ttl).await
    }

    /// 删除缓存条目
    ///
    /// 写路径的失效原语：先更新数据源，再删缓存，
    /// 下一次读未命中时回源取到新值
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(key).await
    }

    /// 序列化任意值并附带逻辑过期时间写入缓存，不设置物理TTL
    pub async fn set_with_logical_expire<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        logical_ttl: Duration,
    ) -> Result<()> {
        let wrapped = TimedValue {
            data: value,
            expire_at: Utc::now() + chrono::Duration::milliseconds(logical_ttl.as_millis() as i64),
        };
        let json = serde_json::to_string(&wrapped)?;
        self.store.set(key, &json).await
    }

    /// 缓存空值策略：未命中回源，数据源确认不存在时写入短TTL的空值墓碑
    ///
    /// 墓碑有效期内对同一不存在key的重复查询不会落到数据源
    pub async fn query_with_pass_through<T, ID, F, Fut>(
        &self,
        key_prefix: &str,
        id: ID,
        ttl: Duration,
        loader: F,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        ID: ToString + Clone,
        F: Fn(ID) -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let key = format!("{}{}", key_prefix, id.to_string());
        // 1.查缓存
        if let Some(json) = self.store.get(&key).await? {
            if json.is_empty() {
                // 命中空值墓碑，确认不存在
                return Ok(None);
            }
            // 2.命中则反序列化返回
            return Ok(Some(serde_json::from_str(&json)?));
        }
        // 3.未命中，回源
        match loader(id).await? {
            Some(value) => {
                // 4.写回缓存并返回
                self.set(&key, &value, ttl).await?;
                Ok(Some(value))
            }
            None => {
                // 5.数据源也不存在，写空值墓碑防穿透
                debug!(key = %key, "loader miss, writing tombstone");
                self.store
                    .set_ex(&key, "", Duration::from_secs(self.config.null_ttl_secs))
                    .await?;
                Ok(None)
            }
        }
    }

    /// 互斥重建策略：未命中时抢占该key的重建锁，抢到的同步重建，
    /// 没抢到的小睡后整体重读
    ///
    /// 同一key任一时刻至多一个重建者在访问数据源。重试次数由配置
    /// 封顶，耗尽后返回锁错误而不是无限等待。
    pub async fn query_with_mutex<T, ID, F, Fut>(
        &self,
        key_prefix: &str,
        id: ID,
        ttl: Duration,
        loader: F,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        ID: ToString + Clone,
        F: Fn(ID) -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let key = format!("{}{}", key_prefix, id.to_string());
        for _attempt in 0..self.config.mutex_max_retries {
            if let Some(json) = self.store.get(&key).await? {
                if json.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(serde_json::from_str(&json)?));
            }

            let lock = RedisLock::new(self.store.clone(), &format!("rebuild:{}", key));
            if lock
                .try_lock(Duration::from_secs(self.config.rebuild_lock_ttl_secs))
                .await?
            {
                let rebuilt = self.rebuild(&key, id.clone(), ttl, &loader).await;
                let _ = lock.unlock().await;
                return rebuilt;
            }
            // 别人正在重建，稍等后重读缓存
            tokio::time::sleep(Duration::from_millis(self.config.mutex_retry_interval_ms)).await;
        }
        Err(FlashError::Lock(format!(
            "cache rebuild lock for {} not acquired after {} retries",
            key, self.config.mutex_max_retries
        )))
    }

    /// 持锁重建：先DoubleCheck缓存再回源，避免上一个重建者
    /// 刚写完就重复回源
    async fn rebuild<T, ID, F, Fut>(
        &self,
        key: &str,
        id: ID,
        ttl: Duration,
        loader: &F,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
        ID: ToString + Clone,
        F: Fn(ID) -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        if let Some(json) = self.store.get(key).await? {
            if json.is_empty() {
                return Ok(None);
            }
            return Ok(Some(serde_json::from_str(&json)?));
        }
        match loader(id).await? {
            Some(value) => {
                self.set(key, &value, ttl).await?;
                Ok(Some(value))
            }
            None => {
                self.store
                    .set_ex(key, "", Duration::from_secs(self.config.null_ttl_secs))
                    .await?;
                Ok(None)
            }
        }
    }

    /// 逻辑过期策略：命中且未过期直接返回；已过期时抢占重建锁，
    /// 抢到的把重建交给后台任务，当前请求立即返回旧值；没抢到的
    /// 同样返回旧值
    ///
    /// 读路径永不等待重建，旧值的陈旧程度以一次重建周期为界。
    /// 缓存未命中直接返回None：该策略面向预热过的热点数据，
    /// 不负责冷启动加载。
    pub async fn query_with_logical_expire<T, ID, F, Fut>(
        &self,
        key_prefix: &str,
        id: ID,
        logical_ttl: Duration,
        loader: F,
    ) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        ID: ToString + Clone + Send + 'static,
        F: Fn(ID) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<T>>> + Send,
    {
        let key = format!("{}{}", key_prefix, id.to_string());
        let json = match self.store.get(&key).await? {
            Some(json) if !json.is_empty() => json,
            _ => return Ok(None),
        };
        let wrapped: TimedValue<T> = serde_json::from_str(&json)?;
        if wrapped.expire_at > Utc::now() {
            // 未过期，直接返回
            return Ok(Some(wrapped.data));
        }

        // 已过期，尝试抢占重建锁
        let lock = RedisLock::new(self.store.clone(), &format!("rebuild:{}", key));
        if lock
            .try_lock(Duration::from_secs(self.config.rebuild_lock_ttl_secs))
            .await?
        {
            let client = self.clone();
            tokio::spawn(async move {
                if let Err(e) = client
                    .rebuild_logical(&key, id, logical_ttl, &loader)
                    .await
                {
                    error!(key = %key, error = %e, "background cache rebuild failed");
                }
                let _ = lock.unlock().await;
            });
        }
        // 无论是否抢到锁，本次请求都返回旧值
        Ok(Some(wrapped.data))
    }

    /// 后台逻辑过期重建：持锁后DoubleCheck过期时间，仍过期才回源
    async fn rebuild_logical<T, ID, F, Fut>(
        &self,
        key: &str,
        id: ID,
        logical_ttl: Duration,
        loader: &F,
    ) -> Result<()>
    where
        T: Serialize + DeserializeOwned,
        ID: ToString + Clone,
        F: Fn(ID) -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        if let Some(json) = self.store.get(key).await? {
            if !json.is_empty() {
                let current: TimedValue<T> = serde_json::from_str(&json)?;
                if current.expire_at > Utc::now() {
                    // 上一个重建者已经刷新过了
                    return Ok(());
                }
            }
        }
        match loader(id).await? {
            Some(value) => {
                self.set_with_logical_expire(key, &value, logical_ttl)
                    .await
            }
            None => {
                // 数据源已删除该记录，移除缓存条目，后续读得到None
                warn!(key = %key, "source record gone, evicting logical cache entry");
                self.store.delete(key).await
            }
        }
    }
}
