//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于键值存储的分布式互斥锁。

use crate::error::Result;
use crate::store::KvStore;
use lazy_static::lazy_static;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// 锁key前缀
const LOCK_KEY_PREFIX: &str = "lock:";

lazy_static! {
    /// 进程级唯一前缀，保证不同进程的持有者标识不会碰撞
    static ref INSTANCE_PREFIX: String = Uuid::new_v4().simple().to_string();
}

/// 分布式互斥锁
///
/// 获取通过SET NX EX写入本持有者的唯一token并附带过期时间，
/// 持有者崩溃后锁随TTL自动释放。释放通过"比较token再删除"
/// 的原子原语完成，保证不会误删其他持有者的锁。
///
/// 没有续期看门狗：持有时间必须覆盖临界区的预期时长。
/// 获取失败不是错误，表示稍后重试或放弃。
pub struct RedisLock {
    store: Arc<dyn KvStore>,
    key: String,
    token: String,
}

impl RedisLock {
    /// 创建一把以name为资源标识的锁，每个实例对应一次持有者身份
    pub fn new(store: Arc<dyn KvStore>, name: &str) -> Self {
        Self {
            store,
            key: format!("{}{}", LOCK_KEY_PREFIX, name),
            token: format!("{}-{}", *INSTANCE_PREFIX, Uuid::new_v4().simple()),
        }
    }

    /// 尝试获取锁，ttl为自动过期时间，返回是否获取成功
    pub async fn try_lock(&self, ttl: Duration) -> Result<bool> {
        let acquired = self.store.set_nx_ex(&self.key, &self.token, ttl).await?;
        if acquired {
            debug!(key = %self.key, "lock acquired");
        }
        Ok(acquired)
    }

    /// 释放锁，仅当锁仍由本实例持有时删除，返回是否真正删除
    pub async fn unlock(&self) -> Result<bool> {
        let released = self.store.compare_and_delete(&self.key, &self.token).await?;
        if !released {
            // 锁已过期并可能被他人持有，直接放弃
            debug!(key = %self.key, "lock already lost at unlock");
        }
        Ok(released)
    }

    /// 锁key（含前缀）
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use tokio::sync::Barrier;

    #[tokio::test]
    async fn second_holder_is_rejected() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let first = RedisLock::new(store.clone(), "order:42");
        let second = RedisLock::new(store.clone(), "order:42");

        assert!(first.try_lock(Duration::from_secs(10)).await.unwrap());
        assert!(!second.try_lock(Duration::from_secs(10)).await.unwrap());

        assert!(first.unlock().await.unwrap());
        assert!(second.try_lock(Duration::from_secs(10)).await.unwrap());
    }

    #[tokio::test]
    async fn concurrent_acquisition_has_single_winner() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let contenders = 16;
        let barrier = Arc::new(Barrier::new(contenders));
        let mut handles = Vec::new();
        for _ in 0..contenders {
            let store = store.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                let lock = RedisLock::new(store, "hot");
                barrier.wait().await;
                lock.try_lock(Duration::from_secs(10)).await.unwrap()
            }));
        }
        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn mismatched_token_cannot_release() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let holder = RedisLock::new(store.clone(), "order:7");
        let intruder = RedisLock::new(store.clone(), "order:7");

        assert!(holder.try_lock(Duration::from_secs(10)).await.unwrap());
        // 非持有者的释放不生效，锁条目原样保留
        assert!(!intruder.unlock().await.unwrap());
        assert!(store.get(holder.key()).await.unwrap().is_some());
        assert!(!intruder.try_lock(Duration::from_secs(10)).await.unwrap());
        assert!(holder.unlock().await.unwrap());
        assert!(store.get(holder.key()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_holder_does_not_delete_successor() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
        let stale = RedisLock::new(store.clone(), "order:9");
        assert!(stale.try_lock(Duration::from_millis(20)).await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        // TTL到期后锁条目自动消失
        assert!(store.get(stale.key()).await.unwrap().is_none());

        // 锁已过期，新持有者接管
        let fresh = RedisLock::new(store.clone(), "order:9");
        assert!(fresh.try_lock(Duration::from_secs(10)).await.unwrap());

        // 过期的旧持有者释放失败，新持有者的锁保持原样
        assert!(!stale.unlock().await.unwrap());
        assert!(fresh.unlock().await.unwrap());
    }
}
