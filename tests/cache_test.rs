//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 旁路缓存三种策略的集成测试。

mod common;

use common::{setup_logging, test_config};
use oxflash::cache::CacheClient;
use oxflash::store::{KvStore, MemoryStore};
use oxflash::Result;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Barrier;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Shop {
    id: i64,
    name: String,
}

fn shop(id: i64) -> Shop {
    Shop {
        id,
        name: format!("shop-{}", id),
    }
}

/// 模拟数据源：记录访问次数，可配置延迟
struct ShopSource {
    shops: Vec<Shop>,
    hits: AtomicUsize,
    delay: Duration,
}

impl ShopSource {
    fn new(shops: Vec<Shop>) -> Arc<Self> {
        Arc::new(Self {
            shops,
            hits: AtomicUsize::new(0),
            delay: Duration::ZERO,
        })
    }

    fn slow(shops: Vec<Shop>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            shops,
            hits: AtomicUsize::new(0),
            delay,
        })
    }

    async fn load(self: &Arc<Self>, id: i64) -> Result<Option<Shop>> {
        self.hits.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.shops.iter().find(|s| s.id == id).cloned())
    }

    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

fn loader(
    source: &Arc<ShopSource>,
) -> impl Fn(i64) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<Option<Shop>>> + Send>>
       + Send
       + Sync
       + 'static {
    let source = source.clone();
    move |id| {
        let source = source.clone();
        Box::pin(async move { source.load(id).await })
    }
}

fn client(store: Arc<MemoryStore>) -> CacheClient {
    CacheClient::new(store as Arc<dyn KvStore>, test_config(16).cache)
}

#[tokio::test]
async fn pass_through_caches_loaded_value() {
    setup_logging();
    let store = Arc::new(MemoryStore::new());
    let source = ShopSource::new(vec![shop(1)]);
    let cache = client(store);

    let first: Option<Shop> = cache
        .query_with_pass_through("cache:shop:", 1, Duration::from_secs(60), loader(&source))
        .await
        .unwrap();
    assert_eq!(first, Some(shop(1)));

    let second: Option<Shop> = cache
        .query_with_pass_through("cache:shop:", 1, Duration::from_secs(60), loader(&source))
        .await
        .unwrap();
    assert_eq!(second, Some(shop(1)));
    // 第二次命中缓存，数据源只被访问一次
    assert_eq!(source.hits(), 1);
}

#[tokio::test]
async fn tombstone_absorbs_repeated_misses() {
    setup_logging();
    let store = Arc::new(MemoryStore::new());
    let source = ShopSource::new(vec![]);
    let cache = client(store.clone());

    // 第一次未命中：回源并写入空值墓碑
    let first: Option<Shop> = cache
        .query_with_pass_through("cache:shop:", 404, Duration::from_secs(60), loader(&source))
        .await
        .unwrap();
    assert_eq!(first, None);
    assert_eq!(source.hits(), 1);
    assert_eq!(store.get("cache:shop:404").await.unwrap().as_deref(), Some(""));

    // 墓碑有效期内的重复查询不再回源
    let second: Option<Shop> = cache
        .query_with_pass_through("cache:shop:", 404, Duration::from_secs(60), loader(&source))
        .await
        .unwrap();
    assert_eq!(second, None);
    assert_eq!(source.hits(), 1);
}

#[tokio::test]
async fn mutex_rebuild_admits_single_loader() {
    setup_logging();
    let store = Arc::new(MemoryStore::new());
    let source = ShopSource::slow(vec![shop(7)], Duration::from_millis(80));
    let cache = client(store);

    let concurrency = 20;
    let barrier = Arc::new(Barrier::new(concurrency));
    let mut handles = Vec::new();
    for _ in 0..concurrency {
        let cache = cache.clone();
        let source = source.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            cache
                .query_with_mutex("cache:shop:", 7, Duration::from_secs(60), loader(&source))
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), Some(shop(7)));
    }
    // 并发未命中只有一个重建者触达数据源
    assert_eq!(source.hits(), 1);
}

#[tokio::test]
async fn mutex_rebuild_writes_tombstone_for_absent_key() {
    setup_logging();
    let store = Arc::new(MemoryStore::new());
    let source = ShopSource::new(vec![]);
    let cache = client(store);

    let missing: Option<Shop> = cache
        .query_with_mutex("cache:shop:", 404, Duration::from_secs(60), loader(&source))
        .await
        .unwrap();
    assert_eq!(missing, None);

    let again: Option<Shop> = cache
        .query_with_mutex("cache:shop:", 404, Duration::from_secs(60), loader(&source))
        .await
        .unwrap();
    assert_eq!(again, None);
    assert_eq!(source.hits(), 1);
}

#[tokio::test]
async fn logical_expire_serves_fresh_value_without_source_access() {
    setup_logging();
    let store = Arc::new(MemoryStore::new());
    let source = ShopSource::new(vec![shop(9)]);
    let cache = client(store);

    cache
        .set_with_logical_expire("cache:shop:9", &shop(9), Duration::from_secs(60))
        .await
        .unwrap();

    let value: Option<Shop> = cache
        .query_with_logical_expire("cache:shop:", 9, Duration::from_secs(60), loader(&source))
        .await
        .unwrap();
    assert_eq!(value, Some(shop(9)));
    // 未过期，不触碰数据源
    assert_eq!(source.hits(), 0);
}

#[tokio::test]
async fn logical_expire_returns_stale_and_rebuilds_once() {
    setup_logging();
    let store = Arc::new(MemoryStore::new());
    let stale = Shop {
        id: 9,
        name: "stale".to_string(),
    };
    let source = ShopSource::slow(vec![shop(9)], Duration::from_millis(50));
    let cache = client(store);

    // 写入立即过期的条目
    cache
        .set_with_logical_expire("cache:shop:9", &stale, Duration::ZERO)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;

    // 并发读：全部立刻拿到旧值
    let concurrency = 10;
    let barrier = Arc::new(Barrier::new(concurrency));
    let mut handles = Vec::new();
    for _ in 0..concurrency {
        let cache = cache.clone();
        let source = source.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            cache
                .query_with_logical_expire("cache:shop:", 9, Duration::from_secs(60), loader(&source))
                .await
                .unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap().map(|s: Shop| s.name), Some("stale".to_string()));
    }

    // 等后台重建完成
    tokio::time::sleep(Duration::from_millis(200)).await;
    // 至多一次后台重建
    assert_eq!(source.hits(), 1);

    let fresh: Option<Shop> = cache
        .query_with_logical_expire("cache:shop:", 9, Duration::from_secs(60), loader(&source))
        .await
        .unwrap();
    assert_eq!(fresh.map(|s| s.name), Some("shop-9".to_string()));
    assert_eq!(source.hits(), 1);
}

/// 逻辑过期查询的future必须是Send：既要能被调用方spawn到
/// 多线程runtime上，其内部的后台重建任务同样要跨线程执行
#[test]
fn logical_expire_query_future_is_send() {
    fn assert_send<F: std::future::Future + Send>(_: &F) {}

    let store = Arc::new(MemoryStore::new());
    let source = ShopSource::new(vec![shop(1)]);
    let cache = client(store);
    let future = cache.query_with_logical_expire::<Shop, _, _, _>(
        "cache:shop:",
        1,
        Duration::from_secs(60),
        loader(&source),
    );
    assert_send(&future);
}

#[tokio::test]
async fn logical_expire_misses_are_not_loaded() {
    setup_logging();
    let store = Arc::new(MemoryStore::new());
    let source = ShopSource::new(vec![shop(1)]);
    let cache = client(store);

    // 该策略面向预热数据，未命中不回源
    let value: Option<Shop> = cache
        .query_with_logical_expire("cache:shop:", 1, Duration::from_secs(60), loader(&source))
        .await
        .unwrap();
    assert_eq!(value, None);
    assert_eq!(source.hits(), 0);
}
