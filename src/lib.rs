//! oxflash - 秒杀订单核心
//!
//! 在高并发抢购下保证不超卖、一人一单、低接单延迟的订单流水线，
//! 以及保护持久层的缓存一致性策略（缓存空值、互斥重建、逻辑过期）。
//!
//! 组件：全局唯一ID生成器、存储端原子库存闸门、分布式互斥锁、
//! 单消费者异步落库队列、旁路缓存客户端。

#![doc(html_root_url = "https://docs.rs/oxflash/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use tokio;

pub mod cache;
pub mod config;
pub mod error;
pub mod id;
pub mod lock;
pub mod orders;
pub mod seckill;
pub mod store;
pub mod utils;

// Re-export commonly used items
pub use cache::{CacheClient, TimedValue};
pub use config::Config;
pub use error::{FlashError, Result};
pub use id::IdGenerator;
pub use lock::RedisLock;
pub use orders::{OrderStore, SeaOrderStore, SeckillVoucher, VoucherOrder};
pub use seckill::{
    GateStatus, OrderPipeline, OrderQueue, OrderWorker, PendingOrder, PurchaseOutcome,
    PurchaseRejection, SeckillService, StockGate,
};
pub use store::{KvStore, MemoryStore, RedisStore};

/// oxflash 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
