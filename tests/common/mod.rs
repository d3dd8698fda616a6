//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 集成测试共用的工具：日志初始化、测试配置、内存订单存储。

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use oxflash::orders::{OrderStore, SeckillVoucher, VoucherOrder};
use oxflash::{Config, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

pub fn setup_logging() {
    oxflash::utils::setup_logging();
}

/// 测试用配置：短TTL、小队列便于触发边界
pub fn test_config(queue_capacity: usize) -> Config {
    let mut config = Config::default();
    config.order.queue_capacity = queue_capacity;
    config.cache.value_ttl_secs = 60;
    config.cache.null_ttl_secs = 30;
    config.cache.mutex_retry_interval_ms = 10;
    config.cache.mutex_max_retries = 200;
    config
}

/// 正在售卖中的代金券
pub fn live_voucher(voucher_id: i64, stock: i64) -> SeckillVoucher {
    SeckillVoucher {
        voucher_id,
        stock,
        begin_time: Utc::now() - ChronoDuration::minutes(5),
        end_time: Utc::now() + ChronoDuration::minutes(5),
    }
}

/// 订单存储的内存实现，统计数据源访问次数
#[derive(Default)]
pub struct MemOrderStore {
    pub vouchers: Mutex<Vec<SeckillVoucher>>,
    pub orders: Mutex<Vec<VoucherOrder>>,
    pub voucher_loads: AtomicUsize,
}

impl MemOrderStore {
    pub async fn add_voucher(&self, voucher: SeckillVoucher) {
        self.vouchers.lock().await.push(voucher);
    }

    pub fn loads(&self) -> usize {
        self.voucher_loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderStore for MemOrderStore {
    async fn load_voucher(&self, voucher_id: i64) -> Result<Option<SeckillVoucher>> {
        self.voucher_loads.fetch_add(1, Ordering::SeqCst);
        let vouchers = self.vouchers.lock().await;
        Ok(vouchers.iter().find(|v| v.voucher_id == voucher_id).cloned())
    }

    async fn save_voucher(&self, voucher: &SeckillVoucher) -> Result<()> {
        let mut vouchers = self.vouchers.lock().await;
        // 同一券重复上架时覆盖旧记录
        vouchers.retain(|v| v.voucher_id != voucher.voucher_id);
        vouchers.push(voucher.clone());
        Ok(())
    }

    async fn order_exists(&self, user_id: i64, voucher_id: i64) -> Result<bool> {
        let orders = self.orders.lock().await;
        Ok(orders
            .iter()
            .any(|o| o.user_id == user_id && o.voucher_id == voucher_id))
    }

    async fn insert_order(&self, order: &VoucherOrder) -> Result<()> {
        self.orders.lock().await.push(order.clone());
        Ok(())
    }
}
