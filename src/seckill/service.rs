//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了下单服务（接受路径）和订单流水线的生命周期管理。

use crate::cache::CacheClient;
use crate::config::Config;
use crate::error::{FlashError, Result};
use crate::id::IdGenerator;
use crate::orders::OrderStore;
use crate::seckill::{
    GateStatus, OrderQueue, OrderWorker, PendingOrder, PurchaseOutcome, PurchaseRejection,
    StockGate,
};
use crate::store::KvStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// 代金券缓存key前缀
pub const VOUCHER_CACHE_PREFIX: &str = "cache:voucher:";

/// 下单服务（接受路径）
///
/// 流程：查券（走防穿透缓存）校验售卖窗口 → 库存闸门原子判定 →
/// 生成订单id → 入队 → 立即返回。持久化完全异步，调用方感知的
/// 延迟只包含这几步。
#[derive(Clone)]
pub struct SeckillService {
    gate: StockGate,
    ids: IdGenerator,
    queue: OrderQueue,
    cache: CacheClient,
    orders: Arc<dyn OrderStore>,
    voucher_ttl: Duration,
}

impl SeckillService {
    pub fn new(
        store: Arc<dyn KvStore>,
        orders: Arc<dyn OrderStore>,
        queue: OrderQueue,
        config: &Config,
    ) -> Self {
        Self {
            gate: StockGate::new(store.clone()),
            ids: IdGenerator::new(store.clone()),
            queue,
            cache: CacheClient::new(store, config.cache.clone()),
            orders,
            voucher_ttl: Duration::from_secs(config.cache.value_ttl_secs),
        }
    }

    /// 发起一次秒杀下单
    ///
    /// 业务拒绝通过[`PurchaseOutcome::Rejected`]返回；
    /// Err只代表基础设施故障（存储不可达、队列已满等），
    /// 此时库存可能已扣减但订单未被接受，需要上层告警
    #[instrument(skip(self), level = "debug")]
    pub async fn purchase(&self, voucher_id: i64, user_id: i64) -> Result<PurchaseOutcome> {
        // 1.查券并校验售卖窗口（窗口校验不需要与扣减原子）
        let orders = self.orders.clone();
        let voucher = self
            .cache
            .query_with_pass_through(VOUCHER_CACHE_PREFIX, voucher_id, self.voucher_ttl, move |id| {
                let orders = orders.clone();
                async move { orders.load_voucher(id).await }
            })
            .await?;
        let voucher = match voucher {
            Some(v) => v,
            None => return Ok(PurchaseOutcome::Rejected(PurchaseRejection::NotFound)),
        };
        let now = Utc::now();
        if !voucher.window_contains(now) {
            let rejection = if now < voucher.begin_time {
                PurchaseRejection::NotStarted
            } else {
                PurchaseRejection::Ended
            };
            return Ok(PurchaseOutcome::Rejected(rejection));
        }

        // 2.原子判定资格并扣减库存
        match self.gate.purchase(voucher_id, user_id).await? {
            GateStatus::OutOfStock => {
                return Ok(PurchaseOutcome::Rejected(PurchaseRejection::OutOfStock))
            }
            GateStatus::Duplicate => {
                return Ok(PurchaseOutcome::Rejected(PurchaseRejection::Duplicate))
            }
            GateStatus::Ok => {}
        }

        // 3.生成订单id并入队，入队失败必须暴露给调用方：
        // 库存已扣减，静默丢弃等于丢单
        let order_id = self.ids.next_id("order").await?;
        self.queue.try_enqueue(PendingOrder {
            order_id,
            user_id,
            voucher_id,
        })?;

        // 4.不等待持久化，立即返回
        Ok(PurchaseOutcome::Accepted { order_id })
    }

    /// 上架秒杀活动：落库代金券、播种存储端库存、失效旧缓存
    pub async fn publish_voucher(&self, voucher: &crate::orders::SeckillVoucher) -> Result<()> {
        self.orders.save_voucher(voucher).await?;
        self.gate
            .seed_voucher(voucher.voucher_id, voucher.stock)
            .await?;
        // 先写数据源再删缓存；上架前的未命中会留下空值墓碑，
        // 不删掉的话新活动在墓碑过期前一直查不到
        self.cache
            .delete(&format!("{}{}", VOUCHER_CACHE_PREFIX, voucher.voucher_id))
            .await?;
        info!(
            voucher_id = voucher.voucher_id,
            stock = voucher.stock,
            "voucher published"
        );
        Ok(())
    }

    /// 旁路缓存客户端，供非竞争读路径（店铺等）复用
    pub fn cache(&self) -> &CacheClient {
        &self.cache
    }
}

/// 订单流水线：服务 + 单消费者worker的生命周期容器
///
/// 由应用启动序列显式构造并持有，关闭时停止接单、
/// 排空在途任务后退出
pub struct OrderPipeline {
    service: SeckillService,
    shutdown: CancellationToken,
    worker: tokio::task::JoinHandle<()>,
}

impl OrderPipeline {
    /// 组装并启动流水线
    pub fn start(store: Arc<dyn KvStore>, orders: Arc<dyn OrderStore>, config: &Config) -> Self {
        let (queue, receiver) = OrderQueue::new(config.order.queue_capacity);
        let shutdown = CancellationToken::new();
        let worker = OrderWorker::new(
            store.clone(),
            orders.clone(),
            receiver,
            shutdown.clone(),
            &config.order,
        )
        .spawn();
        let service = SeckillService::new(store, orders, queue, config);
        Self {
            service,
            shutdown,
            worker,
        }
    }

    pub fn service(&self) -> &SeckillService {
        &self.service
    }

    /// 优雅关闭：触发取消，等待worker排空队列后退出
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.cancel();
        // service（含队列生产者端）在此一并释放
        drop(self.service);
        if self.worker.await.is_err() {
            warn!("order worker terminated abnormally");
            return Err(FlashError::Shutdown);
        }
        Ok(())
    }
}
