//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了订单落库消费者。

use crate::config::OrderConfig;
use crate::error::Result;
use crate::lock::RedisLock;
use crate::orders::{OrderStore, VoucherOrder};
use crate::seckill::PendingOrder;
use crate::store::KvStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 订单落库消费者
///
/// 设计上严格单消费者：持久化吞吐与接单吞吐解耦，不需要随请求
/// 并发扩展。每个任务按用户加分布式锁、对持久层做重复订单复查
/// （对闸门与存储分歧的纵深防御）后落库；任何单任务失败只记日志，
/// 不终止消费循环。
pub struct OrderWorker {
    store: Arc<dyn KvStore>,
    orders: Arc<dyn OrderStore>,
    receiver: mpsc::Receiver<PendingOrder>,
    shutdown: CancellationToken,
    user_lock_ttl: Duration,
}

impl OrderWorker {
    pub fn new(
        store: Arc<dyn KvStore>,
        orders: Arc<dyn OrderStore>,
        receiver: mpsc::Receiver<PendingOrder>,
        shutdown: CancellationToken,
        config: &OrderConfig,
    ) -> Self {
        Self {
            store,
            orders,
            receiver,
            shutdown,
            user_lock_ttl: Duration::from_secs(config.user_lock_ttl_secs),
        }
    }

    /// 在后台任务中运行消费循环
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// 消费循环：取消信号到达后停止接收新任务，
    /// 排空已入队的任务再退出
    pub async fn run(mut self) {
        info!("order worker started");
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("order worker draining before shutdown");
                    self.drain().await;
                    break;
                }
                task = self.receiver.recv() => match task {
                    Some(task) => self.handle(task).await,
                    // 所有生产者都已消失
                    None => break,
                }
            }
        }
        info!("order worker stopped");
    }

    /// 关闭接收端后消费剩余任务
    async fn drain(&mut self) {
        self.receiver.close();
        while let Some(task) = self.receiver.recv().await {
            self.handle(task).await;
        }
    }

    /// 处理单个任务，失败被隔离在任务内
    async fn handle(&self, task: PendingOrder) {
        if let Err(e) = self.persist(&task).await {
            // 队列侧无调用方可报告，接受至多一次语义：记录后丢弃
            error!(
                order_id = task.order_id,
                user_id = task.user_id,
                voucher_id = task.voucher_id,
                error = %e,
                "order task dropped after persistence failure"
            );
        }
    }

    async fn persist(&self, task: &PendingOrder) -> Result<()> {
        let lock = RedisLock::new(self.store.clone(), &format!("order:{}", task.user_id));
        if !lock.try_lock(self.user_lock_ttl).await? {
            // 同一用户的另一次下单正在持久化，本任务按重复请求丢弃
            warn!(
                user_id = task.user_id,
                voucher_id = task.voucher_id,
                "user lock busy, discarding concurrent order task"
            );
            return Ok(());
        }
        let result = self.persist_locked(task).await;
        // 成功、重复、失败都要释放锁
        let _ = lock.unlock().await;
        result
    }

    async fn persist_locked(&self, task: &PendingOrder) -> Result<()> {
        if self.orders.order_exists(task.user_id, task.voucher_id).await? {
            warn!(
                user_id = task.user_id,
                voucher_id = task.voucher_id,
                "duplicate order found at persistence, discarding"
            );
            return Ok(());
        }
        let order = VoucherOrder {
            id: task.order_id,
            user_id: task.user_id,
            voucher_id: task.voucher_id,
            create_time: Utc::now(),
        };
        self.orders.insert_order(&order).await?;
        debug!(order_id = order.id, "order persisted");
        Ok(())
    }
}
