//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了待持久化订单的有界FIFO队列。

use crate::error::{FlashError, Result};
use crate::seckill::PendingOrder;
use tokio::sync::mpsc;
use tracing::warn;

/// 订单队列的生产者端
///
/// 入队永不阻塞：队列满时立刻返回[`FlashError::QueueFull`]，
/// 让调用方把失败暴露给用户，而不是在库存已扣减后悄悄丢单
#[derive(Clone)]
pub struct OrderQueue {
    sender: mpsc::Sender<PendingOrder>,
}

impl OrderQueue {
    /// 创建队列，返回生产者端和交给消费者的接收端
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<PendingOrder>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }

    /// 非阻塞入队
    pub fn try_enqueue(&self, task: PendingOrder) -> Result<()> {
        match self.sender.try_send(task) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(task)) => {
                warn!(
                    order_id = task.order_id,
                    user_id = task.user_id,
                    "order queue full, rejecting purchase"
                );
                Err(FlashError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(FlashError::Shutdown),
        }
    }
}
