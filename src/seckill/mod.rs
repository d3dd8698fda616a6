//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 秒杀订单流水线：原子库存闸门、待持久化队列、单消费者落库，
//! 以及面向调用方的下单服务。

pub mod gate;
pub mod queue;
pub mod service;
pub mod worker;

pub use gate::{GateStatus, StockGate};
pub use queue::OrderQueue;
pub use service::{OrderPipeline, SeckillService};
pub use worker::OrderWorker;

/// 待持久化订单任务
///
/// 下单被接受后进入队列，由队列独占直到被消费；
/// 持久化成功后丢弃，终态失败时记录日志后丢弃
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOrder {
    pub order_id: i64,
    pub user_id: i64,
    pub voucher_id: i64,
}

/// 业务层拒绝原因
///
/// 这些是同步返回给调用方的正常业务结果，不走错误通道
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseRejection {
    /// 代金券不存在
    NotFound,
    /// 秒杀尚未开始
    NotStarted,
    /// 秒杀已经结束
    Ended,
    /// 库存不足
    OutOfStock,
    /// 一人限购一张，重复下单
    Duplicate,
}

impl std::fmt::Display for PurchaseRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            PurchaseRejection::NotFound => "voucher not found",
            PurchaseRejection::NotStarted => "sale has not started",
            PurchaseRejection::Ended => "sale has ended",
            PurchaseRejection::OutOfStock => "out of stock",
            PurchaseRejection::Duplicate => "duplicate purchase",
        };
        f.write_str(reason)
    }
}

/// 下单结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PurchaseOutcome {
    /// 已接受，订单进入异步持久化队列
    Accepted { order_id: i64 },
    /// 业务拒绝
    Rejected(PurchaseRejection),
}

impl PurchaseOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, PurchaseOutcome::Accepted { .. })
    }
}
