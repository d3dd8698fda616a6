//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了秒杀核心的错误类型和处理机制。

use thiserror::Error;

/// 秒杀系统错误类型枚举
///
/// 只包含基础设施层面的错误；业务拒绝（未开始、库存不足、重复下单等）
/// 通过 [`crate::seckill::PurchaseOutcome`] 在 Ok 通道中返回
#[derive(Error, Debug)]
pub enum FlashError {
    /// Redis错误
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Sea-ORM数据库错误
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 订单队列已满，下单请求被拒绝
    #[error("Order queue is full")]
    QueueFull,

    /// 订单队列已关闭（进程正在停机）
    #[error("Order pipeline is shutting down")]
    Shutdown,

    /// 分布式锁操作失败
    #[error("Lock error: {0}")]
    Lock(String),

    /// 超时错误
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// 存储端返回了违反约定的数据
    #[error("Store error: {0}")]
    Store(String),

    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for FlashError {
    fn from(e: serde_json::Error) -> Self {
        FlashError::Serialization(e.to_string())
    }
}

/// 秒杀核心操作结果类型别名
///
/// 简化错误处理，所有核心操作都返回此类型
pub type Result<T> = std::result::Result<T, FlashError>;
