//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了订单与代金券的持久化接口及领域记录。

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod sea;

pub use sea::SeaOrderStore;

/// 秒杀代金券
///
/// 核心内只读；库存的唯一修改入口是库存扣减脚本
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeckillVoucher {
    pub voucher_id: i64,
    pub stock: i64,
    pub begin_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl SeckillVoucher {
    /// 当前时刻是否处于售卖窗口内
    pub fn window_contains(&self, at: DateTime<Utc>) -> bool {
        self.begin_time <= at && at < self.end_time
    }
}

/// 秒杀订单，持久化后不可变
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VoucherOrder {
    pub id: i64,
    pub user_id: i64,
    pub voucher_id: i64,
    pub create_time: DateTime<Utc>,
}

/// 持久化存储抽象接口
///
/// (user_id, voucher_id)的唯一约束由存储端保证，
/// 插入重复订单返回数据库错误
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// 按id加载代金券，不存在返回None
    async fn load_voucher(&self, voucher_id: i64) -> Result<Option<SeckillVoucher>>;

    /// 保存代金券（活动上架）
    async fn save_voucher(&self, voucher: &SeckillVoucher) -> Result<()>;

    /// 查询某用户对某代金券是否已有订单
    async fn order_exists(&self, user_id: i64, voucher_id: i64) -> Result<bool>;

    /// 插入订单
    async fn insert_order(&self, order: &VoucherOrder) -> Result<()>;
}
