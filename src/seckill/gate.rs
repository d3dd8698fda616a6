//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了原子库存闸门。

use crate::error::{FlashError, Result};
use crate::store::{KvStore, GATE_DUPLICATE, GATE_OK, GATE_OUT_OF_STOCK};
use std::sync::Arc;
use tracing::debug;

/// 库存闸门判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    /// 库存已扣减，用户已记入已购集合
    Ok,
    /// 库存不足
    OutOfStock,
    /// 该用户已购买过
    Duplicate,
}

/// 原子库存闸门
///
/// 资格校验与库存扣减在存储端脚本内一次性完成：查库存、
/// 查用户是否已购、扣减、记录用户，中间状态对并发调用者不可见。
/// 售卖窗口校验不需要与扣减原子，由调用方在进闸门前完成。
///
/// 热路径上没有任何进程内锁，这是整个系统的核心性能决策。
#[derive(Clone)]
pub struct StockGate {
    store: Arc<dyn KvStore>,
}

impl StockGate {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// 执行一次购买判定并在通过时扣减库存
    pub async fn purchase(&self, voucher_id: i64, user_id: i64) -> Result<GateStatus> {
        let code = self.store.eval_stock_gate(voucher_id, user_id).await?;
        let status = match code {
            GATE_OK => GateStatus::Ok,
            GATE_OUT_OF_STOCK => GateStatus::OutOfStock,
            GATE_DUPLICATE => GateStatus::Duplicate,
            other => {
                return Err(FlashError::Store(format!(
                    "stock gate returned unexpected status {}",
                    other
                )))
            }
        };
        debug!(voucher_id, user_id, ?status, "stock gate evaluated");
        Ok(status)
    }

    /// 上架：写入秒杀库存并清空该券的已购集合
    pub async fn seed_voucher(&self, voucher_id: i64, stock: i64) -> Result<()> {
        self.store.seed_voucher_stock(voucher_id, stock).await
    }
}
