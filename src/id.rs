//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了全局唯一ID生成器。

use crate::error::Result;
use crate::store::KvStore;
use chrono::Utc;
use std::sync::Arc;

/// 起始时间戳：2022-01-01T00:00:00Z对应的秒数
const BEGIN_TIMESTAMP: i64 = 1_640_995_200;
/// 序列号的位数
const COUNT_BITS: u32 = 32;
/// 自增序列key前缀
const ID_KEY_PREFIX: &str = "icr:";

/// 全局唯一ID生成器
///
/// 生成64位id：高位是相对起始时间的秒数，低32位是按业务和日期
/// 分key的自增序列。序列key每天自然轮换，单key不会无限增长；
/// 32位序列段远超单日可能的下单量。
///
/// id随时间粗略递增；同一秒内跨机器不保证严格递增，
/// 其大小关系取决于序列存储的一致性。
#[derive(Clone)]
pub struct IdGenerator {
    store: Arc<dyn KvStore>,
}

impl IdGenerator {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    /// 生成下一个id，businessKey用于区分不同业务的序列
    pub async fn next_id(&self, business_key: &str) -> Result<i64> {
        let now = Utc::now();
        // 1.时间戳部分：当前时间减去起始时间
        let timestamp = now.timestamp() - BEGIN_TIMESTAMP;
        // 2.序列号部分：按天分key自增
        let date = now.format("%Y:%m:%d");
        let key = format!("{}{}:{}", ID_KEY_PREFIX, business_key, date);
        let count = self.store.incr(&key).await?;
        // 3.拼接
        Ok((timestamp << COUNT_BITS) | count)
    }
}
