//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了秒杀核心对键值存储的抽象接口。
//!
//! 存储端需要提供普通读写、原子自增、原子setnx、原子比较删除，
//! 以及服务端原子脚本执行能力；库存扣减脚本在存储端单线程串行执行，
//! 这是防止超卖的根基。

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub mod memory;
pub mod redis;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// 库存扣减脚本的返回码
///
/// 与脚本约定的整数状态码一一对应：0成功、1库存不足、2重复下单
pub const GATE_OK: i64 = 0;
pub const GATE_OUT_OF_STOCK: i64 = 1;
pub const GATE_DUPLICATE: i64 = 2;

/// 秒杀库存key前缀
pub const STOCK_KEY_PREFIX: &str = "seckill:stock:";
/// 已下单用户集合key前缀
pub const ORDER_SET_KEY_PREFIX: &str = "seckill:order:";

/// 键值存储抽象接口
///
/// [`RedisStore`]是生产实现；[`MemoryStore`]是内嵌实现，
/// 供测试和本地开发使用，两者遵循相同的原子性契约。
#[async_trait]
pub trait KvStore: Send + Sync {
    /// 读取字符串值，key不存在时返回None
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// 写入字符串值，不设置过期时间
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// 写入字符串值并设置物理过期时间
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// 仅当key不存在时写入并设置过期时间，返回是否写入成功
    ///
    /// 分布式锁的获取原语（SET NX EX）
    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool>;

    /// 原子自增，key不存在时从0开始，返回自增后的值
    async fn incr(&self, key: &str) -> Result<i64>;

    /// 删除key
    async fn delete(&self, key: &str) -> Result<()>;

    /// 当且仅当key当前值等于expected时删除，返回是否删除
    ///
    /// 分布式锁的安全释放原语，必须在存储端原子执行，
    /// 防止误删其他持有者在本方锁过期后获取的锁
    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool>;

    /// 执行库存扣减脚本，返回状态码（见GATE_*常量）
    ///
    /// 脚本内的检查与扣减对同一voucher全局串行，
    /// 不会与其他调用者的检查扣减交错
    async fn eval_stock_gate(&self, voucher_id: i64, user_id: i64) -> Result<i64>;

    /// 写入某个代金券的秒杀库存并清空其已下单集合
    ///
    /// 用于活动上架和测试播种
    async fn seed_voucher_stock(&self, voucher_id: i64, stock: i64) -> Result<()>;
}

/// 库存key
pub fn stock_key(voucher_id: i64) -> String {
    format!("{}{}", STOCK_KEY_PREFIX, voucher_id)
}

/// 已下单用户集合key
pub fn order_set_key(voucher_id: i64) -> String {
    format!("{}{}", ORDER_SET_KEY_PREFIX, voucher_id)
}
