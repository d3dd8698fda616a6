//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了键值存储接口的内嵌实现，供测试和本地开发使用。
//!
//! 整个存储由一把互斥锁保护，每个操作在锁内完整执行，
//! 与Redis单线程执行模型给出的原子性契约一致。

use crate::error::{FlashError, Result};
use crate::store::{KvStore, GATE_DUPLICATE, GATE_OK, GATE_OUT_OF_STOCK};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// 存储值：字符串或集合
#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    /// 物理过期时刻，None表示永不过期
    expire_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        matches!(self.expire_at, Some(at) if at <= Instant::now())
    }
}

/// 键值存储的内嵌实现
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 统计测试断言用：某代金券当前剩余库存
    pub async fn remaining_stock(&self, voucher_id: i64) -> Option<i64> {
        let mut map = self.inner.lock().await;
        let key = crate::store::stock_key(voucher_id);
        live_str(&mut map, &key).and_then(|s| s.parse().ok())
    }
}

/// 读取未过期的字符串值，过期条目顺手清除
fn live_str(map: &mut HashMap<String, Entry>, key: &str) -> Option<String> {
    let expired = matches!(map.get(key), Some(entry) if entry.expired());
    if expired {
        map.remove(key);
        return None;
    }
    match map.get(key).map(|entry| &entry.value) {
        Some(Value::Str(s)) => Some(s.clone()),
        _ => None,
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut map = self.inner.lock().await;
        Ok(live_str(&mut map, key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.inner.lock().await;
        map.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expire_at: None,
            },
        );
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut map = self.inner.lock().await;
        map.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expire_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut map = self.inner.lock().await;
        if live_str(&mut map, key).is_some() {
            return Ok(false);
        }
        map.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expire_at: Some(Instant::now() + ttl),
            },
        );
        Ok(true)
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut map = self.inner.lock().await;
        let current = match live_str(&mut map, key) {
            Some(s) => s
                .parse::<i64>()
                .map_err(|_| FlashError::Serialization(format!("value at {} is not an integer", key)))?,
            None => 0,
        };
        let next = current + 1;
        map.insert(
            key.to_string(),
            Entry {
                value: Value::Str(next.to_string()),
                expire_at: None,
            },
        );
        Ok(next)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut map = self.inner.lock().await;
        map.remove(key);
        Ok(())
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut map = self.inner.lock().await;
        if live_str(&mut map, key).as_deref() == Some(expected) {
            map.remove(key);
            return Ok(true);
        }
        Ok(false)
    }

    async fn eval_stock_gate(&self, voucher_id: i64, user_id: i64) -> Result<i64> {
        // 整段逻辑持锁执行，等价于脚本的原子性
        let mut map = self.inner.lock().await;
        let stock_key = crate::store::stock_key(voucher_id);
        let order_key = crate::store::order_set_key(voucher_id);

        let stock = match live_str(&mut map, &stock_key).and_then(|s| s.parse::<i64>().ok()) {
            Some(stock) => stock,
            None => return Ok(GATE_OUT_OF_STOCK),
        };
        if stock < 1 {
            return Ok(GATE_OUT_OF_STOCK);
        }

        let member = user_id.to_string();
        if let Some(Entry {
            value: Value::Set(members),
            ..
        }) = map.get(&order_key)
        {
            if members.contains(&member) {
                return Ok(GATE_DUPLICATE);
            }
        }

        map.insert(
            stock_key,
            Entry {
                value: Value::Str((stock - 1).to_string()),
                expire_at: None,
            },
        );
        match map.get_mut(&order_key) {
            Some(Entry {
                value: Value::Set(members),
                ..
            }) => {
                members.insert(member);
            }
            _ => {
                let mut members = HashSet::new();
                members.insert(member);
                map.insert(
                    order_key,
                    Entry {
                        value: Value::Set(members),
                        expire_at: None,
                    },
                );
            }
        }
        Ok(GATE_OK)
    }

    async fn seed_voucher_stock(&self, voucher_id: i64, stock: i64) -> Result<()> {
        let mut map = self.inner.lock().await;
        map.insert(
            crate::store::stock_key(voucher_id),
            Entry {
                value: Value::Str(stock.to_string()),
                expire_at: None,
            },
        );
        map.remove(&crate::store::order_set_key(voucher_id));
        Ok(())
    }
}
