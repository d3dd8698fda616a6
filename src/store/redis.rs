//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了键值存储接口的Redis实现。

use crate::config::RedisConfig;
use crate::error::{FlashError, Result};
use crate::store::KvStore;
use async_trait::async_trait;
use lazy_static::lazy_static;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use secrecy::ExposeSecret;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument};

lazy_static! {
    /// 库存扣减脚本
    ///
    /// 检查库存、检查用户是否已下单、扣减库存、记录用户，
    /// 四步在Redis内原子执行。库存key缺失视同库存不足。
    static ref STOCK_GATE_SCRIPT: Script = Script::new(
        r#"
        local voucherId = ARGV[1]
        local userId = ARGV[2]
        local stockKey = 'seckill:stock:' .. voucherId
        local orderKey = 'seckill:order:' .. voucherId
        local stock = redis.call('get', stockKey)
        if (stock == false or tonumber(stock) < 1) then
            return 1
        end
        if (redis.call('sismember', orderKey, userId) == 1) then
            return 2
        end
        redis.call('incrby', stockKey, -1)
        redis.call('sadd', orderKey, userId)
        return 0
        "#
    );

    /// 比较并删除脚本，用于锁的安全释放
    static ref COMPARE_DELETE_SCRIPT: Script = Script::new(
        r#"
        if redis.call('get', KEYS[1]) == ARGV[1] then
            return redis.call('del', KEYS[1])
        else
            return 0
        end
        "#
    );
}

/// 键值存储的Redis实现
///
/// 基于ConnectionManager的单机模式连接，自动重连
#[derive(Clone)]
pub struct RedisStore {
    #[allow(dead_code)]
    client: Client,
    manager: ConnectionManager,
    command_timeout_ms: u64,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("command_timeout_ms", &self.command_timeout_ms)
            .finish()
    }
}

impl RedisStore {
    /// 根据配置建立Redis连接
    #[instrument(skip(config), level = "info", name = "init_redis_store")]
    pub async fn new(config: &RedisConfig) -> Result<Self> {
        let connection_string = config.connection_string.expose_secret().to_string();
        let client = Client::open(connection_string.as_str())?;
        let manager = match timeout(
            Duration::from_millis(config.connection_timeout_ms),
            client.get_connection_manager(),
        )
        .await
        {
            Ok(res) => res?,
            Err(_) => {
                return Err(FlashError::Timeout(format!(
                    "Redis connection timed out after {}ms",
                    config.connection_timeout_ms
                )));
            }
        };
        debug!("RedisStore connected");
        Ok(Self {
            client,
            manager,
            command_timeout_ms: config.command_timeout_ms,
        })
    }

    /// 为单条命令施加超时
    async fn run<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        match timeout(Duration::from_millis(self.command_timeout_ms), fut).await {
            Ok(res) => Ok(res?),
            Err(_) => Err(FlashError::Timeout(format!(
                "Redis command '{}' timed out after {}ms",
                op, self.command_timeout_ms
            ))),
        }
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        self.run("GET", async move { conn.get(key).await }).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        self.run("SET", async move { conn.set(key, value).await })
            .await
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        let secs = ttl.as_secs().max(1);
        self.run("SETEX", async move { conn.set_ex(key, value, secs).await })
            .await
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.manager.clone();
        let secs = ttl.as_secs().max(1);
        let reply: Option<String> = self
            .run("SET NX EX", async move {
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("EX")
                    .arg(secs)
                    .query_async(&mut conn)
                    .await
            })
            .await?;
        Ok(reply.is_some())
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.manager.clone();
        self.run("INCR", async move { conn.incr(key, 1).await })
            .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        self.run("DEL", async move { conn.del(key).await }).await
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let deleted: i64 = self
            .run("EVAL compare-delete", async move {
                COMPARE_DELETE_SCRIPT
                    .key(key)
                    .arg(expected)
                    .invoke_async(&mut conn)
                    .await
            })
            .await?;
        Ok(deleted == 1)
    }

    async fn eval_stock_gate(&self, voucher_id: i64, user_id: i64) -> Result<i64> {
        let mut conn = self.manager.clone();
        self.run("EVAL stock-gate", async move {
            STOCK_GATE_SCRIPT
                .arg(voucher_id)
                .arg(user_id)
                .invoke_async(&mut conn)
                .await
        })
        .await
    }

    async fn seed_voucher_stock(&self, voucher_id: i64, stock: i64) -> Result<()> {
        let mut conn = self.manager.clone();
        let stock_key = crate::store::stock_key(voucher_id);
        let order_key = crate::store::order_set_key(voucher_id);
        self.run("MULTI seed-voucher", async move {
            redis::pipe()
                .atomic()
                .set(&stock_key, stock)
                .ignore()
                .del(&order_key)
                .ignore()
                .query_async(&mut conn)
                .await
        })
        .await
    }
}
