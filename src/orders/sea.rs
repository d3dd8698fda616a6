//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了持久化接口的Sea-ORM实现，支持SQLite、MySQL和PostgreSQL。

use crate::config::DatabaseConfig;
use crate::error::{FlashError, Result};
use crate::orders::{OrderStore, SeckillVoucher, VoucherOrder};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseBackend, DatabaseConnection, Statement,
};
use std::time::Duration;
use tracing::{debug, instrument};

/// 订单表建表语句，时间列统一存RFC3339文本以保持跨库可移植
const CREATE_ORDER_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS tb_voucher_order (
    id BIGINT NOT NULL PRIMARY KEY,
    user_id BIGINT NOT NULL,
    voucher_id BIGINT NOT NULL,
    create_time VARCHAR(48) NOT NULL,
    CONSTRAINT uq_user_voucher UNIQUE (user_id, voucher_id)
)
"#;

const CREATE_VOUCHER_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS tb_seckill_voucher (
    voucher_id BIGINT NOT NULL PRIMARY KEY,
    stock BIGINT NOT NULL,
    begin_time VARCHAR(48) NOT NULL,
    end_time VARCHAR(48) NOT NULL
)
"#;

/// 持久化存储的Sea-ORM实现
#[derive(Clone)]
pub struct SeaOrderStore {
    connection: DatabaseConnection,
    backend: DatabaseBackend,
}

impl std::fmt::Debug for SeaOrderStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeaOrderStore")
            .field("backend", &self.backend)
            .finish()
    }
}

impl SeaOrderStore {
    /// 根据配置建立数据库连接
    #[instrument(skip(config), level = "info", name = "init_order_store")]
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let mut options = ConnectOptions::new(config.url.clone());
        options
            .max_connections(config.max_connections)
            .connect_timeout(Duration::from_secs(10))
            .sqlx_logging(false);
        let connection = Database::connect(options).await?;
        let backend = connection.get_database_backend();
        debug!(?backend, "order store connected");
        Ok(Self {
            connection,
            backend,
        })
    }

    /// 包装已有连接（测试用）
    pub fn from_connection(connection: DatabaseConnection) -> Self {
        let backend = connection.get_database_backend();
        Self {
            connection,
            backend,
        }
    }

    /// 建表，幂等，用于首次启动和测试
    pub async fn ensure_schema(&self) -> Result<()> {
        self.connection
            .execute_unprepared(CREATE_ORDER_TABLE)
            .await?;
        self.connection
            .execute_unprepared(CREATE_VOUCHER_TABLE)
            .await?;
        Ok(())
    }

    /// 按后端选择占位符风格
    fn sql<'a>(&self, question_mark: &'a str, dollar: &'a str) -> &'a str {
        match self.backend {
            DatabaseBackend::Postgres => dollar,
            _ => question_mark,
        }
    }
}

fn parse_time(raw: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| FlashError::Serialization(format!("bad {} value '{}': {}", column, raw, e)))
}

#[async_trait]
impl OrderStore for SeaOrderStore {
    async fn load_voucher(&self, voucher_id: i64) -> Result<Option<SeckillVoucher>> {
        let statement = Statement::from_sql_and_values(
            self.backend,
            self.sql(
                "SELECT voucher_id, stock, begin_time, end_time FROM tb_seckill_voucher WHERE voucher_id = ?",
                "SELECT voucher_id, stock, begin_time, end_time FROM tb_seckill_voucher WHERE voucher_id = $1",
            ),
            [voucher_id.into()],
        );
        let row = match self.connection.query_one(statement).await? {
            Some(row) => row,
            None => return Ok(None),
        };
        let begin_time: String = row.try_get("", "begin_time")?;
        let end_time: String = row.try_get("", "end_time")?;
        Ok(Some(SeckillVoucher {
            voucher_id: row.try_get("", "voucher_id")?,
            stock: row.try_get("", "stock")?,
            begin_time: parse_time(&begin_time, "begin_time")?,
            end_time: parse_time(&end_time, "end_time")?,
        }))
    }

    async fn save_voucher(&self, voucher: &SeckillVoucher) -> Result<()> {
        let statement = Statement::from_sql_and_values(
            self.backend,
            self.sql(
                "INSERT INTO tb_seckill_voucher (voucher_id, stock, begin_time, end_time) VALUES (?, ?, ?, ?)",
                "INSERT INTO tb_seckill_voucher (voucher_id, stock, begin_time, end_time) VALUES ($1, $2, $3, $4)",
            ),
            [
                voucher.voucher_id.into(),
                voucher.stock.into(),
                voucher.begin_time.to_rfc3339().into(),
                voucher.end_time.to_rfc3339().into(),
            ],
        );
        self.connection.execute(statement).await?;
        Ok(())
    }

    async fn order_exists(&self, user_id: i64, voucher_id: i64) -> Result<bool> {
        let statement = Statement::from_sql_and_values(
            self.backend,
            self.sql(
                "SELECT COUNT(*) AS cnt FROM tb_voucher_order WHERE user_id = ? AND voucher_id = ?",
                "SELECT COUNT(*) AS cnt FROM tb_voucher_order WHERE user_id = $1 AND voucher_id = $2",
            ),
            [user_id.into(), voucher_id.into()],
        );
        let row = self.connection.query_one(statement).await?;
        let count: i64 = match row {
            Some(row) => row.try_get("", "cnt")?,
            None => 0,
        };
        Ok(count > 0)
    }

    async fn insert_order(&self, order: &VoucherOrder) -> Result<()> {
        let statement = Statement::from_sql_and_values(
            self.backend,
            self.sql(
                "INSERT INTO tb_voucher_order (id, user_id, voucher_id, create_time) VALUES (?, ?, ?, ?)",
                "INSERT INTO tb_voucher_order (id, user_id, voucher_id, create_time) VALUES ($1, $2, $3, $4)",
            ),
            [
                order.id.into(),
                order.user_id.into(),
                order.voucher_id.into(),
                order.create_time.to_rfc3339().into(),
            ],
        );
        // (user_id, voucher_id)唯一约束兜底：并发写入同一用户订单时
        // 后到者在此收到数据库错误
        self.connection.execute(statement).await?;
        Ok(())
    }
}
