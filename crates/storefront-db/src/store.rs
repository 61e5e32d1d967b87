//! `Store` implementation over an SQLite pool.

use crate::error::{corrupt, db_err, open_err};
use crate::schema;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, Sqlite, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use storefront_core::cart::{Cart, CartLine, Coupon, CouponCode, CouponRedemption};
use storefront_core::catalog::{CatalogEntry, InventoryRecord, ProductStatus, SellableUnit};
use storefront_core::checkout::{Order, OrderStatus, SavedAddress};
use storefront_core::identity::{CartOwner, CartToken};
use storefront_core::ids::{AddressId, CartId, LineId, OrderId, UserId};
use storefront_core::money::{Currency, Money};
use storefront_core::store::{Store, StoreError, Transaction};
use tracing::debug;

/// How long a connection waits on a locked database before reporting busy.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-backed store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) a database file and apply the schema.
    ///
    /// With `max_connections = 1` transactions are fully serialized by the
    /// pool. Larger pools run concurrently in WAL mode; lock contention then
    /// surfaces as [`StoreError::Busy`].
    pub async fn open(path: impl AsRef<Path>, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new().filename(path.as_ref());
        Self::open_with(options, max_connections).await
    }

    /// Like [`SqliteStore::open`], from a `sqlite://` URL.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(url).map_err(open_err)?;
        Self::open_with(options, max_connections).await
    }

    async fn open_with(
        options: SqliteConnectOptions,
        max_connections: u32,
    ) -> Result<Self, StoreError> {
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT)
            .foreign_keys(true);
        let filename = options.get_filename().display().to_string();
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(open_err)?;
        debug!(filename = %filename, max_connections, "Opened SQLite store");
        Self::from_pool(pool).await
    }

    /// A private in-memory database. Lives as long as the store.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(open_err)?
            .foreign_keys(true);
        // Every connection to :memory: is a separate database; keep exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(open_err)?;
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and apply the schema.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        schema::apply(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn begin(&self) -> Result<Box<dyn Transaction>, StoreError> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(Box::new(SqliteTx { tx }))
    }
}

/// Rolls back on drop unless committed.
struct SqliteTx {
    tx: sqlx::Transaction<'static, Sqlite>,
}

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn timestamp(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| corrupt(format!("timestamp {ms} out of range")))
}

fn currency(code: &str) -> Result<Currency, StoreError> {
    Currency::from_code(code).ok_or_else(|| corrupt(format!("unknown currency {code}")))
}

fn money(row: &SqliteRow) -> Result<Money, StoreError> {
    let cents: i64 = row.try_get("price_cents").map_err(db_err)?;
    let code: String = row.try_get("currency").map_err(db_err)?;
    Ok(Money::new(cents, currency(&code)?))
}

fn unit(row: &SqliteRow) -> Result<SellableUnit, StoreError> {
    let product: String = row.try_get("product_id").map_err(db_err)?;
    let variant: String = row.try_get("variant_id").map_err(db_err)?;
    Ok(SellableUnit::from_keys(product, &variant))
}

fn body<T: serde::de::DeserializeOwned>(row: &SqliteRow) -> Result<T, StoreError> {
    let raw: String = row.try_get("body").map_err(db_err)?;
    Ok(serde_json::from_str(&raw)?)
}

impl SqliteTx {
    async fn load_cart(&mut self, row: SqliteRow) -> Result<Cart, StoreError> {
        let id: String = row.try_get("id").map_err(db_err)?;
        let user_id: Option<String> = row.try_get("user_id").map_err(db_err)?;
        let token: Option<String> = row.try_get("token").map_err(db_err)?;
        let owner = match (user_id, token) {
            (Some(user), None) => CartOwner::User(UserId::new(user)),
            (None, Some(token)) => CartOwner::Token(
                CartToken::parse(&token)
                    .ok_or_else(|| corrupt(format!("malformed token on cart {id}")))?,
            ),
            _ => return Err(corrupt(format!("cart {id} has no single owner"))),
        };
        let coupon_code: Option<String> = row.try_get("coupon_code").map_err(db_err)?;
        let currency_code: String = row.try_get("currency").map_err(db_err)?;

        let line_rows = sqlx::query(
            "SELECT id, product_id, variant_id, name, quantity, price_cents, currency
             FROM cart_lines WHERE cart_id = ?1 ORDER BY position",
        )
        .bind(&id)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;

        let mut lines = Vec::with_capacity(line_rows.len());
        for line in &line_rows {
            lines.push(CartLine {
                id: LineId::new(line.try_get::<String, _>("id").map_err(db_err)?),
                unit: unit(line)?,
                name: line.try_get("name").map_err(db_err)?,
                quantity: line.try_get("quantity").map_err(db_err)?,
                unit_price: money(line)?,
            });
        }

        Ok(Cart {
            id: CartId::new(id),
            owner,
            lines,
            coupon_code: coupon_code.map(CouponCode::new),
            currency: currency(&currency_code)?,
            created_at: timestamp(row.try_get("created_at").map_err(db_err)?)?,
            last_activity_at: timestamp(row.try_get("last_activity_at").map_err(db_err)?)?,
        })
    }
}

const CART_COLUMNS: &str =
    "SELECT id, user_id, token, coupon_code, currency, created_at, last_activity_at FROM carts";

#[async_trait]
impl Transaction for SqliteTx {
    async fn inventory(
        &mut self,
        unit: &SellableUnit,
    ) -> Result<Option<InventoryRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT quantity, reserved FROM inventory WHERE product_id = ?1 AND variant_id = ?2",
        )
        .bind(unit.product_id.as_str())
        .bind(unit.variant_key())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;

        row.map(|row| {
            Ok(InventoryRecord {
                unit: unit.clone(),
                quantity: row.try_get("quantity").map_err(db_err)?,
                reserved: row.try_get("reserved").map_err(db_err)?,
            })
        })
        .transpose()
    }

    async fn put_inventory(&mut self, record: &InventoryRecord) -> Result<(), StoreError> {
        if !record.is_consistent() {
            return Err(corrupt(format!(
                "reserved {} outside 0..={} for {}",
                record.reserved, record.quantity, record.unit
            )));
        }
        sqlx::query(
            "INSERT INTO inventory (product_id, variant_id, quantity, reserved)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (product_id, variant_id)
             DO UPDATE SET quantity = excluded.quantity, reserved = excluded.reserved",
        )
        .bind(record.unit.product_id.as_str())
        .bind(record.unit.variant_key())
        .bind(record.quantity)
        .bind(record.reserved)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn reserve_if_available(
        &mut self,
        unit: &SellableUnit,
        qty: i64,
    ) -> Result<bool, StoreError> {
        if qty <= 0 {
            return Ok(false);
        }
        let result = sqlx::query(
            "UPDATE inventory SET reserved = reserved + ?3
             WHERE product_id = ?1 AND variant_id = ?2 AND reserved + ?3 <= quantity",
        )
        .bind(unit.product_id.as_str())
        .bind(unit.variant_key())
        .bind(qty)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_reserved(&mut self, unit: &SellableUnit, qty: i64) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE inventory SET reserved = MAX(reserved - ?3, 0)
             WHERE product_id = ?1 AND variant_id = ?2",
        )
        .bind(unit.product_id.as_str())
        .bind(unit.variant_key())
        .bind(qty)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Query(format!("no inventory row for {}", unit)));
        }
        Ok(())
    }

    async fn commit_reserved(&mut self, unit: &SellableUnit, qty: i64) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE inventory
             SET quantity = MAX(quantity - ?3, 0),
                 reserved = MIN(MAX(reserved - ?3, 0), MAX(quantity - ?3, 0))
             WHERE product_id = ?1 AND variant_id = ?2",
        )
        .bind(unit.product_id.as_str())
        .bind(unit.variant_key())
        .bind(qty)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Query(format!("no inventory row for {}", unit)));
        }
        Ok(())
    }

    async fn catalog_entry(
        &mut self,
        unit: &SellableUnit,
    ) -> Result<Option<CatalogEntry>, StoreError> {
        let row = sqlx::query(
            "SELECT name, price_cents, currency, status FROM catalog
             WHERE product_id = ?1 AND variant_id = ?2",
        )
        .bind(unit.product_id.as_str())
        .bind(unit.variant_key())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(db_err)?;

        row.map(|row| {
            let status: String = row.try_get("status").map_err(db_err)?;
            Ok(CatalogEntry {
                unit: unit.clone(),
                name: row.try_get("name").map_err(db_err)?,
                unit_price: money(&row)?,
                status: ProductStatus::parse(&status)
                    .ok_or_else(|| corrupt(format!("unknown product status {status}")))?,
            })
        })
        .transpose()
    }

    async fn put_catalog_entry(&mut self, entry: &CatalogEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO catalog (product_id, variant_id, name, price_cents, currency, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT (product_id, variant_id) DO UPDATE SET
                 name = excluded.name,
                 price_cents = excluded.price_cents,
                 currency = excluded.currency,
                 status = excluded.status",
        )
        .bind(entry.unit.product_id.as_str())
        .bind(entry.unit.variant_key())
        .bind(&entry.name)
        .bind(entry.unit_price.amount_cents)
        .bind(entry.unit_price.currency.code())
        .bind(entry.status.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn cart(&mut self, id: &CartId) -> Result<Option<Cart>, StoreError> {
        let row = sqlx::query(&format!("{CART_COLUMNS} WHERE id = ?1"))
            .bind(id.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => Ok(Some(self.load_cart(row).await?)),
            None => Ok(None),
        }
    }

    async fn cart_for_owner(&mut self, owner: &CartOwner) -> Result<Option<Cart>, StoreError> {
        let (sql, key) = match owner {
            CartOwner::User(user_id) => {
                (format!("{CART_COLUMNS} WHERE user_id = ?1"), user_id.as_str())
            }
            CartOwner::Token(token) => (format!("{CART_COLUMNS} WHERE token = ?1"), token.as_str()),
        };
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => Ok(Some(self.load_cart(row).await?)),
            None => Ok(None),
        }
    }

    async fn save_cart(&mut self, cart: &Cart) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO carts
                 (id, user_id, token, coupon_code, currency, created_at, last_activity_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT (id) DO UPDATE SET
                 user_id = excluded.user_id,
                 token = excluded.token,
                 coupon_code = excluded.coupon_code,
                 currency = excluded.currency,
                 last_activity_at = excluded.last_activity_at",
        )
        .bind(cart.id.as_str())
        .bind(cart.owner.user_id().map(|u| u.as_str()))
        .bind(cart.owner.token().map(|t| t.as_str()))
        .bind(cart.coupon_code.as_ref().map(|c| c.as_str()))
        .bind(cart.currency.code())
        .bind(millis(cart.created_at))
        .bind(millis(cart.last_activity_at))
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;

        sqlx::query("DELETE FROM cart_lines WHERE cart_id = ?1")
            .bind(cart.id.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;

        for (position, line) in cart.lines.iter().enumerate() {
            sqlx::query(
                "INSERT INTO cart_lines
                     (id, cart_id, position, product_id, variant_id, name, quantity,
                      price_cents, currency)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )
            .bind(line.id.as_str())
            .bind(cart.id.as_str())
            .bind(position as i64)
            .bind(line.unit.product_id.as_str())
            .bind(line.unit.variant_key())
            .bind(&line.name)
            .bind(line.quantity)
            .bind(line.unit_price.amount_cents)
            .bind(line.unit_price.currency.code())
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        }
        Ok(())
    }

    async fn delete_cart(&mut self, id: &CartId) -> Result<bool, StoreError> {
        sqlx::query("DELETE FROM cart_lines WHERE cart_id = ?1")
            .bind(id.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        let result = sqlx::query("DELETE FROM carts WHERE id = ?1")
            .bind(id.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_anonymous_carts_inactive_since(
        &mut self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let cutoff = millis(cutoff);
        sqlx::query(
            "DELETE FROM cart_lines WHERE cart_id IN
                 (SELECT id FROM carts WHERE token IS NOT NULL AND last_activity_at < ?1)",
        )
        .bind(cutoff)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        let result =
            sqlx::query("DELETE FROM carts WHERE token IS NOT NULL AND last_activity_at < ?1")
                .bind(cutoff)
                .execute(&mut *self.tx)
                .await
                .map_err(db_err)?;
        Ok(result.rows_affected())
    }

    async fn coupon(&mut self, code: &CouponCode) -> Result<Option<Coupon>, StoreError> {
        let row = sqlx::query("SELECT used_count, body FROM coupons WHERE code = ?1")
            .bind(code.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
        row.map(|row| {
            let mut coupon: Coupon = body(&row)?;
            // The column is the counter; the document copy may lag behind it.
            coupon.used_count = row.try_get("used_count").map_err(db_err)?;
            Ok(coupon)
        })
        .transpose()
    }

    async fn put_coupon(&mut self, coupon: &Coupon) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO coupons (code, used_count, usage_limit, body) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT (code) DO UPDATE SET
                 used_count = excluded.used_count,
                 usage_limit = excluded.usage_limit,
                 body = excluded.body",
        )
        .bind(coupon.code.as_str())
        .bind(coupon.used_count)
        .bind(coupon.usage_limit)
        .bind(serde_json::to_string(coupon)?)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn increment_coupon_usage(&mut self, code: &CouponCode) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE coupons SET used_count = used_count + 1
             WHERE code = ?1 AND (usage_limit IS NULL OR used_count < usage_limit)",
        )
        .bind(code.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected() == 1)
    }

    async fn record_redemption(&mut self, redemption: &CouponRedemption) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO coupon_redemptions (code, user_id, order_id, redeemed_at)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(redemption.code.as_str())
        .bind(redemption.user_id.as_str())
        .bind(redemption.order_id.as_str())
        .bind(millis(redemption.redeemed_at))
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn redemption_count(
        &mut self,
        code: &CouponCode,
        user_id: &UserId,
    ) -> Result<i64, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS redeemed FROM coupon_redemptions WHERE code = ?1 AND user_id = ?2",
        )
        .bind(code.as_str())
        .bind(user_id.as_str())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(db_err)?;
        row.try_get("redeemed").map_err(db_err)
    }

    async fn address(&mut self, id: &AddressId) -> Result<Option<SavedAddress>, StoreError> {
        let row = sqlx::query("SELECT body FROM addresses WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
        row.map(|row| body(&row)).transpose()
    }

    async fn put_address(&mut self, address: &SavedAddress) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO addresses (id, user_id, body) VALUES (?1, ?2, ?3)
             ON CONFLICT (id) DO UPDATE SET user_id = excluded.user_id, body = excluded.body",
        )
        .bind(address.id.as_str())
        .bind(address.user_id.as_str())
        .bind(serde_json::to_string(address)?)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO orders (id, order_number, user_id, status, created_at, body)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(order.id.as_str())
        .bind(&order.order_number)
        .bind(order.user_id.as_str())
        .bind(order.status.as_str())
        .bind(millis(order.created_at))
        .bind(serde_json::to_string(order)?)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn order(&mut self, id: &OrderId) -> Result<Option<Order>, StoreError> {
        let row = sqlx::query("SELECT body FROM orders WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
        row.map(|row| body(&row)).transpose()
    }

    async fn update_order(&mut self, order: &Order) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE orders SET status = ?2, body = ?3 WHERE id = ?1")
            .bind(order.id.as_str())
            .bind(order.status.as_str())
            .bind(serde_json::to_string(order)?)
            .execute(&mut *self.tx)
            .await
            .map_err(db_err)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Query(format!("order {} does not exist", order.id)));
        }
        Ok(())
    }

    async fn orders_with_status_before(
        &mut self,
        status: OrderStatus,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<OrderId>, StoreError> {
        let rows = sqlx::query(
            "SELECT id FROM orders WHERE status = ?1 AND created_at < ?2
             ORDER BY created_at, id",
        )
        .bind(status.as_str())
        .bind(millis(cutoff))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_err)?;
        rows.iter()
            .map(|row| Ok(OrderId::new(row.try_get::<String, _>("id").map_err(db_err)?)))
            .collect()
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        this.tx.commit().await.map_err(db_err)
    }
}
