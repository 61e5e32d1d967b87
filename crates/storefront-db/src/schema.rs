//! Table definitions.
//!
//! Timestamps are unix milliseconds. A unit without a variant is stored with
//! `variant_id = ''` so the composite keys stay non-null.

use crate::error::db_err;
use sqlx::SqlitePool;
use storefront_core::store::StoreError;

/// Statements applied in order when a store is opened. Each is idempotent.
pub const SCHEMA: &[&str] = &[
    r#"CREATE TABLE IF NOT EXISTS catalog (
        product_id  TEXT NOT NULL,
        variant_id  TEXT NOT NULL DEFAULT '',
        name        TEXT NOT NULL,
        price_cents INTEGER NOT NULL,
        currency    TEXT NOT NULL,
        status      TEXT NOT NULL DEFAULT 'active',
        PRIMARY KEY (product_id, variant_id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS inventory (
        product_id TEXT NOT NULL,
        variant_id TEXT NOT NULL DEFAULT '',
        quantity   INTEGER NOT NULL CHECK (quantity >= 0),
        reserved   INTEGER NOT NULL DEFAULT 0 CHECK (reserved >= 0),
        CHECK (reserved <= quantity),
        PRIMARY KEY (product_id, variant_id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS carts (
        id               TEXT PRIMARY KEY,
        user_id          TEXT UNIQUE,
        token            TEXT UNIQUE,
        coupon_code      TEXT,
        currency         TEXT NOT NULL,
        created_at       INTEGER NOT NULL,
        last_activity_at INTEGER NOT NULL,
        CHECK ((user_id IS NULL) <> (token IS NULL))
    )"#,
    r#"CREATE INDEX IF NOT EXISTS carts_anonymous_activity
        ON carts (last_activity_at) WHERE token IS NOT NULL"#,
    r#"CREATE TABLE IF NOT EXISTS cart_lines (
        id          TEXT PRIMARY KEY,
        cart_id     TEXT NOT NULL REFERENCES carts (id) ON DELETE CASCADE,
        position    INTEGER NOT NULL,
        product_id  TEXT NOT NULL,
        variant_id  TEXT NOT NULL DEFAULT '',
        name        TEXT NOT NULL,
        quantity    INTEGER NOT NULL CHECK (quantity > 0),
        price_cents INTEGER NOT NULL,
        currency    TEXT NOT NULL,
        UNIQUE (cart_id, product_id, variant_id)
    )"#,
    r#"CREATE TABLE IF NOT EXISTS coupons (
        code        TEXT PRIMARY KEY,
        used_count  INTEGER NOT NULL DEFAULT 0 CHECK (used_count >= 0),
        usage_limit INTEGER,
        body        TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS coupon_redemptions (
        code        TEXT NOT NULL,
        user_id     TEXT NOT NULL,
        order_id    TEXT NOT NULL,
        redeemed_at INTEGER NOT NULL,
        PRIMARY KEY (code, order_id)
    )"#,
    r#"CREATE INDEX IF NOT EXISTS coupon_redemptions_by_user
        ON coupon_redemptions (code, user_id)"#,
    r#"CREATE TABLE IF NOT EXISTS addresses (
        id      TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        body    TEXT NOT NULL
    )"#,
    r#"CREATE TABLE IF NOT EXISTS orders (
        id           TEXT PRIMARY KEY,
        order_number TEXT NOT NULL UNIQUE,
        user_id      TEXT NOT NULL,
        status       TEXT NOT NULL,
        created_at   INTEGER NOT NULL,
        body         TEXT NOT NULL
    )"#,
    r#"CREATE INDEX IF NOT EXISTS orders_by_status
        ON orders (status, created_at)"#,
];

pub(crate) async fn apply(pool: &SqlitePool) -> Result<(), StoreError> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await.map_err(db_err)?;
    }
    Ok(())
}
