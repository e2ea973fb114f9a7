//! PostgreSQL order store
//!
//! The aggregate spans four tables. Writes run in one transaction: the
//! parent rows are upserted, then the item rows are replaced wholesale so
//! readers never observe a partial item set.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::models::{Delivery, Item, Order, Payment};
use sqlx::PgPool;
use uuid::Uuid;

use super::{OrderStore, StoreError};

#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    order_uid: Uuid,
    track_number: String,
    entry: String,
    locale: String,
    internal_signature: String,
    customer_id: String,
    delivery_service: String,
    shardkey: String,
    sm_id: i64,
    date_created: DateTime<Utc>,
    oof_shard: String,
}

#[derive(sqlx::FromRow)]
struct DeliveryRow {
    name: String,
    phone: String,
    zip: String,
    city: String,
    address: String,
    region: String,
    email: String,
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    transaction: String,
    request_id: String,
    currency: String,
    provider: String,
    amount: i64,
    payment_dt: i64,
    bank: String,
    delivery_cost: i64,
    goods_total: i64,
    custom_fee: i64,
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    chrt_id: i64,
    track_number: String,
    price: i64,
    rid: String,
    name: String,
    sale: i64,
    size: String,
    total_price: i64,
    nm_id: i64,
    brand: String,
    status: i64,
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert_order(&self, order: &Order) -> Result<(), StoreError> {
        let order_uuid = Uuid::parse_str(&order.order_uid)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (
                order_uid, track_number, entry, locale, internal_signature,
                customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (order_uid) DO UPDATE SET
                track_number = EXCLUDED.track_number,
                entry = EXCLUDED.entry,
                locale = EXCLUDED.locale,
                internal_signature = EXCLUDED.internal_signature,
                customer_id = EXCLUDED.customer_id,
                delivery_service = EXCLUDED.delivery_service,
                shardkey = EXCLUDED.shardkey,
                sm_id = EXCLUDED.sm_id,
                date_created = EXCLUDED.date_created,
                oof_shard = EXCLUDED.oof_shard
            "#,
        )
        .bind(order_uuid)
        .bind(&order.track_number)
        .bind(&order.entry)
        .bind(&order.locale)
        .bind(&order.internal_signature)
        .bind(&order.customer_id)
        .bind(&order.delivery_service)
        .bind(&order.shard_key)
        .bind(order.sm_id)
        .bind(order.date_created)
        .bind(&order.oof_shard)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO deliveries (order_uid, name, phone, zip, city, address, region, email)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (order_uid) DO UPDATE SET
                name = EXCLUDED.name, phone = EXCLUDED.phone, zip = EXCLUDED.zip,
                city = EXCLUDED.city, address = EXCLUDED.address,
                region = EXCLUDED.region, email = EXCLUDED.email
            "#,
        )
        .bind(order_uuid)
        .bind(&order.delivery.name)
        .bind(&order.delivery.phone)
        .bind(&order.delivery.zip)
        .bind(&order.delivery.city)
        .bind(&order.delivery.address)
        .bind(&order.delivery.region)
        .bind(&order.delivery.email)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO payments (
                order_uid, transaction, request_id, currency, provider,
                amount, payment_dt, bank, delivery_cost, goods_total, custom_fee
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (order_uid) DO UPDATE SET
                transaction = EXCLUDED.transaction,
                request_id = EXCLUDED.request_id,
                currency = EXCLUDED.currency,
                provider = EXCLUDED.provider,
                amount = EXCLUDED.amount,
                payment_dt = EXCLUDED.payment_dt,
                bank = EXCLUDED.bank,
                delivery_cost = EXCLUDED.delivery_cost,
                goods_total = EXCLUDED.goods_total,
                custom_fee = EXCLUDED.custom_fee
            "#,
        )
        .bind(order_uuid)
        .bind(&order.payment.transaction)
        .bind(&order.payment.request_id)
        .bind(&order.payment.currency)
        .bind(&order.payment.provider)
        .bind(order.payment.amount)
        .bind(order.payment.payment_dt)
        .bind(&order.payment.bank)
        .bind(order.payment.delivery_cost)
        .bind(order.payment.goods_total)
        .bind(order.payment.custom_fee)
        .execute(&mut *tx)
        .await?;

        // Replace the item set atomically within the same transaction.
        sqlx::query("DELETE FROM items WHERE order_uid = $1")
            .bind(order_uuid)
            .execute(&mut *tx)
            .await?;

        if !order.items.is_empty() {
            let order_uids: Vec<Uuid> = order.items.iter().map(|_| order_uuid).collect();
            let chrt_ids: Vec<i64> = order.items.iter().map(|i| i.chrt_id).collect();
            let track_numbers: Vec<String> =
                order.items.iter().map(|i| i.track_number.clone()).collect();
            let prices: Vec<i64> = order.items.iter().map(|i| i.price).collect();
            let rids: Vec<String> = order.items.iter().map(|i| i.rid.clone()).collect();
            let names: Vec<String> = order.items.iter().map(|i| i.name.clone()).collect();
            let sales: Vec<i64> = order.items.iter().map(|i| i.sale).collect();
            let sizes: Vec<String> = order.items.iter().map(|i| i.size.clone()).collect();
            let total_prices: Vec<i64> = order.items.iter().map(|i| i.total_price).collect();
            let nm_ids: Vec<i64> = order.items.iter().map(|i| i.nm_id).collect();
            let brands: Vec<String> = order.items.iter().map(|i| i.brand.clone()).collect();
            let statuses: Vec<i64> = order.items.iter().map(|i| i.status).collect();
            sqlx::query(
                r#"
                INSERT INTO items (
                    order_uid, chrt_id, track_number, price, rid, name,
                    sale, size, total_price, nm_id, brand, status
                )
                SELECT * FROM UNNEST(
                    $1::uuid[], $2::bigint[], $3::text[], $4::bigint[], $5::text[], $6::text[],
                    $7::bigint[], $8::text[], $9::bigint[], $10::bigint[], $11::text[], $12::bigint[]
                )
                "#,
            )
            .bind(&order_uids)
            .bind(&chrt_ids)
            .bind(&track_numbers)
            .bind(&prices)
            .bind(&rids)
            .bind(&names)
            .bind(&sales)
            .bind(&sizes)
            .bind(&total_prices)
            .bind(&nm_ids)
            .bind(&brands)
            .bind(&statuses)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_order_by_id(&self, order_uid: &str) -> Result<Order, StoreError> {
        let order_uuid = Uuid::parse_str(order_uid)?;

        let order_row: OrderRow = sqlx::query_as(
            r#"
            SELECT order_uid, track_number, entry, locale, internal_signature,
                   customer_id, delivery_service, shardkey, sm_id, date_created, oof_shard
            FROM orders
            WHERE order_uid = $1
            "#,
        )
        .bind(order_uuid)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        let delivery_row: DeliveryRow = sqlx::query_as(
            "SELECT name, phone, zip, city, address, region, email
             FROM deliveries WHERE order_uid = $1",
        )
        .bind(order_uuid)
        .fetch_one(&self.pool)
        .await?;

        let payment_row: PaymentRow = sqlx::query_as(
            r#"
            SELECT transaction, request_id, currency, provider, amount,
                   payment_dt, bank, delivery_cost, goods_total, custom_fee
            FROM payments WHERE order_uid = $1
            "#,
        )
        .bind(order_uuid)
        .fetch_one(&self.pool)
        .await?;

        // No order column is stored; sort by chrt_id for reproducible reads.
        let item_rows: Vec<ItemRow> = sqlx::query_as(
            r#"
            SELECT chrt_id, track_number, price, rid, name, sale, size,
                   total_price, nm_id, brand, status
            FROM items WHERE order_uid = $1
            ORDER BY chrt_id
            "#,
        )
        .bind(order_uuid)
        .fetch_all(&self.pool)
        .await?;

        Ok(Order {
            order_uid: order_row.order_uid.to_string(),
            track_number: order_row.track_number,
            entry: order_row.entry,
            delivery: Delivery {
                name: delivery_row.name,
                phone: delivery_row.phone,
                zip: delivery_row.zip,
                city: delivery_row.city,
                address: delivery_row.address,
                region: delivery_row.region,
                email: delivery_row.email,
            },
            payment: Payment {
                transaction: payment_row.transaction,
                request_id: payment_row.request_id,
                currency: payment_row.currency,
                provider: payment_row.provider,
                amount: payment_row.amount,
                payment_dt: payment_row.payment_dt,
                bank: payment_row.bank,
                delivery_cost: payment_row.delivery_cost,
                goods_total: payment_row.goods_total,
                custom_fee: payment_row.custom_fee,
            },
            items: item_rows
                .into_iter()
                .map(|row| Item {
                    chrt_id: row.chrt_id,
                    track_number: row.track_number,
                    price: row.price,
                    rid: row.rid,
                    name: row.name,
                    sale: row.sale,
                    size: row.size,
                    total_price: row.total_price,
                    nm_id: row.nm_id,
                    brand: row.brand,
                    status: row.status,
                })
                .collect(),
            locale: order_row.locale,
            internal_signature: order_row.internal_signature,
            customer_id: order_row.customer_id,
            delivery_service: order_row.delivery_service,
            shard_key: order_row.shardkey,
            sm_id: order_row.sm_id,
            date_created: order_row.date_created,
            oof_shard: order_row.oof_shard,
        })
    }

    async fn get_all_orders(&self) -> Result<Vec<Order>, StoreError> {
        let uids: Vec<Uuid> = sqlx::query_scalar("SELECT order_uid FROM orders")
            .fetch_all(&self.pool)
            .await?;

        let mut orders = Vec::with_capacity(uids.len());
        for uid in uids {
            match self.get_order_by_id(&uid.to_string()).await {
                Ok(order) => orders.push(order),
                Err(err) => {
                    // One bad row must not block warmup.
                    tracing::warn!(order_uid = %uid, error = %err, "failed to load order");
                }
            }
        }
        Ok(orders)
    }
}
