use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use shared::{Delivery, Item, Order, Payment};

use crate::store::StoreError;

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::orders)]
pub struct OrderRow {
    pub order_uid: String,
    pub track_number: String,
    pub entry: String,
    pub locale: String,
    pub internal_signature: String,
    pub customer_id: String,
    pub delivery_service: String,
    pub shardkey: String,
    pub sm_id: i32,
    pub date_created: DateTime<Utc>,
    pub oof_shard: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::delivery)]
pub struct DeliveryRow {
    pub order_uid: String,
    pub name: String,
    pub phone: String,
    pub zip: String,
    pub city: String,
    pub address: String,
    pub region: String,
    pub email: String,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::payment)]
pub struct PaymentRow {
    pub order_uid: String,
    pub transaction: String,
    pub request_id: String,
    pub currency: String,
    pub provider: String,
    pub amount: BigDecimal,
    pub payment_dt: i64,
    pub bank: String,
    pub delivery_cost: BigDecimal,
    pub goods_total: BigDecimal,
    pub custom_fee: BigDecimal,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = crate::schema::items)]
pub struct ItemRow {
    pub id: i64,
    pub chrt_id: i64,
    pub order_uid: String,
    pub track_number: String,
    pub price: BigDecimal,
    pub rid: String,
    pub name: String,
    pub sale: BigDecimal,
    pub size: String,
    pub total_price: BigDecimal,
    pub nm_id: i64,
    pub brand: String,
    pub status: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::items)]
pub struct NewItem {
    pub chrt_id: i64,
    pub order_uid: String,
    pub track_number: String,
    pub price: BigDecimal,
    pub rid: String,
    pub name: String,
    pub sale: BigDecimal,
    pub size: String,
    pub total_price: BigDecimal,
    pub nm_id: i64,
    pub brand: String,
    pub status: i32,
}

/// Every row one order occupies across the four tables.
#[derive(Debug, Clone)]
pub struct OrderRows {
    pub header: OrderRow,
    pub delivery: DeliveryRow,
    pub payment: PaymentRow,
    pub items: Vec<NewItem>,
}

impl TryFrom<&Order> for OrderRows {
    type Error = StoreError;

    fn try_from(order: &Order) -> Result<Self, Self::Error> {
        let uid = &order.order_uid;

        let header = OrderRow {
            order_uid: uid.clone(),
            track_number: order.track_number.clone(),
            entry: order.entry.clone(),
            locale: order.locale.clone(),
            internal_signature: order.internal_signature.clone(),
            customer_id: order.customer_id.clone(),
            delivery_service: order.delivery_service.clone(),
            shardkey: order.shardkey.clone(),
            sm_id: order.sm_id,
            date_created: order.date_created,
            oof_shard: order.oof_shard.clone(),
        };

        let d = &order.delivery;
        let delivery = DeliveryRow {
            order_uid: uid.clone(),
            name: d.name.clone(),
            phone: d.phone.clone(),
            zip: d.zip.clone(),
            city: d.city.clone(),
            address: d.address.clone(),
            region: d.region.clone(),
            email: d.email.clone(),
        };

        let p = &order.payment;
        let payment = PaymentRow {
            order_uid: uid.clone(),
            transaction: p.transaction.clone(),
            request_id: p.request_id.clone(),
            currency: p.currency.clone(),
            provider: p.provider.clone(),
            amount: to_numeric("payment.amount", p.amount)?,
            payment_dt: p.payment_dt,
            bank: p.bank.clone(),
            delivery_cost: to_numeric("payment.delivery_cost", p.delivery_cost)?,
            goods_total: to_numeric("payment.goods_total", p.goods_total)?,
            custom_fee: to_numeric("payment.custom_fee", p.custom_fee)?,
        };

        let items = order
            .items
            .iter()
            .map(|item| {
                Ok(NewItem {
                    chrt_id: item.chrt_id,
                    order_uid: uid.clone(),
                    track_number: item.track_number.clone(),
                    price: to_numeric("item.price", item.price)?,
                    rid: item.rid.clone(),
                    name: item.name.clone(),
                    sale: to_numeric("item.sale", item.sale)?,
                    size: item.size.clone(),
                    total_price: to_numeric("item.total_price", item.total_price)?,
                    nm_id: item.nm_id,
                    brand: item.brand.clone(),
                    status: item.status,
                })
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        Ok(Self { header, delivery, payment, items })
    }
}

/// Rebuilds an order from its stored rows. Absent delivery or payment rows
/// leave the corresponding substructure empty.
pub fn assemble_order(
    header: OrderRow,
    delivery: Option<DeliveryRow>,
    payment: Option<PaymentRow>,
    items: Vec<ItemRow>,
) -> Order {
    let delivery = delivery
        .map(|d| Delivery {
            name: d.name,
            phone: d.phone,
            zip: d.zip,
            city: d.city,
            address: d.address,
            region: d.region,
            email: d.email,
        })
        .unwrap_or_default();

    let payment = payment
        .map(|p| Payment {
            transaction: p.transaction,
            request_id: p.request_id,
            currency: p.currency,
            provider: p.provider,
            amount: from_numeric(&p.amount),
            payment_dt: p.payment_dt,
            bank: p.bank,
            delivery_cost: from_numeric(&p.delivery_cost),
            goods_total: from_numeric(&p.goods_total),
            custom_fee: from_numeric(&p.custom_fee),
        })
        .unwrap_or_default();

    let items = items
        .into_iter()
        .map(|i| Item {
            chrt_id: i.chrt_id,
            track_number: i.track_number,
            price: from_numeric(&i.price),
            rid: i.rid,
            name: i.name,
            sale: from_numeric(&i.sale),
            size: i.size,
            total_price: from_numeric(&i.total_price),
            nm_id: i.nm_id,
            brand: i.brand,
            status: i.status,
        })
        .collect();

    Order {
        order_uid: header.order_uid,
        track_number: header.track_number,
        entry: header.entry,
        delivery,
        payment,
        items,
        locale: header.locale,
        internal_signature: header.internal_signature,
        customer_id: header.customer_id,
        delivery_service: header.delivery_service,
        shardkey: header.shardkey,
        sm_id: header.sm_id,
        date_created: header.date_created,
        oof_shard: header.oof_shard,
    }
}

fn to_numeric(field: &'static str, value: f64) -> Result<BigDecimal, StoreError> {
    if !value.is_finite() {
        return Err(StoreError::InvalidAmount { field, value });
    }
    // Display gives the shortest representation that round-trips.
    BigDecimal::from_str(&value.to_string()).map_err(|_| StoreError::InvalidAmount { field, value })
}

fn from_numeric(value: &BigDecimal) -> f64 {
    // Going through the decimal text keeps values like 0.1 exact on the way back.
    value.to_string().parse().unwrap_or_default()
}
