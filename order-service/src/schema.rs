diesel::table! {
    orders (order_uid) {
        order_uid -> Varchar,
        track_number -> Varchar,
        entry -> Varchar,
        locale -> Varchar,
        internal_signature -> Varchar,
        customer_id -> Varchar,
        delivery_service -> Varchar,
        shardkey -> Varchar,
        sm_id -> Int4,
        date_created -> Timestamptz,
        oof_shard -> Varchar,
    }
}

diesel::table! {
    delivery (order_uid) {
        order_uid -> Varchar,
        name -> Varchar,
        phone -> Varchar,
        zip -> Varchar,
        city -> Varchar,
        address -> Varchar,
        region -> Varchar,
        email -> Varchar,
    }
}

diesel::table! {
    payment (order_uid) {
        order_uid -> Varchar,
        transaction -> Varchar,
        request_id -> Varchar,
        currency -> Varchar,
        provider -> Varchar,
        amount -> Numeric,
        payment_dt -> Int8,
        bank -> Varchar,
        delivery_cost -> Numeric,
        goods_total -> Numeric,
        custom_fee -> Numeric,
    }
}

diesel::table! {
    items (id) {
        id -> Int8,
        chrt_id -> Int8,
        order_uid -> Varchar,
        track_number -> Varchar,
        price -> Numeric,
        rid -> Varchar,
        name -> Varchar,
        sale -> Numeric,
        size -> Varchar,
        total_price -> Numeric,
        nm_id -> Int8,
        brand -> Varchar,
        status -> Int4,
    }
}

diesel::joinable!(delivery -> orders (order_uid));
diesel::joinable!(payment -> orders (order_uid));
diesel::joinable!(items -> orders (order_uid));

diesel::allow_tables_to_appear_in_same_query!(
    orders,
    delivery,
    payment,
    items,
);
