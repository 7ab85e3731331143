use diesel::{allow_tables_to_appear_in_same_query, table};

table! {
    dropi_orders (id) {
        id -> BigInt,
        user_id -> BigInt,
        external_id -> BigInt,
        status -> Text,
        raw_status -> Text,
        order_total -> Numeric,
        shipping_cost -> Nullable<Numeric>,
        profit -> Nullable<Numeric>,
        customer_name -> Nullable<Text>,
        customer_phone -> Nullable<Text>,
        shipping_city -> Nullable<Text>,
        shipping_department -> Nullable<Text>,
        shipping_address -> Nullable<Text>,
        courier -> Nullable<Text>,
        source_created_at -> Nullable<Timestamptz>,
        source_updated_at -> Nullable<Timestamptz>,
        delivered_at -> Nullable<Timestamptz>,
        returned_at -> Nullable<Timestamptz>,
        is_paid -> Bool,
        paid_at -> Nullable<Timestamptz>,
        paid_amount -> Nullable<Numeric>,
        wallet_movement_id -> Nullable<BigInt>,
        is_return_charged -> Bool,
        charged_at -> Nullable<Timestamptz>,
        charged_amount -> Nullable<Numeric>,
        raw_payload -> Jsonb,
        first_synced_at -> Timestamptz,
        last_synced_at -> Timestamptz,
    }
}

table! {
    wallet_movements (id) {
        id -> BigInt,
        user_id -> BigInt,
        external_id -> BigInt,
        direction -> Nullable<Text>,
        description -> Text,
        amount -> Numeric,
        balance_after -> Nullable<Numeric>,
        order_reference -> Nullable<BigInt>,
        category -> Text,
        moved_at -> Nullable<Timestamptz>,
        raw_payload -> Jsonb,
        synced_at -> Timestamptz,
    }
}

table! {
    platform_connections (id) {
        id -> BigInt,
        user_id -> BigInt,
        platform -> Text,
        credentials -> Text,
        last_orders_sync_at -> Nullable<Timestamptz>,
        last_wallet_sync_at -> Nullable<Timestamptz>,
        last_contacts_sync_at -> Nullable<Timestamptz>,
        sync_status -> Text,
        last_error -> Nullable<Text>,
        active -> Bool,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

table! {
    crm_contacts (id) {
        id -> BigInt,
        user_id -> BigInt,
        external_id -> Text,
        name -> Nullable<Text>,
        phone -> Nullable<Text>,
        ad_id -> Nullable<Text>,
        amount_paid -> Nullable<Numeric>,
        product -> Nullable<Text>,
        qualification -> Nullable<Text>,
        source_created_at -> Nullable<Timestamptz>,
        synced_at -> Timestamptz,
    }
}

allow_tables_to_appear_in_same_query!(
    dropi_orders,
    wallet_movements,
    platform_connections,
    crm_contacts,
);
