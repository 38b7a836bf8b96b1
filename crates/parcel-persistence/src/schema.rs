//! Esquema Diesel (declarado manualmente). Reemplazable con `diesel
//! print-schema`.
//!
//! Tablas:
//! - `kv_items`: tabla única con clave `(tbl, pk, sk)`; las columnas
//!   `gsiNpk`/`gsiNsk` materializan los índices secundarios y el ítem
//!   completo vive en `attributes` (JSONB).
//! - `kv_transact_tokens`: registro de `client_request_token` aplicados
//!   (idempotencia de transacciones).

diesel::table! {
    kv_items (tbl, pk, sk) {
        tbl -> Text,
        pk -> Text,
        sk -> Text,
        entity_type -> Nullable<Text>,
        gsi1pk -> Nullable<Text>,
        gsi1sk -> Nullable<Text>,
        gsi2pk -> Nullable<Text>,
        gsi2sk -> Nullable<Text>,
        gsi3pk -> Nullable<Text>,
        gsi3sk -> Nullable<Text>,
        attributes -> Jsonb,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    kv_transact_tokens (token) {
        token -> Text,
        applied_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(kv_items, kv_transact_tokens,);
