// Subset of the hosted schema that the deletion paths touch. Numeric money
// columns are not mapped.

diesel::table! {
    clients (id) {
        id -> Uuid,
        full_name -> Text,
        phone -> Text,
        email -> Nullable<Text>,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        deleted_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    document_types (id) {
        id -> Uuid,
        name -> Text,
        code -> Nullable<Text>,
        required -> Bool,
        sort_order -> Int4,
        is_active -> Bool,
        deleted_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    client_documents (id) {
        id -> Uuid,
        client_id -> Uuid,
        document_type_id -> Nullable<Uuid>,
        custom_name -> Nullable<Text>,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        deleted_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    files (id) {
        id -> Uuid,
        client_id -> Uuid,
        client_document_id -> Nullable<Uuid>,
        bucket -> Text,
        path -> Text,
        original_name -> Nullable<Text>,
        mime_type -> Nullable<Text>,
        size_bytes -> Nullable<Int8>,
        created_at -> Timestamptz,
        deleted_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    client_payments (id) {
        id -> Uuid,
        client_id -> Uuid,
        paid_at -> Date,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        deleted_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    client_ownerships (id) {
        id -> Uuid,
        client_id -> Uuid,
        owner_name -> Text,
        start_year -> Nullable<Int4>,
        end_year -> Nullable<Int4>,
        is_current -> Bool,
        notes -> Nullable<Text>,
        created_at -> Timestamptz,
        deleted_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(client_documents -> clients (client_id));
diesel::joinable!(client_documents -> document_types (document_type_id));
diesel::joinable!(files -> clients (client_id));
diesel::joinable!(files -> client_documents (client_document_id));
diesel::joinable!(client_payments -> clients (client_id));
diesel::joinable!(client_ownerships -> clients (client_id));

diesel::allow_tables_to_appear_in_same_query!(
    clients,
    document_types,
    client_documents,
    files,
    client_payments,
    client_ownerships,
);
