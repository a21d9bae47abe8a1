diesel::table! {
    categories (id) {
        id -> Uuid,
        name -> Varchar,
    }
}

diesel::table! {
    order_items (id) {
        id -> Uuid,
        order_id -> Uuid,
        product_id -> Uuid,
        quantity -> Int4,
        price -> Numeric,
    }
}

diesel::table! {
    orders (id) {
        id -> Uuid,
        total -> Numeric,
        delivery_status -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    products (id) {
        id -> Uuid,
        category_id -> Uuid,
        name -> Varchar,
        price -> Numeric,
    }
}

diesel::table! {
    users (id) {
        id -> Uuid,
        email -> Varchar,
        role -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(order_items -> orders (order_id));
diesel::joinable!(order_items -> products (product_id));
diesel::joinable!(products -> categories (category_id));

diesel::allow_tables_to_appear_in_same_query!(
    categories,
    order_items,
    orders,
    products,
    users,
);
