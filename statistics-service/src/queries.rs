//! Aggregate statements over the shop schema, built with diesel's query DSL.
//!
//! Columns are types in diesel, so each shape the query vocabulary can express
//! is spelled out per table below and picked by matching on the validated
//! query. A valid query that has no statement here is reported as invalid.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use diesel::dsl::{count_star, sql, sum};
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::sql_types::{Bool, Integer, Text};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use num_traits::Zero;
use shared::*;
use uuid::Uuid;

use crate::schema::{categories, order_items, orders, products, users};

type OrderFilter = Box<dyn BoxableExpression<orders::table, Pg, SqlType = Bool>>;

/// Orders created inside the window, or every order.
fn order_window(window: Option<&WindowFilter>) -> OrderFilter {
    match window {
        Some(filter) => {
            Box::new(orders::created_at.between(filter.window.start, filter.window.end))
        }
        None => Box::new(true.into_sql::<Bool>()),
    }
}

fn unsupported(what: impl std::fmt::Display) -> QueryError {
    QueryError::invalid(format!("no statement for {}", what))
}

fn counted<K: ToString>(rows: Vec<(K, i64)>) -> Vec<GroupRow<i64>> {
    rows.into_iter()
        .map(|(key, total)| GroupRow { key: key.to_string(), total })
        .collect()
}

fn summed<K: ToString, S: Into<BigDecimal>>(rows: Vec<(K, Option<S>)>) -> Vec<GroupRow<BigDecimal>> {
    rows.into_iter()
        .map(|(key, total)| GroupRow {
            key: key.to_string(),
            total: total.map_or_else(BigDecimal::zero, Into::into),
        })
        .collect()
}

/// Calls `$then!(table, column, KeyType, ..)` with the `orders` column behind `$field`.
macro_rules! order_columns {
    ($field:expr, $then:ident!($($args:tt)*)) => {
        match $field {
            Field::ORDER_ID => $then!(orders, id, Uuid, $($args)*),
            Field::ORDER_TOTAL => $then!(orders, total, BigDecimal, $($args)*),
            Field::ORDER_DELIVERY_STATUS => $then!(orders, delivery_status, String, $($args)*),
            Field::ORDER_CREATED_AT => $then!(orders, created_at, DateTime<Utc>, $($args)*),
            other => Err(unsupported(other)),
        }
    };
}

macro_rules! order_item_columns {
    ($field:expr, $then:ident!($($args:tt)*)) => {
        match $field {
            Field::ORDER_ITEM_ID => $then!(order_items, id, Uuid, $($args)*),
            Field::ORDER_ITEM_ORDER_ID => $then!(order_items, order_id, Uuid, $($args)*),
            Field::ORDER_ITEM_PRODUCT_ID => $then!(order_items, product_id, Uuid, $($args)*),
            Field::ORDER_ITEM_QUANTITY => $then!(order_items, quantity, i32, $($args)*),
            Field::ORDER_ITEM_PRICE => $then!(order_items, price, BigDecimal, $($args)*),
            other => Err(unsupported(other)),
        }
    };
}

macro_rules! product_columns {
    ($field:expr, $then:ident!($($args:tt)*)) => {
        match $field {
            Field::PRODUCT_ID => $then!(products, id, Uuid, $($args)*),
            Field::PRODUCT_CATEGORY_ID => $then!(products, category_id, Uuid, $($args)*),
            Field::PRODUCT_NAME => $then!(products, name, String, $($args)*),
            Field::PRODUCT_PRICE => $then!(products, price, BigDecimal, $($args)*),
            other => Err(unsupported(other)),
        }
    };
}

macro_rules! category_columns {
    ($field:expr, $then:ident!($($args:tt)*)) => {
        match $field {
            Field::CATEGORY_ID => $then!(categories, id, Uuid, $($args)*),
            Field::CATEGORY_NAME => $then!(categories, name, String, $($args)*),
            other => Err(unsupported(other)),
        }
    };
}

macro_rules! user_columns {
    ($field:expr, $then:ident!($($args:tt)*)) => {
        match $field {
            Field::USER_ID => $then!(users, id, Uuid, $($args)*),
            Field::USER_EMAIL => $then!(users, email, String, $($args)*),
            Field::USER_ROLE => $then!(users, role, String, $($args)*),
            Field::USER_CREATED_AT => $then!(users, created_at, DateTime<Utc>, $($args)*),
            other => Err(unsupported(other)),
        }
    };
}

/// Month (1..=12) of `$table.created_at` on the wall clock of `$zone`.
///
/// The zone is bound by its IANA name, so the result does not depend on the
/// database session's `TimeZone` setting.
macro_rules! month_of {
    ($table:ident, $zone:expr) => {
        sql::<Integer>("CAST(date_part('month', timezone(")
            .bind::<Text, _>($zone.name())
            .sql(concat!(", \"", stringify!($table), "\".\"created_at\")) AS INTEGER)"))
    };
}

macro_rules! count_by {
    ($table:ident, $column:ident, $key:ty, $conn:expr) => {
        $table::table
            .group_by($table::$column)
            .select(($table::$column, count_star()))
            .order($table::$column.asc())
            .load::<($key, i64)>($conn)
            .await
            .map(counted)
            .map_err(QueryError::from)
    };
}

// GROUP BY and ORDER BY refer to the month by its position in the select list.
macro_rules! count_by_month {
    ($table:ident, $zone:expr, $conn:expr) => {
        $table::table
            .group_by(sql::<Integer>("1"))
            .select((month_of!($table, $zone), count_star()))
            .order(sql::<Integer>("1").asc())
            .load::<(i32, i64)>($conn)
            .await
            .map(counted)
            .map_err(QueryError::from)
    };
}

macro_rules! sum_by {
    ($table:ident, $column:ident, $key:ty, $conn:expr, $order:expr, $aggregate:expr, $sum:ty $(, $filter:expr)?) => {{
        let grouped = $table::table
            $(.filter($filter))?
            .group_by($table::$column)
            .select(($table::$column, sum($aggregate)));
        let rows = match $order {
            SortOrder::KeyAscending => grouped
                .order($table::$column.asc())
                .load::<($key, Option<$sum>)>($conn)
                .await,
            SortOrder::AggregateDescending => grouped
                .order((sum($aggregate).desc(), $table::$column.asc()))
                .load::<($key, Option<$sum>)>($conn)
                .await,
        };
        rows.map(summed).map_err(QueryError::from)
    }};
}

/// Groups by the joined entity's id, reports its label, and ties on the
/// aggregate fall back to label then id.
macro_rules! joined_sum {
    ($source:expr, $key:path, $label:path, $conn:expr, $order:expr, $aggregate:expr, $sum:ty) => {{
        let grouped = $source
            .group_by(($key, $label))
            .select(($label, sum($aggregate)));
        let rows = match $order {
            SortOrder::KeyAscending => grouped
                .order(($label.asc(), $key.asc()))
                .load::<(String, Option<$sum>)>($conn)
                .await,
            SortOrder::AggregateDescending => grouped
                .order((sum($aggregate).desc(), $label.asc(), $key.asc()))
                .load::<(String, Option<$sum>)>($conn)
                .await,
        };
        rows.map(summed).map_err(QueryError::from)
    }};
}

/// Appends the `order_items` column summed by `$aggregate` to `$then!`'s arguments.
macro_rules! item_aggregate {
    ($aggregate:expr, $then:ident!($($args:tt)*)) => {
        match $aggregate {
            Field::ORDER_ITEM_PRICE => $then!($($args)*, order_items::price, BigDecimal),
            Field::ORDER_ITEM_QUANTITY => $then!($($args)*, order_items::quantity, i64),
            other => Err(unsupported(other)),
        }
    };
}

pub async fn count_all(conn: &mut AsyncPgConnection, entity: Entity) -> Result<i64, QueryError> {
    let total = match entity {
        Entity::Order => orders::table.count().get_result(conn).await,
        Entity::OrderItem => order_items::table.count().get_result(conn).await,
        Entity::Product => products::table.count().get_result(conn).await,
        Entity::Category => categories::table.count().get_result(conn).await,
        Entity::User => users::table.count().get_result(conn).await,
    };
    Ok(total?)
}

pub async fn sum_field(
    conn: &mut AsyncPgConnection,
    query: &SumQuery,
) -> Result<Option<BigDecimal>, QueryError> {
    query.validate()?;
    let total = match query.field {
        Field::ORDER_TOTAL => {
            orders::table
                .filter(order_window(query.window.as_ref()))
                .select(sum(orders::total))
                .get_result::<Option<BigDecimal>>(conn)
                .await?
        }
        Field::ORDER_ITEM_PRICE => {
            order_items::table
                .select(sum(order_items::price))
                .get_result::<Option<BigDecimal>>(conn)
                .await?
        }
        Field::ORDER_ITEM_QUANTITY => order_items::table
            .select(sum(order_items::quantity))
            .get_result::<Option<i64>>(conn)
            .await?
            .map(BigDecimal::from),
        Field::PRODUCT_PRICE => {
            products::table
                .select(sum(products::price))
                .get_result::<Option<BigDecimal>>(conn)
                .await?
        }
        other => return Err(unsupported(other)),
    };
    Ok(total)
}

pub async fn group_count(
    conn: &mut AsyncPgConnection,
    query: &GroupCountQuery,
) -> Result<Vec<GroupRow<i64>>, QueryError> {
    query.validate()?;
    match query.key {
        GroupKey::Column(field) => match field.entity() {
            Entity::Order => order_columns!(field, count_by!(conn)),
            Entity::OrderItem => order_item_columns!(field, count_by!(conn)),
            Entity::Product => product_columns!(field, count_by!(conn)),
            Entity::Category => category_columns!(field, count_by!(conn)),
            Entity::User => user_columns!(field, count_by!(conn)),
        },
        GroupKey::MonthOf(Field::ORDER_CREATED_AT, zone) => count_by_month!(orders, zone, conn),
        GroupKey::MonthOf(Field::USER_CREATED_AT, zone) => count_by_month!(users, zone, conn),
        GroupKey::MonthOf(field, _) => Err(unsupported(field)),
    }
}

pub async fn group_sum(
    conn: &mut AsyncPgConnection,
    query: &GroupSumQuery,
) -> Result<Vec<GroupRow<BigDecimal>>, QueryError> {
    query.validate()?;
    let order = query.order;
    match (query.aggregate, query.key) {
        (Field::ORDER_TOTAL, GroupKey::MonthOf(_, zone)) => {
            order_total_by_month(conn, zone, order_window(query.window.as_ref()), order).await
        }
        (Field::ORDER_TOTAL, GroupKey::Column(field)) => order_columns!(
            field,
            sum_by!(conn, order, orders::total, BigDecimal, order_window(query.window.as_ref()))
        ),
        (Field::ORDER_ITEM_PRICE, GroupKey::Column(field)) => {
            order_item_columns!(field, sum_by!(conn, order, order_items::price, BigDecimal))
        }
        (Field::ORDER_ITEM_QUANTITY, GroupKey::Column(field)) => {
            order_item_columns!(field, sum_by!(conn, order, order_items::quantity, i64))
        }
        (Field::PRODUCT_PRICE, GroupKey::Column(field)) => {
            product_columns!(field, sum_by!(conn, order, products::price, BigDecimal))
        }
        (aggregate, key) => Err(unsupported(format!("{} grouped by {}", aggregate, key.field()))),
    }
}

async fn order_total_by_month(
    conn: &mut AsyncPgConnection,
    zone: Tz,
    window: OrderFilter,
    order: SortOrder,
) -> Result<Vec<GroupRow<BigDecimal>>, QueryError> {
    let grouped = orders::table
        .filter(window)
        .group_by(sql::<Integer>("1"))
        .select((month_of!(orders, zone), sum(orders::total)));
    let rows = match order {
        SortOrder::KeyAscending => {
            grouped
                .order(sql::<Integer>("1").asc())
                .load::<(i32, Option<BigDecimal>)>(conn)
                .await
        }
        SortOrder::AggregateDescending => {
            grouped
                .order((sum(orders::total).desc(), sql::<Integer>("1").asc()))
                .load::<(i32, Option<BigDecimal>)>(conn)
                .await
        }
    };
    Ok(summed(rows?))
}

pub async fn joined_group_sum(
    conn: &mut AsyncPgConnection,
    query: &JoinedGroupSumQuery,
) -> Result<Vec<GroupRow<BigDecimal>>, QueryError> {
    query.validate()?;
    let order = query.order;
    match (query.path.root(), query.path.hops(), query.key) {
        (
            Entity::OrderItem,
            [JoinSpec::ORDER_ITEM_PRODUCT, JoinSpec::PRODUCT_CATEGORY],
            Field::CATEGORY_ID,
        ) => item_aggregate!(
            query.aggregate,
            joined_sum!(
                order_items::table.inner_join(products::table.inner_join(categories::table)),
                categories::id,
                categories::name,
                conn,
                order
            )
        ),
        (
            Entity::OrderItem,
            [JoinSpec::ORDER_ITEM_PRODUCT, JoinSpec::PRODUCT_CATEGORY],
            Field::PRODUCT_ID,
        ) => item_aggregate!(
            query.aggregate,
            joined_sum!(
                order_items::table.inner_join(products::table.inner_join(categories::table)),
                products::id,
                products::name,
                conn,
                order
            )
        ),
        (Entity::OrderItem, [JoinSpec::ORDER_ITEM_PRODUCT], Field::PRODUCT_ID) => item_aggregate!(
            query.aggregate,
            joined_sum!(
                order_items::table.inner_join(products::table),
                products::id,
                products::name,
                conn,
                order
            )
        ),
        (Entity::OrderItem, [JoinSpec::ORDER_ITEM_ORDER], Field::ORDER_ID) => item_aggregate!(
            query.aggregate,
            joined_sum!(
                order_items::table.inner_join(orders::table),
                orders::id,
                orders::delivery_status,
                conn,
                order
            )
        ),
        (Entity::Product, [JoinSpec::PRODUCT_CATEGORY], Field::CATEGORY_ID) => joined_sum!(
            products::table.inner_join(categories::table),
            categories::id,
            categories::name,
            conn,
            order,
            products::price,
            BigDecimal
        ),
        (root, _, key) => Err(unsupported(format!("{} grouped by {}", root, key))),
    }
}
