//! The dashboard reports. Each one issues exactly one store query.

use bigdecimal::BigDecimal;
use chrono::DateTime;
use chrono_tz::Tz;
use num_traits::{ToPrimitive, Zero};
use shared::*;

use crate::store::StatisticsStore;

pub async fn total_orders(store: &dyn StatisticsStore) -> Result<TotalOrders, QueryError> {
    let total_orders = store.count_all(Entity::Order).await?;
    Ok(TotalOrders { total_orders })
}

pub async fn orders_by_status(store: &dyn StatisticsStore) -> Result<Vec<StatusCount>, QueryError> {
    let query = GroupCountQuery {
        entity: Entity::Order,
        key: GroupKey::Column(Field::ORDER_DELIVERY_STATUS),
    };
    let rows = store.group_count(&query).await?;
    Ok(rows
        .into_iter()
        .map(|row| StatusCount { delivery_status: row.key, total: row.total })
        .collect())
}

/// Counts every user account.
pub async fn total_customers(store: &dyn StatisticsStore) -> Result<TotalCustomers, QueryError> {
    let total_customers = store.count_all(Entity::User).await?;
    Ok(TotalCustomers { total_customers })
}

pub async fn sales_today(
    store: &dyn StatisticsStore,
    now: DateTime<Tz>,
) -> Result<SalesToday, QueryError> {
    let total_sales_today = order_sales(store, TimeWindow::today(&now)).await?;
    Ok(SalesToday { total_sales_today })
}

pub async fn monthly_sales(
    store: &dyn StatisticsStore,
    now: DateTime<Tz>,
) -> Result<MonthlySales, QueryError> {
    let total_sales_this_month = order_sales(store, TimeWindow::month_to_date(&now)).await?;
    Ok(MonthlySales { total_sales_this_month })
}

pub async fn yearly_sales(
    store: &dyn StatisticsStore,
    now: DateTime<Tz>,
) -> Result<YearlySales, QueryError> {
    let total_sales_this_year = order_sales(store, TimeWindow::year_to_date(&now)).await?;
    Ok(YearlySales { total_sales_this_year })
}

/// Order totals of the current year per calendar month, read on the wall
/// clock of `now`'s zone. Months without orders are absent.
///
/// Only this year's orders count: without the year-to-date window, June of
/// last year and June of this year would be added into one bucket.
pub async fn yearly_sales_by_month(
    store: &dyn StatisticsStore,
    now: DateTime<Tz>,
) -> Result<Vec<MonthTotal>, QueryError> {
    let query = GroupSumQuery {
        entity: Entity::Order,
        key: GroupKey::MonthOf(Field::ORDER_CREATED_AT, now.timezone()),
        aggregate: Field::ORDER_TOTAL,
        window: Some(WindowFilter::new(
            Field::ORDER_CREATED_AT,
            TimeWindow::year_to_date(&now),
        )),
        order: SortOrder::KeyAscending,
    };
    let rows = store.group_sum(&query).await?;
    rows.into_iter()
        .map(|row| -> Result<MonthTotal, QueryError> {
            Ok(MonthTotal {
                month: parse_month(&row.key)?,
                total: to_number(&row.total)?,
            })
        })
        .collect()
}

/// Item prices rolled up to their product's category, highest first.
pub async fn sales_by_category(
    store: &dyn StatisticsStore,
) -> Result<Vec<CategorySales>, QueryError> {
    let query = JoinedGroupSumQuery {
        path: category_path()?,
        key: Field::CATEGORY_ID,
        label: Field::CATEGORY_NAME,
        aggregate: Field::ORDER_ITEM_PRICE,
        order: SortOrder::AggregateDescending,
    };
    let rows = store.joined_group_sum(&query).await?;
    rows.into_iter()
        .map(|row| -> Result<CategorySales, QueryError> {
            Ok(CategorySales {
                total_sales: to_number(&row.total)?,
                category: row.key,
            })
        })
        .collect()
}

/// order_items -> products -> categories
pub fn category_path() -> Result<JoinPath, QueryError> {
    JoinPath::new(Entity::OrderItem)
        .join(JoinSpec::ORDER_ITEM_PRODUCT)?
        .join(JoinSpec::PRODUCT_CATEGORY)
}

async fn order_sales(store: &dyn StatisticsStore, window: TimeWindow) -> Result<f64, QueryError> {
    let query = SumQuery {
        entity: Entity::Order,
        field: Field::ORDER_TOTAL,
        window: Some(WindowFilter::new(Field::ORDER_CREATED_AT, window)),
    };
    // An empty window sums to zero, not null.
    let total = store.sum_field(&query).await?.unwrap_or_else(BigDecimal::zero);
    to_number(&total)
}

fn to_number(value: &BigDecimal) -> Result<f64, QueryError> {
    value
        .to_f64()
        .ok_or_else(|| QueryError::UnexpectedResult(format!("{} does not fit a number", value)))
}

fn parse_month(key: &str) -> Result<u32, QueryError> {
    key.parse::<u32>()
        .ok()
        .filter(|month| (1..=12).contains(month))
        .ok_or_else(|| QueryError::UnexpectedResult(format!("{:?} is not a month", key)))
}
