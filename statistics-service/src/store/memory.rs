//! In-memory [`StatisticsStore`] with the same aggregate semantics as the
//! PostgreSQL store: inclusive windows, inner joins, key-ascending groups and
//! descending aggregates tie-broken by key.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Datelike, Utc};
use num_traits::Zero;
use shared::*;
use uuid::Uuid;

use super::StatisticsStore;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Id(Uuid),
    Text(String),
    Int(i64),
    Num(BigDecimal),
    Time(DateTime<Utc>),
}

type Row = HashMap<&'static str, Value>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum GroupValue {
    Int(i64),
    Text(String),
}

impl fmt::Display for GroupValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupValue::Int(value) => write!(f, "{}", value),
            GroupValue::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: HashMap<Entity, Vec<Row>>,
    failure: Option<String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose every query fails with a connection error.
    pub fn failing(message: &str) -> Self {
        Self { failure: Some(message.to_string()), ..Self::default() }
    }

    pub fn insert(&mut self, entity: Entity, values: Vec<(Field, Value)>) {
        let row = values
            .into_iter()
            .map(|(field, value)| {
                assert_eq!(field.entity(), entity, "{} inserted into {}", field, entity);
                (field.column(), value)
            })
            .collect();
        self.tables.entry(entity).or_default().push(row);
    }

    pub fn add_user(&mut self, role: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.insert(
            Entity::User,
            vec![
                (Field::USER_ID, Value::Id(id)),
                (Field::USER_EMAIL, Value::Text(format!("{}@example.com", id))),
                (Field::USER_ROLE, Value::Text(role.to_string())),
                (Field::USER_CREATED_AT, Value::Time(Utc::now())),
            ],
        );
        id
    }

    pub fn add_category(&mut self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.insert(
            Entity::Category,
            vec![
                (Field::CATEGORY_ID, Value::Id(id)),
                (Field::CATEGORY_NAME, Value::Text(name.to_string())),
            ],
        );
        id
    }

    pub fn add_product(&mut self, category_id: Uuid, price: i64) -> Uuid {
        let id = Uuid::new_v4();
        self.insert(
            Entity::Product,
            vec![
                (Field::PRODUCT_ID, Value::Id(id)),
                (Field::PRODUCT_CATEGORY_ID, Value::Id(category_id)),
                (Field::PRODUCT_NAME, Value::Text(format!("product-{}", id))),
                (Field::PRODUCT_PRICE, Value::Num(BigDecimal::from(price))),
            ],
        );
        id
    }

    pub fn add_order(&mut self, total: i64, status: &str, created_at: DateTime<Utc>) -> Uuid {
        let id = Uuid::new_v4();
        self.insert(
            Entity::Order,
            vec![
                (Field::ORDER_ID, Value::Id(id)),
                (Field::ORDER_TOTAL, Value::Num(BigDecimal::from(total))),
                (Field::ORDER_DELIVERY_STATUS, Value::Text(status.to_string())),
                (Field::ORDER_CREATED_AT, Value::Time(created_at)),
            ],
        );
        id
    }

    pub fn add_order_item(
        &mut self,
        order_id: Uuid,
        product_id: Uuid,
        quantity: i64,
        price: i64,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.insert(
            Entity::OrderItem,
            vec![
                (Field::ORDER_ITEM_ID, Value::Id(id)),
                (Field::ORDER_ITEM_ORDER_ID, Value::Id(order_id)),
                (Field::ORDER_ITEM_PRODUCT_ID, Value::Id(product_id)),
                (Field::ORDER_ITEM_QUANTITY, Value::Int(quantity)),
                (Field::ORDER_ITEM_PRICE, Value::Num(BigDecimal::from(price))),
            ],
        );
        id
    }

    fn rows(&self, entity: Entity) -> &[Row] {
        self.tables.get(&entity).map(Vec::as_slice).unwrap_or(&[])
    }

    fn available(&self) -> Result<(), QueryError> {
        match &self.failure {
            Some(message) => Err(QueryError::Connection(message.clone())),
            None => Ok(()),
        }
    }

    fn windowed<'a>(
        &'a self,
        entity: Entity,
        window: Option<&'a WindowFilter>,
    ) -> impl Iterator<Item = &'a Row> + 'a {
        self.rows(entity).iter().filter(move |row| match window {
            Some(filter) => matches!(
                row.get(filter.field.column()),
                Some(Value::Time(instant)) if filter.window.contains(*instant)
            ),
            None => true,
        })
    }
}

fn number(row: &Row, field: Field) -> BigDecimal {
    match row.get(field.column()) {
        Some(Value::Num(value)) => value.clone(),
        Some(Value::Int(value)) => BigDecimal::from(*value),
        _ => BigDecimal::zero(),
    }
}

fn group_value(row: &Row, key: GroupKey) -> Option<GroupValue> {
    let value = row.get(key.field().column())?;
    match (key, value) {
        (GroupKey::MonthOf(_, zone), Value::Time(instant)) => {
            Some(GroupValue::Int(i64::from(instant.with_timezone(&zone).month())))
        }
        (GroupKey::MonthOf(..), _) => None,
        (GroupKey::Column(_), value) => Some(column_value(value)),
    }
}

fn column_value(value: &Value) -> GroupValue {
    match value {
        Value::Id(id) => GroupValue::Text(id.to_string()),
        Value::Text(text) => GroupValue::Text(text.clone()),
        Value::Int(number) => GroupValue::Int(*number),
        Value::Num(number) => GroupValue::Text(number.to_string()),
        Value::Time(instant) => GroupValue::Text(instant.to_string()),
    }
}

fn sort_groups<K: ToString>(groups: BTreeMap<K, BigDecimal>, order: SortOrder) -> Vec<GroupRow<BigDecimal>> {
    let mut rows: Vec<GroupRow<BigDecimal>> = groups
        .into_iter()
        .map(|(key, total)| GroupRow { key: key.to_string(), total })
        .collect();
    if order == SortOrder::AggregateDescending {
        // Stable: equal totals keep their key-ascending order.
        rows.sort_by(|a, b| b.total.cmp(&a.total));
    }
    rows
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct LabelledKey {
    label: String,
    key: GroupValue,
}

impl fmt::Display for LabelledKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}

#[async_trait]
impl StatisticsStore for MemoryStore {
    async fn count_all(&self, entity: Entity) -> Result<i64, QueryError> {
        self.available()?;
        Ok(self.rows(entity).len() as i64)
    }

    async fn sum_field(&self, query: &SumQuery) -> Result<Option<BigDecimal>, QueryError> {
        query.validate()?;
        self.available()?;
        Ok(self
            .windowed(query.entity, query.window.as_ref())
            .map(|row| number(row, query.field))
            .reduce(|sum, value| sum + value))
    }

    async fn group_count(&self, query: &GroupCountQuery) -> Result<Vec<GroupRow<i64>>, QueryError> {
        query.validate()?;
        self.available()?;
        let mut groups: BTreeMap<GroupValue, i64> = BTreeMap::new();
        for row in self.rows(query.entity) {
            if let Some(key) = group_value(row, query.key) {
                *groups.entry(key).or_default() += 1;
            }
        }
        Ok(groups
            .into_iter()
            .map(|(key, total)| GroupRow { key: key.to_string(), total })
            .collect())
    }

    async fn group_sum(
        &self,
        query: &GroupSumQuery,
    ) -> Result<Vec<GroupRow<BigDecimal>>, QueryError> {
        query.validate()?;
        self.available()?;
        let mut groups: BTreeMap<GroupValue, BigDecimal> = BTreeMap::new();
        for row in self.windowed(query.entity, query.window.as_ref()) {
            if let Some(key) = group_value(row, query.key) {
                let total = groups.entry(key).or_insert_with(BigDecimal::zero);
                *total += number(row, query.aggregate);
            }
        }
        Ok(sort_groups(groups, query.order))
    }

    async fn joined_group_sum(
        &self,
        query: &JoinedGroupSumQuery,
    ) -> Result<Vec<GroupRow<BigDecimal>>, QueryError> {
        query.validate()?;
        self.available()?;
        let path = &query.path;
        let mut groups: BTreeMap<LabelledKey, BigDecimal> = BTreeMap::new();

        'rows: for root in self.rows(path.root()) {
            // Rows reached along the path, indexed by path position.
            let mut reached = vec![root];
            for hop in path.hops() {
                let Some(source) = path.position(hop.from.entity()).map(|index| reached[index]) else {
                    continue 'rows;
                };
                let Some(value) = source.get(hop.from.column()) else {
                    continue 'rows;
                };
                let Some(target) = self
                    .rows(hop.to.entity())
                    .iter()
                    .find(|row| row.get(hop.to.column()) == Some(value))
                else {
                    continue 'rows;
                };
                reached.push(target);
            }

            let (Some(key_row), Some(label_row)) = (
                path.position(query.key.entity()).map(|index| reached[index]),
                path.position(query.label.entity()).map(|index| reached[index]),
            ) else {
                continue;
            };
            let (Some(key), Some(label)) = (
                key_row.get(query.key.column()).map(column_value),
                label_row.get(query.label.column()).map(column_value),
            ) else {
                continue;
            };

            let total = groups
                .entry(LabelledKey { label: label.to_string(), key })
                .or_insert_with(BigDecimal::zero);
            *total += number(root, query.aggregate);
        }

        Ok(sort_groups(groups, query.order))
    }
}
