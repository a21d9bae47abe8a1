//! Typed vocabulary for aggregate queries.
//!
//! Entities and fields form closed sets: a [`Field`] can only be one of the
//! associated constants below, so nothing outside this crate can smuggle an
//! arbitrary table or column into a query.

use std::fmt;

use chrono_tz::Tz;

use crate::{QueryError, TimeWindow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Entity {
    Order,
    OrderItem,
    Product,
    Category,
    User,
}

impl Entity {
    pub fn table(self) -> &'static str {
        match self {
            Entity::Order => "orders",
            Entity::OrderItem => "order_items",
            Entity::Product => "products",
            Entity::Category => "categories",
            Entity::User => "users",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Id,
    Text,
    Integer,
    Numeric,
    Timestamp,
}

impl FieldKind {
    pub fn is_summable(self) -> bool {
        matches!(self, FieldKind::Integer | FieldKind::Numeric)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Field {
    entity: Entity,
    column: &'static str,
    kind: FieldKind,
}

impl Field {
    const fn new(entity: Entity, column: &'static str, kind: FieldKind) -> Self {
        Self { entity, column, kind }
    }

    pub const ORDER_ID: Field = Field::new(Entity::Order, "id", FieldKind::Id);
    pub const ORDER_TOTAL: Field = Field::new(Entity::Order, "total", FieldKind::Numeric);
    pub const ORDER_DELIVERY_STATUS: Field =
        Field::new(Entity::Order, "delivery_status", FieldKind::Text);
    pub const ORDER_CREATED_AT: Field =
        Field::new(Entity::Order, "created_at", FieldKind::Timestamp);

    pub const ORDER_ITEM_ID: Field = Field::new(Entity::OrderItem, "id", FieldKind::Id);
    pub const ORDER_ITEM_ORDER_ID: Field =
        Field::new(Entity::OrderItem, "order_id", FieldKind::Id);
    pub const ORDER_ITEM_PRODUCT_ID: Field =
        Field::new(Entity::OrderItem, "product_id", FieldKind::Id);
    pub const ORDER_ITEM_QUANTITY: Field =
        Field::new(Entity::OrderItem, "quantity", FieldKind::Integer);
    pub const ORDER_ITEM_PRICE: Field =
        Field::new(Entity::OrderItem, "price", FieldKind::Numeric);

    pub const PRODUCT_ID: Field = Field::new(Entity::Product, "id", FieldKind::Id);
    pub const PRODUCT_CATEGORY_ID: Field =
        Field::new(Entity::Product, "category_id", FieldKind::Id);
    pub const PRODUCT_NAME: Field = Field::new(Entity::Product, "name", FieldKind::Text);
    pub const PRODUCT_PRICE: Field = Field::new(Entity::Product, "price", FieldKind::Numeric);

    pub const CATEGORY_ID: Field = Field::new(Entity::Category, "id", FieldKind::Id);
    pub const CATEGORY_NAME: Field = Field::new(Entity::Category, "name", FieldKind::Text);

    pub const USER_ID: Field = Field::new(Entity::User, "id", FieldKind::Id);
    pub const USER_EMAIL: Field = Field::new(Entity::User, "email", FieldKind::Text);
    pub const USER_ROLE: Field = Field::new(Entity::User, "role", FieldKind::Text);
    pub const USER_CREATED_AT: Field =
        Field::new(Entity::User, "created_at", FieldKind::Timestamp);

    pub fn entity(self) -> Entity {
        self.entity
    }

    pub fn column(self) -> &'static str {
        self.column
    }

    pub fn kind(self) -> FieldKind {
        self.kind
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.entity.table(), self.column)
    }
}

/// Restricts rows to those whose timestamp `field` lies inside `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowFilter {
    pub field: Field,
    pub window: TimeWindow,
}

impl WindowFilter {
    pub fn new(field: Field, window: TimeWindow) -> Self {
        Self { field, window }
    }

    fn validate(&self, entity: Entity) -> Result<(), QueryError> {
        if self.field.entity() != entity {
            return Err(QueryError::invalid(format!(
                "window field {} does not belong to {}",
                self.field, entity
            )));
        }
        if self.field.kind() != FieldKind::Timestamp {
            return Err(QueryError::invalid(format!(
                "window field {} is not a timestamp",
                self.field
            )));
        }
        if self.window.start > self.window.end {
            return Err(QueryError::invalid("window starts after it ends"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKey {
    Column(Field),
    /// Calendar month (1..=12) of a timestamp column, read on the wall clock
    /// of the given zone.
    MonthOf(Field, Tz),
}

impl GroupKey {
    pub fn field(self) -> Field {
        match self {
            GroupKey::Column(field) | GroupKey::MonthOf(field, _) => field,
        }
    }

    fn validate(self, entity: Entity) -> Result<(), QueryError> {
        let field = self.field();
        if field.entity() != entity {
            return Err(QueryError::invalid(format!(
                "group field {} does not belong to {}",
                field, entity
            )));
        }
        if let GroupKey::MonthOf(..) = self {
            if field.kind() != FieldKind::Timestamp {
                return Err(QueryError::invalid(format!(
                    "cannot take the month of non-timestamp field {}",
                    field
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// By group value ascending.
    #[default]
    KeyAscending,
    /// By aggregate descending, ties by group value ascending.
    AggregateDescending,
}

/// One hop of a join: rows of `from.entity()` match rows of `to.entity()`
/// where `from == to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinSpec {
    pub from: Field,
    pub to: Field,
}

impl JoinSpec {
    pub const ORDER_ITEM_ORDER: JoinSpec =
        JoinSpec { from: Field::ORDER_ITEM_ORDER_ID, to: Field::ORDER_ID };
    pub const ORDER_ITEM_PRODUCT: JoinSpec =
        JoinSpec { from: Field::ORDER_ITEM_PRODUCT_ID, to: Field::PRODUCT_ID };
    pub const PRODUCT_CATEGORY: JoinSpec =
        JoinSpec { from: Field::PRODUCT_CATEGORY_ID, to: Field::CATEGORY_ID };

    /// Foreign keys of the shop schema, referencing column first.
    pub const FOREIGN_KEYS: [JoinSpec; 3] =
        [Self::ORDER_ITEM_ORDER, Self::ORDER_ITEM_PRODUCT, Self::PRODUCT_CATEGORY];

    pub fn new(from: Field, to: Field) -> Self {
        Self { from, to }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinPath {
    root: Entity,
    hops: Vec<JoinSpec>,
}

impl JoinPath {
    pub fn new(root: Entity) -> Self {
        Self { root, hops: Vec::new() }
    }

    /// Appends a hop. The hop must leave from the entity the path currently
    /// ends at, must not revisit an entity already on the path, and must
    /// follow a foreign key from the referencing to the referenced table.
    pub fn join(mut self, hop: JoinSpec) -> Result<Self, QueryError> {
        if hop.from.entity() != self.terminal() {
            return Err(QueryError::invalid(format!(
                "join from {} does not continue a path ending at {}",
                hop.from,
                self.terminal()
            )));
        }
        if self.position(hop.to.entity()).is_some() {
            return Err(QueryError::invalid(format!(
                "join path already contains {}",
                hop.to.entity()
            )));
        }
        if hop.from.kind() != hop.to.kind() {
            return Err(QueryError::invalid(format!(
                "cannot join {} to {} of a different kind",
                hop.from, hop.to
            )));
        }
        if !JoinSpec::FOREIGN_KEYS.contains(&hop) {
            return Err(QueryError::invalid(format!(
                "{} does not reference {}",
                hop.from, hop.to
            )));
        }
        self.hops.push(hop);
        Ok(self)
    }

    pub fn root(&self) -> Entity {
        self.root
    }

    pub fn hops(&self) -> &[JoinSpec] {
        &self.hops
    }

    pub fn terminal(&self) -> Entity {
        self.hops.last().map_or(self.root, |hop| hop.to.entity())
    }

    /// Index of `entity` along the path, the root being 0.
    pub fn position(&self, entity: Entity) -> Option<usize> {
        if entity == self.root {
            return Some(0);
        }
        self.hops
            .iter()
            .position(|hop| hop.to.entity() == entity)
            .map(|index| index + 1)
    }
}

/// `sumField`: sum of `field` over the rows of `entity`, optionally windowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SumQuery {
    pub entity: Entity,
    pub field: Field,
    pub window: Option<WindowFilter>,
}

impl SumQuery {
    pub fn validate(&self) -> Result<(), QueryError> {
        check_aggregate(self.entity, self.field)?;
        if let Some(window) = &self.window {
            window.validate(self.entity)?;
        }
        Ok(())
    }
}

/// `groupCount`: row count per distinct group value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupCountQuery {
    pub entity: Entity,
    pub key: GroupKey,
}

impl GroupCountQuery {
    pub fn validate(&self) -> Result<(), QueryError> {
        self.key.validate(self.entity)
    }
}

/// `groupSum`: sum of `aggregate` per distinct group value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupSumQuery {
    pub entity: Entity,
    pub key: GroupKey,
    pub aggregate: Field,
    pub window: Option<WindowFilter>,
    pub order: SortOrder,
}

impl GroupSumQuery {
    pub fn validate(&self) -> Result<(), QueryError> {
        self.key.validate(self.entity)?;
        check_aggregate(self.entity, self.aggregate)?;
        if let Some(window) = &self.window {
            window.validate(self.entity)?;
        }
        Ok(())
    }
}

/// `joinedGroupSum`: sum of a root-entity field, grouped by `key` and
/// labelled by `label`, both taken from an entity reached through `path`.
/// The key is that entity's identifier and the label one of its text columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedGroupSumQuery {
    pub path: JoinPath,
    pub key: Field,
    pub label: Field,
    pub aggregate: Field,
    pub order: SortOrder,
}

impl JoinedGroupSumQuery {
    pub fn validate(&self) -> Result<(), QueryError> {
        check_aggregate(self.path.root(), self.aggregate)?;
        for field in [self.key, self.label] {
            if self.path.position(field.entity()).is_none() {
                return Err(QueryError::invalid(format!(
                    "{} is not reachable through the join path",
                    field
                )));
            }
        }
        if self.key.entity() != self.label.entity() {
            return Err(QueryError::invalid(format!(
                "group key {} and label {} come from different entities",
                self.key, self.label
            )));
        }
        if self.key.entity() == self.path.root() {
            return Err(QueryError::invalid(format!(
                "group key {} must come from a joined entity",
                self.key
            )));
        }
        if self.key.kind() != FieldKind::Id {
            return Err(QueryError::invalid(format!("group key {} is not an identifier", self.key)));
        }
        if self.label.kind() != FieldKind::Text {
            return Err(QueryError::invalid(format!("label {} is not text", self.label)));
        }
        Ok(())
    }
}

/// One row of a grouped aggregate. `key` is the group value rendered as
/// text; for joined queries it is the label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRow<T> {
    pub key: String,
    pub total: T,
}

fn check_aggregate(entity: Entity, field: Field) -> Result<(), QueryError> {
    if field.entity() != entity {
        return Err(QueryError::invalid(format!(
            "aggregate field {} does not belong to {}",
            field, entity
        )));
    }
    if !field.kind().is_summable() {
        return Err(QueryError::invalid(format!("cannot sum {}", field)));
    }
    Ok(())
}
