use crate::{
    AttributeKey, AttributeRef, Entity, EntityDefinition, RepositoryResult, UsageError, Value,
};
use std::{
    fmt::{self, Debug},
    marker::PhantomData,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Equal,
    NotEqual,
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,
    Between,
    In,
    NotIn,
    Like,
    NotLike,
}

/// One predicate: `attribute <operator> values`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueFilter {
    pub attribute: AttributeKey,
    pub operator: FilterOperator,
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

/// Join of the table owning `relation` on `source = relation`.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRelation {
    pub join: JoinType,
    pub source: AttributeRef,
    pub relation: AttributeRef,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    ASC,
    DESC,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderExpression {
    pub attribute: AttributeKey,
    pub order: Order,
}

/// Page of a result set, `number` starts from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub size: u32,
    pub number: u32,
}

impl Page {
    pub fn new(size: u32, number: u32) -> Self {
        Self { size, number }
    }

    /// Rows skipped before the page, numbers below 1 count as the first page.
    pub fn offset(&self) -> u64 {
        (self.number.max(1) as u64 - 1) * self.size as u64
    }
}

/// Borrowed, entity independent view of a selection, consumed by the SQL writers.
#[derive(Debug, Default, Clone, Copy)]
pub struct SelectionRef<'a> {
    pub filters: &'a [ValueFilter],
    pub relations: &'a [EntityRelation],
    pub order_by: &'a [OrderExpression],
    pub page: Option<Page>,
    /// Only the first row is read, limits an unpaged SELECT to one row.
    pub first: bool,
}

impl<'a> SelectionRef<'a> {
    pub fn first(self) -> Self {
        Self {
            first: true,
            ..self
        }
    }
}

/// What to read, update or delete for entity `E`.
///
/// Built once with the consuming builder methods and then only read:
/// the same selection compiles to SELECT, EXISTS, UPDATE and DELETE.
///
/// ```ignore
/// let selection = ItemSelection::<Product>::new()
///     .where_equal(Product::category_id, 4)
///     .where_between(Product::price, 10.0, 20.0)
///     .inner_join(Product::category_id, Category::id)
///     .order_by(Product::name)
///     .page(25, 1);
/// ```
pub struct ItemSelection<E: Entity> {
    pub filters: Vec<ValueFilter>,
    pub relations: Vec<EntityRelation>,
    pub order_by: Vec<OrderExpression>,
    pub page: Option<Page>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> ItemSelection<E> {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
            relations: Vec::new(),
            order_by: Vec::new(),
            page: None,
            _entity: PhantomData,
        }
    }

    fn check_definition(definition: &EntityDefinition) -> RepositoryResult<()> {
        if definition.type_name() != E::descriptor().type_name {
            return Err(UsageError::SelectionMismatch(format!(
                "definition of `{}` used to select `{}`",
                definition.type_name(),
                E::descriptor().type_name
            ))
            .into());
        }
        Ok(())
    }

    /// Values of `item`, checked against the definition's slots.
    pub(crate) fn values_of(definition: &EntityDefinition, item: &E) -> RepositoryResult<Vec<Value>> {
        Self::check_definition(definition)?;
        let values = item.to_values();
        if values.len() != definition.slot_count() {
            return Err(UsageError::SelectionMismatch(format!(
                "`{}` wrote {} values, its definition has {} attributes",
                definition.type_name(),
                values.len(),
                definition.slot_count()
            ))
            .into());
        }
        Ok(values)
    }

    /// Equality on every persisted column of `item` holding a non default value.
    pub fn by_example(definition: &EntityDefinition, item: &E) -> RepositoryResult<Self> {
        let values = Self::values_of(definition, item)?;
        Ok(Self::by_example_values(definition, &values))
    }

    pub(crate) fn by_example_values(definition: &EntityDefinition, values: &[Value]) -> Self {
        definition
            .direct_attributes()
            .filter(|v| !values[v.ordinal].is_default())
            .fold(Self::new(), |selection, attribute| {
                selection.with_filter(
                    attribute.key(),
                    FilterOperator::Equal,
                    vec![values[attribute.ordinal].clone()],
                )
            })
    }

    /// Selection identifying `item`: its primary key when set, else the alternate
    /// key when declared, else by example.
    pub fn unique(definition: &EntityDefinition, item: &E) -> RepositoryResult<Self> {
        let values = Self::values_of(definition, item)?;
        Ok(Self::unique_values(definition, &values))
    }

    pub(crate) fn unique_values(definition: &EntityDefinition, values: &[Value]) -> Self {
        let primary_key: Vec<_> = definition.primary_key().collect();
        let keys = if !primary_key.is_empty()
            && primary_key
                .iter()
                .all(|v| !values[v.ordinal].is_default())
        {
            primary_key
        } else if !definition.alternate_key.is_empty() {
            definition.alternate_key().collect()
        } else {
            return Self::by_example_values(definition, values);
        };
        keys.into_iter().fold(Self::new(), |selection, attribute| {
            selection.with_filter(
                attribute.key(),
                FilterOperator::Equal,
                vec![values[attribute.ordinal].clone()],
            )
        })
    }

    /// Equality on the primary key columns, in declaration order.
    pub fn by_key(
        definition: &EntityDefinition,
        key: impl IntoIterator<Item = Value>,
    ) -> RepositoryResult<Self> {
        Self::check_definition(definition)?;
        let key: Vec<_> = key.into_iter().collect();
        let primary_key: Vec<_> = definition.primary_key().collect();
        if primary_key.is_empty() || primary_key.len() != key.len() {
            return Err(UsageError::SelectionMismatch(format!(
                "`{}` has {} primary key columns, {} values were given",
                definition.type_name(),
                primary_key.len(),
                key.len()
            ))
            .into());
        }
        Ok(primary_key
            .into_iter()
            .zip(key)
            .fold(Self::new(), |selection, (attribute, value)| {
                selection.with_filter(attribute.key(), FilterOperator::Equal, vec![value])
            }))
    }

    pub fn with_filter(
        mut self,
        attribute: AttributeKey,
        operator: FilterOperator,
        values: Vec<Value>,
    ) -> Self {
        self.filters.push(ValueFilter {
            attribute,
            operator,
            values,
        });
        self
    }

    /// Equality, a null `value` selects null columns.
    pub fn where_equal(self, attribute: AttributeRef, value: impl Into<Value>) -> Self {
        self.with_filter(attribute.key(), FilterOperator::Equal, vec![value.into()])
    }

    pub fn where_not_equal(self, attribute: AttributeRef, value: impl Into<Value>) -> Self {
        self.with_filter(attribute.key(), FilterOperator::NotEqual, vec![value.into()])
    }

    pub fn where_null(self, attribute: AttributeRef) -> Self {
        self.with_filter(attribute.key(), FilterOperator::Equal, vec![Value::Null])
    }

    pub fn where_not_null(self, attribute: AttributeRef) -> Self {
        self.with_filter(attribute.key(), FilterOperator::NotEqual, vec![Value::Null])
    }

    pub fn where_less(self, attribute: AttributeRef, value: impl Into<Value>) -> Self {
        self.with_filter(attribute.key(), FilterOperator::Less, vec![value.into()])
    }

    pub fn where_less_or_equal(self, attribute: AttributeRef, value: impl Into<Value>) -> Self {
        self.with_filter(attribute.key(), FilterOperator::LessOrEqual, vec![value.into()])
    }

    pub fn where_greater(self, attribute: AttributeRef, value: impl Into<Value>) -> Self {
        self.with_filter(attribute.key(), FilterOperator::Greater, vec![value.into()])
    }

    pub fn where_greater_or_equal(self, attribute: AttributeRef, value: impl Into<Value>) -> Self {
        self.with_filter(
            attribute.key(),
            FilterOperator::GreaterOrEqual,
            vec![value.into()],
        )
    }

    /// Inclusive range, a null bound leaves that side open.
    pub fn where_between(
        self,
        attribute: AttributeRef,
        min: impl Into<Value>,
        max: impl Into<Value>,
    ) -> Self {
        self.with_filter(
            attribute.key(),
            FilterOperator::Between,
            vec![min.into(), max.into()],
        )
    }

    pub fn where_in<V: Into<Value>>(
        self,
        attribute: AttributeRef,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.with_filter(
            attribute.key(),
            FilterOperator::In,
            values.into_iter().map(Into::into).collect(),
        )
    }

    pub fn where_not_in<V: Into<Value>>(
        self,
        attribute: AttributeRef,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        self.with_filter(
            attribute.key(),
            FilterOperator::NotIn,
            values.into_iter().map(Into::into).collect(),
        )
    }

    pub fn where_like(self, attribute: AttributeRef, pattern: impl Into<Value>) -> Self {
        self.with_filter(attribute.key(), FilterOperator::Like, vec![pattern.into()])
    }

    pub fn where_not_like(self, attribute: AttributeRef, pattern: impl Into<Value>) -> Self {
        self.with_filter(attribute.key(), FilterOperator::NotLike, vec![pattern.into()])
    }

    pub fn join(mut self, join: JoinType, source: AttributeRef, relation: AttributeRef) -> Self {
        self.relations.push(EntityRelation {
            join,
            source,
            relation,
        });
        self
    }

    pub fn inner_join(self, source: AttributeRef, relation: AttributeRef) -> Self {
        self.join(JoinType::Inner, source, relation)
    }

    pub fn left_join(self, source: AttributeRef, relation: AttributeRef) -> Self {
        self.join(JoinType::Left, source, relation)
    }

    pub fn order_by(mut self, attribute: AttributeRef) -> Self {
        self.order_by.push(OrderExpression {
            attribute: attribute.key(),
            order: Order::ASC,
        });
        self
    }

    pub fn order_by_descending(mut self, attribute: AttributeRef) -> Self {
        self.order_by.push(OrderExpression {
            attribute: attribute.key(),
            order: Order::DESC,
        });
        self
    }

    pub fn page(mut self, size: u32, number: u32) -> Self {
        self.page = Some(Page::new(size, number));
        self
    }

    pub fn without_page(mut self) -> Self {
        self.page = None;
        self
    }

    pub fn criteria(&self) -> SelectionRef<'_> {
        SelectionRef {
            filters: &self.filters,
            relations: &self.relations,
            order_by: &self.order_by,
            page: self.page,
            first: false,
        }
    }
}

impl<E: Entity> Default for ItemSelection<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> Clone for ItemSelection<E> {
    fn clone(&self) -> Self {
        Self {
            filters: self.filters.clone(),
            relations: self.relations.clone(),
            order_by: self.order_by.clone(),
            page: self.page,
            _entity: PhantomData,
        }
    }
}

impl<E: Entity> PartialEq for ItemSelection<E> {
    fn eq(&self, other: &Self) -> bool {
        self.filters == other.filters
            && self.relations == other.relations
            && self.order_by == other.order_by
            && self.page == other.page
    }
}

impl<E: Entity> Debug for ItemSelection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemSelection")
            .field("entity", &E::descriptor().type_name)
            .field("filters", &self.filters)
            .field("relations", &self.relations)
            .field("order_by", &self.order_by)
            .field("page", &self.page)
            .finish()
    }
}
