use crate::{AsValue, DescriptorFn, EntityDescriptor, Error, Result, Value};
use anyhow::Context;
use std::{
    fmt::{self, Debug},
    iter,
};

pub type ValueCursor = std::vec::IntoIter<Value>;

/// A mapped type.
///
/// An instance is exchanged with the engine as a flat vector of values with one
/// slot per resolved attribute, in depth first declaration order: relation
/// pointers and ignored fields occupy a `Value::Null` slot, the fields of a nested
/// relation follow its pointer slot.
pub trait Entity: Sized + Send + Sync + 'static {
    fn descriptor() -> &'static EntityDescriptor;

    fn write_values(&self, out: &mut Vec<Value>);

    fn read_values(values: &mut ValueCursor) -> Result<Self>;

    fn to_values(&self) -> Vec<Value> {
        let mut values = Vec::with_capacity(Self::descriptor().slot_count());
        self.write_values(&mut values);
        values
    }

    fn from_values(values: Vec<Value>) -> Result<Self> {
        let mut cursor = values.into_iter();
        let result = Self::read_values(&mut cursor)
            .with_context(|| format!("While decoding `{}`", Self::descriptor().type_name))?;
        if cursor.len() != 0 {
            return Err(Error::msg(format!(
                "{} values left over while decoding `{}`",
                cursor.len(),
                Self::descriptor().type_name
            )));
        }
        Ok(result)
    }
}

/// Reads the next slot as a `T`.
pub fn read_value<T: AsValue>(values: &mut ValueCursor, field: &str) -> Result<T> {
    let value = values
        .next()
        .ok_or_else(|| Error::msg(format!("Missing value for field `{}`", field)))?;
    T::try_from_value(value).with_context(|| format!("While decoding field `{}`", field))
}

/// Skips a slot that carries no data (relation pointer, ignored field).
pub fn skip_value(values: &mut ValueCursor, field: &str) -> Result<()> {
    values
        .next()
        .map(|_| ())
        .ok_or_else(|| Error::msg(format!("Missing value for field `{}`", field)))
}

pub fn write_optional_relation<E: Entity>(value: &Option<E>, out: &mut Vec<Value>) {
    match value {
        Some(v) => v.write_values(out),
        None => out.extend(iter::repeat_n(Value::Null, E::descriptor().slot_count())),
    }
}

/// Reads an optional nested relation, `None` when all its slots are null (left joins).
pub fn read_optional_relation<E: Entity>(values: &mut ValueCursor, field: &str) -> Result<Option<E>> {
    let count = E::descriptor().slot_count();
    let slots: Vec<Value> = values.by_ref().take(count).collect();
    if slots.len() != count {
        return Err(Error::msg(format!(
            "Missing values for relation `{}`",
            field
        )));
    }
    if slots.iter().all(Value::is_null) {
        return Ok(None);
    }
    E::from_values(slots).map(Some)
}

/// Reads a nested relation, its default value when all its slots are null
/// (not joined, or no matching row on a left join).
pub fn read_relation<E: Entity + Default>(values: &mut ValueCursor, field: &str) -> Result<E> {
    read_optional_relation(values, field).map(Option::unwrap_or_default)
}

/// Typed handle to one field of an entity, used to build selections.
///
/// `#[derive(Entity)]` generates one associated constant per field, so that
/// `Product::name` refers to the `name` field of `Product`.
#[derive(Clone, Copy)]
pub struct AttributeRef {
    pub entity: DescriptorFn,
    pub field: &'static str,
    /// Restricts the match to a location with this alias (self joins).
    pub alias: Option<&'static str>,
}

impl AttributeRef {
    pub const fn new(entity: DescriptorFn, field: &'static str) -> Self {
        Self {
            entity,
            field,
            alias: None,
        }
    }

    pub const fn aliased(mut self, alias: &'static str) -> Self {
        self.alias = Some(alias);
        self
    }

    pub fn descriptor(&self) -> &'static EntityDescriptor {
        (self.entity)()
    }

    pub fn entity_type(&self) -> &'static str {
        self.descriptor().type_name
    }

    pub fn key(&self) -> AttributeKey {
        AttributeKey {
            entity: self.entity_type(),
            field: self.field,
            alias: self.alias,
        }
    }
}

impl PartialEq for AttributeRef {
    fn eq(&self, other: &Self) -> bool {
        self.entity_type() == other.entity_type()
            && self.field == other.field
            && self.alias == other.alias
    }
}

impl Debug for AttributeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.key().fmt(f)
    }
}

/// Identity of an attribute: owning type, field and optional location alias.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttributeKey {
    pub entity: &'static str,
    pub field: &'static str,
    pub alias: Option<&'static str>,
}

impl Debug for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entity = self.entity.rsplit("::").next().unwrap_or(self.entity);
        match self.alias {
            Some(alias) => write!(f, "{}.{} ({})", entity, self.field, alias),
            None => write!(f, "{}.{}", entity, self.field),
        }
    }
}

impl From<AttributeRef> for AttributeKey {
    fn from(value: AttributeRef) -> Self {
        value.key()
    }
}
