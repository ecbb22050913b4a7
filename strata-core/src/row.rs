use crate::{AsValue, EntityAttributeDefinition, Error, Result, RowLabeled, RowNames, UsageError, Value};
use anyhow::Context;
use std::sync::Arc;

/// Expected columns of a free form result: names and value prototypes.
#[derive(Debug, Clone, PartialEq)]
pub struct RowShape {
    names: RowNames,
    prototypes: Vec<Value>,
}

impl RowShape {
    pub fn new() -> Self {
        Self {
            names: Arc::new([]),
            prototypes: Vec::new(),
        }
    }

    pub fn column(mut self, name: impl Into<String>, prototype: Value) -> Self {
        self.names = self.names.iter().cloned().chain([name.into()]).collect();
        self.prototypes.push(prototype.as_null());
        self
    }

    pub(crate) fn of_attributes<'a>(
        attributes: impl IntoIterator<Item = &'a EntityAttributeDefinition>,
    ) -> Self {
        attributes.into_iter().fold(Self::new(), |shape, attribute| {
            shape.column(attribute.reference_name(), attribute.value.clone())
        })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Picks the shape's columns out of `row`, by name. Every column must be present
    /// and hold a value convertible to the prototype's type, the result carries the
    /// prototype's variants.
    pub fn conform(&self, row: &RowLabeled) -> std::result::Result<StructuredRow, UsageError> {
        let mut values = Vec::with_capacity(self.len());
        for (name, prototype) in self.names.iter().zip(&self.prototypes) {
            let value = row.get_column(name).ok_or_else(|| {
                UsageError::UnsupportedShape(format!(
                    "column `{}` is missing, the row has {:?}",
                    name,
                    row.names()
                ))
            })?;
            let value = value.clone().converted_like(prototype).map_err(|e| {
                UsageError::UnsupportedShape(format!(
                    "column `{}` holds {:?}, expected a value like {:?}: {:#}",
                    name, value, prototype, e
                ))
            })?;
            values.push(value);
        }
        Ok(StructuredRow {
            names: self.names.clone(),
            values: values.into(),
        })
    }
}

impl Default for RowShape {
    fn default() -> Self {
        Self::new()
    }
}

/// Result row conforming to a [`RowShape`].
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredRow {
    names: RowNames,
    values: Box<[Value]>,
}

impl StructuredRow {
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values.into_vec()
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.names
            .iter()
            .position(|v| v == name)
            .map(|i| &self.values[i])
    }

    /// Typed getter, fails when the column is missing or does not convert.
    pub fn get<T: AsValue>(&self, name: &str) -> Result<T> {
        let value = self
            .value(name)
            .ok_or_else(|| Error::msg(format!("No column named `{}`", name)))?;
        T::try_from_value(value.clone()).with_context(|| format!("While reading column `{}`", name))
    }
}

impl From<StructuredRow> for RowLabeled {
    fn from(value: StructuredRow) -> Self {
        RowLabeled::new(Arc::clone(&value.names), value.values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeled(names: &[&str], values: Vec<Value>) -> RowLabeled {
        RowLabeled::new(names.iter().map(|v| v.to_string()).collect(), values.into())
    }

    #[test]
    fn conform_by_name() {
        let shape = RowShape::new()
            .column("code", Value::Varchar(Some("prototype".into())))
            .column("id", Value::Int64(None));
        let row = labeled(
            &["id", "extra", "code"],
            vec![Value::Int64(Some(3)), Value::Boolean(Some(true)), Value::Varchar(None)],
        );
        let structured = shape.conform(&row).unwrap();
        assert_eq!(structured.names(), ["code", "id"]);
        assert_eq!(structured.values(), [Value::Varchar(None), Value::Int64(Some(3))]);
        assert_eq!(structured.get::<i64>("id").unwrap(), 3);
        assert!(structured.get::<i64>("missing").is_err());
        let back: RowLabeled = structured.into();
        assert_eq!(back.get_column("id"), Some(&Value::Int64(Some(3))));
    }

    #[test]
    fn conform_widens_to_the_prototype() {
        let shape = RowShape::new()
            .column("id", Value::Int64(None))
            .column("price", Value::Float64(None));
        let row = labeled(
            &["id", "price"],
            vec![Value::Int32(Some(5)), Value::Int16(None)],
        );
        let structured = shape.conform(&row).unwrap();
        assert_eq!(structured.values(), [Value::Int64(Some(5)), Value::Float64(None)]);
    }

    #[test]
    fn conform_rejects_other_types() {
        let shape = RowShape::new().column("id", Value::Int64(None));
        let row = labeled(&["id"], vec![Value::Varchar(Some("three".into()))]);
        assert!(matches!(shape.conform(&row), Err(UsageError::UnsupportedShape(..))));
        let row = labeled(&["id"], vec![Value::Boolean(Some(true))]);
        assert!(matches!(shape.conform(&row), Err(UsageError::UnsupportedShape(..))));
        let row = labeled(&["code"], vec![Value::Int64(Some(3))]);
        assert!(matches!(shape.conform(&row), Err(UsageError::UnsupportedShape(..))));
    }
}
