use crate::Value;

pub type DescriptorFn = fn() -> &'static EntityDescriptor;

/// Declarative mapping of one entity type.
///
/// Produced once per type by `#[derive(Entity)]` (or written by hand) and consumed
/// read only by the [`DefinitionProvider`](crate::DefinitionProvider).
#[derive(Debug)]
pub struct EntityDescriptor {
    /// Unique identity of the type, `module::path::Type`.
    pub type_name: &'static str,
    /// Identifier of the entity, the snake case type name.
    pub entity_name: &'static str,
    pub schema: &'static str,
    pub name: &'static str,
    pub fields: Vec<FieldDescriptor>,
    /// Property names forming the natural key.
    pub alternate_key: Vec<&'static str>,
}

impl EntityDescriptor {
    pub fn new(
        type_name: &'static str,
        entity_name: &'static str,
        schema: &'static str,
        name: &'static str,
    ) -> Self {
        Self {
            type_name,
            entity_name,
            schema,
            name,
            fields: Vec::new(),
            alternate_key: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDescriptor) -> Self {
        self.fields.push(field);
        self
    }

    pub fn alternate_key(mut self, properties: &[&'static str]) -> Self {
        self.alternate_key = properties.to_vec();
        self
    }

    /// Number of value slots an instance writes, nested relations included.
    pub fn slot_count(&self) -> usize {
        self.fields
            .iter()
            .map(|f| match f.kind {
                FieldKind::Relation { entity, .. } => 1 + entity().slot_count(),
                _ => 1,
            })
            .sum()
    }

    /// Physical column names of the persisted fields declared by this type.
    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields
            .iter()
            .filter(|f| f.kind.is_persisted())
            .map(FieldDescriptor::column_name)
    }
}

#[derive(Debug)]
pub struct FieldDescriptor {
    pub property: &'static str,
    pub column: Option<&'static str>,
    pub kind: FieldKind,
    /// Type prototype, an empty value of the field's type.
    pub value: Value,
}

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    PrimaryKey,
    AutoNumber,
    Attribute,
    Ignored,
    /// Column of another entity, reached by a join the selection declares.
    Related {
        entity: DescriptorFn,
        alias: Option<&'static str>,
        use_attribute_alias: bool,
    },
    /// Nested entity whose fields are flattened into the owner.
    Relation {
        entity: DescriptorFn,
        alias: Option<&'static str>,
    },
}

impl FieldKind {
    pub fn is_persisted(&self) -> bool {
        matches!(
            self,
            FieldKind::PrimaryKey | FieldKind::AutoNumber | FieldKind::Attribute
        )
    }
}

impl FieldDescriptor {
    pub fn new(property: &'static str, value: Value) -> Self {
        Self {
            property,
            column: None,
            kind: FieldKind::Attribute,
            value,
        }
    }

    pub fn column(mut self, column: &'static str) -> Self {
        self.column = Some(column);
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.kind = FieldKind::PrimaryKey;
        self
    }

    pub fn auto_number(mut self) -> Self {
        self.kind = FieldKind::AutoNumber;
        self
    }

    pub fn ignored(mut self) -> Self {
        self.kind = FieldKind::Ignored;
        self.value = Value::Null;
        self
    }

    pub fn related(
        mut self,
        entity: DescriptorFn,
        alias: Option<&'static str>,
        use_attribute_alias: bool,
    ) -> Self {
        self.kind = FieldKind::Related {
            entity,
            alias,
            use_attribute_alias,
        };
        self
    }

    pub fn relation(mut self, entity: DescriptorFn, alias: Option<&'static str>) -> Self {
        self.kind = FieldKind::Relation { entity, alias };
        self.value = Value::Null;
        self
    }

    /// Physical name: the explicit column or the property without leading underscores.
    pub fn column_name(&self) -> &'static str {
        self.column
            .unwrap_or_else(|| self.property.trim_start_matches('_'))
    }
}
