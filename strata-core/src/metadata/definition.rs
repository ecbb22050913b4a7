use crate::{AttributeKey, EntityDescriptor, Value};
use std::fmt::{self, Debug};

/// Mapped type reached either as root or through `container`.
#[derive(Clone, Copy)]
pub struct EntityReference {
    pub entity: &'static EntityDescriptor,
    pub container: Option<&'static EntityDescriptor>,
    pub alias: Option<&'static str>,
}

impl EntityReference {
    pub fn new(entity: &'static EntityDescriptor) -> Self {
        Self {
            entity,
            container: None,
            alias: None,
        }
    }

    pub fn contained(
        entity: &'static EntityDescriptor,
        container: &'static EntityDescriptor,
        alias: Option<&'static str>,
    ) -> Self {
        Self {
            entity,
            container: Some(container),
            alias,
        }
    }
}

impl PartialEq for EntityReference {
    fn eq(&self, other: &Self) -> bool {
        self.entity.type_name == other.entity.type_name && self.alias == other.alias
    }
}

impl Eq for EntityReference {}

impl Debug for EntityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityReference")
            .field("entity", &self.entity.type_name)
            .field("container", &self.container.map(|v| v.type_name))
            .field("alias", &self.alias)
            .finish()
    }
}

/// Physical table of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityLocation {
    /// Type identity of the entity stored here.
    pub entity: &'static str,
    pub schema: &'static str,
    pub name: &'static str,
    pub alias: Option<&'static str>,
    /// Reached only to be joined, the owner holds no nested object for it.
    pub is_virtual: bool,
}

impl EntityLocation {
    /// Name used to qualify columns: the alias when present, the table otherwise.
    pub fn reference_name(&self) -> &'static str {
        self.alias.unwrap_or(self.name)
    }

    pub fn same_table(&self, other: &EntityLocation) -> bool {
        self.schema == other.schema && self.name == other.name
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    DirectPrimaryKey,
    DirectAutoNumberKey,
    DirectAttribute,
    RelatedPrimaryKey,
    RelatedAutoNumberKey,
    RelatedAttribute,
    ExplicitRelatedAttribute,
    Relation,
    MappedAttribute,
}

impl AttributeKind {
    pub fn is_direct(&self) -> bool {
        matches!(
            self,
            Self::DirectPrimaryKey | Self::DirectAutoNumberKey | Self::DirectAttribute
        )
    }

    pub fn is_primary_key(&self) -> bool {
        matches!(
            self,
            Self::DirectPrimaryKey
                | Self::DirectAutoNumberKey
                | Self::RelatedPrimaryKey
                | Self::RelatedAutoNumberKey
        )
    }

    pub fn is_auto_number(&self) -> bool {
        matches!(self, Self::DirectAutoNumberKey | Self::RelatedAutoNumberKey)
    }

    /// Has a column to read in a SELECT.
    pub fn is_selectable(&self) -> bool {
        !matches!(self, Self::Relation | Self::MappedAttribute)
    }

    pub fn is_insertable(&self) -> bool {
        matches!(self, Self::DirectPrimaryKey | Self::DirectAttribute)
    }

    pub fn is_updatable(&self) -> bool {
        matches!(self, Self::DirectAttribute)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityAttributeDefinition {
    /// Join chain from the root location to `location`, both included.
    pub path: Box<[EntityLocation]>,
    /// Location of the entity owning the column.
    pub location: EntityLocation,
    pub property: &'static str,
    pub physical_name: &'static str,
    pub alias: Option<&'static str>,
    pub kind: AttributeKind,
    pub value: Value,
    /// Slot of the attribute in the entity's value vector.
    pub ordinal: usize,
}

impl EntityAttributeDefinition {
    pub fn entity(&self) -> &'static str {
        self.location.entity
    }

    /// Name the column is read back as.
    pub fn reference_name(&self) -> &'static str {
        self.alias.unwrap_or(self.physical_name)
    }

    /// Location of the entity declaring the field. Differs from `location` only for
    /// explicit related attributes, declared by the owner of the join.
    pub fn owner(&self) -> &EntityLocation {
        match self.kind {
            AttributeKind::ExplicitRelatedAttribute if self.path.len() > 1 => {
                &self.path[self.path.len() - 2]
            }
            _ => &self.location,
        }
    }

    pub fn key(&self) -> AttributeKey {
        let owner = self.owner();
        AttributeKey {
            entity: owner.entity,
            field: self.property,
            alias: owner.alias,
        }
    }

    pub fn matches(&self, attribute: &AttributeKey) -> bool {
        let owner = self.owner();
        owner.entity == attribute.entity
            && self.property == attribute.field
            && (attribute.alias.is_none() || attribute.alias == owner.alias)
    }
}

/// Flattened, resolved metadata of an entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDefinition {
    pub reference: EntityReference,
    pub location: EntityLocation,
    pub attributes: Box<[EntityAttributeDefinition]>,
    /// Indices of the natural key attributes.
    pub alternate_key: Box<[usize]>,
}

impl EntityDefinition {
    pub fn type_name(&self) -> &'static str {
        self.reference.entity.type_name
    }

    pub fn slot_count(&self) -> usize {
        self.attributes.len()
    }

    pub fn direct_attributes(&self) -> impl Iterator<Item = &EntityAttributeDefinition> {
        self.attributes.iter().filter(|v| v.kind.is_direct())
    }

    pub fn primary_key(&self) -> impl Iterator<Item = &EntityAttributeDefinition> {
        self.direct_attributes().filter(|v| v.kind.is_primary_key())
    }

    pub fn auto_number(&self) -> Option<&EntityAttributeDefinition> {
        self.attributes
            .iter()
            .find(|v| v.kind == AttributeKind::DirectAutoNumberKey)
    }

    pub fn alternate_key(&self) -> impl Iterator<Item = &EntityAttributeDefinition> {
        self.alternate_key.iter().map(|i| &self.attributes[*i])
    }

    pub fn selectable(&self) -> impl Iterator<Item = &EntityAttributeDefinition> {
        self.attributes.iter().filter(|v| v.kind.is_selectable())
    }

    pub fn insertable(&self) -> impl Iterator<Item = &EntityAttributeDefinition> {
        self.attributes.iter().filter(|v| v.kind.is_insertable())
    }

    pub fn updatable(&self) -> impl Iterator<Item = &EntityAttributeDefinition> {
        self.attributes.iter().filter(|v| v.kind.is_updatable())
    }

    pub fn find(&self, attribute: &AttributeKey) -> Option<&EntityAttributeDefinition> {
        self.attributes.iter().find(|v| v.matches(attribute))
    }

    /// Location where `entity` is stored within this definition.
    pub fn find_location(
        &self,
        entity: &'static str,
        alias: Option<&'static str>,
    ) -> Option<&EntityLocation> {
        self.attributes
            .iter()
            .flat_map(|v| v.path.iter())
            .find(|v| v.entity == entity && (alias.is_none() || v.alias == alias))
    }
}
