use crate::{
    AttributeKind, Entity, EntityAttributeDefinition, EntityDefinition, EntityDescriptor,
    EntityLocation, EntityReference, FieldKind, RepositoryError, RepositoryResult, Value,
    strip_identifier_prefix,
};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, PoisonError, RwLock},
};

type LocationKey = (&'static str, Option<&'static str>, Option<&'static str>);

/// Resolves and caches entity definitions and locations.
///
/// Owned by the application root and shared by handle. Each type is built at most
/// once per publication: concurrent misses may build twice, the first definition
/// published is the one every caller observes.
#[derive(Default)]
pub struct DefinitionProvider {
    definitions: RwLock<HashMap<&'static str, Arc<EntityDefinition>>>,
    locations: RwLock<HashMap<LocationKey, EntityLocation>>,
}

impl DefinitionProvider {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn resolve<E: Entity>(&self) -> RepositoryResult<Arc<EntityDefinition>> {
        self.resolve_descriptor(E::descriptor())
    }

    pub fn resolve_descriptor(
        &self,
        descriptor: &'static EntityDescriptor,
    ) -> RepositoryResult<Arc<EntityDefinition>> {
        if let Some(definition) = self
            .definitions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(descriptor.type_name)
        {
            return Ok(definition.clone());
        }
        let definition = Arc::new(self.build(descriptor)?);
        let mut definitions = self
            .definitions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        Ok(definitions
            .entry(descriptor.type_name)
            .or_insert(definition)
            .clone())
    }

    pub fn resolve_location(&self, reference: &EntityReference) -> EntityLocation {
        let key = (
            reference.entity.type_name,
            reference.container.map(|v| v.type_name),
            reference.alias,
        );
        if let Some(location) = self
            .locations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return location.clone();
        }
        let location = EntityLocation {
            entity: reference.entity.type_name,
            schema: reference.entity.schema,
            name: reference.entity.name,
            alias: reference.alias,
            is_virtual: false,
        };
        self.locations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_insert(location)
            .clone()
    }

    fn build(&self, descriptor: &'static EntityDescriptor) -> RepositoryResult<EntityDefinition> {
        if descriptor.name.is_empty() {
            return Err(RepositoryError::metadata(
                descriptor.type_name,
                "the entity does not declare a table name",
            ));
        }
        let reference = EntityReference::new(descriptor);
        let location = self.resolve_location(&reference);
        let mut walker = Walker {
            provider: self,
            root: descriptor,
            attributes: Vec::new(),
            tables: vec![location.clone()],
        };
        walker.walk(descriptor, Box::new([location.clone()]), false, &[descriptor.type_name])?;
        let attributes = walker.attributes;

        let mut qualified = HashSet::new();
        for attribute in attributes.iter().filter(|v| v.kind.is_selectable()) {
            let key = (
                attribute.location.schema,
                attribute.location.reference_name(),
                attribute.physical_name,
            );
            if !qualified.insert(key) {
                return Err(RepositoryError::metadata(
                    descriptor.type_name,
                    format!(
                        "column `{}.{}` is mapped twice, declare an alias for one of the relations",
                        attribute.location.reference_name(),
                        attribute.physical_name
                    ),
                ));
            }
        }

        let alternate_key = descriptor
            .alternate_key
            .iter()
            .map(|property| {
                attributes
                    .iter()
                    .position(|v| v.kind.is_direct() && v.property == *property)
                    .ok_or_else(|| {
                        RepositoryError::metadata(
                            descriptor.type_name,
                            format!("alternate key field `{}` is not a mapped column", property),
                        )
                    })
            })
            .collect::<RepositoryResult<Box<[_]>>>()?;

        Ok(EntityDefinition {
            reference,
            location,
            attributes: attributes.into(),
            alternate_key,
        })
    }
}

struct Walker<'p> {
    provider: &'p DefinitionProvider,
    root: &'static EntityDescriptor,
    attributes: Vec<EntityAttributeDefinition>,
    /// Every table already reached by the definition.
    tables: Vec<EntityLocation>,
}

impl<'p> Walker<'p> {
    fn error(&self, message: String) -> RepositoryError {
        RepositoryError::metadata(self.root.type_name, message)
    }

    fn push(
        &mut self,
        path: Box<[EntityLocation]>,
        property: &'static str,
        physical_name: &'static str,
        alias: Option<&'static str>,
        kind: AttributeKind,
        value: Value,
    ) {
        let location = path[path.len() - 1].clone();
        let ordinal = self.attributes.len();
        self.attributes.push(EntityAttributeDefinition {
            path,
            location,
            property,
            physical_name,
            alias,
            kind,
            value,
            ordinal,
        });
    }

    /// Depth first walk of `descriptor`. `path` ends with the descriptor's location,
    /// `lineage` holds the types along the path.
    fn walk(
        &mut self,
        descriptor: &'static EntityDescriptor,
        path: Box<[EntityLocation]>,
        related: bool,
        lineage: &[&'static str],
    ) -> RepositoryResult<()> {
        let mut declared = HashSet::new();
        for field in &descriptor.fields {
            if !declared.insert(field.property) {
                log::warn!(
                    "Field `{}` of `{}` is declared more than once, keeping the first declaration",
                    field.property,
                    descriptor.type_name
                );
                let slots = match field.kind {
                    FieldKind::Relation { entity, .. } => 1 + entity().slot_count(),
                    _ => 1,
                };
                for _ in 0..slots {
                    self.push(
                        path.clone(),
                        field.property,
                        field.property,
                        None,
                        AttributeKind::MappedAttribute,
                        Value::Null,
                    );
                }
                continue;
            }
            let column = field.column_name();
            match field.kind {
                FieldKind::PrimaryKey => {
                    let kind = if related {
                        AttributeKind::RelatedPrimaryKey
                    } else {
                        AttributeKind::DirectPrimaryKey
                    };
                    self.push(path.clone(), field.property, column, None, kind, field.value.clone());
                }
                FieldKind::AutoNumber => {
                    let kind = if related {
                        AttributeKind::RelatedAutoNumberKey
                    } else {
                        AttributeKind::DirectAutoNumberKey
                    };
                    self.push(path.clone(), field.property, column, None, kind, field.value.clone());
                }
                FieldKind::Attribute => {
                    let kind = if related {
                        AttributeKind::RelatedAttribute
                    } else {
                        AttributeKind::DirectAttribute
                    };
                    self.push(path.clone(), field.property, column, None, kind, field.value.clone());
                }
                FieldKind::Ignored => {
                    self.push(
                        path.clone(),
                        field.property,
                        column,
                        None,
                        AttributeKind::MappedAttribute,
                        Value::Null,
                    );
                }
                FieldKind::Related {
                    entity,
                    alias,
                    use_attribute_alias,
                } => {
                    let target = entity();
                    if target.name.is_empty() {
                        return Err(self.error(format!(
                            "related entity `{}` of field `{}` does not declare a table name",
                            target.type_name, field.property
                        )));
                    }
                    let (physical_name, attribute_alias) = match (field.column, use_attribute_alias) {
                        (None, true) => {
                            match strip_identifier_prefix(field.property, target.entity_name) {
                                Some(stripped) => (stripped, Some(field.property)),
                                None => (column, None),
                            }
                        }
                        _ => (column, None),
                    };
                    if !target.columns().any(|v| v == physical_name) {
                        return Err(self.error(format!(
                            "field `{}` refers to column `{}` which `{}` does not map",
                            field.property, physical_name, target.type_name
                        )));
                    }
                    let reference = EntityReference::contained(target, descriptor, alias);
                    let mut location = self.provider.resolve_location(&reference);
                    location.is_virtual = true;
                    if !self.tables.contains(&location) {
                        self.tables.push(location.clone());
                    }
                    let related_path = path.iter().cloned().chain([location]).collect();
                    self.push(
                        related_path,
                        field.property,
                        physical_name,
                        attribute_alias,
                        AttributeKind::ExplicitRelatedAttribute,
                        field.value.clone(),
                    );
                }
                FieldKind::Relation { entity, alias } => {
                    let target = entity();
                    if target.name.is_empty() {
                        return Err(self.error(format!(
                            "relation `{}` targets `{}` which does not declare a table name",
                            field.property, target.type_name
                        )));
                    }
                    if lineage.contains(&target.type_name) {
                        return Err(self.error(format!(
                            "relation `{}` of `{}` leads back to `{}`",
                            field.property, descriptor.type_name, target.type_name
                        )));
                    }
                    self.push(
                        path.clone(),
                        field.property,
                        field.property,
                        None,
                        AttributeKind::Relation,
                        Value::Null,
                    );
                    let reference = EntityReference::contained(target, descriptor, alias);
                    let mut location = self.provider.resolve_location(&reference);
                    if location.alias.is_none() && self.tables.iter().any(|v| v.same_table(&location)) {
                        location.alias = Some(field.property);
                    }
                    self.tables.push(location.clone());
                    let child_path: Box<[EntityLocation]> =
                        path.iter().cloned().chain([location]).collect();
                    let child_lineage: Vec<_> =
                        lineage.iter().copied().chain([target.type_name]).collect();
                    self.walk(target, child_path, true, &child_lineage)?;
                }
            }
        }
        Ok(())
    }
}
