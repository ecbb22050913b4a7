use crate::{
    AttributeKey, AttributeRef, CompiledStatement, DefinitionProvider, DescriptorFn, Entity,
    EntityAttributeDefinition, EntityDefinition, RepositoryError, RepositoryResult, RowShape, SqlWriter,
    UsageError, Value,
};
use std::fmt::{self, Debug};

/// What happens to a row colliding with an existing key.
#[derive(Debug, Clone)]
pub enum ConflictAction<'a> {
    DoNothing {
        keys: Vec<&'a EntityAttributeDefinition>,
    },
    DoUpdate {
        keys: Vec<&'a EntityAttributeDefinition>,
        columns: Vec<&'a EntityAttributeDefinition>,
    },
}

/// Resolved set based insert, the input of [`SqlWriter::compile_structured`].
#[derive(Debug, Clone)]
pub struct StructuredInsert<'a> {
    pub target: &'a EntityDefinition,
    pub source: &'a EntityDefinition,
    /// Target column and the source attribute feeding it.
    pub columns: Vec<(&'a EntityAttributeDefinition, &'a EntityAttributeDefinition)>,
    /// Value slots of each source row.
    pub rows: Vec<Vec<Value>>,
    pub conflict: Option<ConflictAction<'a>>,
    pub returning: Vec<&'a EntityAttributeDefinition>,
}

#[derive(Clone)]
enum Conflict {
    DoNothing(Vec<AttributeRef>),
    DoUpdate(Vec<AttributeRef>, Vec<AttributeRef>),
}

/// Set based `INSERT INTO .. SELECT` of rows of type `R` into a target table,
/// with optional upsert and returned columns.
///
/// ```ignore
/// let command = StructuredCommand::new(&imports)
///     .insert_into::<Product>(&[Product::code, Product::name])
///     .from(&[ProductImport::code, ProductImport::label])
///     .on_conflict_do_update(&[Product::code], &[Product::name])
///     .returning(&[Product::id, Product::code]);
/// ```
pub struct StructuredCommand<'r, R: Entity> {
    rows: &'r [R],
    target: Option<DescriptorFn>,
    target_columns: Vec<AttributeRef>,
    source_columns: Vec<AttributeRef>,
    conflict: Option<Conflict>,
    returning: Vec<AttributeRef>,
}

impl<'r, R: Entity> StructuredCommand<'r, R> {
    pub fn new(rows: &'r [R]) -> Self {
        Self {
            rows,
            target: None,
            target_columns: Vec::new(),
            source_columns: Vec::new(),
            conflict: None,
            returning: Vec::new(),
        }
    }

    /// Target table and columns, every insertable column of `T` when empty.
    pub fn insert_into<T: Entity>(mut self, columns: &[AttributeRef]) -> Self {
        self.target = Some(T::descriptor);
        self.target_columns = columns.to_vec();
        self
    }

    /// Source attribute of each target column, matched by column name when empty.
    pub fn from(mut self, columns: &[AttributeRef]) -> Self {
        self.source_columns = columns.to_vec();
        self
    }

    pub fn on_conflict_do_update(mut self, keys: &[AttributeRef], columns: &[AttributeRef]) -> Self {
        self.conflict = Some(Conflict::DoUpdate(keys.to_vec(), columns.to_vec()));
        self
    }

    pub fn on_conflict_do_nothing(mut self) -> Self {
        self.conflict = Some(Conflict::DoNothing(Vec::new()));
        self
    }

    pub fn on_conflict_on_do_nothing(mut self, keys: &[AttributeRef]) -> Self {
        self.conflict = Some(Conflict::DoNothing(keys.to_vec()));
        self
    }

    pub fn returning(mut self, columns: &[AttributeRef]) -> Self {
        self.returning = columns.to_vec();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn has_returning(&self) -> bool {
        !self.returning.is_empty()
    }

    pub(crate) fn target_descriptor(&self) -> DescriptorFn {
        self.target.unwrap_or(R::descriptor)
    }

    /// Resolves the command against the definitions and renders it.
    ///
    /// `returning_all` returns every direct column of the target when no column
    /// was requested, the entity mapping needs the full row.
    pub fn compile(
        &self,
        definitions: &DefinitionProvider,
        writer: &dyn SqlWriter,
        returning_all: bool,
    ) -> RepositoryResult<(CompiledStatement, RowShape)> {
        let target = definitions.resolve_descriptor(self.target_descriptor()())?;
        let source = definitions.resolve::<R>()?;
        let columns = self.columns(&target, &source)?;
        let conflict = match &self.conflict {
            None => None,
            Some(Conflict::DoNothing(keys)) => Some(ConflictAction::DoNothing {
                keys: direct_attributes(&target, keys)?,
            }),
            Some(Conflict::DoUpdate(keys, update)) => {
                if keys.is_empty() || update.is_empty() {
                    return Err(UsageError::SelectionMismatch(
                        "an upsert needs a conflict key and the columns to update".into(),
                    )
                    .into());
                }
                Some(ConflictAction::DoUpdate {
                    keys: direct_attributes(&target, keys)?,
                    columns: direct_attributes(&target, update)?,
                })
            }
        };
        let returning = if self.returning.is_empty() && returning_all {
            target.direct_attributes().collect()
        } else {
            direct_attributes(&target, &self.returning)?
        };
        let shape = RowShape::of_attributes(returning.iter().copied());
        let rows = self
            .rows
            .iter()
            .map(|row| {
                let values = row.to_values();
                if values.len() != source.slot_count() {
                    return Err(RepositoryError::from(UsageError::SelectionMismatch(format!(
                        "`{}` wrote {} values, its definition has {} attributes",
                        source.type_name(),
                        values.len(),
                        source.slot_count()
                    ))));
                }
                Ok(values)
            })
            .collect::<RepositoryResult<_>>()?;
        let command = StructuredInsert {
            target: &target,
            source: &source,
            columns,
            rows,
            conflict,
            returning,
        };
        Ok((writer.compile_structured(&command)?, shape))
    }

    fn columns<'a>(
        &self,
        target: &'a EntityDefinition,
        source: &'a EntityDefinition,
    ) -> RepositoryResult<Vec<(&'a EntityAttributeDefinition, &'a EntityAttributeDefinition)>> {
        let targets = if self.target_columns.is_empty() {
            target.insertable().collect()
        } else {
            direct_attributes(target, &self.target_columns)?
        };
        if targets.is_empty() {
            return Err(UsageError::SelectionMismatch(format!(
                "`{}` has no column to insert",
                target.type_name()
            ))
            .into());
        }
        if self.source_columns.is_empty() {
            return targets
                .into_iter()
                .map(|column| {
                    source
                        .direct_attributes()
                        .find(|v| v.physical_name == column.physical_name)
                        .map(|v| (column, v))
                        .ok_or_else(|| {
                            RepositoryError::from(UsageError::SelectionMismatch(format!(
                                "`{}` has no column `{}` to insert from",
                                source.type_name(),
                                column.physical_name
                            )))
                        })
                })
                .collect();
        }
        if self.source_columns.len() != targets.len() {
            return Err(UsageError::SelectionMismatch(format!(
                "{} target columns fed by {} source columns",
                targets.len(),
                self.source_columns.len()
            ))
            .into());
        }
        let sources = self
            .source_columns
            .iter()
            .map(|v| {
                source
                    .find(&v.key())
                    .filter(|v| v.kind.is_selectable())
                    .ok_or_else(|| not_a_column(source, &v.key()))
            })
            .collect::<RepositoryResult<Vec<_>>>()?;
        Ok(targets.into_iter().zip(sources).collect())
    }
}

fn not_a_column(definition: &EntityDefinition, key: &AttributeKey) -> RepositoryError {
    UsageError::SelectionMismatch(format!(
        "{:?} is not a column of `{}`",
        key,
        definition.type_name()
    ))
    .into()
}

fn direct_attributes<'a>(
    definition: &'a EntityDefinition,
    columns: &[AttributeRef],
) -> RepositoryResult<Vec<&'a EntityAttributeDefinition>> {
    columns
        .iter()
        .map(|v| {
            let key = v.key();
            definition
                .find(&key)
                .filter(|v| v.kind.is_direct())
                .ok_or_else(|| not_a_column(definition, &key))
        })
        .collect()
}

impl<'r, R: Entity> Debug for StructuredCommand<'r, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructuredCommand")
            .field("source", &R::descriptor().type_name)
            .field("target", &self.target_descriptor()().type_name)
            .field("rows", &self.rows.len())
            .field("target_columns", &self.target_columns)
            .field("source_columns", &self.source_columns)
            .field("returning", &self.returning)
            .finish()
    }
}
