use crate::{
    CompiledStatement, ConflictAction, EntityAttributeDefinition, EntityDefinition,
    EntityLocation, EntityRelation, FilterOperator, IsolationLevel, JoinType, Order, Page,
    RepositoryError, RepositoryResult, SelectionRef, StructuredInsert, UsageError, Value,
    ValueFilter, possibly_parenthesized, separated_by,
    writer::{Context, Fragment},
};

macro_rules! write_integer {
    ($out:ident, $value:expr) => {{
        let mut buffer = itoa::Buffer::new();
        $out.push_str(buffer.format($value));
    }};
}

/// Column resolved for rendering: where it lives and its physical name.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedColumn<'a> {
    pub location: &'a EntityLocation,
    pub name: &'static str,
}

/// Dialect printer compiling definitions and selections into SQL statements.
///
/// Every default method renders the standard dialect: `?` placeholders,
/// `OFFSET .. ROWS FETCH NEXT .. ROWS ONLY` paging, multi row `VALUES` for bulk
/// inserts. Dialects override the pieces that differ.
pub trait SqlWriter: Send + Sync {
    fn as_dyn(&self) -> &dyn SqlWriter;

    /// Whether INSERT returns the generated key as a row.
    fn insert_returns_key(&self) -> bool {
        false
    }

    /// Whether the current fragment context allows alias declaration.
    fn alias_declaration(&self, context: &Context) -> bool {
        matches!(context.fragment, Fragment::SqlSelectFrom | Fragment::SqlJoin)
    }

    /// Escape occurrences of `search` char with `replace` while copying into buffer.
    fn write_escaped(
        &self,
        _context: &Context,
        out: &mut String,
        value: &str,
        search: char,
        replace: &str,
    ) {
        let mut position = 0;
        for (i, c) in value.char_indices() {
            if c == search {
                out.push_str(&value[position..i]);
                out.push_str(replace);
                position = i + c.len_utf8();
            }
        }
        out.push_str(&value[position..]);
    }

    /// Quote identifiers ("name") doubling inner quotes.
    fn write_identifier_quoted(&self, context: &Context, out: &mut String, value: &str) {
        out.push('"');
        self.write_escaped(context, out, value, '"', "\"\"");
        out.push('"');
    }

    /// Render a table: the declaration (`"schema"."name" "alias"`) in FROM and JOIN,
    /// the alias or the qualified name elsewhere.
    fn write_location(&self, context: &Context, out: &mut String, location: &EntityLocation) {
        let declaration = self.alias_declaration(context);
        if declaration || location.alias.is_none() {
            if !location.schema.is_empty() {
                self.write_identifier_quoted(context, out, location.schema);
                out.push('.');
            }
            self.write_identifier_quoted(context, out, location.name);
        }
        if let Some(alias) = location.alias {
            if declaration {
                out.push(' ');
            }
            self.write_identifier_quoted(context, out, alias);
        }
    }

    /// Render a column, qualified with its location when the context asks so.
    fn write_column(&self, context: &Context, out: &mut String, column: ResolvedColumn) {
        if context.qualify_columns {
            self.write_location(&context.switch_fragment(Fragment::None), out, column.location);
            out.push('.');
        }
        self.write_identifier_quoted(context, out, column.name);
    }

    fn write_attribute(
        &self,
        context: &Context,
        out: &mut String,
        attribute: &EntityAttributeDefinition,
    ) {
        self.write_column(
            context,
            out,
            ResolvedColumn {
                location: &attribute.location,
                name: attribute.physical_name,
            },
        );
    }

    /// Render the SQL type for a `Value` prototype.
    fn write_column_type(&self, _context: &Context, out: &mut String, value: &Value) {
        match value {
            Value::Boolean(..) => out.push_str("BOOLEAN"),
            Value::Int8(..) => out.push_str("TINYINT"),
            Value::Int16(..) => out.push_str("SMALLINT"),
            Value::Int32(..) => out.push_str("INTEGER"),
            Value::Int64(..) => out.push_str("BIGINT"),
            Value::UInt8(..) => out.push_str("UTINYINT"),
            Value::UInt16(..) => out.push_str("USMALLINT"),
            Value::UInt32(..) => out.push_str("UINTEGER"),
            Value::UInt64(..) => out.push_str("UBIGINT"),
            Value::Float32(..) => out.push_str("FLOAT"),
            Value::Float64(..) => out.push_str("DOUBLE"),
            Value::Decimal(..) => out.push_str("DECIMAL"),
            Value::Varchar(..) => out.push_str("VARCHAR"),
            Value::Blob(..) => out.push_str("BLOB"),
            Value::Date(..) => out.push_str("DATE"),
            Value::Time(..) => out.push_str("TIME"),
            Value::Timestamp(..) => out.push_str("TIMESTAMP"),
            Value::TimestampWithTimezone(..) => out.push_str("TIMESTAMPTZ"),
            Value::Uuid(..) => out.push_str("UUID"),
            Value::Json(..) => out.push_str("JSON"),
            Value::Null => log::error!("Cannot write the column type of an untyped null"),
        };
    }

    /// Render the placeholder of the `index`-th parameter (1-based).
    fn write_placeholder(&self, _context: &Context, out: &mut String, _index: usize) {
        out.push('?');
    }

    /// Append `value` to the parameters and render its placeholder.
    fn write_parameter(
        &self,
        context: &Context,
        out: &mut String,
        params: &mut Vec<Value>,
        value: Value,
    ) {
        params.push(value);
        self.write_placeholder(context, out, params.len());
    }

    /// Checks that the placeholders of `statement` match its parameter list.
    fn verify_placeholders(&self, statement: &CompiledStatement) -> RepositoryResult<()> {
        let mut count = 0;
        scan_unquoted(&statement.sql, |sql, i| {
            if sql.as_bytes()[i] == b'?' {
                count += 1;
            }
        });
        if count != statement.params.len() {
            return Err(RepositoryError::CompilationInvariant(format!(
                "statement has {} placeholders but {} parameters: {}",
                count,
                statement.params.len(),
                statement
            )));
        }
        Ok(())
    }

    /// Where the column referenced by `key` lives, looked up in the definition and
    /// then in the tables joined by `relations`.
    fn resolve_column<'a>(
        &self,
        definition: &'a EntityDefinition,
        relations: &'a [EntityRelation],
        joined: &'a [EntityLocation],
        key: &crate::AttributeKey,
    ) -> RepositoryResult<ResolvedColumn<'a>> {
        if let Some(attribute) = definition.find(key)
            && attribute.kind.is_selectable()
            && is_reachable(definition, joined, &attribute.location)
        {
            return Ok(ResolvedColumn {
                location: &attribute.location,
                name: attribute.physical_name,
            });
        }
        for (relation, location) in relations.iter().zip(joined) {
            for side in [&relation.relation, &relation.source] {
                if side.entity_type() != key.entity
                    || (key.alias.is_some() && key.alias != location.alias)
                    || side.entity_type() != location.entity
                {
                    continue;
                }
                if let Some(field) = side
                    .descriptor()
                    .fields
                    .iter()
                    .find(|v| v.property == key.field && v.kind.is_persisted())
                {
                    return Ok(ResolvedColumn {
                        location,
                        name: field.column_name(),
                    });
                }
            }
        }
        if key.entity == definition.type_name()
            && key.alias.is_none()
            && let Some(field) = definition
                .reference
                .entity
                .fields
                .iter()
                .find(|v| v.property == key.field && v.kind.is_persisted())
        {
            return Ok(ResolvedColumn {
                location: &definition.location,
                name: field.column_name(),
            });
        }
        Err(UsageError::SelectionMismatch(format!(
            "{:?} is not reachable from `{}`",
            key,
            definition.type_name()
        ))
        .into())
    }

    /// Render one predicate, null comparisons become `IS NULL` / `IS NOT NULL`.
    fn write_filter(
        &self,
        context: &Context,
        out: &mut String,
        params: &mut Vec<Value>,
        column: ResolvedColumn,
        filter: &ValueFilter,
    ) -> RepositoryResult<()> {
        let invalid = |message: &str| -> RepositoryError {
            UsageError::InvalidFilter(format!("{:?}: {}", filter.attribute, message)).into()
        };
        let single = || match filter.values.as_slice() {
            [v] => Ok(v),
            _ => Err(invalid("expected exactly one value")),
        };
        match filter.operator {
            FilterOperator::Equal | FilterOperator::NotEqual => {
                let value = single()?;
                let equal = filter.operator == FilterOperator::Equal;
                self.write_column(context, out, column);
                if value.is_null() {
                    out.push_str(if equal { " IS NULL" } else { " IS NOT NULL" });
                } else {
                    out.push_str(if equal { " = " } else { " <> " });
                    self.write_parameter(context, out, params, value.clone());
                }
            }
            FilterOperator::Less
            | FilterOperator::LessOrEqual
            | FilterOperator::Greater
            | FilterOperator::GreaterOrEqual
            | FilterOperator::Like
            | FilterOperator::NotLike => {
                let value = single()?;
                if value.is_null() {
                    return Err(invalid("cannot compare with null"));
                }
                self.write_column(context, out, column);
                out.push_str(match filter.operator {
                    FilterOperator::Less => " < ",
                    FilterOperator::LessOrEqual => " <= ",
                    FilterOperator::Greater => " > ",
                    FilterOperator::GreaterOrEqual => " >= ",
                    FilterOperator::Like => " LIKE ",
                    _ => " NOT LIKE ",
                });
                self.write_parameter(context, out, params, value.clone());
            }
            FilterOperator::Between => {
                let [min, max] = filter.values.as_slice() else {
                    return Err(invalid("expected a minimum and a maximum"));
                };
                self.write_column(context, out, column);
                match (min.is_null(), max.is_null()) {
                    (false, false) => {
                        out.push_str(" BETWEEN ");
                        self.write_parameter(context, out, params, min.clone());
                        out.push_str(" AND ");
                        self.write_parameter(context, out, params, max.clone());
                    }
                    (true, false) => {
                        out.push_str(" <= ");
                        self.write_parameter(context, out, params, max.clone());
                    }
                    (false, true) => {
                        out.push_str(" >= ");
                        self.write_parameter(context, out, params, min.clone());
                    }
                    (true, true) => return Err(invalid("both range bounds are null")),
                }
            }
            FilterOperator::In | FilterOperator::NotIn => {
                let include = filter.operator == FilterOperator::In;
                let values: Vec<Value> =
                    filter.values.iter().filter(|v| !v.is_null()).cloned().collect();
                let has_null = values.len() != filter.values.len();
                if values.is_empty() && !has_null {
                    out.push_str(if include { "1 = 0" } else { "1 = 1" });
                    return Ok(());
                }
                possibly_parenthesized!(out, !values.is_empty() && has_null, {
                    if !values.is_empty() {
                        self.write_column(context, out, column);
                        out.push_str(if include { " IN (" } else { " NOT IN (" });
                        separated_by(
                            out,
                            values.iter(),
                            |out, v| self.write_parameter(context, out, params, v.clone()),
                            ", ",
                        );
                        out.push(')');
                        if has_null {
                            out.push_str(if include { " OR " } else { " AND " });
                        }
                    }
                    if has_null {
                        self.write_column(context, out, column);
                        out.push_str(if include { " IS NULL" } else { " IS NOT NULL" });
                    }
                });
            }
        }
        Ok(())
    }

    /// Render the filters joined by `AND`, nothing when there are none.
    fn write_conditions(
        &self,
        context: &Context,
        out: &mut String,
        params: &mut Vec<Value>,
        definition: &EntityDefinition,
        selection: SelectionRef,
        joined: &[EntityLocation],
    ) -> RepositoryResult<()> {
        let mut result = Ok(());
        separated_by(
            out,
            selection.filters,
            |out, filter| {
                if result.is_err() {
                    return;
                }
                result = self
                    .resolve_column(definition, selection.relations, joined, &filter.attribute)
                    .and_then(|column| self.write_filter(context, out, params, column, filter));
            },
            " AND ",
        );
        result
    }

    fn write_join(
        &self,
        context: &Context,
        out: &mut String,
        definition: &EntityDefinition,
        relations: &[EntityRelation],
        joined: &[EntityLocation],
        index: usize,
    ) -> RepositoryResult<()> {
        let relation = &relations[index];
        out.push_str(match relation.join {
            JoinType::Inner => "\nINNER JOIN ",
            JoinType::Left => "\nLEFT JOIN ",
        });
        self.write_location(&context.switch_fragment(Fragment::SqlJoin), out, &joined[index]);
        out.push_str(" ON ");
        self.write_join_condition(context, out, definition, relations, joined, index)
    }

    /// `source = relation` of the `index`-th relation.
    fn write_join_condition(
        &self,
        context: &Context,
        out: &mut String,
        definition: &EntityDefinition,
        relations: &[EntityRelation],
        joined: &[EntityLocation],
        index: usize,
    ) -> RepositoryResult<()> {
        let relation = &relations[index];
        let source = self.resolve_column(
            definition,
            &relations[..index],
            &joined[..index],
            &relation.source.key(),
        )?;
        let target = ResolvedColumn {
            location: &joined[index],
            name: relation
                .relation
                .descriptor()
                .fields
                .iter()
                .find(|v| v.property == relation.relation.field && v.kind.is_persisted())
                .map(|v| v.column_name())
                .ok_or_else(|| {
                    RepositoryError::from(UsageError::SelectionMismatch(format!(
                        "{:?} is not a mapped column",
                        relation.relation
                    )))
                })?,
        };
        self.write_column(context, out, source);
        out.push_str(" = ");
        self.write_column(context, out, target);
        Ok(())
    }

    fn write_order_by(
        &self,
        context: &Context,
        out: &mut String,
        definition: &EntityDefinition,
        selection: SelectionRef,
        joined: &[EntityLocation],
    ) -> RepositoryResult<()> {
        if selection.order_by.is_empty() {
            return Ok(());
        }
        let context = context.switch_fragment(Fragment::SqlSelectOrderBy);
        out.push_str("\nORDER BY ");
        let mut result = Ok(());
        separated_by(
            out,
            selection.order_by,
            |out, order| {
                match self.resolve_column(
                    definition,
                    selection.relations,
                    joined,
                    &order.attribute,
                ) {
                    Ok(column) => self.write_column(&context, out, column),
                    Err(e) => {
                        result = Err(e);
                        return;
                    }
                }
                out.push_str(match order.order {
                    Order::ASC => " ASC",
                    Order::DESC => " DESC",
                });
            },
            ", ",
        );
        result
    }

    fn write_paging(&self, _context: &Context, out: &mut String, page: &Page) {
        out.push_str("\nOFFSET ");
        write_integer!(out, page.offset());
        out.push_str(" ROWS FETCH NEXT ");
        write_integer!(out, page.size);
        out.push_str(" ROWS ONLY");
    }

    fn write_first_row(&self, _context: &Context, out: &mut String) {
        out.push_str("\nFETCH FIRST 1 ROWS ONLY");
    }

    /// FROM clause with the joins, shared by SELECT and EXISTS.
    fn write_from(
        &self,
        context: &Context,
        out: &mut String,
        definition: &EntityDefinition,
        selection: SelectionRef,
        joined: &[EntityLocation],
    ) -> RepositoryResult<()> {
        out.push_str("\nFROM ");
        self.write_location(
            &context.switch_fragment(Fragment::SqlSelectFrom),
            out,
            &definition.location,
        );
        for index in 0..selection.relations.len() {
            self.write_join(context, out, definition, selection.relations, joined, index)?;
        }
        Ok(())
    }

    fn write_where(
        &self,
        context: &Context,
        out: &mut String,
        params: &mut Vec<Value>,
        definition: &EntityDefinition,
        selection: SelectionRef,
        joined: &[EntityLocation],
    ) -> RepositoryResult<()> {
        if selection.filters.is_empty() {
            return Ok(());
        }
        out.push_str("\nWHERE ");
        self.write_conditions(context, out, params, definition, selection, joined)
    }

    /// WHERE clause of UPDATE and DELETE. Joined tables move into a correlated
    /// `EXISTS` sub query, the target table cannot be joined in place portably.
    fn write_modify_where(
        &self,
        context: &Context,
        out: &mut String,
        params: &mut Vec<Value>,
        definition: &EntityDefinition,
        selection: SelectionRef,
    ) -> RepositoryResult<()> {
        let joined = joined_locations(definition, selection.relations);
        if selection.relations.is_empty() {
            return self.write_where(context, out, params, definition, selection, &joined);
        }
        out.push_str("\nWHERE EXISTS (SELECT 1\nFROM ");
        let declaration = context.switch_fragment(Fragment::SqlSelectFrom);
        separated_by(
            out,
            joined.iter(),
            |out, location| self.write_location(&declaration, out, location),
            ", ",
        );
        out.push_str("\nWHERE ");
        for index in 0..selection.relations.len() {
            if index > 0 {
                out.push_str(" AND ");
            }
            self.write_join_condition(context, out, definition, selection.relations, &joined, index)?;
        }
        if !selection.filters.is_empty() {
            out.push_str(" AND ");
            self.write_conditions(context, out, params, definition, selection, &joined)?;
        }
        out.push(')');
        Ok(())
    }

    fn write_select(
        &self,
        out: &mut String,
        params: &mut Vec<Value>,
        definition: &EntityDefinition,
        selection: SelectionRef,
    ) -> RepositoryResult<()> {
        let context = Context::new(Fragment::SqlSelect, true);
        let joined = joined_locations(definition, selection.relations);
        out.push_str("SELECT ");
        separated_by(
            out,
            selected_attributes(definition, &joined),
            |out, attribute| {
                self.write_attribute(&context, out, attribute);
                if let Some(alias) = attribute.alias {
                    out.push_str(" AS ");
                    self.write_identifier_quoted(&context, out, alias);
                }
            },
            ", ",
        );
        self.write_from(&context, out, definition, selection, &joined)?;
        self.write_where(
            &context.switch_fragment(Fragment::SqlSelectWhere),
            out,
            params,
            definition,
            selection,
            &joined,
        )?;
        self.write_order_by(&context, out, definition, selection, &joined)?;
        if let Some(page) = &selection.page {
            self.write_paging(&context, out, page);
        } else if selection.first {
            self.write_first_row(&context, out);
        }
        out.push(';');
        Ok(())
    }

    fn write_exists(
        &self,
        out: &mut String,
        params: &mut Vec<Value>,
        definition: &EntityDefinition,
        selection: SelectionRef,
    ) -> RepositoryResult<()> {
        let context = Context::new(Fragment::SqlExists, true);
        let joined = joined_locations(definition, selection.relations);
        out.push_str("SELECT EXISTS (SELECT 1");
        self.write_from(&context, out, definition, selection, &joined)?;
        self.write_where(
            &context.switch_fragment(Fragment::SqlSelectWhere),
            out,
            params,
            definition,
            selection,
            &joined,
        )?;
        out.push_str(");");
        Ok(())
    }

    fn write_insert(
        &self,
        out: &mut String,
        params: &mut Vec<Value>,
        definition: &EntityDefinition,
        values: &[Value],
    ) -> RepositoryResult<()> {
        let context = Context::new(Fragment::SqlInsertInto, false);
        out.push_str("INSERT INTO ");
        self.write_location(&context, out, &definition.location);
        let columns: Vec<_> = definition.insertable().collect();
        if columns.is_empty() {
            out.push_str(" DEFAULT VALUES");
        } else {
            out.push_str(" (");
            separated_by(
                out,
                columns.iter(),
                |out, attribute| self.write_attribute(&context, out, attribute),
                ", ",
            );
            out.push_str(")\nVALUES (");
            let context = context.switch_fragment(Fragment::SqlInsertIntoValues);
            separated_by(
                out,
                columns.iter(),
                |out, attribute| {
                    self.write_parameter(&context, out, params, values[attribute.ordinal].clone())
                },
                ", ",
            );
            out.push(')');
        }
        if self.insert_returns_key()
            && let Some(key) = definition.auto_number()
        {
            self.write_returning(&context, out, &[key]);
        }
        out.push(';');
        Ok(())
    }

    fn write_returning(
        &self,
        context: &Context,
        out: &mut String,
        columns: &[&EntityAttributeDefinition],
    ) {
        if columns.is_empty() {
            return;
        }
        let context = context.switch_fragment(Fragment::SqlReturning).unqualified();
        out.push_str("\nRETURNING ");
        separated_by(
            out,
            columns,
            |out, attribute| self.write_attribute(&context, out, attribute),
            ", ",
        );
    }

    fn write_update(
        &self,
        out: &mut String,
        params: &mut Vec<Value>,
        definition: &EntityDefinition,
        selection: SelectionRef,
        values: &[Value],
        columns: &[&EntityAttributeDefinition],
    ) -> RepositoryResult<()> {
        let context = Context::new(Fragment::SqlUpdate, true);
        out.push_str("UPDATE ");
        self.write_location(&context, out, &definition.location);
        out.push_str(" SET ");
        let set = context.switch_fragment(Fragment::SqlUpdateSet).unqualified();
        separated_by(
            out,
            columns,
            |out, attribute| {
                self.write_attribute(&set, out, attribute);
                out.push_str(" = ");
                self.write_parameter(&set, out, params, values[attribute.ordinal].clone());
            },
            ", ",
        );
        self.write_modify_where(
            &context.switch_fragment(Fragment::SqlUpdateWhere),
            out,
            params,
            definition,
            selection,
        )?;
        out.push(';');
        Ok(())
    }

    fn write_delete(
        &self,
        out: &mut String,
        params: &mut Vec<Value>,
        definition: &EntityDefinition,
        selection: SelectionRef,
    ) -> RepositoryResult<()> {
        let context = Context::new(Fragment::SqlDeleteFrom, true);
        out.push_str("DELETE FROM ");
        self.write_location(&context, out, &definition.location);
        self.write_modify_where(
            &context.switch_fragment(Fragment::SqlDeleteFromWhere),
            out,
            params,
            definition,
            selection,
        )?;
        out.push(';');
        Ok(())
    }

    fn write_on_conflict(&self, context: &Context, out: &mut String, conflict: &ConflictAction) {
        let context = context
            .switch_fragment(Fragment::SqlInsertIntoOnConflict)
            .unqualified();
        let write_keys = |out: &mut String, keys: &[&EntityAttributeDefinition]| {
            if keys.is_empty() {
                return;
            }
            out.push_str(" (");
            separated_by(
                out,
                keys,
                |out, attribute| self.write_attribute(&context, out, attribute),
                ", ",
            );
            out.push(')');
        };
        out.push_str("\nON CONFLICT");
        match conflict {
            ConflictAction::DoNothing { keys } => {
                write_keys(out, keys);
                out.push_str(" DO NOTHING");
            }
            ConflictAction::DoUpdate { keys, columns } => {
                write_keys(out, keys);
                out.push_str(" DO UPDATE SET\n");
                separated_by(
                    out,
                    columns,
                    |out, attribute| {
                        self.write_attribute(&context, out, attribute);
                        out.push_str(" = EXCLUDED.");
                        self.write_attribute(&context, out, attribute);
                    },
                    ",\n",
                );
            }
        }
    }

    /// Bulk insert rendered as a multi row `VALUES` list.
    fn write_structured_insert(
        &self,
        out: &mut String,
        params: &mut Vec<Value>,
        command: &StructuredInsert,
    ) -> RepositoryResult<()> {
        let context = Context::new(Fragment::SqlInsertInto, false);
        out.push_str("INSERT INTO ");
        self.write_location(&context, out, &command.target.location);
        out.push_str(" (");
        separated_by(
            out,
            command.columns.iter(),
            |out, (target, _)| self.write_attribute(&context, out, target),
            ", ",
        );
        out.push_str(") VALUES\n");
        let values = context.switch_fragment(Fragment::SqlInsertIntoValues);
        separated_by(
            out,
            command.rows.iter(),
            |out, row| {
                out.push('(');
                separated_by(
                    out,
                    command.columns.iter(),
                    |out, (_, source)| {
                        self.write_parameter(&values, out, params, row[source.ordinal].clone())
                    },
                    ", ",
                );
                out.push(')');
            },
            ",\n",
        );
        if let Some(conflict) = &command.conflict {
            self.write_on_conflict(&context, out, conflict);
        }
        self.write_returning(&context, out, &command.returning);
        out.push(';');
        Ok(())
    }

    fn write_isolation_level(&self, _context: &Context, out: &mut String, level: IsolationLevel) {
        out.push_str(match level {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        });
    }

    fn write_transaction_begin(
        &self,
        context: &Context,
        out: &mut String,
        isolation: Option<IsolationLevel>,
    ) {
        out.push_str("START TRANSACTION");
        if let Some(level) = isolation {
            out.push_str(" ISOLATION LEVEL ");
            self.write_isolation_level(context, out, level);
        }
        out.push(';');
    }

    fn write_transaction_commit(&self, _context: &Context, out: &mut String) {
        out.push_str("COMMIT;");
    }

    fn write_transaction_rollback(&self, _context: &Context, out: &mut String) {
        out.push_str("ROLLBACK;");
    }

    fn finish(&self, sql: String, params: Vec<Value>) -> RepositoryResult<CompiledStatement> {
        let statement = CompiledStatement::new(sql, params);
        self.verify_placeholders(&statement)?;
        Ok(statement)
    }

    fn compile_select(
        &self,
        definition: &EntityDefinition,
        selection: SelectionRef,
    ) -> RepositoryResult<CompiledStatement> {
        let (mut sql, mut params) = (String::with_capacity(256), Vec::new());
        self.write_select(&mut sql, &mut params, definition, selection)?;
        self.finish(sql, params)
    }

    fn compile_exists(
        &self,
        definition: &EntityDefinition,
        selection: SelectionRef,
    ) -> RepositoryResult<CompiledStatement> {
        let (mut sql, mut params) = (String::with_capacity(128), Vec::new());
        self.write_exists(&mut sql, &mut params, definition, selection)?;
        self.finish(sql, params)
    }

    /// INSERT of one entity, `values` are its slots.
    fn compile_insert(
        &self,
        definition: &EntityDefinition,
        values: &[Value],
    ) -> RepositoryResult<CompiledStatement> {
        check_slots(definition, values)?;
        let (mut sql, mut params) = (String::with_capacity(128), Vec::new());
        self.write_insert(&mut sql, &mut params, definition, values)?;
        self.finish(sql, params)
    }

    /// UPDATE of the rows matching `selection`, setting `columns` (every updatable
    /// column when `None`) from the slots in `values`.
    fn compile_update(
        &self,
        definition: &EntityDefinition,
        selection: SelectionRef,
        values: &[Value],
        columns: Option<&[crate::AttributeKey]>,
    ) -> RepositoryResult<CompiledStatement> {
        check_slots(definition, values)?;
        let columns: Vec<&EntityAttributeDefinition> = match columns {
            Some(columns) => columns
                .iter()
                .map(|key| {
                    definition
                        .find(key)
                        .filter(|v| v.kind.is_updatable())
                        .ok_or_else(|| {
                            RepositoryError::from(UsageError::SelectionMismatch(format!(
                                "{:?} is not an updatable column of `{}`",
                                key,
                                definition.type_name()
                            )))
                        })
                })
                .collect::<RepositoryResult<_>>()?,
            None => definition.updatable().collect(),
        };
        if columns.is_empty() {
            return Err(UsageError::SelectionMismatch(format!(
                "`{}` has no column to update",
                definition.type_name()
            ))
            .into());
        }
        let (mut sql, mut params) = (String::with_capacity(128), Vec::new());
        self.write_update(&mut sql, &mut params, definition, selection, values, &columns)?;
        self.finish(sql, params)
    }

    fn compile_delete(
        &self,
        definition: &EntityDefinition,
        selection: SelectionRef,
    ) -> RepositoryResult<CompiledStatement> {
        let (mut sql, mut params) = (String::with_capacity(128), Vec::new());
        self.write_delete(&mut sql, &mut params, definition, selection)?;
        self.finish(sql, params)
    }

    fn compile_structured(&self, command: &StructuredInsert) -> RepositoryResult<CompiledStatement> {
        let (mut sql, mut params) = (String::with_capacity(256), Vec::new());
        self.write_structured_insert(&mut sql, &mut params, command)?;
        self.finish(sql, params)
    }

    fn compile_begin(&self, isolation: Option<IsolationLevel>) -> CompiledStatement {
        let mut sql = String::new();
        self.write_transaction_begin(&Context::default(), &mut sql, isolation);
        sql.into()
    }

    fn compile_commit(&self) -> CompiledStatement {
        let mut sql = String::new();
        self.write_transaction_commit(&Context::default(), &mut sql);
        sql.into()
    }

    fn compile_rollback(&self) -> CompiledStatement {
        let mut sql = String::new();
        self.write_transaction_rollback(&Context::default(), &mut sql);
        sql.into()
    }
}

/// Calls `f` with the byte index of every character outside quoted strings and
/// identifiers.
pub fn scan_unquoted(sql: &str, mut f: impl FnMut(&str, usize)) {
    let (mut single, mut double) = (false, false);
    for (i, c) in sql.char_indices() {
        match c {
            '\'' if !double => single = !single,
            '"' if !single => double = !double,
            _ if !single && !double => f(sql, i),
            _ => {}
        }
    }
}

fn check_slots(definition: &EntityDefinition, values: &[Value]) -> RepositoryResult<()> {
    if values.len() != definition.slot_count() {
        return Err(UsageError::SelectionMismatch(format!(
            "{} values given for the {} attributes of `{}`",
            values.len(),
            definition.slot_count(),
            definition.type_name()
        ))
        .into());
    }
    Ok(())
}

/// Location of the table joined by each relation, in declaration order.
pub fn joined_locations(
    definition: &EntityDefinition,
    relations: &[EntityRelation],
) -> Vec<EntityLocation> {
    relations
        .iter()
        .map(|relation| {
            let descriptor = relation.relation.descriptor();
            definition
                .find_location(descriptor.type_name, relation.relation.alias)
                .cloned()
                .unwrap_or_else(|| EntityLocation {
                    entity: descriptor.type_name,
                    schema: descriptor.schema,
                    name: descriptor.name,
                    alias: relation.relation.alias,
                    is_virtual: true,
                })
        })
        .collect()
}

/// Attributes a SELECT reads: the selectable ones stored in the root table or in a
/// table the selection joins. Nested relations the selection does not join read
/// back as null.
pub fn selected_attributes<'a>(
    definition: &'a EntityDefinition,
    joined: &[EntityLocation],
) -> Vec<&'a EntityAttributeDefinition> {
    definition
        .selectable()
        .filter(|v| is_reachable(definition, joined, &v.location))
        .collect()
}

/// Whether `location` is the root table or one of the `joined` tables.
fn is_reachable(
    definition: &EntityDefinition,
    joined: &[EntityLocation],
    location: &EntityLocation,
) -> bool {
    [&definition.location]
        .into_iter()
        .chain(joined)
        .any(|v| v.entity == location.entity && v.alias == location.alias && v.same_table(location))
}

/// Standard SQL dialect.
#[derive(Default, Debug, Clone, Copy)]
pub struct GenericSqlWriter {}

impl GenericSqlWriter {
    pub const fn new() -> Self {
        Self {}
    }
}

impl SqlWriter for GenericSqlWriter {
    fn as_dyn(&self) -> &dyn SqlWriter {
        self
    }
}
