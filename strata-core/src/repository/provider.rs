use crate::{
    AsValue, AttributeKey, AttributeRef, CompiledStatement, Connection, DefinitionProvider, Driver,
    Entity, EntityAttributeDefinition, EntityDefinition, ErrorRecord, IsolationLevel,
    ItemSelection, Operation, RepositoryError, RepositoryOptions, RepositoryResult, ResultCache,
    RowLabeled, RowShape, RowsAffected, SelectionRef, SqlWriter, StructuredCommand,
    StructuredRow, UsageError, Value, joined_locations, selected_attributes,
    stream::TryStreamExt,
};
use std::{pin::pin, sync::Arc};

/// Application root of the repository layer: owns the metadata and result caches
/// and hands out providers sharing them.
#[derive(Clone, Default)]
pub struct RepositoryFactory {
    definitions: Arc<DefinitionProvider>,
    cache: Arc<ResultCache>,
    options: RepositoryOptions,
}

impl RepositoryFactory {
    pub fn new(options: RepositoryOptions) -> Self {
        Self {
            definitions: Default::default(),
            cache: Default::default(),
            options,
        }
    }

    pub fn with_definitions(definitions: Arc<DefinitionProvider>, options: RepositoryOptions) -> Self {
        Self {
            definitions,
            cache: Default::default(),
            options,
        }
    }

    pub fn definitions(&self) -> &Arc<DefinitionProvider> {
        &self.definitions
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn options(&self) -> &RepositoryOptions {
        &self.options
    }

    /// Provider running on an already established connection.
    pub fn provider<C: Connection>(&self, connection: C) -> RepositoryProvider<C> {
        RepositoryProvider::new(
            connection,
            self.definitions.clone(),
            self.cache.clone(),
            self.options.clone(),
        )
    }

    pub async fn connect<C: Connection>(&self, url: &str) -> RepositoryResult<RepositoryProvider<C>> {
        match C::connect(url).await {
            Ok(connection) => Ok(self.provider(connection)),
            Err(e) => {
                let error = RepositoryError::execution(Operation::Connect, url, e);
                log::error!("{:#}", error);
                Err(error)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderState {
    Idle,
    TransactionOpen,
    Committed,
    RolledBack,
    CommitFailed,
    Disposed,
}

/// One unit of work on one connection.
///
/// A provider is used by a single caller at a time. It releases its connection
/// when disposed or dropped; once disposed every operation fails with
/// [`UsageError::Disposed`] before reaching the connection.
pub struct RepositoryProvider<C: Connection> {
    connection: Option<C>,
    writer: <C::Driver as Driver>::SqlWriter,
    definitions: Arc<DefinitionProvider>,
    cache: Arc<ResultCache>,
    options: RepositoryOptions,
    state: ProviderState,
    last_error: Option<ErrorRecord>,
}

impl<C: Connection> RepositoryProvider<C> {
    pub fn new(
        connection: C,
        definitions: Arc<DefinitionProvider>,
        cache: Arc<ResultCache>,
        options: RepositoryOptions,
    ) -> Self {
        let writer = connection.driver().sql_writer();
        Self {
            connection: Some(connection),
            writer,
            definitions,
            cache,
            options,
            state: ProviderState::Idle,
            last_error: None,
        }
    }

    pub fn state(&self) -> ProviderState {
        self.state
    }

    pub fn is_disposed(&self) -> bool {
        self.state == ProviderState::Disposed
    }

    pub fn definitions(&self) -> &Arc<DefinitionProvider> {
        &self.definitions
    }

    pub fn sql_writer(&self) -> &dyn SqlWriter {
        self.writer.as_dyn()
    }

    /// Audit record of the last translated failure, when an error mapping is configured.
    pub fn last_error(&self) -> Option<&ErrorRecord> {
        self.last_error.as_ref()
    }

    fn connection(&mut self) -> RepositoryResult<&mut C> {
        match self.connection.as_mut() {
            Some(connection) if self.state != ProviderState::Disposed => Ok(connection),
            _ => Err(UsageError::Disposed.into()),
        }
    }

    fn ensure_usable(&self) -> RepositoryResult<()> {
        if self.is_disposed() {
            return Err(UsageError::Disposed.into());
        }
        Ok(())
    }

    /// Logs `error` and records it through the error mapping.
    fn fail(&mut self, operation: Operation, error: RepositoryError) -> RepositoryError {
        log::error!("{:#}", error);
        if let Some(mapping) = &self.options.error_mapping {
            self.last_error = Some(mapping.map(&operation.to_string(), &error));
        }
        error
    }

    fn translate(
        &mut self,
        operation: Operation,
        target: impl Into<String>,
        error: crate::Error,
    ) -> RepositoryError {
        self.fail(operation, RepositoryError::execution(operation, target, error))
    }

    async fn fetch_rows(
        &mut self,
        operation: Operation,
        statement: CompiledStatement,
        first: bool,
        item: Option<serde_json::Value>,
    ) -> RepositoryResult<Vec<RowLabeled>> {
        log::debug!("{}", statement);
        let target = statement.to_string();
        let params = statement.params.clone();
        let result = {
            let connection = self.connection()?;
            let stream = connection.fetch(statement);
            if first {
                let mut stream = pin!(stream);
                stream.try_next().await.map(|v| v.into_iter().collect())
            } else {
                stream.try_collect::<Vec<_>>().await
            }
        };
        result.map_err(|e| {
            let error = RepositoryError::execution(operation, target, e)
                .with_params(params)
                .with_item(item);
            self.fail(operation, error)
        })
    }

    async fn execute_statement(
        &mut self,
        operation: Operation,
        statement: CompiledStatement,
        item: Option<serde_json::Value>,
    ) -> RepositoryResult<RowsAffected> {
        log::debug!("{}", statement);
        let target = statement.to_string();
        let params = statement.params.clone();
        let result = self.connection()?.execute(statement).await;
        result.map_err(|e| {
            let error = RepositoryError::execution(operation, target, e)
                .with_params(params)
                .with_item(item);
            self.fail(operation, error)
        })
    }

    /// Value slots of the rows selected, served from the cache when enabled.
    async fn load(
        &mut self,
        definition: &EntityDefinition,
        selection: SelectionRef<'_>,
        first: bool,
    ) -> RepositoryResult<Vec<Vec<Value>>> {
        self.ensure_usable()?;
        let selection = if first { selection.first() } else { selection };
        let statement = self.writer.compile_select(definition, selection)?;
        let signature = cache_signature(&statement, first);
        if self.options.caching {
            if let Some(rows) = self.cache.get(definition.type_name(), &signature) {
                log::trace!("Cache hit for `{}`", definition.type_name());
                return Ok(rows);
            }
            log::trace!("Cache miss for `{}`", definition.type_name());
        }
        let joined = joined_locations(definition, selection.relations);
        let selected = selected_attributes(definition, &joined);
        let rows = self.fetch_rows(Operation::Select, statement, first, None).await?;
        let rows: Vec<_> = rows
            .into_iter()
            .map(|row| slots_of(definition, &selected, row))
            .collect();
        if self.options.caching {
            self.cache.set(
                definition.type_name(),
                signature,
                rows.clone(),
                self.options.cache_expiry,
            );
        }
        Ok(rows)
    }

    fn decode<E: Entity>(&mut self, operation: Operation, values: Vec<Value>) -> RepositoryResult<E> {
        E::from_values(values).map_err(|e| {
            let error = UsageError::UnsupportedShape(format!(
                "the row does not decode into `{}`: {:#}",
                E::descriptor().type_name,
                e
            ));
            self.fail(operation, error.into())
        })
    }

    /// Stores `values` as the single row identifying the item.
    fn refresh<E: Entity>(&self, definition: &EntityDefinition, values: &[Value]) -> RepositoryResult<()> {
        if !self.options.caching {
            return Ok(());
        }
        let selection = ItemSelection::<E>::unique_values(definition, values);
        let statement = self
            .writer
            .compile_select(definition, selection.criteria().first())?;
        self.cache.set(
            definition.type_name(),
            cache_signature(&statement, true),
            vec![values.to_vec()],
            self.options.cache_expiry,
        );
        Ok(())
    }

    fn invalidate(&self, definition: &EntityDefinition) {
        if self.options.caching {
            self.cache.invalidate(definition.type_name());
        }
    }

    /// Whether at least one row matches, without fetching it.
    pub async fn contains<E: Entity>(&mut self, selection: &ItemSelection<E>) -> RepositoryResult<bool> {
        self.ensure_usable()?;
        let definition = self.definitions.resolve::<E>()?;
        let statement = self.writer.compile_exists(&definition, selection.criteria())?;
        log::debug!("{}", statement);
        let target = statement.to_string();
        let result = self.connection()?.scalar::<bool>(statement).await;
        match result {
            Ok(v) => Ok(v.unwrap_or(false)),
            Err(e) => Err(self.translate(Operation::Exists, target, e)),
        }
    }

    pub async fn first_or_default<E: Entity>(
        &mut self,
        selection: &ItemSelection<E>,
    ) -> RepositoryResult<Option<E>> {
        let definition = self.definitions.resolve::<E>()?;
        let rows = self.load(&definition, selection.criteria(), true).await?;
        match rows.into_iter().next() {
            Some(values) => self.decode(Operation::Select, values).map(Some),
            None => Ok(None),
        }
    }

    pub async fn select<E: Entity>(&mut self, selection: &ItemSelection<E>) -> RepositoryResult<Vec<E>> {
        let definition = self.definitions.resolve::<E>()?;
        let rows = self.load(&definition, selection.criteria(), false).await?;
        rows.into_iter()
            .map(|values| self.decode(Operation::Select, values))
            .collect()
    }

    /// One page of `selection`, `number` starts from 1.
    pub async fn select_page<E: Entity>(
        &mut self,
        selection: &ItemSelection<E>,
        size: u32,
        number: u32,
    ) -> RepositoryResult<Vec<E>> {
        self.select(&selection.clone().page(size, number)).await
    }

    /// Inserts `item` and returns it with its generated key, when the table has one.
    pub async fn insert<E: Entity>(&mut self, item: &E) -> RepositoryResult<E> {
        self.ensure_usable()?;
        let definition = self.definitions.resolve::<E>()?;
        let values = ItemSelection::<E>::values_of(&definition, item)?;
        let values = self.insert_values(&definition, values).await?;
        self.invalidate(&definition);
        self.refresh::<E>(&definition, &values)?;
        self.decode(Operation::Insert, values)
    }

    async fn insert_values(
        &mut self,
        definition: &EntityDefinition,
        mut values: Vec<Value>,
    ) -> RepositoryResult<Vec<Value>> {
        let statement = self.writer.compile_insert(definition, &values)?;
        let item = Some(item_of(definition, &values));
        let key = definition.auto_number().map(|v| v.ordinal);
        match key {
            Some(ordinal) if self.writer.insert_returns_key() => {
                let rows = self
                    .fetch_rows(Operation::Insert, statement, true, item)
                    .await?;
                if let Some(value) = rows
                    .into_iter()
                    .next()
                    .and_then(|row| row.values.into_vec().into_iter().next())
                {
                    let generated = value.clone().converted_like(&values[ordinal]).unwrap_or(value);
                    values[ordinal] = generated;
                }
            }
            _ => {
                let affected = self.execute_statement(Operation::Insert, statement, item).await?;
                if let (Some(ordinal), Some(id)) = (key, affected.last_affected_id) {
                    let generated = id.as_value();
                    values[ordinal] = generated
                        .clone()
                        .converted_like(&values[ordinal])
                        .unwrap_or(generated);
                }
            }
        }
        Ok(values)
    }

    /// Updates the row identified by `item`, setting `columns` or every updatable column.
    pub async fn update<E: Entity>(
        &mut self,
        item: &E,
        columns: Option<&[AttributeRef]>,
    ) -> RepositoryResult<u64> {
        self.ensure_usable()?;
        let definition = self.definitions.resolve::<E>()?;
        let selection = ItemSelection::<E>::unique(&definition, item)?;
        self.update_where(&selection, item, columns).await
    }

    /// Updates every row matching `selection` with the values of `item`.
    pub async fn update_where<E: Entity>(
        &mut self,
        selection: &ItemSelection<E>,
        item: &E,
        columns: Option<&[AttributeRef]>,
    ) -> RepositoryResult<u64> {
        self.ensure_usable()?;
        let definition = self.definitions.resolve::<E>()?;
        let values = ItemSelection::<E>::values_of(&definition, item)?;
        let columns: Option<Vec<AttributeKey>> =
            columns.map(|v| v.iter().map(AttributeRef::key).collect());
        let statement = self.writer.compile_update(
            &definition,
            selection.criteria(),
            &values,
            columns.as_deref(),
        )?;
        let item = Some(item_of(&definition, &values));
        let affected = self
            .execute_statement(Operation::Update, statement, item)
            .await?;
        self.invalidate(&definition);
        Ok(affected.rows_affected)
    }

    pub async fn delete<E: Entity>(&mut self, item: &E) -> RepositoryResult<u64> {
        self.ensure_usable()?;
        let definition = self.definitions.resolve::<E>()?;
        let selection = ItemSelection::<E>::unique(&definition, item)?;
        self.delete_where(&selection).await
    }

    pub async fn delete_where<E: Entity>(&mut self, selection: &ItemSelection<E>) -> RepositoryResult<u64> {
        self.ensure_usable()?;
        let definition = self.definitions.resolve::<E>()?;
        let statement = self.writer.compile_delete(&definition, selection.criteria())?;
        let affected = self
            .execute_statement(Operation::Delete, statement, None)
            .await?;
        self.invalidate(&definition);
        Ok(affected.rows_affected)
    }

    /// Inserts `item`, or merges it into the existing row it identifies.
    ///
    /// Non default fields of `item` override the stored ones, keys are kept. The
    /// UPDATE is skipped when the merge leaves the persisted columns unchanged.
    pub async fn save<E: Entity>(&mut self, item: &E) -> RepositoryResult<E> {
        self.ensure_usable()?;
        let definition = self.definitions.resolve::<E>()?;
        let selection = ItemSelection::<E>::unique(&definition, item)?;
        self.save_where(item, &selection).await
    }

    /// Like [`save`](Self::save), looking up the existing row with `selection`.
    ///
    /// The first matching row is merged and updated through its own key, no row
    /// matching inserts `item`.
    pub async fn save_where<E: Entity>(
        &mut self,
        item: &E,
        selection: &ItemSelection<E>,
    ) -> RepositoryResult<E> {
        self.ensure_usable()?;
        let definition = self.definitions.resolve::<E>()?;
        let incoming = ItemSelection::<E>::values_of(&definition, item)?;
        let existing = self
            .load(&definition, selection.criteria(), true)
            .await?
            .into_iter()
            .next();
        let Some(existing) = existing else {
            let values = self.insert_values(&definition, incoming).await?;
            self.invalidate(&definition);
            self.refresh::<E>(&definition, &values)?;
            return self.decode(Operation::Save, values);
        };
        let merged = merge_values(&definition, &existing, &incoming);
        let saved = self.decode(Operation::Save, merged.clone())?;
        if persisted_equal(&definition, &existing, &merged) {
            log::trace!("`{}` is unchanged, skipping the update", definition.type_name());
            self.refresh::<E>(&definition, &merged)?;
            return Ok(saved);
        }
        let selection = ItemSelection::<E>::unique_values(&definition, &existing);
        let statement =
            self.writer
                .compile_update(&definition, selection.criteria(), &merged, None)?;
        let item = Some(item_of(&definition, &merged));
        self.execute_statement(Operation::Save, statement, item).await?;
        self.invalidate(&definition);
        self.refresh::<E>(&definition, &merged)?;
        Ok(saved)
    }

    pub async fn start_transaction(&mut self, isolation: Option<IsolationLevel>) -> RepositoryResult<()> {
        self.ensure_usable()?;
        if self.state == ProviderState::TransactionOpen {
            return Err(UsageError::NestedTransaction.into());
        }
        let result = self.connection()?.begin(isolation).await;
        match result {
            Ok(()) => {
                self.state = ProviderState::TransactionOpen;
                Ok(())
            }
            Err(e) => Err(self.translate(Operation::Begin, "transaction", e)),
        }
    }

    pub async fn commit(&mut self) -> RepositoryResult<()> {
        self.ensure_usable()?;
        if self.state != ProviderState::TransactionOpen {
            return Err(UsageError::NoTransaction.into());
        }
        let result = self.connection()?.commit().await;
        match result {
            Ok(()) => {
                self.state = ProviderState::Committed;
                Ok(())
            }
            Err(e) => {
                self.state = ProviderState::CommitFailed;
                Err(self.translate(Operation::Commit, "transaction", e))
            }
        }
    }

    /// Rolls back the open transaction. Outside a transaction, after a commit or
    /// when repeated it does nothing.
    pub async fn rollback(&mut self) -> RepositoryResult<()> {
        self.ensure_usable()?;
        match self.state {
            ProviderState::TransactionOpen => {
                let result = self.connection()?.rollback().await;
                self.state = ProviderState::RolledBack;
                result.map_err(|e| self.translate(Operation::Rollback, "transaction", e))
            }
            ProviderState::CommitFailed => {
                let result = self.connection()?.rollback().await;
                self.state = ProviderState::RolledBack;
                if let Err(e) = result {
                    log::warn!("Rollback after a failed commit did not complete: {:#}", e);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Rolls back an open transaction and releases the connection.
    pub async fn dispose(&mut self) -> RepositoryResult<()> {
        if self.is_disposed() {
            return Ok(());
        }
        let transaction = matches!(
            self.state,
            ProviderState::TransactionOpen | ProviderState::CommitFailed
        );
        self.state = ProviderState::Disposed;
        let Some(mut connection) = self.connection.take() else {
            return Ok(());
        };
        if transaction && let Err(e) = connection.rollback().await {
            log::warn!("Rollback while disposing the provider failed: {:#}", e);
        }
        match connection.disconnect().await {
            Ok(()) => Ok(()),
            Err(e) => Err(self.translate(Operation::Dispose, "connection", e)),
        }
    }

    /// Runs a statement as is and returns the rows it affected.
    pub async fn execute_raw(
        &mut self,
        statement: impl Into<CompiledStatement>,
    ) -> RepositoryResult<RowsAffected> {
        self.ensure_usable()?;
        self.execute_statement(Operation::Raw, statement.into(), None)
            .await
    }

    /// Runs a statement as is, its rows must conform to `shape`.
    pub async fn query_rows(
        &mut self,
        statement: impl Into<CompiledStatement>,
        shape: &RowShape,
    ) -> RepositoryResult<Vec<StructuredRow>> {
        self.ensure_usable()?;
        let rows = self
            .fetch_rows(Operation::Raw, statement.into(), false, None)
            .await?;
        rows.iter()
            .map(|row| shape.conform(row).map_err(Into::into))
            .collect()
    }

    /// First column of the first row.
    pub async fn scalar<V: AsValue + Send>(
        &mut self,
        statement: impl Into<CompiledStatement>,
    ) -> RepositoryResult<Option<V>> {
        self.ensure_usable()?;
        let statement = statement.into();
        log::debug!("{}", statement);
        let target = statement.to_string();
        let result = self.connection()?.scalar::<V>(statement).await;
        result.map_err(|e| self.translate(Operation::Raw, target, e))
    }

    /// Runs a bulk insert and returns the number of rows it affected.
    pub async fn execute_structured<R: Entity>(
        &mut self,
        command: &StructuredCommand<'_, R>,
    ) -> RepositoryResult<u64> {
        self.ensure_usable()?;
        if command.is_empty() {
            return Ok(0);
        }
        let (statement, _) = command.compile(&self.definitions, self.writer.as_dyn(), false)?;
        let affected = if command.has_returning() {
            let rows = self
                .fetch_rows(Operation::Structured, statement, false, None)
                .await?;
            rows.len() as u64
        } else {
            self.execute_statement(Operation::Structured, statement, None)
                .await?
                .rows_affected
        };
        self.invalidate_target(command)?;
        Ok(affected)
    }

    /// Runs a bulk insert and returns the rows of its `RETURNING` clause, every
    /// target column when none was requested.
    pub async fn execute_structured_for_results<R: Entity>(
        &mut self,
        command: &StructuredCommand<'_, R>,
    ) -> RepositoryResult<Vec<StructuredRow>> {
        self.ensure_usable()?;
        if command.is_empty() {
            return Ok(Vec::new());
        }
        let (statement, shape) = command.compile(&self.definitions, self.writer.as_dyn(), true)?;
        let rows = self
            .fetch_rows(Operation::Structured, statement, false, None)
            .await?;
        self.invalidate_target(command)?;
        rows.iter()
            .map(|row| shape.conform(row).map_err(Into::into))
            .collect()
    }

    /// Like [`execute_structured_for_results`](Self::execute_structured_for_results),
    /// mapping the returned rows onto the target entity `T`.
    pub async fn execute_structured_for_entities<R: Entity, T: Entity>(
        &mut self,
        command: &StructuredCommand<'_, R>,
    ) -> RepositoryResult<Vec<T>> {
        self.ensure_usable()?;
        let definition = self.definitions.resolve::<T>()?;
        let target = command.target_descriptor()().type_name;
        if definition.type_name() != target {
            return Err(UsageError::SelectionMismatch(format!(
                "the command inserts into `{}`, not `{}`",
                target,
                definition.type_name()
            ))
            .into());
        }
        let rows = self.execute_structured_for_results(command).await?;
        rows.into_iter()
            .map(|row| {
                let mut values: Vec<Value> =
                    definition.attributes.iter().map(|v| v.value.as_null()).collect();
                let names = row.names().to_vec();
                for (name, value) in names.iter().zip(row.into_values()) {
                    if let Some(attribute) = definition
                        .direct_attributes()
                        .find(|v| v.reference_name() == name)
                    {
                        values[attribute.ordinal] = value;
                    }
                }
                self.decode(Operation::Structured, values)
            })
            .collect()
    }

    fn invalidate_target<R: Entity>(&self, command: &StructuredCommand<'_, R>) -> RepositoryResult<()> {
        if self.options.caching {
            let target = self
                .definitions
                .resolve_descriptor(command.target_descriptor()())?;
            self.cache.invalidate(target.type_name());
        }
        Ok(())
    }
}

impl<C: Connection> Drop for RepositoryProvider<C> {
    fn drop(&mut self) {
        if self.connection.is_some() && self.state == ProviderState::TransactionOpen {
            log::warn!("Provider dropped with an open transaction, the connection is released without commit");
        }
    }
}

/// Cache signature: the statement plus whether only the first row was read.
fn cache_signature(statement: &CompiledStatement, first: bool) -> String {
    let mut signature = statement.signature();
    signature.push_str(if first { "#first" } else { "#all" });
    signature
}

/// Slots of `definition` filled from a row listing the `selected` columns in order.
fn slots_of(
    definition: &EntityDefinition,
    selected: &[&EntityAttributeDefinition],
    row: RowLabeled,
) -> Vec<Value> {
    let mut values: Vec<Value> = definition
        .attributes
        .iter()
        .map(|v| v.value.as_null())
        .collect();
    for (attribute, value) in selected.iter().zip(row.values.into_vec()) {
        values[attribute.ordinal] = value.clone().converted_like(&attribute.value).unwrap_or(value);
    }
    values
}

/// Persisted columns of an item by column name, attached to execution errors.
fn item_of(definition: &EntityDefinition, values: &[Value]) -> serde_json::Value {
    definition
        .direct_attributes()
        .map(|v| (v.reference_name().to_string(), values[v.ordinal].to_json()))
        .collect::<serde_json::Map<_, _>>()
        .into()
}

/// Existing row with the non default persisted columns of `incoming` applied.
/// Keys, relations and unmapped slots stay as stored.
pub fn merge_values(definition: &EntityDefinition, existing: &[Value], incoming: &[Value]) -> Vec<Value> {
    let mut merged = existing.to_vec();
    for attribute in definition.updatable() {
        let value = &incoming[attribute.ordinal];
        if !value.is_default() {
            merged[attribute.ordinal] = value.clone();
        }
    }
    merged
}

/// Whether the persisted direct columns hold the same values.
pub fn persisted_equal(definition: &EntityDefinition, a: &[Value], b: &[Value]) -> bool {
    definition
        .direct_attributes()
        .all(|v| a[v.ordinal] == b[v.ordinal])
}
