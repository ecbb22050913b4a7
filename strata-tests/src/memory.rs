use async_stream::try_stream;
use std::{
    marker::PhantomData,
    sync::{Arc, Mutex, PoisonError},
};
use strata_core::{
    BackendError, BackendErrorKind, CompiledStatement, Connection, Driver, Error, Executor,
    GenericSqlWriter, QueryResult, Result, RowLabeled, RowsAffected, SqlWriter, Value,
    stream::{Stream, TryStreamExt},
};

/// Answers a statement with the items its stream yields.
pub type Responder = Box<dyn FnMut(&CompiledStatement) -> Result<Vec<QueryResult>> + Send>;

#[derive(Default)]
struct Recorded {
    statements: Vec<CompiledStatement>,
    touches: usize,
    disconnected: bool,
}

/// Scripted backend shared by the connections it hands out.
///
/// Records every statement and every call reaching a connection, and answers
/// statements through a responder closure (an empty result by default).
#[derive(Clone)]
pub struct MemoryBackend {
    recorded: Arc<Mutex<Recorded>>,
    responder: Arc<Mutex<Responder>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            recorded: Default::default(),
            responder: Arc::new(Mutex::new(Box::new(|_| Ok(Vec::new())))),
        }
    }

    pub fn respond(
        &self,
        responder: impl FnMut(&CompiledStatement) -> Result<Vec<QueryResult>> + Send + 'static,
    ) -> &Self {
        *self
            .responder
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Box::new(responder);
        self
    }

    pub fn connection<W: SqlWriter + Default>(&self) -> MemoryConnection<W> {
        MemoryConnection {
            driver: MemoryDriver::default(),
            backend: self.clone(),
        }
    }

    fn record<T>(&self, f: impl FnOnce(&mut Recorded) -> T) -> T {
        f(&mut self.recorded.lock().unwrap_or_else(PoisonError::into_inner))
    }

    fn answer(&self, statement: CompiledStatement) -> Result<Vec<QueryResult>> {
        let mut responder = self.responder.lock().unwrap_or_else(PoisonError::into_inner);
        let result = (*responder)(&statement);
        drop(responder);
        self.record(|v| {
            v.touches += 1;
            v.statements.push(statement);
        });
        result
    }

    pub fn statements(&self) -> Vec<CompiledStatement> {
        self.record(|v| v.statements.clone())
    }

    /// Text of every statement run, in order.
    pub fn sql(&self) -> Vec<String> {
        self.record(|v| v.statements.iter().map(|s| s.sql.clone()).collect())
    }

    /// Number of statements starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.record(|v| {
            v.statements
                .iter()
                .filter(|s| s.sql.starts_with(prefix))
                .count()
        })
    }

    /// Calls that reached a connection: statements and disconnections.
    pub fn touches(&self) -> usize {
        self.record(|v| v.touches)
    }

    pub fn is_disconnected(&self) -> bool {
        self.record(|v| v.disconnected)
    }

    pub fn clear(&self) {
        self.record(|v| v.statements.clear());
    }
}

/// A row labeled with `names`.
pub fn row(names: &[&str], values: Vec<Value>) -> QueryResult {
    RowLabeled::new(
        names.iter().map(|v| v.to_string()).collect(),
        values.into(),
    )
    .into()
}

pub fn affected(rows_affected: u64) -> QueryResult {
    RowsAffected {
        rows_affected,
        last_affected_id: None,
    }
    .into()
}

pub fn affected_with_id(rows_affected: u64, id: i64) -> QueryResult {
    RowsAffected {
        rows_affected,
        last_affected_id: Some(id),
    }
    .into()
}

pub fn constraint_violation(message: &str) -> Error {
    Error::new(BackendError::new(BackendErrorKind::Constraint, message))
}

pub struct MemoryDriver<W = GenericSqlWriter>(PhantomData<fn() -> W>);

impl<W> Default for MemoryDriver<W> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<W: SqlWriter + Default> Driver for MemoryDriver<W> {
    type Connection = MemoryConnection<W>;
    type SqlWriter = W;

    const NAME: &'static str = "memory";

    fn sql_writer(&self) -> W {
        W::default()
    }
}

pub struct MemoryConnection<W = GenericSqlWriter> {
    driver: MemoryDriver<W>,
    backend: MemoryBackend,
}

impl<W> MemoryConnection<W> {
    pub fn backend(&self) -> &MemoryBackend {
        &self.backend
    }
}

impl<W: SqlWriter + Default> Executor for MemoryConnection<W> {
    type Driver = MemoryDriver<W>;

    fn driver(&self) -> &Self::Driver {
        &self.driver
    }

    fn run(
        &mut self,
        statement: CompiledStatement,
    ) -> impl Stream<Item = Result<QueryResult>> + Send {
        let context = format!("While running the statement:\n{}", statement);
        let results = self.backend.answer(statement);
        try_stream! {
            for item in results? {
                yield item;
            }
        }
        .map_err(move |e: Error| {
            let error = e.context(context.clone());
            log::error!("{:#}", error);
            error
        })
    }
}

impl<W: SqlWriter + Default> Connection for MemoryConnection<W> {
    /// Accepts `memory://` URLs, each connection gets a fresh backend.
    async fn connect(url: &str) -> Result<Self> {
        if !url.starts_with("memory://") {
            return Err(Error::new(BackendError::new(
                BackendErrorKind::Connectivity,
                format!("`{}` is not a memory url", url),
            )));
        }
        Ok(MemoryBackend::new().connection())
    }

    async fn disconnect(self) -> Result<()> {
        self.backend.record(|v| {
            v.touches += 1;
            v.disconnected = true;
        });
        Ok(())
    }
}
