use crate::{
    AsValue, CompiledStatement, Driver, Error, QueryResult, Result, RowLabeled, RowsAffected,
    stream::{Stream, StreamExt, TryStreamExt},
};
use std::future::Future;

pub trait Executor: Send + Sized {
    type Driver: Driver;

    fn driver(&self) -> &Self::Driver;

    /// General method to send any statement and return any result type (either row or count)
    fn run(
        &mut self,
        statement: CompiledStatement,
    ) -> impl Stream<Item = Result<QueryResult>> + Send;

    /// Execute the statement and returns the rows.
    fn fetch(
        &mut self,
        statement: CompiledStatement,
    ) -> impl Stream<Item = Result<RowLabeled>> + Send {
        self.run(statement).filter_map(|v| async move {
            match v {
                Ok(QueryResult::Row(v)) => Some(Ok(v)),
                Err(e) => Some(Err(e)),
                _ => None,
            }
        })
    }

    /// Execute the statement and return the total number of rows affected.
    fn execute(
        &mut self,
        statement: CompiledStatement,
    ) -> impl Future<Output = Result<RowsAffected>> + Send {
        self.run(statement)
            .filter_map(|v| async move {
                match v {
                    Ok(QueryResult::Affected(v)) => Some(Ok(v)),
                    Err(e) => Some(Err(e)),
                    _ => None,
                }
            })
            .try_collect()
    }

    /// First column of the first row, `None` when the statement returns no row.
    fn scalar<V: AsValue + Send>(
        &mut self,
        statement: CompiledStatement,
    ) -> impl Future<Output = Result<Option<V>>> + Send {
        async move {
            let stream = self.fetch(statement);
            let mut stream = std::pin::pin!(stream);
            let Some(row) = stream.try_next().await? else {
                return Ok(None);
            };
            let value = row
                .values
                .into_vec()
                .into_iter()
                .next()
                .ok_or_else(|| Error::msg("The statement returned a row without columns"))?;
            V::try_from_value(value).map(Some)
        }
    }
}
