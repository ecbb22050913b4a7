use crate::{Driver, Executor, Result, SqlWriter};
use std::future::Future;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// A live session with a backend. Transactions are local to the connection.
pub trait Connection: Executor {
    /// Establish a connection to the given URL
    fn connect(url: &str) -> impl Future<Output = Result<Self>> + Send;

    fn begin(
        &mut self,
        isolation: Option<IsolationLevel>,
    ) -> impl Future<Output = Result<()>> + Send {
        async move {
            let statement = self.driver().sql_writer().compile_begin(isolation);
            self.execute(statement).await.map(|_| ())
        }
    }

    fn commit(&mut self) -> impl Future<Output = Result<()>> + Send {
        async move {
            let statement = self.driver().sql_writer().compile_commit();
            self.execute(statement).await.map(|_| ())
        }
    }

    fn rollback(&mut self) -> impl Future<Output = Result<()>> + Send {
        async move {
            let statement = self.driver().sql_writer().compile_rollback();
            self.execute(statement).await.map(|_| ())
        }
    }

    /// Release the session, the connection is not used afterwards.
    fn disconnect(self) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}
