use crate::{Connection, SqlWriter};

/// A backend: its name and the dialect its connections speak.
pub trait Driver: Send + Sync {
    type Connection: Connection;
    type SqlWriter: SqlWriter;

    const NAME: &'static str;

    fn sql_writer(&self) -> Self::SqlWriter;
}
