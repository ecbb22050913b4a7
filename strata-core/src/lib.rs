mod as_value;
mod bulk;
mod connection;
mod driver;
mod entity;
mod error;
mod executor;
mod metadata;
mod query;
mod repository;
mod row;
mod selection;
mod util;
mod value;
pub mod writer;

pub use ::anyhow::Context;
pub use as_value::*;
pub use bulk::*;
pub use connection::*;
pub use driver::*;
pub use entity::*;
pub use error::*;
pub use executor::*;
pub use metadata::*;
pub use query::*;
pub use repository::*;
pub use row::*;
pub use selection::*;
pub use util::*;
pub use value::*;
pub use writer::{GenericSqlWriter, PostgresSqlWriter, SqlWriter, joined_locations, selected_attributes};
pub mod stream {
    pub use ::futures::stream::*;
}
pub use ::futures::future;

pub type Result<T> = anyhow::Result<T>;
pub type Error = anyhow::Error;
