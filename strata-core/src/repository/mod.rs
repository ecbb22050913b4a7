mod cache;
mod options;
mod provider;

pub use cache::*;
pub use options::*;
pub use provider::*;
