mod definition;
mod descriptor;
mod resolver;

pub use definition::*;
pub use descriptor::*;
pub use resolver::*;
