pub mod facts;
pub mod package;
pub mod pipeline;
pub mod request;
pub mod validation;

pub use facts::*;
pub use package::*;
pub use pipeline::*;
pub use request::*;
pub use validation::*;
