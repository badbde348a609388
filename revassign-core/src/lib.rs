pub mod error;
pub mod model;
pub mod selector;

pub use error::ErrorKind;
pub use model::*;
pub use selector::{Candidate, ReviewerSelector};
