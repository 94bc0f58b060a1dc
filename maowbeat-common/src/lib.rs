// maowbeat-common: shared models, collaborator traits and the error type.

pub mod error;
pub mod models;
pub mod traits;
