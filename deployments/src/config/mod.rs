//! Pipeline configuration stored in repositories

pub mod definition;
pub mod resolver;
