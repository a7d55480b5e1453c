//! External service integrations.

pub mod ml_client {
    pub use crate::ml_client::*;
}

pub mod db_storage {
    pub use crate::db_storage::*;
}
