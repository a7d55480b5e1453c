// Domain-layer modules and shared errors/models
pub mod classifier {
    pub use crate::classifier::*;
}

pub mod identity {
    pub use crate::identity::*;
}

pub mod ingest {
    pub use crate::ingest::*;
}

pub mod models {
    pub use crate::models::*;
}

pub mod personalization {
    pub use crate::personalization::*;
}

pub mod scoring {
    pub use crate::scoring::*;
}

pub mod errors {
    pub use crate::errors::*;
}
