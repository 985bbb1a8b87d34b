pub mod domain;
pub mod error;
pub mod error_map;
pub mod protocol;
pub mod validation;

pub use domain::{EntityRecord, Fields, QueryOptions, RecordId};
pub use error::{RawError, StoreError, StoreResult};
pub use error_map::{ErrorCatalog, ErrorMapper};
pub use validation::{combine, Validator};
