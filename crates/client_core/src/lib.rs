pub mod error;
pub mod fetch;
pub mod field;
pub mod form;
pub mod infinite;
pub mod multi_step;
pub mod paginated;
pub mod polling;
pub mod state;

pub use error::{guarded, guarded_with, handle_error, handle_error_with, log_error, ErrorReport};
pub use fetch::{DataFetchController, FetchOptions};
pub use field::{FieldState, FormFieldController};
pub use form::{FieldProps, FormBuilder, FormController, FormState, SubmitOutcome};
pub use infinite::{InfiniteScrollController, VisibilityEntry};
pub use multi_step::{MultiStepFormController, MultiStepState};
pub use paginated::{PaginatedFetchController, PaginationOptions};
pub use polling::{PollingController, PollingOptions};
pub use state::{Dependency, FetchPhase, FetchState, PageState};
