pub mod import;
pub mod query;

pub use import::{run_import, DocumentSource};
pub use query::{run_compile, run_delete, run_get, run_search};
