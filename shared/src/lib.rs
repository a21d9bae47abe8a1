mod error;
mod query;
mod report;
mod window;

pub use error::QueryError;
pub use query::*;
pub use report::*;
pub use window::TimeWindow;
