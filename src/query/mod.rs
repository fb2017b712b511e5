//! Query execution and result handling.
//!
//! # Overview
//!
//! The query module is organized into:
//! - `options` - Result format selection and per-call deadlines
//! - `executor` - The shared prelude, the buffered, handler and detached modes, and
//!   the deadline applied to each engine call
//! - `stream` - Row streams fed by a producer task over a bounded channel
//! - `cursor` - Detached statements drained page by page
//!
//! # Example
//!
//! ```no_run
//! use snowcursor_rs::query::{QueryOptions, ResultFormat};
//! use snowcursor_rs::Driver;
//!
//! # async fn example(driver: &Driver, connection_id: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let options = QueryOptions::new().result_format(ResultFormat::Json);
//!
//! // Detach the statement and drain it in pages
//! let statement_id = driver
//!     .execute_query_detached(connection_id, "SELECT * FROM ORDERS", &options)
//!     .await?;
//! loop {
//!     let page = driver.fetch_next_rows(connection_id, &statement_id, 500).await?;
//!     println!("Page rows: {}", page.rows.len());
//!     if page.end {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod cursor;
pub mod executor;
pub mod options;
pub mod stream;

// Re-export commonly used types
pub use cursor::{Page, RunningStatementKey, StatementRegistry};
pub use executor::{PreparedQuery, QueryDeadline, QueryExecutor};
pub use options::{FetchOptions, QueryOptions, ResultFormat};
pub use stream::RowStream;
