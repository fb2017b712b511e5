//! Engine API layer.
//!
//! This module provides the abstraction over the warehouse engine that the
//! rest of the crate talks to, plus an in-memory implementation.
//!
//! # Architecture
//!
//! The transport layer is organized into:
//! - `protocol` - Engine connector, session and statement traits
//! - `messages` - Column descriptors, engine rows and fetch outcomes
//! - `memory` - In-process engine used by tests and demos
//!
//! # Example
//!
//! ```
//! use snowcursor_rs::connection::ConnectionParams;
//! use snowcursor_rs::transport::{EngineConnector, FetchOutcome, MemoryEngine};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = MemoryEngine::new();
//! let params = ConnectionParams::builder()
//!     .username("loader")
//!     .password("secret")
//!     .account("acme")
//!     .database("ANALYTICS")
//!     .schema("PUBLIC")
//!     .warehouse("COMPUTE_WH")
//!     .build()?;
//!
//! let mut session = engine.connect(&params).await?;
//! let mut statement = session.create_statement().await?;
//! statement.query("SELECT 1").await?;
//! while let FetchOutcome::Row(row) = statement.fetch().await {
//!     println!("{row:?}");
//! }
//! statement.terminate().await?;
//! session.terminate().await?;
//! # Ok(())
//! # }
//! ```

pub mod memory;
pub mod messages;
pub mod protocol;

pub use memory::{MemoryEngine, MemoryTable};
pub use messages::{ColumnDescriptor, EngineRow, FetchOutcome, NativeType};
pub use protocol::{EngineConnector, EngineSession, EngineStatement};
