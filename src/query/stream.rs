//! Channel-backed row streams.
//!
//! A [`RowStream`] is fed by a producer task that owns the statement and the
//! connection guard. Rows flow through a bounded channel, so the producer
//! waits while the consumer is behind. Dropping the stream closes the
//! channel; the producer notices, releases the statement and lets go of the
//! connection.

use crate::connection::ConnectionGuard;
use crate::error::DriverError;
use crate::query::executor::{PreparedQuery, QueryExecutor};
use crate::transport::protocol::release_statement;
use crate::transport::ColumnDescriptor;
use crate::types::Row;
use futures_util::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// A lazy, finite stream of rows from one query.
///
/// Yields `Ok(row)` in engine order, at most one `Err` (after which the
/// stream ends), and then `None`. It cannot be restarted.
///
/// # Example
///
/// ```no_run
/// # use snowcursor_rs::Driver;
/// # use snowcursor_rs::query::QueryOptions;
/// # use futures_util::StreamExt;
/// # async fn example(driver: &Driver, connection_id: &str) -> Result<(), Box<dyn std::error::Error>> {
/// let mut rows = driver
///     .execute_query_stream(connection_id, "SELECT * FROM ORDERS", &QueryOptions::new())
///     .await?;
/// while let Some(row) = rows.next().await {
///     println!("{:?}", row?);
/// }
/// # Ok(())
/// # }
/// ```
pub struct RowStream {
    columns: Vec<ColumnDescriptor>,
    receiver: mpsc::Receiver<Result<Row, DriverError>>,
}

impl RowStream {
    /// Start a producer draining `prepared` into a channel of `buffer` rows.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn spawn(
        connection: ConnectionGuard,
        prepared: PreparedQuery,
        executor: QueryExecutor,
        buffer: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let columns = prepared.columns.clone();
        tokio::spawn(produce(connection, prepared, executor, sender));
        Self { columns, receiver }
    }

    /// Column descriptors of the query.
    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// Stop the producer and release the statement.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Stream for RowStream {
    type Item = Result<Row, DriverError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl std::fmt::Debug for RowStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("columns", &self.columns)
            .finish()
    }
}

async fn produce(
    connection: ConnectionGuard,
    prepared: PreparedQuery,
    executor: QueryExecutor,
    sender: mpsc::Sender<Result<Row, DriverError>>,
) {
    let PreparedQuery {
        mut statement,
        columns,
    } = prepared;
    let mut delivered = 0usize;

    loop {
        let next = tokio::select! {
            _ = sender.closed() => None,
            next = executor.next_row(statement.as_mut(), &columns, delivered) => Some(next),
        };

        let item = match next {
            None => {
                tracing::debug!(
                    connection_id = connection.id(),
                    rows = delivered,
                    "Row stream dropped by consumer"
                );
                break;
            }
            Some(Ok(None)) => break,
            Some(Ok(Some(row))) => Ok(row),
            Some(Err(e)) => Err(e),
        };

        let failed = item.is_err();
        if sender.send(item).await.is_err() || failed {
            break;
        }
        delivered += 1;
    }

    release_statement(statement.as_mut()).await;
    tracing::trace!(connection_id = connection.id(), rows = delivered, "Row stream finished");
    drop(connection);
}
