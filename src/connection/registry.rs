//! Registry of live connections.
//!
//! # Locking
//!
//! The id → connection map sits behind a `parking_lot::Mutex` that is only held
//! for map lookups, inserts and removals, never across an await point. Each
//! connection sits behind its own `tokio::sync::Mutex`; every operation on the
//! connection (query, stream, close) holds that lock for its whole duration,
//! so at most one operation is in flight per connection. A close queued behind
//! a running query waits for it. A waiter that acquires a connection which was
//! closed meanwhile observes `ConnectionNotFound`.

use crate::connection::params::ConnectionParams;
use crate::error::{ConnectionError, DriverError, RegistryError};
use crate::id::IdGenerator;
use crate::transport::{EngineConnector, EngineSession};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as TokioMutex, OwnedMutexGuard};

/// A connection as stored in the registry.
pub struct LiveConnection {
    id: String,
    account: String,
    session: Option<Box<dyn EngineSession>>,
}

type ConnectionSlot = Arc<TokioMutex<LiveConnection>>;

/// Exclusive access to one live connection.
///
/// Holding the guard keeps every other operation on the same connection
/// waiting.
pub struct ConnectionGuard {
    slot: ConnectionSlot,
    guard: OwnedMutexGuard<LiveConnection>,
}

impl ConnectionGuard {
    /// Connection id.
    pub fn id(&self) -> &str {
        &self.guard.id
    }

    /// Account the connection was opened against.
    pub fn account(&self) -> &str {
        &self.guard.account
    }

    /// The engine session.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionNotFound` if the connection has been closed.
    pub fn session(&mut self) -> Result<&mut (dyn EngineSession + 'static), RegistryError> {
        let connection_id = self.guard.id.clone();
        self.guard
            .session
            .as_deref_mut()
            .ok_or(RegistryError::ConnectionNotFound { connection_id })
    }
}

impl std::fmt::Debug for ConnectionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionGuard")
            .field("id", &self.guard.id)
            .field("account", &self.guard.account)
            .finish()
    }
}

/// Owner of every live connection.
pub struct ConnectionRegistry {
    connector: Arc<dyn EngineConnector>,
    connections: Mutex<HashMap<String, ConnectionSlot>>,
    ids: IdGenerator,
}

impl ConnectionRegistry {
    /// Create an empty registry opening sessions through `connector`.
    pub fn new(connector: Arc<dyn EngineConnector>) -> Self {
        Self {
            connector,
            connections: Mutex::new(HashMap::new()),
            ids: IdGenerator::new(),
        }
    }

    /// Use a specific identifier generator.
    pub fn with_id_generator(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    /// Open a session and register it.
    ///
    /// # Returns
    ///
    /// The new connection id.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError::ConnectionFailed` with the engine status if
    /// the engine refuses the session.
    pub async fn connect(&self, params: &ConnectionParams) -> Result<String, DriverError> {
        tracing::trace!(
            account = %params.account,
            username = %params.username,
            database = %params.database,
            schema = %params.schema,
            warehouse = %params.warehouse,
            "Opening connection"
        );

        let session = self.connector.connect(params).await.map_err(|source| {
            tracing::error!(
                account = %params.account,
                code = source.code,
                message = %source.message,
                "Connect failed"
            );
            ConnectionError::ConnectionFailed {
                account: params.account.clone(),
                source,
            }
        })?;

        let inserted = {
            let mut connections = self.connections.lock();
            let generated = self
                .ids
                .generate_unique(|candidate| connections.contains_key(candidate));
            match generated {
                Ok(id) => {
                    let live = LiveConnection {
                        id: id.clone(),
                        account: params.account.clone(),
                        session: Some(session),
                    };
                    connections.insert(id.clone(), Arc::new(TokioMutex::new(live)));
                    Ok(id)
                }
                Err(e) => Err((e, session)),
            }
        };

        match inserted {
            Ok(id) => {
                tracing::debug!(connection_id = %id, "Connection registered");
                Ok(id)
            }
            Err((e, mut session)) => {
                if let Err(term) = session.terminate().await {
                    tracing::warn!(code = term.code, message = %term.message, "Session release failed");
                }
                Err(e.into())
            }
        }
    }

    /// Wait for exclusive access to a connection.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionNotFound` if the id is unknown or the connection was
    /// closed while waiting.
    pub async fn acquire(&self, connection_id: &str) -> Result<ConnectionGuard, RegistryError> {
        let slot = self
            .connections
            .lock()
            .get(connection_id)
            .cloned()
            .ok_or_else(|| RegistryError::ConnectionNotFound {
                connection_id: connection_id.to_string(),
            })?;

        let guard = Arc::clone(&slot).lock_owned().await;
        if guard.session.is_none() {
            return Err(RegistryError::ConnectionNotFound {
                connection_id: connection_id.to_string(),
            });
        }
        Ok(ConnectionGuard { slot, guard })
    }

    /// Close a connection.
    ///
    /// Waits for any in-flight operation on the connection to finish first.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionNotFound` for an unknown id, including a second
    /// close of the same id.
    pub async fn close(&self, connection_id: &str) -> Result<(), DriverError> {
        let guard = self.acquire(connection_id).await?;
        self.close_acquired(guard).await
    }

    /// Close a connection the caller already holds.
    ///
    /// The entry is removed even if the engine reports a failure while
    /// terminating the session.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError::TerminateFailed` with the engine status.
    pub async fn close_acquired(&self, mut guard: ConnectionGuard) -> Result<(), DriverError> {
        let id = guard.guard.id.clone();
        let session = guard.guard.session.take();
        {
            let mut connections = self.connections.lock();
            if connections
                .get(&id)
                .is_some_and(|slot| Arc::ptr_eq(slot, &guard.slot))
            {
                connections.remove(&id);
            }
        }

        let Some(mut session) = session else {
            return Err(RegistryError::ConnectionNotFound { connection_id: id }.into());
        };
        drop(guard);

        let status = session.terminate().await;
        tracing::trace!(connection_id = %id, ok = status.is_ok(), "Connection terminated");
        status.map_err(|source| {
            ConnectionError::TerminateFailed {
                connection_id: id,
                source,
            }
            .into()
        })
    }

    /// Check if a connection id is registered.
    pub fn contains(&self, connection_id: &str) -> bool {
        self.connections.lock().contains_key(connection_id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    /// Check if no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of all registered connections.
    pub fn connection_ids(&self) -> Vec<String> {
        self.connections.lock().keys().cloned().collect()
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("connections", &self.len())
            .field("ids", &self.ids)
            .finish()
    }
}
