//! Per-cycle connection acquisition and release.

use std::fmt;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::ConnectionDescriptor;
use crate::connection::{Connection, Connector, MAX_OPEN_CONNECTIONS};
use crate::error::ExporterError;

/// Opens and validates the single connection of a cycle.
///
/// Cycles sharing a manager are serialized: a second `acquire` waits until
/// the previous lease is released, so at most one connection is open.
pub struct ConnectionManager<K: Connector> {
    connector: K,
    descriptor: ConnectionDescriptor,
    target: String,
    slot: Arc<Semaphore>,
}

impl<K: Connector> fmt::Debug for ConnectionManager<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("target", &self.target)
            .field("in_use", &(self.slot.available_permits() == 0))
            .finish_non_exhaustive()
    }
}

impl<K: Connector> ConnectionManager<K> {
    pub fn new(connector: K, descriptor: ConnectionDescriptor) -> Self {
        let target = descriptor.target();
        Self {
            connector,
            descriptor,
            target,
            slot: Arc::new(Semaphore::new(MAX_OPEN_CONNECTIONS as usize)),
        }
    }

    /// Target address (`host:port`), safe to log.
    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn descriptor(&self) -> &ConnectionDescriptor {
        &self.descriptor
    }

    /// Wait for the connection slot, open the connection and ping it.
    ///
    /// On any failure after the open, the connection is closed before the
    /// error is returned.
    pub async fn acquire(
        &self,
        token: &CancellationToken,
    ) -> Result<ConnectionLease<K::Conn>, ExporterError> {
        let permit = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            permit = Arc::clone(&self.slot).acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            return Err(ExporterError::Cancelled {
                target: self.target.clone(),
            });
        };

        let conn = tokio::select! {
            biased;
            _ = token.cancelled() => {
                return Err(ExporterError::Cancelled { target: self.target.clone() });
            }
            opened = self.connector.open(&self.descriptor) => {
                opened.map_err(|source| ExporterError::Connect {
                    target: self.target.clone(),
                    source,
                })?
            }
        };

        let lease = ConnectionLease::new(Arc::new(conn), permit);
        let pinged = tokio::select! {
            biased;
            _ = token.cancelled() => Err(None),
            pinged = lease.connection().ping() => pinged.map_err(Some),
        };

        match pinged {
            Ok(()) => {
                tracing::debug!(addr = %self.target, "Connection established");
                Ok(lease)
            }
            Err(source) => {
                lease.release().await;
                Err(match source {
                    Some(source) => ExporterError::Ping {
                        target: self.target.clone(),
                        source,
                    },
                    None => ExporterError::Cancelled {
                        target: self.target.clone(),
                    },
                })
            }
        }
    }
}

/// Scoped ownership of a cycle's connection.
///
/// [`release`](Self::release) closes the connection. A lease dropped without
/// release schedules the close on the current runtime. The connection slot is
/// held until the close has finished.
pub struct ConnectionLease<C: Connection> {
    conn: Arc<C>,
    permit: Option<OwnedSemaphorePermit>,
    released: bool,
}

impl<C: Connection> ConnectionLease<C> {
    fn new(conn: Arc<C>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            conn,
            permit: Some(permit),
            released: false,
        }
    }

    /// Shared handle for scrapers.
    pub fn connection(&self) -> &Arc<C> {
        &self.conn
    }

    /// Close the connection and free the slot.
    pub async fn release(mut self) {
        self.conn.close().await;
        self.released = true;
        self.permit.take();
        tracing::debug!("Connection released");
    }
}

impl<C: Connection> Drop for ConnectionLease<C> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let conn = Arc::clone(&self.conn);
        let permit = self.permit.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    conn.close().await;
                    drop(permit);
                });
            }
            Err(_) => {
                tracing::warn!("Connection lease dropped outside a runtime, closing skipped");
            }
        }
    }
}

impl<C: Connection> fmt::Debug for ConnectionLease<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionLease")
            .field("released", &self.released)
            .finish()
    }
}
