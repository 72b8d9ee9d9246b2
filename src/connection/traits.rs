//! Connector and connection traits.

use std::time::Duration;

use crate::ConnectionDescriptor;

/// Physical connections open at once, idle ones included.
pub const MAX_OPEN_CONNECTIONS: u32 = 1;

/// Maximum lifetime of a physical connection.
pub const CONNECTION_MAX_LIFETIME: Duration = Duration::from_secs(60);

/// A live handle to the monitored target.
///
/// The handle is shared by every scraper of a cycle, so implementations must
/// tolerate concurrent use. Implementations bounded to a single physical
/// connection serialize concurrent callers; each call must hold the physical
/// connection only for its own duration.
#[async_trait::async_trait]
pub trait Connection: Send + Sync + 'static {
    /// Liveness check.
    async fn ping(&self) -> Result<(), sqlx::Error>;

    /// Run `sql` and return the first column of the first row as text.
    async fn query_scalar(&self, sql: &str) -> Result<String, sqlx::Error>;

    /// Close the handle and every physical connection behind it.
    async fn close(&self);
}

/// Opens [`Connection`]s from a descriptor.
///
/// `open` may be lazy; the manager always pings before handing out a handle.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Connection type produced by this connector.
    type Conn: Connection;

    /// Open a handle limited to [`MAX_OPEN_CONNECTIONS`] physical connections.
    async fn open(&self, descriptor: &ConnectionDescriptor) -> Result<Self::Conn, sqlx::Error>;
}
