//! Connection layer.
//!
//! One bounded connection per scrape cycle: opened, pinged, shared by every
//! scraper of the cycle, then released.
//!
//! - [`Connector`] / [`Connection`]: seam between the cycle and the driver
//! - [`ConnectionManager`]: acquisition with liveness check and cancellation
//! - [`ConnectionLease`]: scoped ownership that always closes the connection
//! - [`MySqlConnector`] / [`MySqlHandle`]: sqlx implementation

mod manager;
mod mysql;
mod traits;

pub use manager::{ConnectionLease, ConnectionManager};
pub use mysql::{MySqlConnector, MySqlHandle, column_f64, column_text, parse_numeric};
pub use traits::{CONNECTION_MAX_LIFETIME, Connection, Connector, MAX_OPEN_CONNECTIONS};
