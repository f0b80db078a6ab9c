// strata-api: Async Rust client for the Strata portal API (REST + change feed)

pub mod client;
pub mod error;
pub mod feed;
pub mod transport;
pub mod types;

pub use client::PortalClient;
pub use error::Error;
pub use feed::{ChangeAction, ChangeEvent, ChangeFeedHandle, ChangeKind, FeedMessage, ReconnectConfig};
pub use transport::{TlsMode, TransportConfig};
pub use types::{
    ActiveAdministrator, AdministratorRecord, NotificationPatch, NotificationRecord, Page,
    PageQuery,
};
