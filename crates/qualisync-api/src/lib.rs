// qualisync-api: async client for the qualisync backend
// (REST query interface + websocket change feed)

pub mod changefeed;
pub mod error;
pub mod record;
pub mod rest;
pub mod transport;

pub use changefeed::{ChangeEvent, ChangeFeed, ChangeOp, ReconnectConfig};
pub use error::Error;
pub use record::{Record, RecordId};
pub use rest::RestClient;
pub use transport::{TlsMode, TransportConfig};
