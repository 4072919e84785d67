// qualisync-core: staged data orchestration and reactive store between
// qualisync-api and consumers (CLI / embedding applications).

pub mod config;
pub mod error;
pub mod model;
pub mod options;
pub mod service;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{Actor, ServiceConfig, Session, TlsVerification};
pub use error::CoreError;
pub use model::{Collection, FetchSpec, Metric, OptionMapping, Wave};
pub use service::DataService;
pub use store::{CollectionState, DataStore, LoadPhase};

// Row and change-feed types at the crate root for ergonomics.
pub use qualisync_api::{ChangeEvent, ChangeOp, Record, RecordId};
