//! # Livedev Clients
//!
//! Remote client kinds (browsers and similar targets), the sessions opened
//! against them and the per-language updaters that push document output
//! into a session.
//!
//! ```text
//! ClientRegistry
//!     ├─ Client "chrome" ── connect(transport) ──> Session
//!     │      └─ updaters: less -> [StyleUpdater]
//!     └─ SessionEvent::{Connected, Disconnected} (broadcast)
//! ```

mod descriptor;
mod error;
mod registry;
mod session;
mod validation;

pub use descriptor::{ClientDescriptor, DocumentUpdate, SessionInitializer, UpdateError, Updater};
pub use error::{ClientError, Result, ValidationError};
pub use registry::{Client, ClientRegistry, DefinitionReport, DEFAULT_CLIENTS_JSON};
pub use session::{Session, SessionEvent, SessionId};
pub use validation::{validate_client_id, validate_client_name, validate_non_empty};
