//! Session store, controller and conversation exchange for chatline.
//!
//! Provides:
//! - `SessionStore` - Durable sessions plus the current-session pointer
//! - `SessionController` - List, create, select and delete sessions
//! - `ConversationExchange` - One request/response round trip at a time
//! - `Settings` - API key and model selection
//! - `ExternalWatch` - Relay of changes made by other contexts
//! - Storage implementations (memory, file)

pub mod controller;
pub mod exchange;
pub mod settings;
pub mod storage;
pub mod store;
pub mod watch;

pub use controller::{SessionController, WELCOME_MESSAGE};
pub use exchange::{
    ConversationExchange, ExchangeOptions, ExchangeState, Notice, NoticeKind, SendOutcome,
};
pub use settings::Settings;
pub use store::{SessionLookup, SessionStore, StoreError, StoreSnapshot};
pub use watch::{DEFAULT_WATCH_PERIOD, ExternalWatch};
