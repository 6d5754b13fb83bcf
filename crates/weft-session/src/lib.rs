//! # Weft Session
//!
//! Keyed, expiring session state for weft chains.
//!
//! [`SessionMiddleware`] derives a key per update, loads the record from a
//! [`SessionStore`], binds a [`SessionHandle`] onto the context and saves
//! the record once the rest of the chain has succeeded. Handlers reach it
//! through [`SessionContextExt`]:
//!
//! ```rust,ignore
//! use weft_session::{SessionContextExt, SessionMiddleware};
//!
//! bot.push(SessionMiddleware::new().ttl_secs(86_400));
//! bot.push(handler_fn(|ctx| async move {
//!     ctx.session()?.set("seen", json!(true));
//!     Ok(())
//! }));
//! ```
//!
//! Several session middlewares may be stacked as long as each uses its own
//! property name.

pub mod error;
pub mod handle;
pub mod middleware;
pub mod record;
pub mod store;

pub use error::{SessionError, SessionResult};
pub use handle::SessionHandle;
pub use middleware::{
    DEFAULT_PROPERTY, SessionBinding, SessionContextExt, SessionMiddleware, default_key,
};
pub use record::{SceneSession, SessionRecord, StoredSession};
pub use store::{FileStore, MemoryStore, SessionStore, SyncSessionStore};
