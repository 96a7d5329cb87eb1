//! Pattern-and-state dispatch: matches an inbound message's recipient
//! against registered routes, combines that with per-`(module, sender)`
//! FSM state, and invokes the selected handlers.

pub mod bounce_route;
pub mod error;
pub mod route;
pub mod router;
pub mod state;

pub use bounce_route::BounceRoute;
pub use error::{RouterError, SmtpError};
pub use route::{HandlerId, Route, Transition};
pub use router::{HandlerFn, ReloadHook, Router, StateKeyFn, START};
pub use state::{MemoryStorage, PersistentStorage, StateStorage, ERROR_STATE, ROUTE_FIRST_STATE};
