#![cfg_attr(not(test), forbid(unsafe_code))]

//! Session lifecycle for the StoryKeep client.
//!
//! - [`idle`] and [`supervisor`]: idle warning, countdown and automatic logout.
//! - [`gateway`] and [`refresh`]: the authenticated request pipeline with
//!   single-flight token refresh.
//! - [`state`] and [`session`]: the authentication state machine and the
//!   actions that drive it.
//! - [`guard`]: route access decisions.

pub mod activity;
pub mod audit;
pub mod clock;
pub mod error;
pub mod gateway;
pub mod guard;
pub mod idle;
pub mod navigation;
pub mod refresh;
pub mod session;
pub mod state;
pub mod storage;
pub mod supervisor;
pub mod tokens;
pub mod transport;

pub use activity::{ACTIVITY_SIGNALS, ActivityMonitor, ActivitySignal};
pub use clock::{Clock, TokioClock};
pub use error::SessionError;
pub use gateway::AuthGateway;
pub use guard::{GuardDecision, Location, RouteAccess, RouteGuard};
pub use idle::{IdleEvent, IdleState, LogoutCause, SessionTimer, format_countdown};
pub use navigation::{MemoryNavigator, Navigator};
pub use refresh::{RefreshCoordinator, RefreshError, RefreshOutcome};
pub use session::AuthSession;
pub use state::{AuthEvent, AuthPhase, AuthState, SessionStore};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use supervisor::IdleSupervisor;
pub use tokens::{TokenPair, TokenStore};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Method, ReqwestTransport, TransportError};
