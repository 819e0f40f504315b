//! Projector Session
//!
//! Drives the lifecycle of a remote virtual display bound to a screen
//! capture authorization, and wraps the simpler request/response services
//! (task enumeration, app-op edits).
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────┐
//! │               VirtualDisplaySession                │
//! │  ┌─────────────────┐        ┌──────────────────┐  │
//! │  │ CapabilityToken │◄─bind──│  LifecycleSink   │  │
//! │  │  (projection)   │─revoke►│ (weak → session) │  │
//! │  └────────┬────────┘        └────────▲─────────┘  │
//! │           │                          │            │
//! │           ▼                          │ callbacks  │
//! │  ┌─────────────────────────────────────────────┐  │
//! │  │      Proxy<dyn DisplayManager> (remote)      │  │
//! │  │  createVirtualDisplay  releaseVirtualDisplay │  │
//! │  └─────────────────────────────────────────────┘  │
//! └───────────────────────────────────────────────────┘
//! ```
//!
//! Teardown happens exactly once, whoever triggers it: the caller,
//! the platform stopping the display, token revocation, or a drop.

pub mod app_ops;
pub mod capabilities;
pub mod session;
pub mod sink;
pub mod tasks;
pub mod token;

pub use app_ops::{AppOp, AppOpsController, GrantReport};
pub use capabilities::{check_capabilities, print_capability_report, Capability};
pub use session::*;
pub use sink::{LifecycleEvent, LifecycleSink};
pub use tasks::TaskEnumerator;
pub use token::{AuthorizationContext, CapabilityToken, TokenId, TokenState};
