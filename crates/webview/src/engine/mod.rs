//! Rendering engine interfaces
//!
//! The engine itself is an external collaborator. This module only defines
//! what the host calls on it and what it reports back.

pub mod client;
pub mod protocol;
pub mod session;

pub use client::{CookieManager, CookieVisitor, Engine, EngineError, EngineEvent, EngineEvents};
pub use protocol::*;
pub use session::SessionHandle;
