//! Multiplexed Embedded Browser Host
//!
//! Runs many independent browser sessions on top of one embedded rendering
//! engine, on behalf of a host application that talks to it from any thread.
//!
//! # Architecture
//!
//! 1. **One affine thread**: the engine is only ever touched from the thread
//!    the [`dispatcher`] owns. [`Host`] posts every command there.
//! 2. **Registry of sessions**: ids are assigned by the engine on
//!    confirmation; creation requests are correlated by ticket.
//! 3. **Per-session input state**: multi-click, drag and IME composition are
//!    interpreted in [`gesture`] before anything reaches the engine.
//! 4. **Script bridge**: evaluations and channel calls are correlated over
//!    the engine's process-message channel.
//! 5. **Sinks, not globals**: session events reach the host application
//!    through the named interfaces in [`sinks`], or as a stream via
//!    [`EventBus`].

pub mod bridge;
pub mod channels;
pub mod config;
pub mod cookies;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod events;
pub mod gesture;
pub mod host;
pub mod registry;
pub mod sinks;
pub mod storage;

#[cfg(test)]
mod testing;

pub use bridge::{Continuation, ScriptOutcome};
pub use channels::{ChannelHandler, ChannelRouter};
pub use config::{HostConfig, MultiClickConfig};
pub use cookies::CookieJar;
pub use engine::{Engine, EngineEvent, EngineEvents, SessionHandle, SessionId};
pub use error::{Error, Result};
pub use events::{EventBus, HostEvent};
pub use host::{CreatedSession, Host, PresentationFactory, PresentationHandle, WeakHost};
pub use sinks::{
    ChannelInvocation, ChannelSink, ConsoleMessage, DiagnosticSink, EventSinks,
    InputFeedbackSink, LoadFailure, NavigationSink, PresentationSink, ScriptResultSink,
    StorageFallback,
};
