//! Channel Router - async handlers for script channel calls
//!
//! Content calls `name(data, callback)`; the host sees a
//! [`ChannelInvocation`]. The router runs the handler registered for `name`
//! on a tokio runtime and, when the caller passed a callback, answers it
//! through [`Host::send_channel_callback`].
//!
//! Design decisions:
//! 1. Handlers never run on the affine thread - they may await freely
//! 2. The router holds a [`WeakHost`]; it never keeps a host alive
//! 3. Calls to unregistered channels go to the fallback sink, if any

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::runtime::Handle;

use crate::engine::SessionId;
use crate::host::{Host, WeakHost};
use crate::sinks::{ChannelInvocation, ChannelSink, EventSinks};

/// Host-side implementation of one channel function
#[async_trait]
pub trait ChannelHandler: Send + Sync {
    /// `Ok` resolves the script callback, `Err` rejects it with the message
    async fn handle(&self, invocation: &ChannelInvocation) -> Result<String, String>;
}

pub struct ChannelRouter {
    handlers: DashMap<String, Arc<dyn ChannelHandler>>,
    host: WeakHost,
    runtime: Handle,
    fallback: Option<Arc<dyn ChannelSink>>,
}

impl ChannelRouter {
    /// Build a router and attach it to `host` as a channel sink.
    ///
    /// Handlers are spawned on `runtime`.
    pub fn install(host: &Host, runtime: Handle) -> Arc<Self> {
        Self::install_with_fallback(host, runtime, None)
    }

    pub fn install_with_fallback(
        host: &Host,
        runtime: Handle,
        fallback: Option<Arc<dyn ChannelSink>>,
    ) -> Arc<Self> {
        let router = Arc::new(Self {
            handlers: DashMap::new(),
            host: host.downgrade(),
            runtime,
            fallback,
        });
        let mut sinks = EventSinks::new();
        sinks.add_channels(router.clone());
        host.attach_sinks(sinks);
        router
    }

    pub fn register(&self, name: impl Into<String>, handler: Arc<dyn ChannelHandler>) {
        let name = name.into();
        tracing::debug!(channel = %name, "Registered channel handler");
        if self.handlers.insert(name.clone(), handler).is_some() {
            tracing::warn!(channel = %name, "Channel handler replaced");
        }
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.handlers.remove(name).is_some()
    }

    /// Registered channel names, sorted
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    /// Expose every registered channel in `session`'s main frame
    pub fn expose_to(&self, session: SessionId) -> bool {
        match self.host.upgrade() {
            Some(host) => {
                host.set_script_channels(session, self.channel_names());
                true
            }
            None => false,
        }
    }
}

impl ChannelSink for ChannelRouter {
    fn channel_invoked(&self, invocation: &ChannelInvocation) {
        // Clone out so no map guard is held past this point
        let handler = self
            .handlers
            .get(&invocation.function)
            .map(|entry| entry.value().clone());
        let Some(handler) = handler else {
            match &self.fallback {
                Some(fallback) => fallback.channel_invoked(invocation),
                None => tracing::warn!(
                    session = invocation.session,
                    channel = %invocation.function,
                    "No handler for channel"
                ),
            }
            return;
        };

        let host = self.host.clone();
        let invocation = invocation.clone();
        self.runtime.spawn(async move {
            let outcome = handler.handle(&invocation).await;
            if invocation.callback_token.is_empty() {
                return;
            }
            let Some(host) = host.upgrade() else {
                tracing::debug!(channel = %invocation.function, "Host gone, callback dropped");
                return;
            };
            let (is_error, result) = match outcome {
                Ok(result) => (false, result),
                Err(message) => (true, message),
            };
            host.send_channel_callback(
                invocation.session,
                is_error,
                result,
                invocation.callback_token,
                invocation.frame.to_string(),
            );
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::message::CHANNEL_INVOCATION;
    use crate::engine::{EngineEvent, ProcessMessage};
    use crate::testing::{eventually, main_frame_of, running_host, shared_log, Call, SharedLog};
    use parking_lot::Mutex;
    use serde_json::{json, Value};

    struct Upper;

    #[async_trait]
    impl ChannelHandler for Upper {
        async fn handle(&self, invocation: &ChannelInvocation) -> Result<String, String> {
            Ok(invocation.argument.to_uppercase())
        }
    }

    struct Refuse;

    #[async_trait]
    impl ChannelHandler for Refuse {
        async fn handle(&self, _invocation: &ChannelInvocation) -> Result<String, String> {
            Err("not allowed".to_string())
        }
    }

    #[derive(Default)]
    struct Unhandled(Mutex<Vec<String>>);

    impl ChannelSink for Unhandled {
        fn channel_invoked(&self, invocation: &ChannelInvocation) {
            self.0.lock().push(invocation.function.clone());
        }
    }

    fn invoke(log: &SharedLog, session: SessionId, function: &str, argument: &str, token: &str) {
        let events = log.lock().events.clone().unwrap();
        events.post(EngineEvent::ProcessMessage {
            session,
            frame: main_frame_of(session),
            message: ProcessMessage::new(
                CHANNEL_INVOCATION,
                vec![json!(function), json!(argument), json!(token)],
            ),
        });
    }

    fn callbacks(log: &SharedLog) -> Vec<Vec<Value>> {
        log.lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                Call::ProcessMessage { message, .. } => Some(message.args.clone()),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_handler_answers_callback() {
        let log = shared_log();
        let (host, _root) = running_host(&log).await;
        let id = host.create("", "").await.unwrap().id;
        let router = ChannelRouter::install(&host, Handle::current());
        router.register("shout", Arc::new(Upper));
        router.register("deny", Arc::new(Refuse));

        invoke(&log, id, "shout", "hi", "3");
        invoke(&log, id, "deny", "x", "4");

        assert!(eventually(|| callbacks(&log).len() == 2).await);
        let mut seen = callbacks(&log);
        seen.sort_by_key(|args| args[0].as_i64());
        assert_eq!(
            seen,
            vec![
                vec![json!(3), json!(false), json!("HI")],
                vec![json!(4), json!(true), json!("not allowed")],
            ]
        );
    }

    #[tokio::test]
    async fn test_no_token_means_no_callback() {
        struct Counting(Arc<Mutex<usize>>);

        #[async_trait]
        impl ChannelHandler for Counting {
            async fn handle(&self, _invocation: &ChannelInvocation) -> Result<String, String> {
                *self.0.lock() += 1;
                Ok(String::new())
            }
        }

        let log = shared_log();
        let (host, _root) = running_host(&log).await;
        let id = host.create("", "").await.unwrap().id;
        let router = ChannelRouter::install(&host, Handle::current());
        let count = Arc::new(Mutex::new(0));
        router.register("log", Arc::new(Counting(count.clone())));

        invoke(&log, id, "log", "entry", "");
        assert!(eventually(|| *count.lock() == 1).await);
        host.flush().await.unwrap();
        assert!(callbacks(&log).is_empty());
    }

    #[tokio::test]
    async fn test_unregistered_channel_goes_to_fallback() {
        let log = shared_log();
        let (host, _root) = running_host(&log).await;
        let id = host.create("", "").await.unwrap().id;
        let fallback = Arc::new(Unhandled::default());
        let router =
            ChannelRouter::install_with_fallback(&host, Handle::current(), Some(fallback.clone()));
        router.register("shout", Arc::new(Upper));
        assert!(router.unregister("shout"));
        assert!(!router.unregister("shout"));

        invoke(&log, id, "shout", "hi", "1");
        host.flush().await.unwrap();

        assert_eq!(*fallback.0.lock(), vec!["shout".to_string()]);
        assert!(callbacks(&log).is_empty());
    }

    #[tokio::test]
    async fn test_expose_installs_registered_names() {
        let log = shared_log();
        let (host, _root) = running_host(&log).await;
        let id = host.create("", "").await.unwrap().id;
        let router = ChannelRouter::install(&host, Handle::current());
        router.register("save", Arc::new(Upper));
        router.register("load", Arc::new(Upper));
        assert_eq!(router.channel_names(), vec!["load", "save"]);

        assert!(router.expose_to(id));
        host.flush().await.unwrap();

        let script = log
            .lock()
            .calls
            .iter()
            .find_map(|call| match call {
                Call::ExecuteScript { code, .. } => Some(code.clone()),
                _ => None,
            })
            .unwrap();
        assert!(script.contains("bind(\"load\");bind(\"save\");"));

        drop(host);
        assert!(!router.expose_to(id));
    }
}
