//! Application hooks for link events
//!
//! Implement [`LinkHandler`] to receive decoded frames and lifecycle events.
//! Every method has a default, so a handler only overrides what it needs.

use std::future::Future;

use crate::codec::Frame;
use crate::error::DispatchError;
use crate::transport::TransportKind;

/// Identity of a running link, passed to every hook
#[derive(Debug, Clone)]
pub struct LinkContext {
    /// Display name, e.g. `tcp 10.0.0.2:51234`
    pub name: String,
    /// Channel the link occupies
    pub channel: usize,
    /// Transport the link runs over
    pub transport: TransportKind,
}

impl LinkContext {
    pub fn new(name: impl Into<String>, channel: usize, transport: TransportKind) -> Self {
        Self {
            name: name.into(),
            channel,
            transport,
        }
    }
}

/// Handler for link events
///
/// Hooks run on the link's own task, between poll iterations. A slow hook
/// delays that link only.
pub trait LinkHandler: Send + Sync + 'static {
    /// Called once after the link has its channel, before the first poll
    fn on_link_begin(&self, ctx: &LinkContext) -> impl Future<Output = ()> + Send {
        let _ = ctx;
        async {}
    }

    /// Called for every decoded frame, heartbeats included
    ///
    /// An error is logged by the link and never terminates it.
    fn on_frame(
        &self,
        ctx: &LinkContext,
        frame: &Frame,
    ) -> impl Future<Output = Result<(), DispatchError>> + Send {
        let _ = ctx;
        let result = if frame.is_heartbeat() {
            Ok(())
        } else {
            Err(DispatchError::Unsupported(frame.msg_id()))
        };
        async move { result }
    }

    /// Called when the first heartbeat arrives after being inactive
    fn on_link_active(&self, ctx: &LinkContext) -> impl Future<Output = ()> + Send {
        let _ = ctx;
        async {}
    }

    /// Called when the heartbeat times out
    fn on_link_idle(&self, ctx: &LinkContext) -> impl Future<Output = ()> + Send {
        let _ = ctx;
        async {}
    }

    /// Called once after the channel has been released
    fn on_link_end(&self, ctx: &LinkContext) -> impl Future<Output = ()> + Send {
        let _ = ctx;
        async {}
    }
}

/// Handler that only acknowledges heartbeats
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHandler;

impl LinkHandler for NullHandler {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::message::{gcs_heartbeat, MSG_ID_COMMAND_LONG};
    use crate::codec::testing::{arm_command, gcs_frame};
    use crate::codec::MavMessage;

    fn ctx() -> LinkContext {
        LinkContext::new("test", 0, TransportKind::Memory)
    }

    #[tokio::test]
    async fn test_default_accepts_heartbeat() {
        let frame = gcs_frame(0, MavMessage::HEARTBEAT(gcs_heartbeat()));
        assert!(NullHandler.on_frame(&ctx(), &frame).await.is_ok());
    }

    #[tokio::test]
    async fn test_default_rejects_other_messages() {
        let frame = gcs_frame(0, arm_command());
        assert_eq!(
            NullHandler.on_frame(&ctx(), &frame).await,
            Err(DispatchError::Unsupported(MSG_ID_COMMAND_LONG))
        );
    }
}
