use std::sync::atomic::{AtomicBool, Ordering};

use logscope_types::{InstanceId, PriorityUpdate};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// Errors reported by a transport
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request could not be handed to the producer
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),

    /// The receiving side of the transport is gone
    #[error("transport closed")]
    Closed,
}

/// Requests sent to the log collector on behalf of the scope model
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum ObserverRequest {
    /// Ask a producer to announce its scopes
    RequestScopes { target: InstanceId },

    /// Change scope priorities of a producer
    PriorityUpdate(PriorityUpdate),

    /// Ask one producer, or every producer when `target` is empty, to persist
    /// its current scope priorities
    SaveConfig { target: Option<InstanceId> },
}

/// Capability to deliver requests to log producers
pub trait PriorityTransport {
    fn send(&self, request: ObserverRequest) -> Result<(), TransportError>;
}

impl<T: PriorityTransport + ?Sized> PriorityTransport for &T {
    fn send(&self, request: ObserverRequest) -> Result<(), TransportError> {
        (**self).send(request)
    }
}

/// Transport forwarding requests over a tokio channel
#[derive(Clone, Debug)]
pub struct ChannelTransport {
    sender: mpsc::UnboundedSender<ObserverRequest>,
}

impl ChannelTransport {
    /// Create a transport and the receiver draining it
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ObserverRequest>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl PriorityTransport for ChannelTransport {
    fn send(&self, request: ObserverRequest) -> Result<(), TransportError> {
        debug!(?request, "sending request");
        self.sender.send(request).map_err(|_| TransportError::Closed)
    }
}

/// In-memory transport keeping every delivered request
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<ObserverRequest>>,
    failing: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Remove and return the recorded requests
    pub fn take(&self) -> Vec<ObserverRequest> {
        std::mem::take(&mut *self.sent.lock())
    }

    pub fn len(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.lock().is_empty()
    }

    /// Priority updates only, in send order
    pub fn updates(&self) -> Vec<PriorityUpdate> {
        self.sent
            .lock()
            .iter()
            .filter_map(|request| match request {
                ObserverRequest::PriorityUpdate(update) => Some(update.clone()),
                _ => None,
            })
            .collect()
    }
}

impl PriorityTransport for RecordingTransport {
    fn send(&self, request: ObserverRequest) -> Result<(), TransportError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(TransportError::DeliveryFailed("producer unreachable".to_string()));
        }
        self.sent.lock().push(request);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logscope_types::{PriorityMask, ScopePriorityRecord};

    fn update() -> ObserverRequest {
        ObserverRequest::PriorityUpdate(PriorityUpdate::new(
            7,
            vec![ScopePriorityRecord::new(3, PriorityMask::DEBUG, "Svc::Init")],
        ))
    }

    #[test]
    fn test_channel_transport_delivers_in_order() {
        let (transport, mut rx) = ChannelTransport::new();
        transport.send(ObserverRequest::RequestScopes { target: 7 }).unwrap();
        transport.send(update()).unwrap();

        assert_eq!(rx.try_recv().unwrap(), ObserverRequest::RequestScopes { target: 7 });
        assert_eq!(rx.try_recv().unwrap(), update());
    }

    #[test]
    fn test_channel_transport_closed() {
        let (transport, rx) = ChannelTransport::new();
        drop(rx);
        assert_eq!(transport.send(update()), Err(TransportError::Closed));
    }

    #[test]
    fn test_recording_transport_failure_toggle() {
        let transport = RecordingTransport::new();
        transport.send(update()).unwrap();

        transport.set_failing(true);
        assert!(matches!(
            transport.send(update()),
            Err(TransportError::DeliveryFailed(_))
        ));
        transport.set_failing(false);

        assert_eq!(transport.len(), 1);
        assert_eq!(transport.updates()[0].target, 7);
        assert_eq!(transport.take().len(), 1);
        assert!(transport.is_empty());
    }

    #[test]
    fn test_request_json_shape() {
        let json = serde_json::to_value(ObserverRequest::SaveConfig { target: None }).unwrap();
        assert_eq!(json["request"], "save_config");
        assert!(json["target"].is_null());

        let json = serde_json::to_value(update()).unwrap();
        assert_eq!(json["request"], "priority_update");
        assert_eq!(json["count"], 1);
        assert_eq!(json["records"][0]["path"], "Svc::Init");
    }
}
