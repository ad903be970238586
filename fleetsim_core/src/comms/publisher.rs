//! Per-client registry of advertised topics.
//!
//! Each advertised topic owns one bound PUB listener; subscribers connect to
//! it directly after resolving the endpoint through the directory. Published
//! frames fan out through a bounded broadcast queue, so a slow subscriber
//! drops messages instead of back-pressuring the publisher.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::RwLock;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, watch};

use crate::comms::protocol::{self, MessageDescriptor};

/// Send high-water mark of a PUB socket, in messages.
pub(crate) const PUB_CHANNEL_DEPTH: usize = 64;

/// Book-keeping for one advertised topic.
pub struct AdvertisedTopic {
    pub name: String,
    pub descriptor: MessageDescriptor,
    /// The bound `tcp://` endpoint announced to the directory.
    pub endpoint: String,
    sender: broadcast::Sender<Vec<u8>>,
}

impl AdvertisedTopic {
    pub(crate) fn new(
        name: String,
        descriptor: MessageDescriptor,
        endpoint: String,
        sender: broadcast::Sender<Vec<u8>>,
    ) -> Self {
        Self {
            name,
            descriptor,
            endpoint,
            sender,
        }
    }

    /// Enqueue an already-serialized message. Fire-and-forget: without
    /// subscribers the frame is simply dropped.
    pub(crate) fn publish_raw(&self, payload: Vec<u8>) {
        let _ = self.sender.send(payload);
    }

    /// Number of currently connected subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Shared map of advertised topics. Publishers take shared access; only
/// advertise takes exclusive access.
pub type TopicMap = Arc<RwLock<HashMap<String, AdvertisedTopic>>>;

/// Accept subscribers for one topic and attach each to the broadcast queue.
pub(crate) async fn accept_loop(
    listener: TcpListener,
    sender: broadcast::Sender<Vec<u8>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let stream = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("subscriber {peer} connected");
                    stream
                }
                Err(e) => {
                    warn!("publisher accept failed: {e}");
                    continue;
                }
            },
        };
        tokio::spawn(forward_to_subscriber(
            stream,
            sender.subscribe(),
            shutdown.clone(),
        ));
    }
}

async fn forward_to_subscriber(
    mut stream: TcpStream,
    mut queue: broadcast::Receiver<Vec<u8>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let payload = tokio::select! {
            _ = shutdown.changed() => break,
            msg = queue.recv() => match msg {
                Ok(payload) => payload,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("slow subscriber dropped {n} messages");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };
        if protocol::write_frame(&mut stream, &payload).await.is_err() {
            break;
        }
    }
}
