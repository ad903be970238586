//! Subscription side of the PUB/SUB transport.
//!
//! A subscription connects straight to every publisher endpoint the
//! directory lists for a topic. Each connection gets a reader task that
//! decodes frames into one bounded channel; the application drains it with
//! the [`Subscription`] handle. Delivery is at-most-once: a full queue drops
//! the incoming message.

use std::time::Duration;

use crossbeam::channel::{Receiver, Sender, TrySendError};
use log::{debug, warn};
use tokio::net::TcpStream;
use tokio::sync::watch;

use crate::comms::endpoint::parse_tcp_endpoint;
use crate::comms::protocol::{self, WireMessage};
use crate::error::{FleetError, FleetResult};

/// Receive queue depth per subscription, in messages.
pub(crate) const SUB_CHANNEL_DEPTH: usize = 256;

/// Handle to an active topic subscription.
#[derive(Debug)]
pub struct Subscription<M> {
    topic: String,
    queue: Receiver<M>,
}

impl<M: WireMessage> Subscription<M> {
    pub(crate) fn new(topic: String, queue: Receiver<M>) -> Self {
        Self { topic, queue }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Block until the next message arrives.
    pub fn recv(&self) -> FleetResult<M> {
        self.queue
            .recv()
            .map_err(|_| FleetError::transport(format!("subscription to `{}` closed", self.topic)))
    }

    /// Non-blocking receive.
    pub fn try_recv(&self) -> Option<M> {
        self.queue.try_recv().ok()
    }

    /// Block up to `timeout` for the next message.
    pub fn recv_timeout(&self, timeout: Duration) -> FleetResult<M> {
        self.queue.recv_timeout(timeout).map_err(|_| {
            FleetError::transport(format!(
                "no message on `{}` within {timeout:?}",
                self.topic
            ))
        })
    }
}

/// Read frames from one publisher endpoint into the subscription queue.
pub(crate) async fn reader_loop<M: WireMessage>(
    topic: String,
    endpoint: String,
    queue: Sender<M>,
    mut shutdown: watch::Receiver<bool>,
) {
    let addr = match parse_tcp_endpoint(&endpoint) {
        Ok(addr) => addr,
        Err(e) => {
            warn!("subscription to `{topic}`: {e}");
            return;
        }
    };
    let mut stream = match TcpStream::connect(addr).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!("subscription to `{topic}`: cannot reach publisher at {endpoint}: {e}");
            return;
        }
    };
    debug!("subscribed to `{topic}` at {endpoint}");

    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => break,
            frame = protocol::read_frame(&mut stream) => match frame {
                Ok(frame) => frame,
                Err(_) => break, // publisher gone
            },
        };
        match bincode::deserialize::<M>(&frame) {
            Ok(msg) => match queue.try_send(msg) {
                Ok(()) | Err(TrySendError::Full(_)) => {} // full queue: drop
                Err(TrySendError::Disconnected(_)) => break,
            },
            Err(e) => warn!("undecodable message on `{topic}`: {e}"),
        }
    }
    debug!("subscription reader for `{topic}` at {endpoint} exiting");
}
