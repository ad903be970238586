//! Fabric client: one per process node.
//!
//! A `Client` owns everything a node needs on the wire: the directory REQ
//! socket and its monitor, one PUB listener per advertised topic, the shared
//! service REP listener, and the dispatcher task serving it. The client owns
//! its own tokio runtime so teardown is scoped to the instance: dropping the
//! client tears down every socket and task it created, and nothing else.
//!
//! The directory REQ socket follows the REQ/REP lockstep discipline and is
//! meant to be used from the thread that owns the `Client`; concurrent use
//! is serialized by an internal lock rather than being an error.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::{broadcast, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::comms::endpoint::{
    default_directory_endpoint, format_tcp_endpoint, parse_tcp_endpoint,
};
use crate::comms::monitor::ConnectionMonitor;
use crate::comms::protocol::{
    self, DirectoryRequest, GenericAnswer, GetServiceInfoAnswer, ListNodesAnswer,
    ListTopicsAnswer, RegisterNodeAnswer, ServiceCall, ServiceReply, TopicEntry, WireMessage,
};
use crate::comms::publisher::{self, AdvertisedTopic, TopicMap, PUB_CHANNEL_DEPTH};
use crate::comms::services::{self, OfferedService, ServiceHandler, ServiceMap};
use crate::comms::subscriber::{self, Subscription, SUB_CHANNEL_DEPTH};
use crate::error::{FleetError, FleetResult};

/// Registration state of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Registered,
    ShuttingDown,
}

/// A node of the messaging fabric.
pub struct Client {
    name: String,
    directory_endpoint: String,
    runtime: Runtime,
    state: ClientState,
    monitor: ConnectionMonitor,
    directory: Option<AsyncMutex<TcpStream>>,
    topics: TopicMap,
    services: ServiceMap,
    service_endpoint: Option<String>,
    shutdown_tx: Option<watch::Sender<bool>>,
    shutdown_rx: Option<watch::Receiver<bool>>,
    dispatcher: Option<JoinHandle<()>>,
}

impl Client {
    /// Create a client that will talk to the directory on the local host's
    /// well-known port.
    pub fn new(name: &str) -> FleetResult<Self> {
        Self::with_directory(name, &default_directory_endpoint())
    }

    /// Create a client with an explicit directory endpoint.
    pub fn with_directory(name: &str, directory_endpoint: &str) -> FleetResult<Self> {
        if name.is_empty() {
            return Err(FleetError::config("node name must not be empty"));
        }
        Ok(Self {
            name: name.to_string(),
            directory_endpoint: directory_endpoint.to_string(),
            runtime: Runtime::new()?,
            state: ClientState::Disconnected,
            monitor: ConnectionMonitor::new(),
            directory: None,
            topics: Arc::new(RwLock::new(HashMap::new())),
            services: Arc::new(RwLock::new(HashMap::new())),
            service_endpoint: None,
            shutdown_tx: None,
            shutdown_rx: None,
            dispatcher: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn directory_endpoint(&self) -> &str {
        &self.directory_endpoint
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    /// True iff the monitor observed a successful directory connect and no
    /// disconnect since.
    pub fn connected(&self) -> bool {
        self.monitor.connected()
    }

    /// The endpoint of this node's shared service REP socket, once connected.
    pub fn service_endpoint(&self) -> Option<&str> {
        self.service_endpoint.as_deref()
    }

    // -- lifecycle ----------------------------------------------------------

    /// Connect to the directory, register this node's name, bind the shared
    /// service socket and start the dispatcher.
    pub fn connect(&mut self) -> FleetResult<()> {
        if self.state != ClientState::Disconnected {
            return Err(FleetError::transport("client is already running"));
        }
        self.state = ClientState::Connecting;
        match self.try_connect() {
            Ok(()) => {
                self.state = ClientState::Registered;
                debug!("node `{}` registered with the directory", self.name);
                Ok(())
            }
            Err(e) => {
                self.reset_transport();
                self.state = ClientState::Disconnected;
                Err(e)
            }
        }
    }

    fn try_connect(&mut self) -> FleetResult<()> {
        let addr = parse_tcp_endpoint(&self.directory_endpoint)?;
        let stream = self
            .runtime
            .block_on(TcpStream::connect(addr))
            .map_err(|e| {
                FleetError::Transport(format!(
                    "cannot reach directory at {}: {e}",
                    self.directory_endpoint
                ))
            })?;
        stream.set_nodelay(true)?;
        self.monitor.mark_connected();
        self.directory = Some(AsyncMutex::new(stream));

        let answer: RegisterNodeAnswer = self.directory_request(&DirectoryRequest::RegisterNode {
            node_name: self.name.clone(),
        })?;
        if !answer.success {
            return Err(FleetError::RegistrationRejected(answer.error_message));
        }

        // One REP socket multiplexes every service of this node.
        let listener = self
            .runtime
            .block_on(TcpListener::bind(("127.0.0.1", 0)))?;
        let local_addr = listener.local_addr()?;
        self.service_endpoint = Some(format_tcp_endpoint(&local_addr));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatcher = self.runtime.spawn(services::dispatcher_loop(
            listener,
            Arc::clone(&self.services),
            shutdown_rx.clone(),
        ));
        self.shutdown_tx = Some(shutdown_tx);
        self.shutdown_rx = Some(shutdown_rx);
        self.dispatcher = Some(dispatcher);
        Ok(())
    }

    /// Unregister and tear everything down. Never fails; safe to call twice
    /// and from `Drop`.
    pub fn shutdown(&mut self) {
        if self.state != ClientState::Registered {
            return;
        }
        self.state = ClientState::ShuttingDown;

        debug!("unregistering node `{}` from the directory", self.name);
        match self.directory_request::<GenericAnswer>(&DirectoryRequest::UnregisterNode {
            node_name: self.name.clone(),
        }) {
            Ok(answer) if !answer.success => {
                warn!("directory refused to unregister: {}", answer.error_message)
            }
            Err(e) => warn!("shutdown: unregister failed: {e}"),
            _ => {}
        }

        // Fire the terminating signal; blocked receives in the dispatcher
        // and the per-topic tasks unwind through it.
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(task) = self.dispatcher.take() {
            if let Err(e) = self.runtime.block_on(task) {
                debug!("dispatcher join: {e}");
            }
        }

        self.reset_transport();
        self.state = ClientState::Disconnected;
    }

    fn reset_transport(&mut self) {
        self.directory = None;
        self.service_endpoint = None;
        self.shutdown_tx = None;
        self.shutdown_rx = None;
        self.dispatcher = None;
        self.topics.write().clear();
        self.services.write().clear();
        self.monitor.mark_disconnected();
    }

    fn ensure_registered(&self) -> FleetResult<()> {
        if self.state == ClientState::Registered {
            Ok(())
        } else {
            Err(FleetError::transport("client is not connected"))
        }
    }

    // -- directory queries --------------------------------------------------

    /// One REQ/REP round-trip on the directory socket.
    fn directory_request<A: DeserializeOwned>(&self, request: &DirectoryRequest) -> FleetResult<A> {
        let socket = self
            .directory
            .as_ref()
            .ok_or_else(|| FleetError::transport("client is not connected to the directory"))?;
        let payload = bincode::serialize(request)?;
        let reply = self.runtime.block_on(async {
            let mut stream = socket.lock().await;
            protocol::write_frame(&mut *stream, &payload).await?;
            protocol::read_frame(&mut *stream).await
        });
        match reply {
            Ok(bytes) => Ok(bincode::deserialize(&bytes)?),
            Err(e) => {
                self.monitor.mark_disconnected();
                Err(e)
            }
        }
    }

    /// Names of all nodes currently registered with the directory.
    pub fn request_list_of_nodes(&self) -> FleetResult<Vec<String>> {
        self.ensure_registered()?;
        let answer: ListNodesAnswer = self.directory_request(&DirectoryRequest::ListNodes)?;
        Ok(answer.nodes)
    }

    /// All topics the directory knows, with their publisher endpoints.
    pub fn request_list_of_topics(&self) -> FleetResult<Vec<TopicEntry>> {
        self.ensure_registered()?;
        let answer: ListTopicsAnswer = self.directory_request(&DirectoryRequest::ListTopics)?;
        Ok(answer.topics)
    }

    // -- publishing ---------------------------------------------------------

    /// Advertise a topic of message type `M`: bind a PUB socket on an
    /// ephemeral port and announce the endpoint to the directory.
    pub fn advertise_topic<M: WireMessage>(&mut self, topic: &str) -> FleetResult<()> {
        self.ensure_registered()?;
        if self.topics.read().contains_key(topic) {
            return Err(FleetError::DuplicateAdvertisement(topic.to_string()));
        }

        let listener = self
            .runtime
            .block_on(TcpListener::bind(("127.0.0.1", 0)))?;
        let local_addr = listener.local_addr()?;
        let endpoint = format_tcp_endpoint(&local_addr);
        let descriptor = M::descriptor();
        let (sender, _) = broadcast::channel(PUB_CHANNEL_DEPTH);
        let shutdown_rx = self
            .shutdown_rx
            .clone()
            .ok_or_else(|| FleetError::transport("client is not connected"))?;
        self.runtime
            .spawn(publisher::accept_loop(listener, sender.clone(), shutdown_rx));

        {
            let mut map = self.topics.write();
            if map.contains_key(topic) {
                return Err(FleetError::DuplicateAdvertisement(topic.to_string()));
            }
            map.insert(
                topic.to_string(),
                AdvertisedTopic::new(topic.to_string(), descriptor.clone(), endpoint.clone(), sender),
            );
            // Lock released before any directory I/O.
        }

        debug!(
            "advertising topic `{topic}` [{}] on endpoint `{endpoint}`",
            descriptor.full_name
        );
        let answer: GenericAnswer = self.directory_request(&DirectoryRequest::AdvertiseTopic {
            topic_name: topic.to_string(),
            endpoint,
            topic_type_name: descriptor.full_name,
            node_name: self.name.clone(),
        })?;
        if !answer.success {
            return Err(FleetError::Transport(format!(
                "directory rejected topic `{topic}`: {}",
                answer.error_message
            )));
        }
        Ok(())
    }

    /// Publish a message on an advertised topic. Fire-and-forget,
    /// at-most-once: slow subscribers drop frames at the transport layer.
    pub fn publish<M: WireMessage>(&self, topic: &str, message: &M) -> FleetResult<()> {
        let payload = message.encode()?;
        let map = self.topics.read();
        let info = map
            .get(topic)
            .ok_or_else(|| FleetError::TopicNotAdvertised(topic.to_string()))?;
        let descriptor = M::descriptor();
        if descriptor != info.descriptor {
            return Err(FleetError::TypeMismatch {
                topic: topic.to_string(),
                got: descriptor.full_name,
                expected: info.descriptor.full_name.clone(),
            });
        }
        info.publish_raw(payload);
        Ok(())
    }

    // -- services -----------------------------------------------------------

    /// Offer a service on this node's shared REP socket and announce it to
    /// the directory. `handler` runs on the dispatcher task; a handler error
    /// becomes a failure answer to the caller and the dispatcher keeps going.
    pub fn advertise_service<Req, Rep, F>(&mut self, name: &str, handler: F) -> FleetResult<()>
    where
        Req: WireMessage,
        Rep: WireMessage,
        F: Fn(Req) -> FleetResult<Rep> + Send + Sync + 'static,
    {
        self.ensure_registered()?;
        let endpoint = self
            .service_endpoint
            .clone()
            .ok_or_else(|| FleetError::transport("service socket is not bound"))?;
        let input = Req::descriptor();
        let output = Rep::descriptor();

        let raw_handler: ServiceHandler = Arc::new(move |bytes: &[u8]| {
            let request = Req::decode(bytes)?;
            handler(request)?.encode()
        });

        {
            let mut map = self.services.write();
            if map.contains_key(name) {
                return Err(FleetError::DuplicateAdvertisement(name.to_string()));
            }
            map.insert(
                name.to_string(),
                OfferedService {
                    name: name.to_string(),
                    input: input.clone(),
                    output: output.clone(),
                    handler: raw_handler,
                },
            );
        }

        debug!(
            "advertising service `{name}` [{} -> {}] on endpoint `{endpoint}`",
            input.full_name, output.full_name
        );
        let answer: GenericAnswer = self.directory_request(&DirectoryRequest::AdvertiseService {
            service_name: name.to_string(),
            endpoint,
            input_type_name: input.full_name,
            output_type_name: output.full_name,
            node_name: self.name.clone(),
        })?;
        if !answer.success {
            return Err(FleetError::Transport(format!(
                "directory rejected service `{name}`: {}",
                answer.error_message
            )));
        }
        Ok(())
    }

    /// Invoke a service by name: resolve the endpoint through the directory,
    /// open a one-shot REQ connection and exchange exactly one call. No
    /// retries happen at this layer.
    pub fn call_service<Req, Rep>(&self, service: &str, input: &Req) -> FleetResult<Rep>
    where
        Req: WireMessage,
        Rep: WireMessage,
    {
        self.ensure_registered()?;
        let info: GetServiceInfoAnswer =
            self.directory_request(&DirectoryRequest::GetServiceInfo {
                service_name: service.to_string(),
            })?;
        if !info.success {
            return Err(FleetError::ServiceNotFound(format!(
                "{service}: {}",
                info.error_message
            )));
        }

        let addr = parse_tcp_endpoint(&info.service_endpoint)?;
        let call = ServiceCall {
            service_name: service.to_string(),
            serialized_input: input.encode()?,
        };
        let payload = bincode::serialize(&call)?;
        let reply = self
            .runtime
            .block_on(async {
                let mut stream = TcpStream::connect(addr).await?;
                protocol::write_frame(&mut stream, &payload).await?;
                protocol::read_frame(&mut stream).await
            })
            .map_err(|e: FleetError| {
                FleetError::ServiceCallFailed(format!("`{service}`: {e}"))
            })?;

        match bincode::deserialize::<ServiceReply>(&reply)? {
            ServiceReply::Output(bytes) => Rep::decode(&bytes),
            ServiceReply::Failure(answer) => {
                Err(FleetError::ServiceCallFailed(answer.error_message))
            }
        }
    }

    // -- subscriptions ------------------------------------------------------

    /// Subscribe to a topic: resolve its publisher endpoints through the
    /// directory and stream decoded messages into a bounded queue.
    pub fn subscribe_topic<M: WireMessage>(&self, topic: &str) -> FleetResult<Subscription<M>> {
        self.ensure_registered()?;
        let topics = self.request_list_of_topics()?;
        let entry = topics
            .into_iter()
            .find(|t| t.name == topic)
            .ok_or_else(|| FleetError::TopicNotAdvertised(topic.to_string()))?;

        let descriptor = M::descriptor();
        if entry.type_name != descriptor.full_name {
            return Err(FleetError::TypeMismatch {
                topic: topic.to_string(),
                got: descriptor.full_name,
                expected: entry.type_name,
            });
        }

        let (tx, rx) = crossbeam::channel::bounded(SUB_CHANNEL_DEPTH);
        let shutdown_rx = self
            .shutdown_rx
            .clone()
            .ok_or_else(|| FleetError::transport("client is not connected"))?;
        for endpoint in entry.endpoints {
            self.runtime.spawn(subscriber::reader_loop::<M>(
                topic.to_string(),
                endpoint,
                tx.clone(),
                shutdown_rx.clone(),
            ));
        }
        Ok(Subscription::new(topic.to_string(), rx))
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.shutdown();
    }
}
