//! The directory: authoritative registry of nodes, topics and services.
//!
//! Normally one directory runs per simulation host on the well-known port;
//! tests spawn one per case on an ephemeral port. Every client connection is
//! served by its own task in REQ/REP lockstep, so one slow client never
//! blocks the others; the registry itself sits behind a read/write lock.

use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, info, warn};
use parking_lot::RwLock;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Runtime;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::comms::endpoint::{format_tcp_endpoint, DEFAULT_DIRECTORY_PORT};
use crate::comms::protocol::{
    self, DirectoryRequest, GenericAnswer, GetServiceInfoAnswer, ListNodesAnswer,
    ListTopicsAnswer, RegisterNodeAnswer, TopicEntry,
};
use crate::error::{FleetError, FleetResult};

#[derive(Debug, Clone)]
struct TopicPublisher {
    endpoint: String,
    node_name: String,
}

#[derive(Debug, Clone)]
struct TopicRecord {
    type_name: String,
    publishers: Vec<TopicPublisher>,
}

#[derive(Debug, Clone)]
struct ServiceRecord {
    endpoint: String,
    node_name: String,
}

/// The registry state proper, separated from the transport so its semantics
/// are testable without sockets.
#[derive(Debug, Default)]
pub(crate) struct Registry {
    nodes: BTreeSet<String>,
    topics: BTreeMap<String, TopicRecord>,
    services: BTreeMap<String, ServiceRecord>,
}

impl Registry {
    fn register_node(&mut self, node_name: &str) -> RegisterNodeAnswer {
        if node_name.is_empty() {
            return RegisterNodeAnswer {
                success: false,
                error_message: "node name must not be empty".to_string(),
            };
        }
        if self.nodes.contains(node_name) {
            return RegisterNodeAnswer {
                success: false,
                error_message: format!("a node named `{node_name}` is already registered"),
            };
        }
        self.nodes.insert(node_name.to_string());
        info!("node `{node_name}` registered");
        RegisterNodeAnswer {
            success: true,
            error_message: String::new(),
        }
    }

    fn unregister_node(&mut self, node_name: &str) -> GenericAnswer {
        if !self.nodes.remove(node_name) {
            return GenericAnswer::error(format!("node `{node_name}` is not registered"));
        }
        // Drop everything the node owned.
        for record in self.topics.values_mut() {
            record.publishers.retain(|p| p.node_name != node_name);
        }
        self.topics.retain(|_, record| !record.publishers.is_empty());
        self.services
            .retain(|_, record| record.node_name != node_name);
        info!("node `{node_name}` unregistered");
        GenericAnswer::ok()
    }

    fn list_nodes(&self) -> ListNodesAnswer {
        ListNodesAnswer {
            nodes: self.nodes.iter().cloned().collect(),
        }
    }

    fn list_topics(&self) -> ListTopicsAnswer {
        ListTopicsAnswer {
            topics: self
                .topics
                .iter()
                .map(|(name, record)| TopicEntry {
                    name: name.clone(),
                    type_name: record.type_name.clone(),
                    endpoints: record.publishers.iter().map(|p| p.endpoint.clone()).collect(),
                    publisher_names: record
                        .publishers
                        .iter()
                        .map(|p| p.node_name.clone())
                        .collect(),
                })
                .collect(),
        }
    }

    fn advertise_topic(
        &mut self,
        topic_name: &str,
        endpoint: &str,
        topic_type_name: &str,
        node_name: &str,
    ) -> GenericAnswer {
        if !self.nodes.contains(node_name) {
            return GenericAnswer::error(format!("unknown node `{node_name}`"));
        }
        let publisher = TopicPublisher {
            endpoint: endpoint.to_string(),
            node_name: node_name.to_string(),
        };
        match self.topics.get_mut(topic_name) {
            Some(record) if record.type_name != topic_type_name => GenericAnswer::error(format!(
                "topic `{topic_name}` already has type `{}`, refusing `{topic_type_name}`",
                record.type_name
            )),
            Some(record) => {
                record.publishers.push(publisher);
                GenericAnswer::ok()
            }
            None => {
                self.topics.insert(
                    topic_name.to_string(),
                    TopicRecord {
                        type_name: topic_type_name.to_string(),
                        publishers: vec![publisher],
                    },
                );
                GenericAnswer::ok()
            }
        }
    }

    fn advertise_service(
        &mut self,
        service_name: &str,
        endpoint: &str,
        node_name: &str,
    ) -> GenericAnswer {
        if !self.nodes.contains(node_name) {
            return GenericAnswer::error(format!("unknown node `{node_name}`"));
        }
        // Last advertiser wins; the per-node duplicate guard is client-side.
        self.services.insert(
            service_name.to_string(),
            ServiceRecord {
                endpoint: endpoint.to_string(),
                node_name: node_name.to_string(),
            },
        );
        GenericAnswer::ok()
    }

    fn get_service_info(&self, service_name: &str) -> GetServiceInfoAnswer {
        match self.services.get(service_name) {
            Some(record) => GetServiceInfoAnswer {
                success: true,
                error_message: String::new(),
                service_endpoint: record.endpoint.clone(),
            },
            None => GetServiceInfoAnswer {
                success: false,
                error_message: format!("service `{service_name}` is not advertised"),
                service_endpoint: String::new(),
            },
        }
    }

    /// Dispatch one request and serialize the matching answer.
    pub(crate) fn handle(&mut self, request: DirectoryRequest) -> FleetResult<Vec<u8>> {
        let bytes = match request {
            DirectoryRequest::RegisterNode { node_name } => {
                bincode::serialize(&self.register_node(&node_name))?
            }
            DirectoryRequest::UnregisterNode { node_name } => {
                bincode::serialize(&self.unregister_node(&node_name))?
            }
            DirectoryRequest::ListNodes => bincode::serialize(&self.list_nodes())?,
            DirectoryRequest::ListTopics => bincode::serialize(&self.list_topics())?,
            DirectoryRequest::AdvertiseTopic {
                topic_name,
                endpoint,
                topic_type_name,
                node_name,
            } => bincode::serialize(&self.advertise_topic(
                &topic_name,
                &endpoint,
                &topic_type_name,
                &node_name,
            ))?,
            DirectoryRequest::AdvertiseService {
                service_name,
                endpoint,
                node_name,
                ..
            } => bincode::serialize(&self.advertise_service(&service_name, &endpoint, &node_name))?,
            DirectoryRequest::GetServiceInfo { service_name } => {
                bincode::serialize(&self.get_service_info(&service_name))?
            }
        };
        Ok(bytes)
    }
}

/// A running directory server.
pub struct DirectoryServer {
    runtime: Runtime,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    accept_task: Option<JoinHandle<()>>,
    _registry: Arc<RwLock<Registry>>,
}

impl DirectoryServer {
    /// Bind and start serving. `bind_addr` is a plain `host:port` address;
    /// pass port 0 to get an ephemeral port (tests do).
    pub fn spawn(bind_addr: &str) -> FleetResult<Self> {
        let runtime = Runtime::new()?;
        let listener = runtime.block_on(TcpListener::bind(bind_addr))?;
        let local_addr = listener.local_addr()?;
        let registry = Arc::new(RwLock::new(Registry::default()));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accept_task = runtime.spawn(accept_loop(listener, Arc::clone(&registry), shutdown_rx));
        info!("directory listening on {}", format_tcp_endpoint(&local_addr));
        Ok(Self {
            runtime,
            local_addr,
            shutdown_tx,
            accept_task: Some(accept_task),
            _registry: registry,
        })
    }

    /// Start on the well-known directory port on all interfaces.
    pub fn spawn_default() -> FleetResult<Self> {
        Self::spawn(&format!("0.0.0.0:{DEFAULT_DIRECTORY_PORT}"))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The `tcp://` endpoint clients connect to.
    pub fn endpoint(&self) -> String {
        format_tcp_endpoint(&self.local_addr)
    }

    /// Stop accepting and join the accept task. Idempotent.
    pub fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.accept_task.take() {
            if let Err(e) = self.runtime.block_on(task) {
                debug!("directory accept task join: {e}");
            }
        }
    }
}

impl Drop for DirectoryServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn accept_loop(
    listener: TcpListener,
    registry: Arc<RwLock<Registry>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let stream = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("directory client {peer} connected");
                    stream
                }
                Err(e) => {
                    warn!("directory accept failed: {e}");
                    continue;
                }
            },
        };
        tokio::spawn(serve_client(stream, Arc::clone(&registry), shutdown.clone()));
    }
    debug!("directory accept loop exiting");
}

async fn serve_client(
    mut stream: TcpStream,
    registry: Arc<RwLock<Registry>>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => return,
            frame = protocol::read_frame(&mut stream) => match frame {
                Ok(frame) => frame,
                Err(FleetError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => return,
                Err(e) => {
                    debug!("directory client connection ended: {e}");
                    return;
                }
            },
        };
        let request: DirectoryRequest = match bincode::deserialize(&frame) {
            Ok(request) => request,
            Err(e) => {
                warn!("directory received an undecodable request: {e}");
                return;
            }
        };
        let reply = {
            let mut reg = registry.write();
            reg.handle(request)
        };
        match reply {
            Ok(bytes) => {
                if protocol::write_frame(&mut stream, &bytes).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!("directory failed to answer: {e}");
                return;
            }
        }
    }
}
