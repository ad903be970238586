//! The messaging fabric: node naming, topic advertising and service
//! invocation over request/reply and publish/subscribe TCP transports.
//!
//! A process joins the fabric by creating a [`Client`], connecting it to the
//! directory and registering a unique node name. From there it can advertise
//! topics and publish on them, offer services with handlers served by a
//! background dispatcher, invoke services by name and subscribe to topics.
//!
//! ```rust,no_run
//! use fleetsim_core::comms::Client;
//!
//! let mut client = Client::new("vehicle_1").unwrap();
//! client.connect().unwrap();
//! for node in client.request_list_of_nodes().unwrap() {
//!     println!("peer: {node}");
//! }
//! client.shutdown();
//! ```

pub mod client;
pub mod directory;
pub mod endpoint;
pub mod monitor;
pub mod protocol;
pub mod publisher;
pub mod services;
pub mod subscriber;

pub use client::{Client, ClientState};
pub use directory::DirectoryServer;
pub use endpoint::{default_directory_endpoint, DEFAULT_DIRECTORY_PORT};
pub use monitor::ConnectionMonitor;
pub use protocol::{
    FieldDescriptor, FieldKind, GenericAnswer, MessageDescriptor, TopicEntry, WireMessage,
};
pub use subscriber::Subscription;
