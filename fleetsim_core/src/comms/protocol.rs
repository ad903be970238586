//! Wire protocol of the messaging fabric.
//!
//! Every socket in the fabric (directory REQ/REP, per-topic PUB, per-node
//! service REP) carries bincode-encoded messages in frames prefixed by a
//! 4-byte little-endian length. Message *types* travel as
//! [`MessageDescriptor`]s: the full type name plus an ordered field schema,
//! which is what allows peers to introspect topic and service types without
//! sharing Rust code.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{FleetError, FleetResult};

/// Upper bound on a single frame; anything larger is a protocol violation.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Write one length-prefixed frame.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, payload: &[u8]) -> FleetResult<()> {
    if payload.len() > MAX_FRAME_LEN {
        return Err(FleetError::transport(format!(
            "frame of {} bytes exceeds the {} byte limit",
            payload.len(),
            MAX_FRAME_LEN
        )));
    }
    writer.write_all(&(payload.len() as u32).to_le_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> FleetResult<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(FleetError::transport(format!(
            "peer announced a frame of {len} bytes, over the {MAX_FRAME_LEN} byte limit"
        )));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    Ok(payload)
}

/// Primitive kinds a message field can take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    Bool,
    I32,
    I64,
    U32,
    U64,
    F32,
    F64,
    Str,
    Bytes,
    Repeated(Box<FieldKind>),
    /// A nested message, referenced by full type name.
    Message(String),
}

/// One named field of a message schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
}

/// Serialized description of a message type: full name + field schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDescriptor {
    pub full_name: String,
    pub fields: Vec<FieldDescriptor>,
}

impl MessageDescriptor {
    pub fn new(full_name: &str) -> Self {
        Self {
            full_name: full_name.to_string(),
            fields: Vec::new(),
        }
    }

    /// Append a field to the schema (builder style).
    pub fn field(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.to_string(),
            kind,
        });
        self
    }
}

/// A message that can travel over the fabric.
///
/// The descriptor is recorded when a topic or service is advertised and
/// checked again on publish, which is what turns a silent encoding mismatch
/// into a typed error.
pub trait WireMessage: Serialize + DeserializeOwned + Send + 'static {
    fn descriptor() -> MessageDescriptor;

    fn encode(&self) -> FleetResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    fn decode(bytes: &[u8]) -> FleetResult<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}

// ---------------------------------------------------------------------------
// Directory wire messages
// ---------------------------------------------------------------------------

/// Requests a client sends on its directory REQ socket. The directory
/// answers each variant with the matching `*Answer` type below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DirectoryRequest {
    RegisterNode {
        node_name: String,
    },
    UnregisterNode {
        node_name: String,
    },
    ListNodes,
    ListTopics,
    AdvertiseTopic {
        topic_name: String,
        endpoint: String,
        topic_type_name: String,
        node_name: String,
    },
    AdvertiseService {
        service_name: String,
        endpoint: String,
        input_type_name: String,
        output_type_name: String,
        node_name: String,
    },
    GetServiceInfo {
        service_name: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterNodeAnswer {
    pub success: bool,
    pub error_message: String,
}

/// Catch-all success/failure answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenericAnswer {
    pub success: bool,
    pub error_message: String,
}

impl GenericAnswer {
    pub fn ok() -> Self {
        Self {
            success: true,
            error_message: String::new(),
        }
    }

    pub fn error<S: Into<String>>(msg: S) -> Self {
        Self {
            success: false,
            error_message: msg.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListNodesAnswer {
    pub nodes: Vec<String>,
}

/// One advertised topic as known to the directory. `endpoints` and
/// `publisher_names` are parallel arrays: entry `k` of both describes the
/// same publisher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicEntry {
    pub name: String,
    pub type_name: String,
    pub endpoints: Vec<String>,
    pub publisher_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListTopicsAnswer {
    pub topics: Vec<TopicEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetServiceInfoAnswer {
    pub success: bool,
    pub error_message: String,
    pub service_endpoint: String,
}

// ---------------------------------------------------------------------------
// Service wire messages
// ---------------------------------------------------------------------------

/// A service invocation, sent to the owning node's service REP socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    pub service_name: String,
    pub serialized_input: Vec<u8>,
}

/// Reply envelope of a service invocation: either the serialized output of
/// the declared reply type, or a failure answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ServiceReply {
    Output(Vec<u8>),
    Failure(GenericAnswer),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_request_roundtrip() {
        let req = DirectoryRequest::AdvertiseTopic {
            topic_name: "odom".into(),
            endpoint: "tcp://127.0.0.1:41000".into(),
            topic_type_name: "fleetsim.Pose2D".into(),
            node_name: "n1".into(),
        };
        let bytes = bincode::serialize(&req).unwrap();
        let back: DirectoryRequest = bincode::deserialize(&bytes).unwrap();
        match back {
            DirectoryRequest::AdvertiseTopic {
                topic_name,
                endpoint,
                topic_type_name,
                node_name,
            } => {
                assert_eq!(topic_name, "odom");
                assert_eq!(endpoint, "tcp://127.0.0.1:41000");
                assert_eq!(topic_type_name, "fleetsim.Pose2D");
                assert_eq!(node_name, "n1");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn answers_roundtrip() {
        let ans = ListTopicsAnswer {
            topics: vec![TopicEntry {
                name: "odom".into(),
                type_name: "fleetsim.Pose2D".into(),
                endpoints: vec!["tcp://127.0.0.1:41000".into()],
                publisher_names: vec!["n1".into()],
            }],
        };
        let bytes = bincode::serialize(&ans).unwrap();
        let back: ListTopicsAnswer = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.topics.len(), 1);
        assert_eq!(back.topics[0].endpoints.len(), back.topics[0].publisher_names.len());

        let gsi = GetServiceInfoAnswer {
            success: false,
            error_message: "unknown service".into(),
            service_endpoint: String::new(),
        };
        let back: GetServiceInfoAnswer =
            bincode::deserialize(&bincode::serialize(&gsi).unwrap()).unwrap();
        assert!(!back.success);
        assert_eq!(back.error_message, "unknown service");
    }

    #[test]
    fn service_reply_roundtrip() {
        let reply = ServiceReply::Failure(GenericAnswer::error("boom"));
        let back: ServiceReply = bincode::deserialize(&bincode::serialize(&reply).unwrap()).unwrap();
        match back {
            ServiceReply::Failure(ans) => {
                assert!(!ans.success);
                assert_eq!(ans.error_message, "boom");
            }
            other => panic!("wrong variant: {other:?}"),
        }
    }

    #[test]
    fn descriptor_equality_is_structural() {
        let a = MessageDescriptor::new("fleetsim.Twist2D")
            .field("linear", FieldKind::Repeated(Box::new(FieldKind::F64)))
            .field("angular", FieldKind::Repeated(Box::new(FieldKind::F64)));
        let b = MessageDescriptor::new("fleetsim.Twist2D")
            .field("linear", FieldKind::Repeated(Box::new(FieldKind::F64)))
            .field("angular", FieldKind::Repeated(Box::new(FieldKind::F64)));
        let c = MessageDescriptor::new("fleetsim.Twist2D")
            .field("linear", FieldKind::Repeated(Box::new(FieldKind::F64)));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn frame_roundtrip() {
        let (mut a, mut b) = tokio::io::duplex(1024);
        write_frame(&mut a, b"hello fabric").await.unwrap();
        let frame = read_frame(&mut b).await.unwrap();
        assert_eq!(frame, b"hello fabric");
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let (mut a, mut b) = tokio::io::duplex(64);
        // Forge a length prefix over the limit.
        use tokio::io::AsyncWriteExt;
        a.write_all(&(u32::MAX).to_le_bytes()).await.unwrap();
        let err = read_frame(&mut b).await.unwrap_err();
        assert!(matches!(err, FleetError::Transport(_)));
    }
}
