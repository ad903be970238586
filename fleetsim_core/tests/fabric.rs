//! End-to-end tests of the messaging fabric: a directory server plus a few
//! clients living in one process, each on its own ephemeral port.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use fleetsim_core::comms::endpoint::parse_tcp_endpoint;
use fleetsim_core::comms::protocol::{
    read_frame, write_frame, ServiceCall, ServiceReply,
};
use fleetsim_core::comms::{
    Client, DirectoryServer, FieldKind, MessageDescriptor, WireMessage,
};
use fleetsim_core::error::{FleetError, FleetResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct Odom {
    x: f64,
    y: f64,
    theta: f64,
}

impl WireMessage for Odom {
    fn descriptor() -> MessageDescriptor {
        MessageDescriptor::new("test.Odom")
            .field("x", FieldKind::F64)
            .field("y", FieldKind::F64)
            .field("theta", FieldKind::F64)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct AddRequest {
    a: i32,
    b: i32,
}

impl WireMessage for AddRequest {
    fn descriptor() -> MessageDescriptor {
        MessageDescriptor::new("test.AddRequest")
            .field("a", FieldKind::I32)
            .field("b", FieldKind::I32)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct AddReply {
    sum: i32,
}

impl WireMessage for AddReply {
    fn descriptor() -> MessageDescriptor {
        MessageDescriptor::new("test.AddReply").field("sum", FieldKind::I32)
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn spawn_directory() -> DirectoryServer {
    init_logging();
    DirectoryServer::spawn("127.0.0.1:0").expect("directory failed to start")
}

fn connected_client(name: &str, directory: &DirectoryServer) -> Client {
    let mut client =
        Client::with_directory(name, &directory.endpoint()).expect("client construction");
    client.connect().expect("client connect");
    client
}

#[test]
fn registration_and_node_listing() {
    let directory = spawn_directory();
    let client = connected_client("n1", &directory);

    assert!(client.connected());
    let nodes = client.request_list_of_nodes().unwrap();
    assert!(nodes.contains(&"n1".to_string()), "nodes = {nodes:?}");
}

#[test]
fn duplicate_node_name_is_rejected() {
    let directory = spawn_directory();
    let _first = connected_client("twin", &directory);

    let mut second = Client::with_directory("twin", &directory.endpoint()).unwrap();
    let err = second.connect().unwrap_err();
    assert!(matches!(err, FleetError::RegistrationRejected(_)), "{err}");
    assert!(!second.connected());
}

#[test]
fn duplicate_advertise_fails_but_first_publisher_survives() {
    let directory = spawn_directory();
    let mut client = connected_client("pub_node", &directory);

    client.advertise_topic::<Odom>("odom").unwrap();
    let err = client.advertise_topic::<Odom>("odom").unwrap_err();
    assert!(matches!(err, FleetError::DuplicateAdvertisement(_)), "{err}");

    // The first advertisement still works.
    client
        .publish("odom", &Odom {
            x: 1.0,
            y: 2.0,
            theta: 0.5,
        })
        .unwrap();
}

#[test]
fn publish_requires_advertise_and_matching_type() {
    let directory = spawn_directory();
    let mut client = connected_client("typed_node", &directory);

    let sample = Odom {
        x: 0.0,
        y: 0.0,
        theta: 0.0,
    };
    let err = client.publish("nowhere", &sample).unwrap_err();
    assert!(matches!(err, FleetError::TopicNotAdvertised(_)), "{err}");

    client.advertise_topic::<Odom>("odom").unwrap();
    let err = client
        .publish("odom", &AddRequest { a: 1, b: 2 })
        .unwrap_err();
    assert!(matches!(err, FleetError::TypeMismatch { .. }), "{err}");
}

#[test]
fn publish_subscribe_roundtrip() {
    let directory = spawn_directory();
    let mut publisher = connected_client("talker", &directory);
    let listener = connected_client("listener", &directory);

    publisher.advertise_topic::<Odom>("odom").unwrap();
    let subscription = listener.subscribe_topic::<Odom>("odom").unwrap();

    let sent = Odom {
        x: 3.5,
        y: -1.25,
        theta: 0.75,
    };

    // The subscriber connects asynchronously; keep publishing until the
    // first frame lands (at-most-once semantics drop anything sent before
    // the connection is up).
    let mut received = None;
    for _ in 0..100 {
        publisher.publish("odom", &sent).unwrap();
        if let Ok(msg) = subscription.recv_timeout(Duration::from_millis(50)) {
            received = Some(msg);
            break;
        }
    }

    let received = received.expect("no message received");
    assert_eq!(received, sent);
}

#[test]
fn subscribe_to_unknown_topic_fails() {
    let directory = spawn_directory();
    let client = connected_client("lonely", &directory);
    let err = client.subscribe_topic::<Odom>("ghost_topic").unwrap_err();
    assert!(matches!(err, FleetError::TopicNotAdvertised(_)), "{err}");
}

#[test]
fn service_roundtrip() {
    let directory = spawn_directory();
    let mut server = connected_client("adder", &directory);
    let caller = connected_client("caller", &directory);

    server
        .advertise_service("add", |req: AddRequest| {
            Ok(AddReply { sum: req.a + req.b })
        })
        .unwrap();

    let reply: AddReply = caller
        .call_service("add", &AddRequest { a: 2, b: 3 })
        .unwrap();
    assert_eq!(reply.sum, 5);
}

#[test]
fn unknown_service_name_fails_and_dispatcher_survives() {
    let directory = spawn_directory();
    let mut server = connected_client("adder", &directory);
    let caller = connected_client("caller", &directory);

    server
        .advertise_service("add", |req: AddRequest| {
            Ok(AddReply { sum: req.a + req.b })
        })
        .unwrap();

    // The directory has never heard of `mul`.
    let err = caller
        .call_service::<AddRequest, AddReply>("mul", &AddRequest { a: 1, b: 1 })
        .unwrap_err();
    assert!(matches!(err, FleetError::ServiceNotFound(_)), "{err}");

    // Reaching the node's REP socket with an unknown name answers a failure
    // instead of killing the dispatcher.
    let endpoint = server.service_endpoint().unwrap().to_string();
    let rt = tokio::runtime::Runtime::new().unwrap();
    let reply: ServiceReply = rt.block_on(async {
        let addr = parse_tcp_endpoint(&endpoint).unwrap();
        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let call = ServiceCall {
            service_name: "mul".to_string(),
            serialized_input: Vec::new(),
        };
        write_frame(&mut stream, &bincode::serialize(&call).unwrap())
            .await
            .unwrap();
        let frame = read_frame(&mut stream).await.unwrap();
        bincode::deserialize(&frame).unwrap()
    });
    match reply {
        ServiceReply::Failure(answer) => {
            assert!(!answer.success);
            assert!(answer.error_message.contains("mul"));
        }
        other => panic!("expected failure answer, got {other:?}"),
    }

    // And `add` still answers afterwards.
    let reply: AddReply = caller
        .call_service("add", &AddRequest { a: 40, b: 2 })
        .unwrap();
    assert_eq!(reply.sum, 42);
}

#[test]
fn duplicate_service_advertise_is_rejected() {
    let directory = spawn_directory();
    let mut server = connected_client("adder", &directory);

    server
        .advertise_service("add", |req: AddRequest| {
            Ok(AddReply { sum: req.a + req.b })
        })
        .unwrap();
    let err = server
        .advertise_service("add", |req: AddRequest| {
            Ok(AddReply { sum: req.a + req.b })
        })
        .unwrap_err();
    assert!(matches!(err, FleetError::DuplicateAdvertisement(_)), "{err}");
}

#[test]
fn handler_error_surfaces_as_service_call_failure() {
    let directory = spawn_directory();
    let mut server = connected_client("fragile", &directory);
    let caller = connected_client("caller", &directory);

    server
        .advertise_service("explode", |_req: AddRequest| -> FleetResult<AddReply> {
            Err(FleetError::ServiceCallFailed("handler exploded".into()))
        })
        .unwrap();

    let err = caller
        .call_service::<AddRequest, AddReply>("explode", &AddRequest { a: 0, b: 0 })
        .unwrap_err();
    match err {
        FleetError::ServiceCallFailed(msg) => assert!(msg.contains("handler exploded")),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn shutdown_is_idempotent_and_unregisters() {
    let directory = spawn_directory();
    let mut going = connected_client("short_lived", &directory);
    let staying = connected_client("observer", &directory);

    assert!(going.connected());
    going.shutdown();
    going.shutdown(); // no-op the second time
    assert!(!going.connected());

    let nodes = staying.request_list_of_nodes().unwrap();
    assert!(!nodes.contains(&"short_lived".to_string()), "nodes = {nodes:?}");
    assert!(nodes.contains(&"observer".to_string()));

    // A shut-down client refuses fabric operations.
    let err = going.request_list_of_nodes().unwrap_err();
    assert!(matches!(err, FleetError::Transport(_)), "{err}");
}

#[test]
fn node_name_is_reusable_after_shutdown() {
    let directory = spawn_directory();
    let mut first = connected_client("phoenix", &directory);
    first.shutdown();

    // The directory dropped the registration, so the name is free again.
    let _second = connected_client("phoenix", &directory);
}
