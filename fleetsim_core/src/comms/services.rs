//! Per-client registry of offered services and the dispatcher task.
//!
//! All services of a node share one REP socket; the dispatcher serves
//! requests strictly sequentially, so a handler that blocks stalls every
//! service of the node. That lockstep is the documented contract of the
//! REQ/REP pair.

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, error, warn};
use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::comms::protocol::{self, GenericAnswer, MessageDescriptor, ServiceCall, ServiceReply};
use crate::error::{FleetError, FleetResult};

/// Type-erased service handler: serialized request in, serialized reply out.
pub type ServiceHandler = Arc<dyn Fn(&[u8]) -> FleetResult<Vec<u8>> + Send + Sync>;

/// Book-keeping for one offered service.
pub struct OfferedService {
    pub name: String,
    pub input: MessageDescriptor,
    pub output: MessageDescriptor,
    pub handler: ServiceHandler,
}

/// Shared map of offered services. The dispatcher takes shared access around
/// the lookup; only advertise takes exclusive access.
pub type ServiceMap = Arc<RwLock<HashMap<String, OfferedService>>>;

/// Serve the node's REP socket until the shutdown signal fires.
///
/// Connections are accepted and drained one at a time; each caller opens a
/// fresh REQ connection, sends one or more calls in lockstep and closes.
pub(crate) async fn dispatcher_loop(
    listener: TcpListener,
    services: ServiceMap,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let stream = tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, _peer)) => stream,
                Err(e) => {
                    warn!("service dispatcher accept failed: {e}");
                    continue;
                }
            },
        };
        match serve_connection(stream, &services, shutdown.clone()).await {
            Ok(()) => {}
            // Terminating signal: normal exit, keep quiet.
            Err(FleetError::Terminated) => break,
            Err(e) => debug!("service connection closed: {e}"),
        }
    }
    debug!("service dispatcher exiting");
}

/// Serve one caller connection request-by-request until it closes.
pub(crate) async fn serve_connection<S: AsyncRead + AsyncWrite + Unpin>(
    mut stream: S,
    services: &ServiceMap,
    mut shutdown: watch::Receiver<bool>,
) -> FleetResult<()> {
    loop {
        let frame = tokio::select! {
            _ = shutdown.changed() => return Err(FleetError::Terminated),
            frame = protocol::read_frame(&mut stream) => match frame {
                Ok(frame) => frame,
                Err(FleetError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    // Caller hung up between requests.
                    return Ok(());
                }
                Err(e) => return Err(e),
            },
        };

        let call: ServiceCall = bincode::deserialize(&frame)?;

        let handler = {
            let map = services.read();
            map.get(&call.service_name).map(|s| Arc::clone(&s.handler))
        };

        let reply = match handler {
            None => {
                let msg = format!("requested unknown service `{}`", call.service_name);
                error!("{msg}");
                ServiceReply::Failure(GenericAnswer::error(msg))
            }
            Some(handler) => match handler(&call.serialized_input) {
                Ok(bytes) => ServiceReply::Output(bytes),
                Err(e) => {
                    warn!("service `{}` handler failed: {e}", call.service_name);
                    ServiceReply::Failure(GenericAnswer::error(e.to_string()))
                }
            },
        };

        protocol::write_frame(&mut stream, &bincode::serialize(&reply)?).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comms::protocol::{read_frame, write_frame};

    fn service_map_with_echo() -> ServiceMap {
        let map: ServiceMap = Arc::new(RwLock::new(HashMap::new()));
        let handler: ServiceHandler = Arc::new(|bytes: &[u8]| Ok(bytes.to_vec()));
        map.write().insert(
            "echo".to_string(),
            OfferedService {
                name: "echo".to_string(),
                input: MessageDescriptor::new("test.Echo"),
                output: MessageDescriptor::new("test.Echo"),
                handler,
            },
        );
        map
    }

    async fn call(
        stream: &mut (impl AsyncRead + AsyncWrite + Unpin),
        name: &str,
        input: &[u8],
    ) -> ServiceReply {
        let call = ServiceCall {
            service_name: name.to_string(),
            serialized_input: input.to_vec(),
        };
        write_frame(stream, &bincode::serialize(&call).unwrap())
            .await
            .unwrap();
        let frame = read_frame(stream).await.unwrap();
        bincode::deserialize(&frame).unwrap()
    }

    #[tokio::test]
    async fn known_service_echoes() {
        let services = service_map_with_echo();
        let (mut caller, server) = tokio::io::duplex(4096);
        let (_tx, rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let _ = serve_connection(server, &services, rx).await;
        });

        match call(&mut caller, "echo", b"ping").await {
            ServiceReply::Output(bytes) => assert_eq!(bytes, b"ping"),
            other => panic!("unexpected reply: {other:?}"),
        }
        drop(caller);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn unknown_service_answers_failure_and_survives() {
        let services = service_map_with_echo();
        let (mut caller, server) = tokio::io::duplex(4096);
        let (_tx, rx) = watch::channel(false);
        let services_clone = Arc::clone(&services);
        let task = tokio::spawn(async move {
            let _ = serve_connection(server, &services_clone, rx).await;
        });

        match call(&mut caller, "no_such_service", b"").await {
            ServiceReply::Failure(ans) => {
                assert!(!ans.success);
                assert!(ans.error_message.contains("no_such_service"));
            }
            other => panic!("unexpected reply: {other:?}"),
        }

        // The dispatcher kept the connection and still serves known services.
        match call(&mut caller, "echo", b"still alive").await {
            ServiceReply::Output(bytes) => assert_eq!(bytes, b"still alive"),
            other => panic!("unexpected reply: {other:?}"),
        }
        drop(caller);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn handler_error_becomes_failure_answer() {
        let map: ServiceMap = Arc::new(RwLock::new(HashMap::new()));
        let handler: ServiceHandler =
            Arc::new(|_: &[u8]| Err(FleetError::ServiceCallFailed("handler exploded".into())));
        map.write().insert(
            "fragile".to_string(),
            OfferedService {
                name: "fragile".to_string(),
                input: MessageDescriptor::new("test.In"),
                output: MessageDescriptor::new("test.Out"),
                handler,
            },
        );

        let (mut caller, server) = tokio::io::duplex(4096);
        let (_tx, rx) = watch::channel(false);
        let task = tokio::spawn(async move {
            let _ = serve_connection(server, &map, rx).await;
        });

        match call(&mut caller, "fragile", b"x").await {
            ServiceReply::Failure(ans) => {
                assert!(ans.error_message.contains("handler exploded"));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
        drop(caller);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn shutdown_signal_is_a_silent_exit() {
        let services = service_map_with_echo();
        let (caller, server) = tokio::io::duplex(4096);
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(async move { serve_connection(server, &services, rx).await });

        tx.send(true).unwrap();
        let result = task.await.unwrap();
        assert!(matches!(result, Err(FleetError::Terminated)));
        drop(caller);
    }
}
