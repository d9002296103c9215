//! Integration tests for graphwire.
//!
//! These tests drive a server over in-memory streams and check the encoded
//! bytes of the value codec against known layouts.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
use uuid::Uuid;

use graphwire::buffer::Buffer;
use graphwire::codec::{GraphBinary, TypeCode};
use graphwire::protocol::{
    args, encode_length_prefix, ops, FrameBuffer, HandshakeEncoder, MessageSerializer,
    RequestMessage, ResponseMessage, ResponseStatusCode,
};
use graphwire::session::{SingleTaskSession, TaskExecutor};
use graphwire::{Channel, OpRegistry, Server, Session, Value, WireError};

const CONTENT_TYPE: &str = "graph-bin";

/// Client end of an in-memory connection to a running server.
struct TestClient {
    stream: DuplexStream,
    handshake: HandshakeEncoder,
    serializer: MessageSerializer,
    frames: FrameBuffer,
    pending: VecDeque<Bytes>,
}

impl TestClient {
    fn connect(server: &Server) -> Self {
        let (ours, theirs) = duplex(256 * 1024);
        let server = server.clone();
        tokio::spawn(async move {
            let _ = server.serve_connection(theirs).await;
        });
        Self {
            stream: ours,
            handshake: HandshakeEncoder::new(CONTENT_TYPE).unwrap(),
            serializer: MessageSerializer::default(),
            frames: FrameBuffer::new(),
            pending: VecDeque::new(),
        }
    }

    async fn send(&mut self, request: &RequestMessage) {
        let body = self.serializer.serialize_request(request).unwrap();
        let frame = self.handshake.encode(&body);
        self.send_frame(&frame).await;
    }

    async fn send_frame(&mut self, frame: &[u8]) {
        let prefix = encode_length_prefix(frame.len()).unwrap();
        self.stream.write_all(&prefix).await.unwrap();
        self.stream.write_all(frame).await.unwrap();
    }

    /// Next response, or `None` once the server closed the connection.
    async fn recv(&mut self) -> Option<ResponseMessage> {
        loop {
            if let Some(body) = self.pending.pop_front() {
                return Some(self.serializer.deserialize_response(&body).unwrap());
            }
            let mut chunk = [0u8; 8192];
            let n = self.stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return None;
            }
            self.pending.extend(self.frames.push(&chunk[..n]).unwrap());
        }
    }
}

fn server() -> Server {
    Server::builder()
        .content_type(CONTENT_TYPE)
        .evaluation_timeout(Duration::from_secs(5))
        .handle("", |_request, ctx| async move { ctx.complete(Value::Null).await })
        .handle(ops::EVAL, |request, ctx| async move {
            let ms = request.arg_i64("sleep").unwrap_or(0) as u64;
            tokio::time::sleep(Duration::from_millis(ms)).await;
            let script = request.arg_str(args::GREMLIN).unwrap_or_default().to_string();
            ctx.complete(script).await
        })
        .handle("stream", |request, ctx| async move {
            let batches = request.arg_i64(args::BATCH_SIZE).unwrap_or(1) as i32;
            for i in 0..batches {
                ctx.write_partial(vec![i]).await?;
            }
            ctx.complete(vec![batches]).await
        })
        .handle("fail", |_request, _ctx| async {
            Err(WireError::Execution("graph exploded".into()))
        })
        .build()
        .unwrap()
}

fn encode(value: &Value) -> Vec<u8> {
    let codec = GraphBinary::default();
    let mut buf = Buffer::new();
    codec.writer.write(value, &mut buf).unwrap();
    buf.to_bytes().unwrap().to_vec()
}

/// Handshake then a request with op "" and no args is accepted.
#[tokio::test]
async fn test_handshake_and_empty_request() {
    let server = server();
    let mut client = TestClient::connect(&server);

    let request = RequestMessage::build("").create();
    let body = client.serializer.serialize_request(&request).unwrap();
    let frame = client.handshake.encode(&body);
    assert_eq!(frame[0], 9);
    assert_eq!(&frame[1..10], b"graph-bin");
    client.send_frame(&frame).await;

    let response = client.recv().await.unwrap();
    assert_eq!(response.request_id, Some(request.request_id));
    assert_eq!(response.code(), ResponseStatusCode::NoContent);
}

#[test]
fn test_uuid_layout() {
    let id = Uuid::parse_str("00112233-4455-6677-8899-aabbccddeeff").unwrap();
    let bytes = encode(&Value::Uuid(id));

    assert_eq!(bytes[0], TypeCode::Uuid.as_u8());
    assert_eq!(bytes[1], 0x00);
    assert_eq!(
        &bytes[2..],
        &[
            0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, 0xcc, 0xdd,
            0xee, 0xff
        ]
    );
}

#[test]
fn test_string_layout() {
    let bytes = encode(&Value::from("héllo"));
    assert_eq!(
        bytes,
        [0x03, 0x00, 0x00, 0x00, 0x00, 0x06, 0x68, 0xc3, 0xa9, 0x6c, 0x6c, 0x6f]
    );
}

#[test]
fn test_null_layout() {
    assert_eq!(encode(&Value::Null), [0xFE, 0x01]);
}

#[test]
fn test_single_entry_map_layout() {
    let map = Value::Map(vec![(Value::from("k"), Value::Int(1))]);
    let bytes = encode(&map);

    assert_eq!(
        bytes,
        [
            0x0A, 0x00, // map header
            0x00, 0x00, 0x00, 0x01, // one entry
            0x03, 0x00, 0x00, 0x00, 0x00, 0x01, 0x6b, // "k"
            0x01, 0x00, 0x00, 0x00, 0x00, 0x01, // 1
        ]
    );
}

#[test]
fn test_map_entry_promoted_to_map() {
    let codec = GraphBinary::default();
    let mut buf = Buffer::new();

    codec
        .writer
        .write(&Value::entry("k", 1i32), &mut buf)
        .unwrap();

    let read = codec.reader.read(&mut buf).unwrap();
    assert_eq!(read, Value::Map(vec![(Value::from("k"), Value::Int(1))]));
    assert_eq!(buf.readable_bytes(), 0);
}

/// A single-task session refuses a second task; the refusal is a 429 for
/// the same request id.
#[tokio::test]
async fn test_busy_session_replies_too_many_requests() {
    let server = server();
    let (ours, theirs) = duplex(64 * 1024);
    let (channel, _writer) = Channel::spawn(
        ours,
        server.serializer().clone(),
        server.settings().writer.clone(),
    );
    let mut peer = TestPeer::new(theirs);

    let mut registry = OpRegistry::new();
    registry.register(ops::EVAL, |_request, _ctx| async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(())
    });
    let executor = TaskExecutor::new(std::sync::Arc::new(registry), Duration::from_secs(5));
    let session = Session::Single(SingleTaskSession::new(channel.clone(), executor));

    let first = RequestMessage::build(ops::EVAL).create();
    let second = RequestMessage::build(ops::EVAL).create();
    let second_id = second.request_id;
    server.submit(&channel, &session, first).await.unwrap();
    server.submit(&channel, &session, second).await.unwrap();

    let busy = peer.recv().await;
    assert_eq!(busy.request_id, Some(second_id));
    assert_eq!(busy.code(), ResponseStatusCode::TooManyRequests);
    assert_eq!(peer.recv().await.code(), ResponseStatusCode::NoContent);
}

/// Reads responses from the far end of a bare channel.
struct TestPeer {
    stream: DuplexStream,
    frames: FrameBuffer,
    pending: VecDeque<Bytes>,
    serializer: MessageSerializer,
}

impl TestPeer {
    fn new(stream: DuplexStream) -> Self {
        Self {
            stream,
            frames: FrameBuffer::new(),
            pending: VecDeque::new(),
            serializer: MessageSerializer::default(),
        }
    }

    async fn recv(&mut self) -> ResponseMessage {
        loop {
            if let Some(body) = self.pending.pop_front() {
                return self.serializer.deserialize_response(&body).unwrap();
            }
            let mut chunk = [0u8; 8192];
            let n = self.stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "channel closed");
            self.pending.extend(self.frames.push(&chunk[..n]).unwrap());
        }
    }
}

/// A 100 ms budget on a 500 ms task yields 498; the session stays usable.
#[tokio::test(start_paused = true)]
async fn test_request_timeout_keeps_session_accepting() {
    let server = server();
    let mut client = TestClient::connect(&server);

    let slow = RequestMessage::build(ops::EVAL)
        .arg(args::SESSION, "s1")
        .arg(args::EVALUATION_TIMEOUT, 100i64)
        .arg("sleep", 500i64)
        .create();
    client.send(&slow).await;

    let response = client.recv().await.unwrap();
    assert_eq!(response.request_id, Some(slow.request_id));
    assert_eq!(response.code(), ResponseStatusCode::RequestTimeout);

    let next = RequestMessage::build(ops::EVAL)
        .arg(args::SESSION, "s1")
        .arg(args::GREMLIN, "g.V()")
        .create();
    client.send(&next).await;

    let response = client.recv().await.unwrap();
    assert_eq!(response.request_id, Some(next.request_id));
    assert_eq!(response.code(), ResponseStatusCode::Success);
    assert_eq!(response.result.data, Value::from("g.V()"));
    assert!(server.sessions().get("s1").is_some());
}

#[tokio::test]
async fn test_streaming_partial_content() {
    let server = server();
    let mut client = TestClient::connect(&server);

    let request = RequestMessage::build("stream")
        .arg(args::BATCH_SIZE, 3i32)
        .create();
    client.send(&request).await;

    for i in 0..3i32 {
        let partial = client.recv().await.unwrap();
        assert_eq!(partial.request_id, Some(request.request_id));
        assert_eq!(partial.code(), ResponseStatusCode::PartialContent);
        assert_eq!(partial.result.data, Value::from(vec![i]));
    }
    let last = client.recv().await.unwrap();
    assert_eq!(last.code(), ResponseStatusCode::Success);
    assert_eq!(last.result.data, Value::from(vec![3i32]));
}

#[tokio::test]
async fn test_handler_failure_carries_attributes() {
    let server = server();
    let mut client = TestClient::connect(&server);

    client.send(&RequestMessage::build("fail").create()).await;

    let response = client.recv().await.unwrap();
    assert_eq!(response.code(), ResponseStatusCode::ServerError);
    assert_eq!(
        response.status.message.as_deref(),
        Some("execution failed: graph exploded")
    );
    assert!(response.status.attributes.contains_key("exceptions"));
    assert!(response.status.attributes.contains_key("stackTrace"));
}

#[tokio::test]
async fn test_unknown_op_is_server_error() {
    let server = server();
    let mut client = TestClient::connect(&server);

    client.send(&RequestMessage::build("nope").create()).await;

    let response = client.recv().await.unwrap();
    assert_eq!(response.code(), ResponseStatusCode::ServerError);
    assert!(response.status.message.unwrap().contains("'nope'"));
}

#[tokio::test]
async fn test_close_op_ends_session() {
    let server = server();
    let mut client = TestClient::connect(&server);

    let open = RequestMessage::build(ops::EVAL)
        .arg(args::SESSION, "s2")
        .create();
    client.send(&open).await;
    assert_eq!(
        client.recv().await.unwrap().code(),
        ResponseStatusCode::Success
    );

    let close = RequestMessage::build(ops::CLOSE)
        .arg(args::SESSION, "s2")
        .create();
    client.send(&close).await;
    let response = client.recv().await.unwrap();
    assert_eq!(response.request_id, Some(close.request_id));
    assert_eq!(response.code(), ResponseStatusCode::NoContent);
    assert!(server.sessions().get("s2").is_none());
}

/// A zero content-type length is answered for the invalid sentinel, then
/// the connection is closed.
#[tokio::test]
async fn test_zero_content_type_length_closes_connection() {
    let server = server();
    let mut client = TestClient::connect(&server);

    client.send_frame(&[0x00, 0x81]).await;

    let response = client.recv().await.unwrap();
    assert_eq!(response.request_id, Some(Uuid::nil()));
    assert_eq!(response.code(), ResponseStatusCode::SerializationError);
    assert!(client.recv().await.is_none());
}

/// An undecodable body after the handshake is answered and the connection
/// stays open.
#[tokio::test]
async fn test_bad_body_keeps_connection() {
    let server = server();
    let mut client = TestClient::connect(&server);

    let mut first = vec![CONTENT_TYPE.len() as u8];
    first.extend_from_slice(CONTENT_TYPE.as_bytes());
    first.extend_from_slice(&[0x42, 0x00]);
    client.send_frame(&first).await;
    let _ = client.handshake.encode(&[]);

    let response = client.recv().await.unwrap();
    assert_eq!(response.code(), ResponseStatusCode::SerializationError);

    let request = RequestMessage::build("").create();
    client.send(&request).await;
    let response = client.recv().await.unwrap();
    assert_eq!(response.request_id, Some(request.request_id));
    assert_eq!(response.code(), ResponseStatusCode::NoContent);
}

#[tokio::test(start_paused = true)]
async fn test_session_lifetime_timeout() {
    let server = Server::builder()
        .content_type(CONTENT_TYPE)
        .evaluation_timeout(Duration::ZERO)
        .session_lifetime_timeout(Duration::from_millis(200))
        .handle(ops::EVAL, |_request, _ctx| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .build()
        .unwrap();
    let mut client = TestClient::connect(&server);

    let running = RequestMessage::build(ops::EVAL)
        .arg(args::SESSION, "s3")
        .create();
    let queued = RequestMessage::build(ops::EVAL)
        .arg(args::SESSION, "s3")
        .create();
    client.send(&running).await;
    client.send(&queued).await;

    let mut timed_out = vec![
        client.recv().await.unwrap(),
        client.recv().await.unwrap(),
    ];
    timed_out.sort_by_key(|r| r.request_id != Some(running.request_id));
    assert_eq!(timed_out[0].request_id, Some(running.request_id));
    assert_eq!(timed_out[1].request_id, Some(queued.request_id));
    assert!(timed_out
        .iter()
        .all(|r| r.code() == ResponseStatusCode::SessionTimeout));
    assert!(client.recv().await.is_none());
}

/// Args nested far past the depth limit are refused with 599 instead of
/// exhausting the stack, and the connection keeps serving.
#[tokio::test]
async fn test_deeply_nested_args_are_refused() {
    let server = server();
    let mut client = TestClient::connect(&server);

    let mut body = vec![0x81];
    body.extend_from_slice(Uuid::new_v4().as_bytes());
    body.extend_from_slice(&[0, 0, 0, 0]); // op ""
    body.extend_from_slice(&[0, 0, 0, 0]); // processor ""
    body.extend_from_slice(&[0, 0, 0, 1]); // one arg
    body.extend_from_slice(&[0x03, 0x00, 0, 0, 0, 1, b'x']);
    for _ in 0..100_000 {
        body.extend_from_slice(&[0x09, 0x00, 0x00, 0x00, 0x00, 0x01]);
    }
    body.extend_from_slice(&[0x01, 0x00, 0x00, 0x00, 0x00, 0x01]);
    let frame = client.handshake.encode(&body);
    client.send_frame(&frame).await;

    let response = client.recv().await.unwrap();
    assert_eq!(response.code(), ResponseStatusCode::SerializationError);

    let request = RequestMessage::build("").create();
    client.send(&request).await;
    let response = client.recv().await.unwrap();
    assert_eq!(response.request_id, Some(request.request_id));
}

/// A sessionless task is aborted when its client disconnects.
#[tokio::test(start_paused = true)]
async fn test_disconnect_aborts_sessionless_task() {
    let finished = Arc::new(AtomicBool::new(false));
    let flag = finished.clone();
    let server = Server::builder()
        .content_type(CONTENT_TYPE)
        .evaluation_timeout(Duration::ZERO)
        .handle(ops::EVAL, move |_request, _ctx| {
            let flag = flag.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }
        })
        .build()
        .unwrap();
    let mut client = TestClient::connect(&server);

    client.send(&RequestMessage::build(ops::EVAL).create()).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.sessions().running_singles(), 1);

    drop(client);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!finished.load(Ordering::SeqCst));
    assert_eq!(server.sessions().running_singles(), 0);
}
