use std::sync::{Arc, Mutex};

use super::*;
use crate::harness::Harness;
use crate::headers::HeaderError;
use crate::native::memory::MemoryRequest;
use crate::native::NativeStatus;
use crate::Options;

#[test]
fn state_machine() {
    let mut state = StateMachine::new();
    assert_eq!(state.current(), ResponseState::Created);
    state.advance(ResponseState::Started).unwrap();
    state.advance(ResponseState::ComputedHeaders).unwrap();
    assert!(state.advance(ResponseState::Started).is_err());
    assert!(state.advance(ResponseState::ComputedHeaders).is_err());
    state.reset().unwrap();
    assert_eq!(state.current(), ResponseState::Created);

    state.advance(ResponseState::StartedSending).unwrap();
    let err = state.reset().unwrap_err();
    assert_eq!(err.from, ResponseState::StartedSending);
    assert_eq!(state.current(), ResponseState::StartedSending);
}

#[test]
fn buffer_builder() {
    let mut buffer = BufferBuilder::new();
    buffer.copy_and_add(b"abc");
    buffer.add(bytes::Bytes::from_static(b"de"));
    buffer.copy_and_add(b"");
    assert_eq!(buffer.total_bytes(), 5);
    assert_eq!(buffer.buffer_count(), 2);
    assert_eq!(buffer.segments()[1], &b"de"[..]);
    buffer.clear();
    assert!(buffer.is_empty());
    assert_eq!(buffer.buffer_count(), 0);
}

#[test]
fn chunk_framing() {
    use crate::native::DataChunk;

    assert_eq!(chunked::ChunkHeader::new(0).as_bytes(), b"0\r\n");
    assert_eq!(chunked::ChunkHeader::new(500).as_bytes(), b"1f4\r\n");
    assert_eq!(chunked::ChunkHeader::new(u64::MAX).as_bytes(), b"ffffffffffffffff\r\n");

    let header = chunked::ChunkHeader::new(5);
    let chunks = chunked::frame(&header, vec![DataChunk::Memory(b"hello")], true);
    let bytes: Vec<u8> = chunks
        .iter()
        .flat_map(|c| match c {
            DataChunk::Memory(b) => b.to_vec(),
            DataChunk::File { .. } => unreachable!(),
        })
        .collect();
    assert_eq!(bytes, b"5\r\nhello\r\n0\r\n\r\n");

    assert!(chunked::frame(&header, vec![], false).is_empty());
    assert_eq!(chunked::frame(&header, vec![], true).len(), 1);
}

#[tokio::test]
async fn buffered_body_gets_content_length() {
    let h = Harness::new(Options::default());
    let mut ctx = h.get("/").await;
    let id = ctx.request_id();

    ctx.response_mut().body().write(b"hello").await.unwrap();
    assert!(ctx.response().has_started());
    assert!(!ctx.response().has_started_sending());
    assert!(h.sends(id).is_empty());

    ctx.dispose().await;
    let sends = h.sends(id);
    assert_eq!(sends.len(), 1);
    let head = sends[0].head.as_ref().unwrap();
    assert_eq!(head.status, 200);
    assert_eq!(head.reason, "OK");
    assert_eq!(head.values("content-length"), ["5"]);
    assert!(head.values("transfer-encoding").is_empty());
    assert_eq!(sends[0].data, b"hello");
    assert_eq!(sends[0].flags, SendFlags::NONE);
}

#[tokio::test]
async fn flushed_body_is_chunked() {
    let h = Harness::new(Options::default());
    let mut ctx = h.get("/").await;
    let id = ctx.request_id();

    let mut body = ctx.response_mut().body();
    body.write(b"hello").await.unwrap();
    body.flush().await.unwrap();
    body.write(b"world").await.unwrap();
    assert_eq!(ctx.response().boundary(), BoundaryType::Chunked);

    ctx.dispose().await;
    let sends = h.sends(id);
    assert_eq!(sends.len(), 2);
    assert_eq!(sends[0].head.as_ref().unwrap().values("Transfer-Encoding"), ["chunked"]);
    assert_eq!(sends[0].flags, SendFlags::MORE_DATA);
    assert_eq!(sends[0].data, b"5\r\nhello\r\n");
    assert!(sends[1].head.is_none());
    assert_eq!(sends[1].flags, SendFlags::NONE);
    assert_eq!(sends[1].data, b"5\r\nworld\r\n0\r\n\r\n");

    let text = String::from_utf8(h.transport.response_bytes(id)).unwrap();
    assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(text.ends_with("\r\n\r\n5\r\nhello\r\n5\r\nworld\r\n0\r\n\r\n"));
}

#[tokio::test]
async fn large_write_bypasses_buffer() {
    let h = Harness::new(Options::default());
    let mut ctx = h.get("/").await;
    let id = ctx.request_id();

    let large = vec![b'x'; 5000];
    let mut body = ctx.response_mut().body();
    body.write(b"abc").await.unwrap();
    body.write(&large).await.unwrap();
    assert_eq!(body.stream().buffered(), 0);

    let sends = h.sends(id);
    assert_eq!(sends.len(), 1);
    assert!(sends[0].data.starts_with(b"138b\r\nabcxxx"));
    assert!(sends[0].data.ends_with(b"xxx\r\n"));
    ctx.dispose().await;
}

#[tokio::test]
async fn buffer_threshold_reached_across_writes() {
    let h = Harness::new(Options::default());
    let mut ctx = h.get("/").await;
    let id = ctx.request_id();

    let mut body = ctx.response_mut().body();
    body.write(&[b'a'; 4000]).await.unwrap();
    assert_eq!(h.sends(id).len(), 0);
    body.write(&[b'b'; 95]).await.unwrap();
    assert_eq!(h.sends(id).len(), 0);
    assert_eq!(body.stream().buffered(), 4095);

    body.write(b"c").await.unwrap();
    assert_eq!(body.stream().buffered(), 0);
    let sends = h.sends(id);
    assert_eq!(sends.len(), 1);
    assert!(sends[0].data.starts_with(b"1000\r\naaa"));
    assert!(sends[0].data.ends_with(b"bbc\r\n"));
    ctx.dispose().await;
}

#[tokio::test]
async fn unbuffered_writes_send_immediately() {
    let h = Harness::new(Options::default().with_buffer_responses(false));
    let mut ctx = h.get("/").await;
    let id = ctx.request_id();
    assert!(!ctx.response().should_buffer());

    ctx.response_mut().body().write(b"a").await.unwrap();
    ctx.response_mut().body().write_bytes(bytes::Bytes::from_static(b"bc")).await.unwrap();
    assert_eq!(h.sends(id).len(), 2);

    ctx.dispose().await;
    assert_eq!(h.body(id), b"1\r\na\r\n2\r\nbc\r\n0\r\n\r\n");
}

#[tokio::test]
async fn content_length_exact() {
    let h = Harness::new(Options::default());
    let mut ctx = h.get("/").await;
    let id = ctx.request_id();

    ctx.response_mut().set_content_length(Some(3)).unwrap();
    let mut body = ctx.response_mut().body();
    let err = body.write(b"abcd").await.unwrap_err();
    assert!(matches!(err, Error::Usage(UsageError::ContentLengthExceeded)));

    body.write(b"ab").await.unwrap();
    body.write(b"c").await.unwrap();
    assert!(body.stream().is_closed());
    assert_eq!(body.stream().left_to_write(), Some(0));

    let err = body.write(b"d").await.unwrap_err();
    assert!(matches!(err, Error::Usage(UsageError::ContentLengthExceeded)));

    ctx.dispose().await;
    let sends = h.sends(id);
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].flags, SendFlags::NONE);
    assert_eq!(sends[0].data, b"abc");
    assert_eq!(sends[0].head.as_ref().unwrap().values("content-length"), ["3"]);
}

#[tokio::test]
async fn content_length_short_aborts() {
    let h = Harness::new(Options::default());
    let mut ctx = h.get("/").await;
    let id = ctx.request_id();

    ctx.response_mut().set_content_length(Some(10)).unwrap();
    ctx.response_mut().body().write(b"abc").await.unwrap();
    ctx.dispose().await;

    assert!(h.sends(id).is_empty());
    assert!(h.transport.is_cancelled(id));
}

#[tokio::test]
async fn http10_closes_connection() {
    let h = Harness::new(Options::default());
    let mut ctx = h.request(MemoryRequest::new("GET / HTTP/1.0\r\n\r\n")).await;
    let id = ctx.request_id();

    let mut body = ctx.response_mut().body();
    body.write(b"hi").await.unwrap();
    body.flush().await.unwrap();
    body.write(b"!").await.unwrap();
    assert_eq!(ctx.response().boundary(), BoundaryType::Close);

    ctx.dispose().await;
    let sends = h.sends(id);
    assert_eq!(sends.len(), 2);
    assert_eq!(sends[0].head.as_ref().unwrap().values("connection"), ["close"]);
    assert_eq!(sends[0].flags, SendFlags::DISCONNECT | SendFlags::MORE_DATA);
    assert_eq!(sends[0].data, b"hi");
    assert_eq!(sends[1].flags, SendFlags::DISCONNECT);
    assert_eq!(sends[1].data, b"!");
}

#[tokio::test]
async fn connection_close_requested() {
    let h = Harness::new(Options::default());
    let mut ctx = h
        .request(MemoryRequest::new("GET / HTTP/1.1\r\nConnection: keep-alive, Close\r\n\r\n"))
        .await;
    let id = ctx.request_id();

    ctx.response_mut().body().write(b"bye").await.unwrap();
    ctx.dispose().await;

    let sends = h.sends(id);
    let head = sends[0].head.as_ref().unwrap();
    assert_eq!(head.values("connection"), ["close"]);
    assert_eq!(head.values("content-length"), ["3"]);
    assert_eq!(sends[0].flags, SendFlags::DISCONNECT);
}

#[tokio::test]
async fn app_connection_close_is_kept() {
    let h = Harness::new(Options::default());
    let mut ctx = h.get("/").await;
    let id = ctx.request_id();

    ctx.response_mut().headers_mut().set("Connection", "close").unwrap();
    ctx.dispose().await;

    let sends = h.sends(id);
    assert_eq!(sends[0].head.as_ref().unwrap().values("connection"), ["close"]);
    assert_eq!(sends[0].flags, SendFlags::DISCONNECT);
}

#[tokio::test]
async fn head_request_discards_body() {
    let h = Harness::new(Options::default());
    let mut ctx = h.request(MemoryRequest::new("HEAD / HTTP/1.1\r\n\r\n")).await;
    let id = ctx.request_id();

    ctx.response_mut().body().write(b"ignored").await.unwrap();
    ctx.dispose().await;

    let sends = h.sends(id);
    assert_eq!(sends.len(), 1);
    assert!(sends[0].data.is_empty());
    assert_eq!(sends[0].flags, SendFlags::NONE);
}

#[tokio::test]
async fn no_body_status_strips_framing() {
    let h = Harness::new(Options::default());
    let mut ctx = h.get("/").await;
    let id = ctx.request_id();

    let res = ctx.response_mut();
    res.set_status_code(204).unwrap();
    res.set_content_length(Some(4)).unwrap();
    res.body().write(b"body").await.unwrap();
    ctx.dispose().await;

    let sends = h.sends(id);
    let head = sends[0].head.as_ref().unwrap();
    assert_eq!(head.status, 204);
    assert_eq!(head.reason, "No Content");
    assert!(head.values("content-length").is_empty());
    assert!(head.values("transfer-encoding").is_empty());
    assert!(sends[0].data.is_empty());
}

#[tokio::test]
async fn pass_through_transfer_encoding() {
    let h = Harness::new(Options::default());
    let mut ctx = h.get("/").await;
    let id = ctx.request_id();

    let res = ctx.response_mut();
    res.headers_mut().set("Transfer-Encoding", "chunked").unwrap();
    res.body().write(b"3\r\nabc\r\n0\r\n\r\n").await.unwrap();
    ctx.dispose().await;

    assert_eq!(h.body(id), b"3\r\nabc\r\n0\r\n\r\n");
}

#[tokio::test]
async fn status_and_headers_lock_on_start() {
    let h = Harness::new(Options::default());
    let mut ctx = h.get("/").await;

    let res = ctx.response_mut();
    assert!(matches!(res.set_status_code(100), Err(Error::Usage(UsageError::InvalidStatusCode(100)))));
    assert!(matches!(res.set_status_code(1000), Err(Error::Usage(UsageError::InvalidStatusCode(1000)))));
    res.set_status_code(999).unwrap();
    assert_eq!(res.reason_phrase(), "");
    res.set_status_code(404).unwrap();
    assert_eq!(res.reason_phrase(), "Not Found");
    res.set_reason_phrase(Some("Gone Fishing".into())).unwrap();

    res.start();
    res.start();
    assert_eq!(res.state(), ResponseState::Started);
    assert!(matches!(res.set_status_code(200), Err(Error::Usage(UsageError::ResponseStarted))));
    assert_eq!(res.headers_mut().set("X-Late", "1"), Err(HeaderError::ReadOnly));
    assert!(res.headers().is_read_only());

    let id = ctx.request_id();
    ctx.dispose().await;
    let head = h.sends(id)[0].head.clone().unwrap();
    assert_eq!(head.status, 404);
    assert_eq!(head.reason, "Gone Fishing");
}

#[tokio::test]
async fn on_starting_runs_in_reverse() {
    let h = Harness::new(Options::default());
    let mut ctx = h.get("/").await;
    let id = ctx.request_id();
    let order = Arc::new(Mutex::new(Vec::new()));

    let res = ctx.response_mut();
    let first = order.clone();
    res.on_starting(move |res| {
        first.lock().unwrap().push(1);
        res.headers_mut().append("X-Order", "first").unwrap();
    })
    .unwrap();
    let second = order.clone();
    res.on_starting(move |res| {
        second.lock().unwrap().push(2);
        res.set_status_code(201).unwrap();
        res.headers_mut().append("X-Order", "second").unwrap();
    })
    .unwrap();

    res.body().write(b"x").await.unwrap();
    assert_eq!(*order.lock().unwrap(), [2, 1]);
    assert!(ctx.response_mut().on_starting(|_| {}).is_err());

    ctx.dispose().await;
    let head = h.sends(id)[0].head.clone().unwrap();
    assert_eq!(head.status, 201);
    assert_eq!(head.values("x-order"), ["second", "first"]);
}

#[tokio::test]
async fn on_starting_registered_while_starting() {
    let h = Harness::new(Options::default());
    let mut ctx = h.get("/").await;
    let id = ctx.request_id();
    let order = Arc::new(Mutex::new(Vec::new()));

    let outer = order.clone();
    ctx.response_mut()
        .on_starting(move |res| {
            outer.lock().unwrap().push("outer");
            let inner = outer.clone();
            res.on_starting(move |res| {
                inner.lock().unwrap().push("inner");
                res.set_status_code(202).unwrap();
            })
            .unwrap();
        })
        .unwrap();

    ctx.response_mut().start();
    assert_eq!(*order.lock().unwrap(), ["outer", "inner"]);
    assert!(ctx.response().has_started());

    ctx.dispose().await;
    assert_eq!(h.sends(id)[0].head.as_ref().unwrap().status, 202);
}

#[tokio::test]
async fn head_serialization() {
    let h = Harness::new(Options::default());
    let mut ctx = h.get("/").await;
    let id = ctx.request_id();

    let headers = ctx.response_mut().headers_mut();
    headers.set("Content-Type", "text/plain").unwrap();
    headers.append("Set-Cookie", "a=1").unwrap();
    headers.append("Set-Cookie", "b=2").unwrap();
    headers.append("X-Custom", "1").unwrap();
    headers.append("X-Custom", "2").unwrap();
    ctx.response_mut().set_cache_ttl(Some(std::time::Duration::from_secs(30))).unwrap();
    ctx.dispose().await;

    let head = h.sends(id)[0].head.clone().unwrap();
    assert_eq!(head.known[KnownHeader::ContentType.index()].as_deref(), Some("text/plain"));
    assert_eq!(head.known[KnownHeader::SetCookie.index()], None);
    assert_eq!(head.multi_known.len(), 1);
    assert_eq!(head.multi_known[0].id, KnownHeader::SetCookie);
    assert_eq!(head.multi_known[0].values, ["a=1", "b=2"]);
    assert!(head.multi_known[0].preserve_order);
    assert_eq!(
        head.unknown,
        [("X-Custom".to_owned(), "1".to_owned()), ("X-Custom".to_owned(), "2".to_owned())]
    );
    assert_eq!(head.cache_ttl, Some(std::time::Duration::from_secs(30)));
}

#[tokio::test]
async fn authentication_challenges() {
    let options = Options::default()
        .with_authentication(|| vec!["Negotiate".to_owned(), "NTLM".to_owned()]);
    let h = Harness::new(options);
    let mut ctx = h.get("/").await;
    let id = ctx.request_id();

    ctx.response_mut().set_status_code(401).unwrap();
    ctx.dispose().await;

    let head = h.sends(id)[0].head.clone().unwrap();
    assert_eq!(head.values("www-authenticate"), ["Negotiate", "NTLM"]);
}

#[tokio::test]
async fn reset_before_sending() {
    let h = Harness::new(Options::default());
    let mut ctx = h.get("/").await;
    let id = ctx.request_id();

    let res = ctx.response_mut();
    res.set_status_code(500).unwrap();
    res.headers_mut().set("X-Error", "1").unwrap();
    res.body().write(b"oops").await.unwrap();
    res.reset().unwrap();

    assert_eq!(res.state(), ResponseState::Created);
    assert_eq!(res.status_code(), 200);
    assert!(res.headers().is_empty());
    res.body().write(b"fine").await.unwrap();
    ctx.dispose().await;

    assert_eq!(h.body(id), b"fine");
    assert_eq!(h.sends(id)[0].head.as_ref().unwrap().status, 200);
}

#[tokio::test]
async fn reset_after_sending_aborts() {
    let h = Harness::new(Options::default());
    let mut ctx = h.get("/").await;

    ctx.response_mut().body().flush().await.unwrap();
    let err = ctx.response_mut().reset().unwrap_err();
    assert!(matches!(err, Error::Usage(UsageError::InvalidTransition(_))));
    assert!(ctx.is_aborted());
    ctx.dispose().await;
}

#[tokio::test]
async fn send_failure_aborts() {
    let h = Harness::new(Options::default());
    let mut ctx = h.get("/").await;
    let id = ctx.request_id();

    h.transport.fail_sends(Some(NativeStatus::NOT_FOUND));
    let err = ctx.response_mut().body().flush().await.unwrap_err();
    assert_eq!(err.native_status(), Some(NativeStatus::NOT_FOUND));
    assert!(ctx.is_aborted());
    assert!(h.transport.is_cancelled(id));

    let err = ctx.response_mut().body().write(b"x").await.unwrap_err();
    assert_eq!(err.native_status(), Some(NativeStatus::OPERATION_ABORTED));
    ctx.dispose().await;
}

#[tokio::test]
async fn ignored_send_failure() {
    let h = Harness::new(Options::default().with_ignore_write_errors(true));
    let mut ctx = h.get("/").await;

    h.transport.fail_sends(Some(NativeStatus::NOT_FOUND));
    ctx.response_mut().body().flush().await.unwrap();
    assert!(ctx.is_aborted());
    ctx.dispose().await;
}

#[tokio::test]
async fn final_send_disconnect_is_graceful() {
    let h = Harness::new(Options::default());
    let mut ctx = h.get("/").await;
    let id = ctx.request_id();

    ctx.response_mut().body().write(b"late").await.unwrap();
    h.transport.fail_sends(Some(NativeStatus::CONNECTION_INVALID));
    let aborted = ctx.abort_handle();
    ctx.dispose().await;

    assert!(!aborted.is_aborted());
    assert!(h.sends(id).is_empty());
}

#[tokio::test]
async fn send_file_ranges() {
    let path = std::env::temp_dir().join(format!("khttp-send-file-{}", std::process::id()));
    std::fs::write(&path, b"0123456789").unwrap();

    let h = Harness::new(Options::default());
    let mut ctx = h.get("/").await;
    let id = ctx.request_id();

    let mut body = ctx.response_mut().body();
    body.write(b"<").await.unwrap();
    body.send_file(&path, 2, Some(5)).await.unwrap();
    body.send_file(&path, 8, None).await.unwrap();
    body.send_file(&path, 10, Some(0)).await.unwrap();

    let err = body.send_file(&path, 11, None).await.unwrap_err();
    assert!(matches!(err, Error::Usage(UsageError::InvalidFileRange)));
    let err = body.send_file(&path, 5, Some(6)).await.unwrap_err();
    assert!(matches!(err, Error::Usage(UsageError::InvalidFileRange)));
    let err = body.send_file(path.with_extension("missing"), 0, None).await.unwrap_err();
    assert!(matches!(err, Error::File(_)));

    ctx.dispose().await;
    std::fs::remove_file(&path).unwrap();

    assert_eq!(h.body(id), b"1\r\n<\r\n5\r\n23456\r\n2\r\n89\r\n0\r\n\r\n");
    let sends = h.sends(id);
    assert!(sends[..3].iter().all(|f| f.flags.contains(SendFlags::MORE_DATA)));
}

#[tokio::test]
async fn send_file_content_length() {
    let path = std::env::temp_dir().join(format!("khttp-send-file-cl-{}", std::process::id()));
    std::fs::write(&path, b"abcdef").unwrap();

    let h = Harness::new(Options::default());
    let mut ctx = h.get("/").await;
    let id = ctx.request_id();

    ctx.response_mut().set_content_length(Some(4)).unwrap();
    let mut body = ctx.response_mut().body();
    let err = body.send_file(&path, 0, None).await.unwrap_err();
    assert!(matches!(err, Error::Usage(UsageError::ContentLengthExceeded)));
    body.send_file(&path, 1, Some(4)).await.unwrap();
    assert!(body.stream().is_closed());

    ctx.dispose().await;
    std::fs::remove_file(&path).unwrap();

    let sends = h.sends(id);
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].data, b"bcde");
    assert_eq!(sends[0].flags, SendFlags::NONE);
}
