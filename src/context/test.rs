use std::sync::atomic::{AtomicUsize, Ordering};

use super::*;
use crate::cancel::CancellationSource;
use crate::harness::Harness;
use crate::http::BoundaryType;
use crate::io::{Readable, Writable};
use crate::native::memory::MemoryRequest;
use crate::native::{NativeStatus, SendFlags};
use crate::response::ResponseState;

#[tokio::test]
async fn abort_is_idempotent() {
    let h = Harness::new(Options::default());
    let mut ctx = h.get("/").await;
    let id = ctx.request_id();
    let token = ctx.disconnect_token();
    let handle = ctx.abort_handle();

    assert!(!token.is_cancelled());
    handle.abort();
    ctx.abort();
    assert!(ctx.is_aborted());
    assert!(handle.is_aborted());
    assert!(token.is_cancelled());
    assert!(h.transport.is_cancelled(id));

    let err = ctx.response_mut().body().write(b"x").await.unwrap_err();
    assert_eq!(err.native_status(), Some(NativeStatus::OPERATION_ABORTED));
    ctx.dispose().await;
    assert!(h.sends(id).is_empty());
}

#[tokio::test]
async fn completed_callbacks_run_once() {
    let h = Harness::new(Options::default());
    let mut ctx = h.get("/").await;
    let calls = Arc::new(AtomicUsize::new(0));

    for _ in 0..2 {
        let calls = calls.clone();
        ctx.response_mut().on_completed(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }
    ctx.response_mut().on_completed(|| Err("callback failed".into()));
    ctx.response_mut().on_completed(|| panic!("callback panicked"));

    ctx.abort();
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    ctx.dispose().await;
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn drop_without_dispose_aborts() {
    let h = Harness::new(Options::default());
    let mut ctx = h.get("/").await;
    let id = ctx.request_id();
    let token = ctx.disconnect_token();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    ctx.response_mut().on_completed(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    ctx.response_mut().body().write(b"never sent").await.unwrap();
    drop(ctx);

    assert!(token.is_cancelled());
    assert!(h.transport.is_cancelled(id));
    assert!(h.sends(id).is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dispose_sends_empty_response() {
    let h = Harness::new(Options::default());
    let ctx = h.get("/").await;
    let id = ctx.request_id();
    ctx.dispose().await;

    let sends = h.sends(id);
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].head.as_ref().unwrap().values("content-length"), ["0"]);
    assert!(sends[0].data.is_empty());
}

#[tokio::test]
async fn abort_cancels_final_write() {
    let h = Harness::new(Options::default());
    let mut ctx = h.get("/").await;
    let id = ctx.request_id();
    let handle = ctx.abort_handle();
    ctx.response_mut().body().write(b"held").await.unwrap();

    h.transport.hold_sends(true);
    let dispose = tokio::spawn(ctx.dispose());
    while h.transport.in_flight_sends() == 0 {
        tokio::task::yield_now().await;
    }

    handle.abort();
    dispose.await.unwrap();
    assert_eq!(h.transport.in_flight_sends(), 0);
    assert!(!h.transport.is_cancelled(id));
    assert!(h.sends(id).is_empty());
}

#[tokio::test]
async fn cancel_last_write_aborts_request() {
    let h = Harness::new(Options::default());
    let ctx = h.get("/").await;
    let id = ctx.request_id();
    let handle = ctx.abort_handle();

    h.transport.hold_sends(true);
    let dispose = tokio::spawn(ctx.dispose());
    while h.transport.in_flight_sends() == 0 {
        tokio::task::yield_now().await;
    }

    handle.cancel_last_write();
    dispose.await.unwrap();
    assert!(handle.is_aborted());
    assert_eq!(h.transport.in_flight_sends(), 0);
    assert!(h.sends(id).is_empty());
}

#[tokio::test]
async fn trace_identifier() {
    let h = Harness::new(Options::default());
    let ctx = h.get("/").await;
    assert_eq!(ctx.request_id(), 1);
    assert_eq!(ctx.trace_identifier(), "00000000-0000-0000-0000-000000000001");
    ctx.dispose().await;
}

#[tokio::test]
async fn client_disconnect_cancels_token() {
    let h = Harness::new(Options::default());
    let ctx = h.get("/").await;
    let connection = ctx.request().connection_id();
    let token = ctx.disconnect_token();

    h.transport.disconnect(connection);
    token.cancelled().await;
    assert!(!ctx.is_aborted());
    ctx.dispose().await;
}

#[tokio::test]
async fn connection_token_shared_by_requests() {
    let h = Harness::new(Options::default());
    let first = h.get("/").await;
    let connection = first.request().connection_id();
    let second = h.request(MemoryRequest::new("GET /2 HTTP/1.1\r\n\r\n").connection(connection)).await;
    let tokens = (first.disconnect_token(), second.disconnect_token());

    first.abort();
    assert!(tokens.0.is_cancelled());
    assert!(!tokens.1.is_cancelled());

    h.transport.disconnect(connection);
    tokens.1.cancelled().await;
    first.dispose().await;
    second.dispose().await;
}

#[tokio::test]
async fn registered_cancellation_aborts() {
    let h = Harness::new(Options::default());
    let ctx = h.get("/").await;
    let source = CancellationSource::new();
    let _registration = ctx.register_for_cancellation(source.token());

    source.cancel();
    ctx.disconnect_token().cancelled().await;
    assert!(ctx.is_aborted());
    ctx.dispose().await;
}

#[tokio::test]
async fn dropped_registration_is_inert() {
    let h = Harness::new(Options::default());
    let ctx = h.get("/").await;
    let source = CancellationSource::new();
    drop(ctx.register_for_cancellation(source.token()));

    source.cancel();
    tokio::task::yield_now().await;
    assert!(!ctx.is_aborted());
    ctx.dispose().await;
}

#[tokio::test]
async fn upgrade_to_opaque() {
    let h = Harness::new(Options::default());
    let mut ctx = h
        .request(MemoryRequest::new("GET /chat HTTP/1.1\r\nConnection: Upgrade\r\nUpgrade: echo\r\n\r\n").streaming())
        .await;
    let id = ctx.request_id();
    assert!(ctx.is_upgradable_request());

    ctx.response_mut().headers_mut().set("Upgrade", "echo").unwrap();
    ctx.response_mut().headers_mut().set("Connection", "Upgrade").unwrap();
    h.transport.push_body(id, &b"ping"[..]);

    let mut opaque = ctx.upgrade().await.unwrap();
    let mut buf = [0u8; 16];
    let n = opaque.read(&mut buf).await.unwrap();
    assert_eq!(&buf[..n], b"ping");
    opaque.write(b"pong").await.unwrap();

    let (read, write) = opaque.split();
    h.transport.push_body(id, &b"more"[..]);
    let n = Readable::read(read, &mut buf).await.unwrap();
    Writable::write(write, &buf[..n]).await.unwrap();

    assert_eq!(ctx.response().status_code(), 101);
    assert_eq!(ctx.response().boundary(), BoundaryType::Close);
    assert_eq!(ctx.response().state(), ResponseState::StartedSending);
    ctx.dispose().await;

    let sends = h.sends(id);
    assert_eq!(sends.len(), 4);
    let head = sends[0].head.as_ref().unwrap();
    assert_eq!(head.status, 101);
    assert_eq!(head.reason, "Switching Protocols");
    assert_eq!(head.values("upgrade"), ["echo"]);
    assert!(head.values("connection").is_empty());
    assert_eq!(head.unknown, [("Connection".to_owned(), "Upgrade".to_owned())]);
    assert_eq!(sends[0].flags, SendFlags::OPAQUE | SendFlags::MORE_DATA | SendFlags::BUFFER_DATA);
    assert_eq!(sends[1].data, b"pong");
    assert_eq!(sends[1].flags, SendFlags::MORE_DATA);
    assert_eq!(sends[2].data, b"more");
    assert_eq!(sends[3].flags, SendFlags::DISCONNECT);
}

#[tokio::test]
async fn upgrade_rejected() {
    let h = Harness::new(Options::default());

    let mut ctx = h
        .request(MemoryRequest::new("POST / HTTP/1.1\r\nContent-Length: 1\r\n\r\n").preload(&b"x"[..]))
        .await;
    assert!(!ctx.is_upgradable_request());
    let err = ctx.upgrade().await.unwrap_err();
    assert!(matches!(err, Error::Usage(UsageError::NotUpgradable)));
    ctx.dispose().await;

    let mut ctx = h.get("/").await;
    ctx.response_mut().start();
    let err = ctx.upgrade().await.unwrap_err();
    assert!(matches!(err, Error::Usage(UsageError::ResponseStarted)));
    ctx.dispose().await;

    h.transport.set_supports_opaque(false);
    let mut ctx = h.get("/").await;
    assert!(matches!(ctx.upgrade().await, Err(Error::Usage(UsageError::NotUpgradable))));
    ctx.dispose().await;
}

#[tokio::test]
async fn server_retries_with_larger_buffer() {
    let h = Harness::new(Options::default().with_request_buffer_size(32));
    let target = format!("/{}", "a".repeat(200));
    let ctx = h
        .request(MemoryRequest::new(format!("POST {target} HTTP/1.1\r\nContent-Length: 4\r\n\r\n")).preload(&b"body"[..]))
        .await;
    assert_eq!(ctx.request().path(), target);
    ctx.dispose().await;
}

#[tokio::test]
async fn server_rejects_malformed_request() {
    let h = Harness::new(Options::default());
    h.transport.push(MemoryRequest::new("GET  / HTTP/1.1\r\n\r\n"));
    h.transport.push(MemoryRequest::new("GET /ok HTTP/1.1\r\n\r\n"));

    let ctx = h.server.accept().await.unwrap();
    assert_eq!(ctx.request().path(), "/ok");
    ctx.dispose().await;

    let rejected = h.sends(1);
    assert_eq!(rejected.len(), 1);
    let head = rejected[0].head.as_ref().unwrap();
    assert_eq!(head.status, 400);
    assert_eq!(head.values("content-length"), ["0"]);
}

#[tokio::test]
async fn server_send_error_with_challenges() {
    let h = Harness::new(Options::default().with_authentication(|| vec!["Basic realm=\"x\"".to_owned()]));
    let ctx = h.get("/").await;
    let id = ctx.request_id();
    drop(ctx);

    h.transport.push(MemoryRequest::new("GET /again HTTP/1.1\r\n\r\n"));
    let ctx = h.server.accept().await.unwrap();
    h.server.send_error(ctx.request_id(), 401).await;
    let head = h.sends(ctx.request_id())[0].head.clone().unwrap();
    assert_eq!(head.status, 401);
    assert_eq!(head.values("www-authenticate"), ["Basic realm=\"x\""]);
    assert!(h.sends(id).is_empty());
    drop(ctx);
}

#[tokio::test]
async fn serve_until_closed() {
    let h = Harness::new(Options::default());
    let transport = h.transport.clone();
    transport.push(MemoryRequest::new("GET /a HTTP/1.1\r\n\r\n"));
    transport.push(MemoryRequest::new("GET /b HTTP/1.1\r\n\r\n"));

    let served = Arc::new(AtomicUsize::new(0));
    let counter = served.clone();
    let server = tokio::spawn(h.server.serve(move |mut ctx| {
        let counter = counter.clone();
        async move {
            let path = ctx.request().path().to_owned();
            let _ = ctx.response_mut().body().write(path.as_bytes()).await;
            counter.fetch_add(1, Ordering::SeqCst);
            ctx
        }
    }));

    while (1..=2).any(|id| transport.sends(id).is_empty()) {
        tokio::task::yield_now().await;
    }
    transport.close();
    server.await.unwrap().unwrap();

    assert_eq!(served.load(Ordering::SeqCst), 2);
    assert_eq!(transport.sends(1)[0].data, b"/a");
    assert_eq!(transport.sends(2)[0].data, b"/b");
}
