//! Echo protocol over an upgraded connection.
use khttp::{
    Options, RequestContext, Server,
    native::{MemoryTransport, memory::MemoryRequest},
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), khttp::Error> {
    env_logger::init();

    let transport = Arc::new(MemoryTransport::new());
    let id = transport.push(
        MemoryRequest::new("GET /echo HTTP/1.1\r\nHost: localhost\r\nConnection: Upgrade\r\nUpgrade: echo\r\n\r\n")
            .streaming(),
    );
    transport.push_body(id, &b"ping\n"[..]);
    transport.push_body(id, &b"pong\n"[..]);
    transport.finish_body(id);

    let server = tokio::spawn(Server::new(transport.clone(), Options::new()).serve(echo));
    while !transport.sends(id).iter().any(|frame| !frame.flags.contains(khttp::native::SendFlags::MORE_DATA)) {
        tokio::task::yield_now().await;
    }
    transport.close();
    server.await.expect("server task panicked")?;

    println!("{}", String::from_utf8_lossy(&transport.response_bytes(id)));
    Ok(())
}

async fn echo(mut ctx: RequestContext) -> RequestContext {
    if !ctx.is_upgradable_request() {
        let _ = ctx.response_mut().set_status_code(400);
        return ctx;
    }
    if let Err(err) = ctx.response_mut().headers_mut().set("Upgrade", "echo") {
        log::error!("{err}");
        return ctx;
    }

    let mut stream = match ctx.upgrade().await {
        Ok(stream) => stream,
        Err(err) => {
            log::error!("upgrade failed: {err}");
            return ctx;
        }
    };

    let mut buf = [0u8; 1024];
    loop {
        match stream.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if let Err(err) = stream.write(&buf[..n]).await {
                    log::error!("write failed: {err}");
                    break;
                }
            }
            Err(err) => {
                log::error!("read failed: {err}");
                break;
            }
        }
    }
    drop(stream);
    ctx
}
