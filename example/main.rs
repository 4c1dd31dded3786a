use khttp::{
    Options, Readable, RequestContext, Server,
    native::{MemoryTransport, memory::MemoryRequest},
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), khttp::Error> {
    env_logger::init();

    let transport = Arc::new(MemoryTransport::new());
    let ids = [
        transport.push(MemoryRequest::new("GET /app/hello?name=world HTTP/1.1\r\nHost: localhost\r\n\r\n")),
        transport.push(MemoryRequest::new("HEAD /app/hello HTTP/1.1\r\nHost: localhost\r\n\r\n")),
        transport.push(
            MemoryRequest::new("POST /app/echo HTTP/1.1\r\nHost: localhost\r\nContent-Length: 11\r\n\r\n")
                .preload(&b"hello "[..])
                .body(&b"world"[..]),
        ),
        transport.push(MemoryRequest::new("GET /app/stream HTTP/1.0\r\nHost: localhost\r\n\r\n")),
    ];

    let options = Options::new().with_url_prefix("/app");
    let server = tokio::spawn(Server::new(transport.clone(), options).serve(routes));

    while ids.iter().any(|&id| transport.sends(id).is_empty()) {
        tokio::task::yield_now().await;
    }
    transport.close();
    server.await.expect("server task panicked")?;

    for id in ids {
        println!("{}", String::from_utf8_lossy(&transport.response_bytes(id)));
    }
    Ok(())
}

async fn routes(mut ctx: RequestContext) -> RequestContext {
    let path = ctx.request().path().to_owned();
    log::info!("{} {}", ctx.request().raw_method(), path);

    let result = match path.as_str() {
        "/hello" => hello(&mut ctx).await,
        "/echo" => echo(&mut ctx).await,
        "/stream" => stream(&mut ctx).await,
        _ => not_found(&mut ctx),
    };
    if let Err(err) = result {
        log::error!("{}: {err}", ctx.trace_identifier());
        ctx.abort();
    }
    ctx
}

// ===== Routes =====

async fn hello(ctx: &mut RequestContext) -> Result<(), khttp::Error> {
    let name = ctx.request().query().strip_prefix("?name=").unwrap_or("anonymous").to_owned();
    let res = ctx.response_mut();
    res.headers_mut().set("Content-Type", "text/plain")?;
    res.body().write(format!("Hello {name}!").as_bytes()).await
}

async fn echo(ctx: &mut RequestContext) -> Result<(), khttp::Error> {
    let (req, res) = ctx.parts_mut();
    let mut body = Vec::new();
    req.body().read_to_end(&mut body).await?;

    res.set_content_length(Some(body.len() as u64))?;
    res.body().write(&body).await
}

async fn stream(ctx: &mut RequestContext) -> Result<(), khttp::Error> {
    let mut body = ctx.response_mut().body();
    for part in ["one\n", "two\n", "three\n"] {
        body.write(part.as_bytes()).await?;
        body.flush().await?;
    }
    Ok(())
}

fn not_found(ctx: &mut RequestContext) -> Result<(), khttp::Error> {
    ctx.response_mut().set_status_code(404)
}
