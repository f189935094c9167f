//! End-to-end tests for the proxy listener.
//!
//! A fake container engine is served by hyper on a Unix socket in a temporary
//! directory. The proxy listens on an ephemeral loopback port and clients talk
//! to it over real TCP connections.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bindmount_proxy::config::{ImageRule, MountSpec, ProxyConfig};
use bindmount_proxy::engine::{EngineConnector, UpstreamEndpoint};
use bindmount_proxy::policy::{BindMode, BindMountPolicy};
use bindmount_proxy::proxy::{BindMountRewriter, ReverseProxy, bind_listener, serve};
use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Incoming;
use hyper::header::{self, HeaderValue};
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UnixListener};
use tokio::sync::oneshot;

type EngineBody = Full<Bytes>;

/// Fake engine behaviour for one request.
async fn engine_service(
    mut req: Request<Incoming>,
) -> Result<Response<EngineBody>, Infallible> {
    let path = req.uri().path().to_owned();

    if path == "/containers/declined/attach" {
        let mut response = Response::new(Full::new(Bytes::from_static(
            b"{\"message\":\"No such container: declined\"}",
        )));
        *response.status_mut() = StatusCode::NOT_FOUND;
        return Ok(response);
    }

    if path.ends_with("/attach") {
        let on_upgrade = hyper::upgrade::on(&mut req);
        tokio::spawn(async move {
            let Ok(upgraded) = on_upgrade.await else {
                return;
            };
            let mut io = TokioIo::new(upgraded);
            if io.write_all(b"B").await.is_err() || io.flush().await.is_err() {
                return;
            }
            let mut received = Vec::new();
            if io.read_to_end(&mut received).await.is_err() {
                return;
            }
            let mut reply = b"echo:".to_vec();
            reply.extend_from_slice(&received);
            if io.write_all(&reply).await.is_ok() {
                drop(io.shutdown().await);
            }
        });

        let mut response = Response::new(Full::new(Bytes::new()));
        *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
        response
            .headers_mut()
            .insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
        response
            .headers_mut()
            .insert(header::UPGRADE, HeaderValue::from_static("tcp"));
        return Ok(response);
    }

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => Bytes::new(),
    };
    Ok(Response::new(Full::new(body)))
}

/// Running fake engine and proxy, torn down on drop.
struct Harness {
    proxy_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    _socket_dir: TempDir,
}

impl Drop for Harness {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            drop(tx.send(()));
        }
    }
}

async fn start_harness() -> Harness {
    let socket_dir = tempfile::tempdir().expect("failed to create socket dir");
    let socket_path = socket_dir.path().join("engine.sock");
    let engine = UnixListener::bind(&socket_path).expect("engine socket should bind");

    tokio::spawn(async move {
        while let Ok((stream, _)) = engine.accept().await {
            tokio::spawn(async move {
                drop(
                    hyper::server::conn::http1::Builder::new()
                        .serve_connection(
                            TokioIo::new(stream),
                            hyper::service::service_fn(engine_service),
                        )
                        .with_upgrades()
                        .await,
                );
            });
        }
    });

    let rules = ProxyConfig {
        bind_mounts: vec![ImageRule {
            image_pattern: String::from("myorg/worker.*"),
            mounts: vec![MountSpec {
                source: String::from("/opt/bin"),
                destination: String::from("/usr/bin/app"),
            }],
            env: Vec::new(),
        }],
    };
    let policy = BindMountPolicy::new(&rules, &BindMode::new("z")).expect("rules should compile");
    let connector = EngineConnector::new(
        UpstreamEndpoint::Unix(socket_path),
        Some(Duration::from_secs(5)),
    );
    let proxy = ReverseProxy::new(connector, BindMountRewriter::new(Arc::new(policy)));

    let listener = bind_listener("127.0.0.1:0")
        .await
        .expect("proxy listener should bind");
    let proxy_addr = listener.local_addr().expect("listener address");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    tokio::spawn(serve(listener, Arc::new(proxy), async move {
        drop(shutdown_rx.await);
    }));

    Harness {
        proxy_addr,
        shutdown: Some(shutdown_tx),
        _socket_dir: socket_dir,
    }
}

/// Sends one request to the proxy over a fresh client connection.
async fn send<B>(addr: SocketAddr, req: Request<B>) -> Response<Incoming>
where
    B: hyper::body::Body + Send + 'static,
    B::Data: Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let stream = TcpStream::connect(addr)
        .await
        .expect("proxy should accept connections");
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .expect("client handshake should succeed");
    tokio::spawn(async move {
        drop(conn.with_upgrades().await);
    });
    sender
        .send_request(req)
        .await
        .expect("request should get a response")
}

async fn collect_body(response: Response<Incoming>) -> Bytes {
    response
        .into_body()
        .collect()
        .await
        .expect("body should collect")
        .to_bytes()
}

#[tokio::test]
async fn create_request_gets_bind_mounts_injected() {
    let harness = start_harness().await;
    let req = Request::post("/v1.43/containers/create?name=w1")
        .header(header::HOST, "docker")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(
            json!({"Image": "myorg/worker:1", "Cmd": ["run"]}).to_string(),
        )))
        .expect("request should build");

    let response = send(harness.proxy_addr, req).await;

    assert_eq!(response.status(), StatusCode::OK);
    let seen: Value =
        serde_json::from_slice(&collect_body(response).await).expect("engine echoes JSON");
    assert_eq!(
        seen,
        json!({
            "Image": "myorg/worker:1",
            "Cmd": ["run"],
            "HostConfig": {"Binds": ["/opt/bin:/usr/bin/app:z"]}
        })
    );
}

#[tokio::test]
async fn unmatched_create_body_reaches_engine_byte_for_byte() {
    let harness = start_harness().await;
    let original = Bytes::from_static(b"{ \"Image\" : \"busybox\",\n  \"Tty\": true }");
    let req = Request::post("/containers/create")
        .header(header::HOST, "docker")
        .body(Full::new(original.clone()))
        .expect("request should build");

    let response = send(harness.proxy_addr, req).await;

    assert_eq!(collect_body(response).await, original);
}

#[tokio::test]
async fn upgraded_session_relays_bytes_and_half_close() {
    let harness = start_harness().await;
    let req = Request::post("/containers/abc/attach?stream=1&stdin=1")
        .header(header::HOST, "docker")
        .header(header::CONNECTION, "Upgrade")
        .header(header::UPGRADE, "tcp")
        .body(Empty::<Bytes>::new())
        .expect("request should build");

    let response = send(harness.proxy_addr, req).await;
    assert_eq!(response.status(), StatusCode::SWITCHING_PROTOCOLS);
    assert_eq!(
        response.headers().get(header::UPGRADE),
        Some(&HeaderValue::from_static("tcp"))
    );

    let upgraded = hyper::upgrade::on(response)
        .await
        .expect("client side should upgrade");
    let mut io = TokioIo::new(upgraded);
    io.write_all(b"A").await.expect("client write");
    io.shutdown().await.expect("client half-close");

    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), io.read_to_end(&mut received))
        .await
        .expect("session should finish")
        .expect("client read");

    assert_eq!(received, b"Becho:A");
}

#[tokio::test]
async fn declined_upgrade_returns_engine_response() {
    let harness = start_harness().await;
    let req = Request::post("/containers/declined/attach")
        .header(header::HOST, "docker")
        .header(header::CONNECTION, "Upgrade")
        .header(header::UPGRADE, "tcp")
        .body(Empty::<Bytes>::new())
        .expect("request should build");

    let response = send(harness.proxy_addr, req).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        collect_body(response).await,
        Bytes::from_static(b"{\"message\":\"No such container: declined\"}")
    );
}
