//! Single-use HTTP endpoint that receives the SAML-POST redirect from the browser.
//!
//! The identity provider's login page ends with an auto-submitting form that
//! posts `SAMLResponse` to the configured URL. Pointing that URL at this
//! listener hands the assertion to the waiting CLI process.

use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http::{header, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::saml::decoder;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_CALLBACK_PATH: &str = "/";
pub const DEFAULT_BIND_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

const RECEIVED_PAGE: &str = "<html><body><h1>SAML response received</h1>\
<p>You can close this window and return to your terminal.</p></body></html>";
const ALREADY_RECEIVED_PAGE: &str = "<html><body><h1>SAML response already received</h1>\
<p>This login has completed. You can close this window.</p></body></html>";
const WAITING_PAGE: &str = "<html><body><h1>aws-saml-auth</h1>\
<p>Waiting for a SAML response. Complete the login in your identity provider.</p></body></html>";

const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(50);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

static LISTENER_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Held for the lifetime of a listener; at most one exists per process.
struct ActiveListenerGuard;

impl ActiveListenerGuard {
    fn acquire() -> Result<Self> {
        LISTENER_ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ActiveListenerGuard)
            .map_err(|_| Error::ListenerBusy)
    }
}

impl Drop for ActiveListenerGuard {
    fn drop(&mut self) {
        LISTENER_ACTIVE.store(false, Ordering::SeqCst);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Listening,
    Received,
    TimedOut,
    Closed,
}

#[derive(Debug, Clone)]
pub struct ListenerConfig {
    pub address: IpAddr,
    pub port: u16,
    pub path: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_BIND_ADDRESS,
            port: DEFAULT_PORT,
            path: DEFAULT_CALLBACK_PATH.to_string(),
        }
    }
}

#[derive(Deserialize)]
struct SamlForm {
    #[serde(rename = "SAMLResponse")]
    saml_response: String,
}

struct Callback {
    path: String,
    sender: Mutex<Option<oneshot::Sender<String>>>,
}

pub struct RedirectListener {
    listener: TcpListener,
    path: String,
    state: ListenerState,
    _guard: ActiveListenerGuard,
}

impl RedirectListener {
    pub async fn bind(config: &ListenerConfig) -> Result<Self> {
        let guard = ActiveListenerGuard::acquire()?;
        let listener = TcpListener::bind(SocketAddr::new(config.address, config.port))
            .await
            .map_err(Error::ListenerIo)?;
        debug!(state = ?ListenerState::Idle, path = %config.path, "redirect listener bound");
        Ok(Self {
            listener,
            path: config.path.clone(),
            state: ListenerState::Idle,
            _guard: guard,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(Error::ListenerIo)
    }

    pub fn state(&self) -> ListenerState {
        self.state
    }

    /// Serves requests until one carries a well-formed SAML response or `timeout` elapses.
    pub async fn wait_for_assertion(mut self, timeout: Duration) -> Result<String> {
        let (sender, receiver) = oneshot::channel();
        let callback = Arc::new(Callback {
            path: std::mem::take(&mut self.path),
            sender: Mutex::new(Some(sender)),
        });

        let listener = self.listener;
        let mut state = self.state;
        let mut advance = |next: ListenerState| {
            debug!(from = ?state, to = ?next, "redirect listener state");
            state = next;
        };

        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "waiting for SAML redirect");
        }
        advance(ListenerState::Listening);
        let server = tokio::spawn(accept_loop(listener, callback));

        let outcome = tokio::time::timeout(timeout, receiver).await;
        server.abort();
        let _ = server.await;

        let result = match outcome {
            Ok(Ok(assertion)) => {
                advance(ListenerState::Received);
                Ok(assertion)
            }
            Ok(Err(_)) => Err(Error::ListenerIo(std::io::Error::other(
                "redirect listener stopped before a SAML response arrived",
            ))),
            Err(_) => {
                advance(ListenerState::TimedOut);
                Err(Error::RedirectTimeout(timeout))
            }
        };
        advance(ListenerState::Closed);
        result
    }
}

/// Pause after `failures` consecutive accept errors, doubling up to one second.
fn accept_backoff(failures: u32) -> Duration {
    ACCEPT_BACKOFF_BASE
        .saturating_mul(2u32.saturating_pow(failures.saturating_sub(1)))
        .min(ACCEPT_BACKOFF_MAX)
}

async fn accept_loop(listener: TcpListener, callback: Arc<Callback>) {
    let mut failures = 0u32;
    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(conn) => {
                failures = 0;
                conn
            }
            Err(err) => {
                failures = failures.saturating_add(1);
                let delay = accept_backoff(failures);
                warn!(error = %err, ?delay, "failed to accept redirect connection");
                tokio::time::sleep(delay).await;
                continue;
            }
        };
        let callback = callback.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| handle_request(req, callback.clone()));
            if let Err(err) = http1::Builder::new()
                .keep_alive(false)
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!(%peer_addr, error = %err, "redirect connection error");
            }
        });
    }
}

fn html(status: StatusCode, body: &'static str) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from_static(body.as_bytes())));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("text/html; charset=utf-8"),
    );
    response
}

async fn handle_request(
    req: Request<Incoming>,
    callback: Arc<Callback>,
) -> std::result::Result<Response<Full<Bytes>>, Infallible> {
    if req.method() != Method::POST || req.uri().path() != callback.path {
        debug!(method = %req.method(), path = req.uri().path(), "ignoring redirect request");
        return Ok(html(StatusCode::OK, WAITING_PAGE));
    }

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            warn!(error = %err, "failed to read redirect body");
            return Ok(html(StatusCode::BAD_REQUEST, WAITING_PAGE));
        }
    };

    let assertion = match serde_urlencoded::from_bytes::<SamlForm>(&body) {
        Ok(form) => form.saml_response,
        Err(err) => {
            warn!(error = %err, "redirect POST did not carry a SAMLResponse field");
            return Ok(html(
                StatusCode::BAD_REQUEST,
                "<html><body><h1>Missing SAMLResponse</h1></body></html>",
            ));
        }
    };
    if let Err(err) = decoder::decode(&assertion) {
        warn!(error = %err, "redirect POST carried an unusable SAML response");
        return Ok(html(
            StatusCode::BAD_REQUEST,
            "<html><body><h1>Invalid SAML response</h1>\
<p>The response could not be decoded. Check the terminal for details.</p></body></html>",
        ));
    }

    let sender = callback
        .sender
        .lock()
        .map(|mut slot| slot.take())
        .unwrap_or_default();
    match sender {
        Some(sender) => {
            let _ = sender.send(assertion);
            Ok(html(StatusCode::OK, RECEIVED_PAGE))
        }
        None => Ok(html(StatusCode::OK, ALREADY_RECEIVED_PAGE)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saml::fixtures::{SamlFixture, LISTENER_SERIAL as SERIAL};
    use std::time::Instant;

    fn ephemeral() -> ListenerConfig {
        ListenerConfig {
            port: 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_times_out_after_bounded_wait() {
        let _serial = SERIAL.lock().await;
        let listener = RedirectListener::bind(&ephemeral()).await.unwrap();
        let addr = listener.local_addr().unwrap();

        let started = Instant::now();
        let result = listener
            .wait_for_assertion(Duration::from_millis(200))
            .await;
        let elapsed = started.elapsed();

        assert!(matches!(result, Err(Error::RedirectTimeout(_))));
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_secs(2));
        // socket released
        TcpListener::bind(addr).await.unwrap();
    }

    #[tokio::test]
    async fn test_post_unblocks_caller_with_exact_assertion() {
        let _serial = SERIAL.lock().await;
        let listener = RedirectListener::bind(&ephemeral()).await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        let assertion = SamlFixture::new(&["arn:aws:iam::111111111111:role/Admin"]).encoded();

        let waiter = tokio::spawn(listener.wait_for_assertion(Duration::from_secs(5)));
        let client = reqwest::Client::new();

        let info = client.get(&url).send().await.unwrap();
        assert_eq!(info.status(), reqwest::StatusCode::OK);
        assert!(info.text().await.unwrap().contains("Waiting for a SAML response"));

        let response = client
            .post(&url)
            .form(&[("SAMLResponse", assertion.as_str()), ("RelayState", "")])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert!(response.text().await.unwrap().contains("SAML response received"));

        assert_eq!(waiter.await.unwrap().unwrap(), assertion);
    }

    #[tokio::test]
    async fn test_invalid_post_keeps_waiting() {
        let _serial = SERIAL.lock().await;
        let listener = RedirectListener::bind(&ephemeral()).await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        let waiter = tokio::spawn(listener.wait_for_assertion(Duration::from_millis(500)));

        let client = reqwest::Client::new();
        let response = client
            .post(&url)
            .form(&[("SAMLResponse", "not-a-saml-response")])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let response = client
            .post(format!("{url}other"))
            .form(&[("SAMLResponse", "x")])
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);

        assert!(matches!(
            waiter.await.unwrap(),
            Err(Error::RedirectTimeout(_))
        ));
    }

    #[test]
    fn test_accept_backoff_grows_and_is_capped() {
        assert_eq!(accept_backoff(1), Duration::from_millis(50));
        assert_eq!(accept_backoff(2), Duration::from_millis(100));
        assert_eq!(accept_backoff(4), Duration::from_millis(400));
        assert_eq!(accept_backoff(6), Duration::from_secs(1));
        assert_eq!(accept_backoff(u32::MAX), Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_second_listener_is_busy() {
        let _serial = SERIAL.lock().await;
        let first = RedirectListener::bind(&ephemeral()).await.unwrap();
        assert_eq!(first.state(), ListenerState::Idle);
        assert!(matches!(
            RedirectListener::bind(&ephemeral()).await,
            Err(Error::ListenerBusy)
        ));
        drop(first);
        RedirectListener::bind(&ephemeral()).await.unwrap();
    }
}
