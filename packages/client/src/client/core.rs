//! The HTTP client engine.
//!
//! [`HttpClient`] owns the connection pool, the connector, and the shared
//! buffer pool. All request entry points funnel through the same dispatch
//! loop: resolve the request, check a connection out of the pool, run one
//! exchange, and either follow a redirect or hand the response back. The
//! buffered path aggregates the body under the content-length cap; the
//! streaming path hands the still-open connection to a pump task and yields
//! chunks with single-chunk backpressure.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use http::header::{CONTENT_TYPE, LOCATION, REFERER, USER_AGENT};
use http::{HeaderValue, Method, StatusCode};
use tokio::sync::mpsc;
use url::Url;

use crate::client::aggregate;
use crate::client::stats::PoolStats;
use crate::config::{BufferPool, HttpConfig};
use crate::connect::Connector;
use crate::error::{HttpError, Result};
use crate::http::request::{FrozenRequest, WireBody};
use crate::http::{IntoUrl, ReceivedResponse, RequestSpec};
use crate::pool::{Checkout, ConnectionPool, PoolKey, PooledConn};
use crate::protocols::{BodyLen, H1Connection, ResponseHead};
use crate::redirect::{
    make_referer, remove_sensitive_headers, ActionKind, Policy, TooManyRedirects,
};
use crate::streaming::{body_channel, StreamedResponse};

/// An asynchronous HTTP/1.1 client with keep-alive connection pooling.
///
/// Cloning is cheap: clones share the pool, its statistics, and the buffer
/// pool. Construction must happen inside a Tokio runtime, since the pool
/// spawns its idle sweeper at that point.
#[derive(Clone)]
pub struct HttpClient {
    config: HttpConfig,
    connector: Connector,
    pool: Arc<ConnectionPool>,
    buffers: Arc<BufferPool>,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Create a client with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::build(HttpConfig::default())
    }

    /// Create a client with a custom configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` when the configuration fails validation.
    pub fn with_config(config: HttpConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| HttpError::invalid_request(format!("invalid configuration: {e}")))?;
        Ok(Self::build(config))
    }

    fn build(config: HttpConfig) -> Self {
        let connector = Connector::new(&config);
        let pool = ConnectionPool::new(&config);
        let buffers = Arc::new(BufferPool::new(config.buffers.clone()));
        Self {
            config,
            connector,
            pool,
            buffers,
        }
    }

    /// The configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &HttpConfig {
        &self.config
    }

    /// Live pool counters.
    #[must_use]
    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// GET a URL and aggregate the response body.
    pub async fn get(&self, url: impl IntoUrl) -> Result<ReceivedResponse> {
        self.request(url, |_| {}).await
    }

    /// GET a URL with a configured request.
    pub async fn get_with(
        &self,
        url: impl IntoUrl,
        configure: impl FnOnce(&mut RequestSpec),
    ) -> Result<ReceivedResponse> {
        self.request(url, configure).await
    }

    /// POST to a URL with a configured request.
    pub async fn post(
        &self,
        url: impl IntoUrl,
        configure: impl FnOnce(&mut RequestSpec),
    ) -> Result<ReceivedResponse> {
        let (frozen, timeout, policy) = self.prepare(Method::POST, url, configure)?;
        self.execute_buffered(frozen, timeout, policy).await
    }

    /// Issue a request and aggregate the response body. The method defaults
    /// to GET; the configure callback may change it along with anything else
    /// on the [`RequestSpec`].
    pub async fn request(
        &self,
        url: impl IntoUrl,
        configure: impl FnOnce(&mut RequestSpec),
    ) -> Result<ReceivedResponse> {
        let (frozen, timeout, policy) = self.prepare(Method::GET, url, configure)?;
        self.execute_buffered(frozen, timeout, policy).await
    }

    /// Issue a request and stream the response body without buffering it.
    ///
    /// The timeout covers the exchange through the response head; body
    /// chunks arrive for as long as the consumer keeps reading. Dropping the
    /// returned stream mid-body closes the connection.
    pub async fn request_stream(
        &self,
        url: impl IntoUrl,
        configure: impl FnOnce(&mut RequestSpec),
    ) -> Result<StreamedResponse> {
        let (frozen, timeout, policy) = self.prepare(Method::GET, url, configure)?;
        let (head, conn) = match tokio::time::timeout(timeout, self.dispatch(frozen, &policy)).await
        {
            Ok(result) => result?,
            Err(_) => return Err(HttpError::Timeout(timeout)),
        };

        let (tx, body) = body_channel();
        tokio::spawn(pump_body(conn, tx));
        Ok(StreamedResponse::new(
            head.status,
            head.version,
            head.headers,
            body,
        ))
    }

    /// Resolve a spec into its frozen form plus the effective timeout and
    /// redirect policy.
    fn prepare(
        &self,
        method: Method,
        url: impl IntoUrl,
        configure: impl FnOnce(&mut RequestSpec),
    ) -> Result<(FrozenRequest, Duration, Policy)> {
        let url = url.into_url()?;
        let mut spec = RequestSpec::new(method, url);
        configure(&mut spec);
        spec.validate()?;

        let timeout = spec.timeout.unwrap_or(self.config.request_timeout);
        let policy = match (spec.follow_redirects, spec.max_redirects) {
            (Some(false), _) => Policy::none(),
            (_, Some(max)) => Policy::limited(max),
            _ => self.config.redirect.clone(),
        };

        let mut frozen = spec.freeze()?;
        if !frozen.headers.contains_key(USER_AGENT) {
            if let Ok(value) = HeaderValue::from_str(&self.config.user_agent) {
                frozen.headers.insert(USER_AGENT, value);
            }
        }
        Ok((frozen, timeout, policy))
    }

    async fn execute_buffered(
        &self,
        frozen: FrozenRequest,
        timeout: Duration,
        policy: Policy,
    ) -> Result<ReceivedResponse> {
        let exchange = async {
            let (head, mut conn) = self.dispatch(frozen, &policy).await?;
            let body = aggregate::read_capped(&mut conn, self.config.max_content_length).await?;
            conn.release();
            Ok(ReceivedResponse::new(
                head.status,
                head.version,
                head.headers,
                body,
            ))
        };
        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(HttpError::Timeout(timeout)),
        }
    }

    /// Run exchanges until a non-redirect response arrives or the policy
    /// ends the chain.
    async fn dispatch(
        &self,
        mut frozen: FrozenRequest,
        policy: &Policy,
    ) -> Result<(ResponseHead, PooledConn)> {
        let mut visited: Vec<Url> = Vec::new();
        loop {
            let (head, mut conn) = self.send_once(&mut frozen).await?;

            if !head.status.is_redirection() {
                return Ok((head, conn));
            }
            // A 3xx without a Location is an ordinary response.
            let Some(location) = head
                .headers
                .get(LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned)
            else {
                return Ok((head, conn));
            };
            let next = frozen.url.join(&location).map_err(|e| {
                HttpError::protocol(format!("invalid redirect location `{location}`: {e}"))
            })?;

            visited.push(frozen.url.clone());
            match policy.check(head.status, &next, &visited) {
                ActionKind::Follow => {
                    // The redirect body is discarded; reuse the connection
                    // only if it drains within the cap.
                    match aggregate::drain_capped(&mut conn, self.config.max_content_length).await
                    {
                        Ok(true) => conn.release(),
                        _ => drop(conn),
                    }
                    self.rewrite_for_redirect(&mut frozen, head.status, next, &visited)?;
                }
                ActionKind::Stop => return Ok((head, conn)),
                ActionKind::Error(e) => {
                    drop(conn);
                    return Err(match e.downcast::<TooManyRedirects>() {
                        Ok(too_many) => HttpError::TooManyRedirects(too_many.limit),
                        Err(e) => HttpError::protocol(format!("redirect rejected: {e}")),
                    });
                }
            }
        }
    }

    fn rewrite_for_redirect(
        &self,
        frozen: &mut FrozenRequest,
        status: StatusCode,
        next: Url,
        visited: &[Url],
    ) -> Result<()> {
        if next.scheme() != "http" && next.scheme() != "https" {
            return Err(HttpError::invalid_request(format!(
                "redirect to unsupported scheme `{}`",
                next.scheme()
            )));
        }

        let demote_to_get = status == StatusCode::SEE_OTHER
            || ((status == StatusCode::MOVED_PERMANENTLY || status == StatusCode::FOUND)
                && frozen.method == Method::POST);
        if demote_to_get {
            if frozen.method != Method::HEAD {
                frozen.method = Method::GET;
            }
            frozen.body = WireBody::Empty;
            frozen.headers.remove(CONTENT_TYPE);
        } else if !frozen.body.is_replayable() {
            // 307/308 must resend the body, and a streaming body is gone.
            return Err(HttpError::invalid_request(
                "cannot follow a redirect with a streaming request body",
            ));
        }

        remove_sensitive_headers(&mut frozen.headers, &next, visited);
        if self.config.referer {
            if let Some(previous) = visited.last() {
                if let Some(referer) = make_referer(&next, previous) {
                    frozen.headers.insert(REFERER, referer);
                }
            }
        }

        tracing::debug!(status = %status, next = %next, "following redirect");
        frozen.url = next;
        Ok(())
    }

    /// One request/response exchange, including pool checkout. A failure
    /// mid-exchange is fatal for the call; only idle connections are ever
    /// replaced silently, and that happens at checkout.
    async fn send_once(
        &self,
        frozen: &mut FrozenRequest,
    ) -> Result<(ResponseHead, PooledConn)> {
        let key = PoolKey::from_url(&frozen.url)?;
        let mut conn = match self.pool.checkout(key).await? {
            Checkout::Reused(conn) => conn,
            Checkout::Permit(permit) => {
                let transport = self.connector.establish(&frozen.url).await?;
                permit.fulfill(H1Connection::new(transport, Arc::clone(&self.buffers)))
            }
        };

        match self.exchange(frozen, &mut conn).await {
            Ok(head) => Ok((head, conn)),
            Err(e) => {
                drop(conn);
                Err(e)
            }
        }
    }

    async fn exchange(
        &self,
        frozen: &mut FrozenRequest,
        conn: &mut H1Connection,
    ) -> Result<ResponseHead> {
        let body_len = match &frozen.body {
            WireBody::Empty => {
                // Methods that conventionally carry a body get an explicit
                // zero length so servers do not wait for one.
                if frozen.method == Method::POST
                    || frozen.method == Method::PUT
                    || frozen.method == Method::PATCH
                {
                    BodyLen::Known(0)
                } else {
                    BodyLen::Empty
                }
            }
            WireBody::Full(body) => BodyLen::Known(body.len() as u64),
            WireBody::Stream(_) => BodyLen::Chunked,
        };

        conn.write_head(&frozen.method, &frozen.url, &frozen.headers, &body_len)
            .await?;

        match &mut frozen.body {
            WireBody::Empty => conn.write_body(&[]).await?,
            WireBody::Full(body) => {
                let body = body.clone();
                conn.write_body(&body).await?;
            }
            WireBody::Stream(slot) => {
                let Some(mut stream) = slot.take() else {
                    return Err(HttpError::invalid_request(
                        "streaming request body already consumed",
                    ));
                };
                while let Some(chunk) = stream.next().await {
                    conn.write_chunk(&chunk?).await?;
                }
                conn.finish_chunked().await?;
            }
        }

        conn.read_head(frozen.method == Method::HEAD).await
    }
}

/// Feed a response body into the stream channel, then return the connection.
///
/// A failed send means the consumer dropped the stream: the body is
/// abandoned mid-read, so the connection is poisoned and closed rather than
/// pooled.
async fn pump_body(mut conn: PooledConn, tx: mpsc::Sender<Result<Bytes>>) {
    loop {
        match conn.read_body_chunk().await {
            Ok(Some(chunk)) => {
                if tx.send(Ok(chunk)).await.is_err() {
                    conn.poison();
                    return;
                }
            }
            Ok(None) => {
                conn.release();
                return;
            }
            Err(e) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        }
    }
}
