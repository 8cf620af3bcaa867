//! Transports open one streaming attempt and yield raw text deltas.
//!
//! The orchestrator owns timing and retry policy; a transport only knows
//! how to issue the request and decode the body.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::{self, Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::api::ChatRequest;
use crate::core::chat_stream::{summarize_error_body, FrameFeeder, WireProtocol};
use crate::core::errors::{StreamFault, TimeoutKind};

/// Deltas of one attempt, in arrival order. Deltas may be empty or blank;
/// filtering them is the orchestrator's job. Dropping the stream releases
/// the underlying connection.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<String, StreamFault>> + Send>>;

#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub payload: ChatRequest,
    pub protocol: WireProtocol,
}

#[async_trait]
pub trait StreamTransport: Send + Sync {
    /// Short label used in logs.
    fn name(&self) -> &str;

    /// Issue the request. `abort` is cancelled when the attempt's overall
    /// deadline passes.
    async fn open(
        &self,
        request: &StreamRequest,
        abort: CancellationToken,
    ) -> Result<DeltaStream, StreamFault>;
}

/// The primary transport followed by the fallbacks, in the order they are
/// tried.
#[derive(Clone)]
pub struct TransportChain {
    primary: Arc<dyn StreamTransport>,
    fallbacks: Vec<Arc<dyn StreamTransport>>,
}

impl TransportChain {
    pub fn new(primary: Arc<dyn StreamTransport>) -> Self {
        Self {
            primary,
            fallbacks: Vec::new(),
        }
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn StreamTransport>) -> Self {
        self.fallbacks.push(fallback);
        self
    }

    pub fn primary(&self) -> &dyn StreamTransport {
        self.primary.as_ref()
    }

    pub fn fallbacks(&self) -> impl Iterator<Item = &dyn StreamTransport> {
        self.fallbacks.iter().map(|transport| transport.as_ref())
    }

    pub fn has_fallbacks(&self) -> bool {
        !self.fallbacks.is_empty()
    }
}

async fn send_request(
    client: &reqwest::Client,
    request: &StreamRequest,
    abort: &CancellationToken,
) -> Result<reqwest::Response, StreamFault> {
    let mut http_request = client
        .post(&request.endpoint)
        .header("Content-Type", "application/json");
    if let Some(api_key) = request.api_key.as_deref().filter(|key| !key.is_empty()) {
        http_request = http_request.bearer_auth(api_key);
    }

    let response = tokio::select! {
        _ = abort.cancelled() => return Err(StreamFault::Timeout(TimeoutKind::Request)),
        sent = http_request.json(&request.payload).send() => {
            sent.map_err(|err| StreamFault::from_reqwest(&err))?
        }
    };

    ensure_success(response).await
}

/// Turn a non-2xx response into a fault, logging the raw body.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, StreamFault> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<no body>".to_string());
    warn!(
        status = status.as_u16(),
        body = %summarize_error_body(&body),
        "Provider returned an error status"
    );
    Err(StreamFault::from_status(status.as_u16(), body))
}

/// Decode a body stream chunk by chunk.
pub fn decode_body_stream<S, B>(body: S, protocol: WireProtocol) -> DeltaStream
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    struct DecodeState<S> {
        body: S,
        feeder: FrameFeeder,
        pending: VecDeque<Result<String, StreamFault>>,
    }

    let state = DecodeState {
        body,
        feeder: FrameFeeder::new(protocol),
        pending: VecDeque::new(),
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.feeder.is_finished() {
                return None;
            }

            match state.body.next().await {
                Some(Ok(chunk)) => state.feeder.push(chunk.as_ref(), &mut state.pending),
                Some(Err(err)) => {
                    state.feeder.finish(&mut VecDeque::new());
                    state.pending.push_back(Err(StreamFault::from_reqwest(&err)));
                }
                None => {
                    debug!(
                        skipped_frames = state.feeder.skipped_frames(),
                        "Response body closed"
                    );
                    state.feeder.finish(&mut state.pending);
                }
            }
        }
    }))
}

/// Streams the response body as it arrives.
pub struct HttpStreamTransport {
    name: &'static str,
    client: reqwest::Client,
}

impl HttpStreamTransport {
    pub fn new(name: &'static str, client: reqwest::Client) -> Self {
        Self { name, client }
    }
}

#[async_trait]
impl StreamTransport for HttpStreamTransport {
    fn name(&self) -> &str {
        self.name
    }

    async fn open(
        &self,
        request: &StreamRequest,
        abort: CancellationToken,
    ) -> Result<DeltaStream, StreamFault> {
        let response = send_request(&self.client, request, &abort).await?;
        Ok(decode_body_stream(
            Box::pin(response.bytes_stream()),
            request.protocol,
        ))
    }
}

/// Legacy fallback: waits for the whole body, then decodes it in one go.
/// Slow for long answers, but survives setups that break incremental reads.
pub struct BufferedHttpTransport {
    name: &'static str,
    client: reqwest::Client,
}

impl BufferedHttpTransport {
    pub fn new(name: &'static str, client: reqwest::Client) -> Self {
        Self { name, client }
    }
}

#[async_trait]
impl StreamTransport for BufferedHttpTransport {
    fn name(&self) -> &str {
        self.name
    }

    async fn open(
        &self,
        request: &StreamRequest,
        abort: CancellationToken,
    ) -> Result<DeltaStream, StreamFault> {
        let response = send_request(&self.client, request, &abort).await?;
        let body = tokio::select! {
            _ = abort.cancelled() => return Err(StreamFault::Timeout(TimeoutKind::Request)),
            body = response.bytes() => body.map_err(|err| StreamFault::from_reqwest(&err))?,
        };

        let mut feeder = FrameFeeder::new(request.protocol);
        let mut items = VecDeque::new();
        feeder.push(&body, &mut items);
        feeder.finish(&mut items);
        debug!(
            bytes = body.len(),
            deltas = items.len(),
            "Decoded buffered response"
        );
        Ok(Box::pin(stream::iter(items)))
    }
}

type TokenStreamFactory =
    dyn Fn(&StreamRequest) -> Result<DeltaStream, StreamFault> + Send + Sync;

/// Adapts an async token sequence, such as a client SDK's text stream or an
/// in-process model, into a transport. The factory is called once per
/// attempt.
pub struct TokenStreamTransport {
    name: String,
    factory: Box<TokenStreamFactory>,
}

impl TokenStreamTransport {
    pub fn new<F>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&StreamRequest) -> Result<DeltaStream, StreamFault> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            factory: Box::new(factory),
        }
    }

    /// Convenience for a fixed script of deltas, replayed on every attempt.
    pub fn scripted(name: impl Into<String>, script: Vec<Result<String, StreamFault>>) -> Self {
        Self::new(name, move |_| Ok(Box::pin(stream::iter(script.clone()))))
    }
}

#[async_trait]
impl StreamTransport for TokenStreamTransport {
    fn name(&self) -> &str {
        &self.name
    }

    async fn open(
        &self,
        request: &StreamRequest,
        _abort: CancellationToken,
    ) -> Result<DeltaStream, StreamFault> {
        (self.factory)(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ChatMessage;
    use crate::utils::test_utils::{spawn_http_stub, test_client, StubResponse};

    fn request(endpoint: String, protocol: WireProtocol) -> StreamRequest {
        StreamRequest {
            endpoint,
            api_key: Some("sk-test".into()),
            payload: ChatRequest {
                model: "test-model".into(),
                messages: vec![ChatMessage {
                    role: "user".into(),
                    content: "hello".into(),
                }],
                stream: true,
            },
            protocol,
        }
    }

    async fn drain(mut deltas: DeltaStream) -> Vec<Result<String, StreamFault>> {
        let mut items = Vec::new();
        while let Some(item) = deltas.next().await {
            items.push(item);
        }
        items
    }

    #[tokio::test]
    async fn http_transport_streams_sse_and_sends_auth() {
        let stub = spawn_http_stub(vec![StubResponse::ok(
            "text/event-stream",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n",
        )])
        .await;

        let transport = HttpStreamTransport::new("streaming", test_client());
        let deltas = transport
            .open(
                &request(stub.url("/v1/chat/completions"), WireProtocol::Sse),
                CancellationToken::new(),
            )
            .await
            .expect("open");
        assert_eq!(drain(deltas).await, vec![Ok("Hi".to_string())]);

        let captured = stub.requests().await;
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].request_line, "POST /v1/chat/completions HTTP/1.1");
        assert_eq!(
            captured[0].header("authorization").as_deref(),
            Some("Bearer sk-test")
        );
        let body: serde_json::Value =
            serde_json::from_slice(&captured[0].body).expect("json body");
        assert_eq!(body["stream"], serde_json::json!(true));
        assert_eq!(body["model"], serde_json::json!("test-model"));
        assert_eq!(body["messages"][0]["content"], serde_json::json!("hello"));
    }

    #[tokio::test]
    async fn http_transport_maps_error_statuses() {
        let stub = spawn_http_stub(vec![
            StubResponse::status(401, r#"{"error":{"message":"Invalid API key"}}"#),
            StubResponse::status(404, "not found"),
        ])
        .await;

        let transport = HttpStreamTransport::new("streaming", test_client());
        let endpoint = stub.url("/v1/chat/completions");

        let first = transport
            .open(&request(endpoint.clone(), WireProtocol::Sse), CancellationToken::new())
            .await;
        assert!(matches!(first, Err(StreamFault::Auth(_))));

        let second = transport
            .open(&request(endpoint, WireProtocol::Sse), CancellationToken::new())
            .await;
        assert!(matches!(
            second,
            Err(StreamFault::ProviderHttp { status: 404, .. })
        ));
    }

    #[tokio::test]
    async fn buffered_transport_decodes_ndjson_without_sentinel() {
        let stub = spawn_http_stub(vec![StubResponse::ok(
            "application/x-ndjson",
            "{\"message\":{\"content\":\"A\"}}\n{\"message\":{\"content\":\"B\"}}",
        )])
        .await;

        let transport = BufferedHttpTransport::new("buffered", test_client());
        let deltas = transport
            .open(
                &request(stub.url("/api/chat"), WireProtocol::Ndjson),
                CancellationToken::new(),
            )
            .await
            .expect("open");
        assert_eq!(
            drain(deltas).await,
            vec![Ok("A".to_string()), Ok("B".to_string())]
        );
    }

    #[tokio::test]
    async fn connection_refused_is_network_fault() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let transport = HttpStreamTransport::new("streaming", test_client());
        let result = transport
            .open(
                &request(format!("http://{addr}/v1/chat/completions"), WireProtocol::Sse),
                CancellationToken::new(),
            )
            .await;
        match result {
            Err(fault) => assert!(fault.is_network(), "{fault:?}"),
            Ok(_) => panic!("expected network fault"),
        }
    }

    #[tokio::test]
    async fn aborted_request_is_request_timeout() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        // Accept and never answer.
        let _server = tokio::spawn(async move {
            let _held = listener.accept().await;
            std::future::pending::<()>().await;
        });

        let abort = CancellationToken::new();
        abort.cancel();
        let transport = HttpStreamTransport::new("streaming", test_client());
        let result = transport
            .open(
                &request(format!("http://{addr}/v1/chat/completions"), WireProtocol::Sse),
                abort,
            )
            .await;
        assert!(matches!(
            result,
            Err(StreamFault::Timeout(TimeoutKind::Request))
        ));
    }

    #[tokio::test]
    async fn scripted_token_stream_replays_each_attempt() {
        let transport = TokenStreamTransport::scripted(
            "sdk",
            vec![Ok("A".to_string()), Ok("B".to_string())],
        );
        let req = request("unused".into(), WireProtocol::Sse);
        for _ in 0..2 {
            let deltas = transport
                .open(&req, CancellationToken::new())
                .await
                .expect("open");
            assert_eq!(
                drain(deltas).await,
                vec![Ok("A".to_string()), Ok("B".to_string())]
            );
        }
        assert_eq!(transport.name(), "sdk");
    }
}
