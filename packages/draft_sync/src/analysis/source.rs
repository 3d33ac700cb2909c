use futures::future::BoxFuture;
use futures::stream::{BoxStream, Stream, StreamExt};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::error::AnalysisError;
use crate::model::{AnalysisMode, LaneAssignment, PerSide, Roster};
use crate::store::DraftStore;

/// Body of an analysis request.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub mode: AnalysisMode,
    pub rosters: PerSide<Roster>,
    pub lanes: PerSide<LaneAssignment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_slot: Option<usize>,
}

impl AnalysisRequest {
    pub fn from_store(mode: AnalysisMode, store: &DraftStore) -> Self {
        let view = store.view();
        Self {
            mode,
            rosters: view.rosters,
            lanes: view.lanes,
            local_slot: view.local_slot,
        }
    }
}

/// Decoded text chunks. Ends cleanly on completion; an `Err` item is a
/// transport failure and is always the last item.
pub type ChunkStream = BoxStream<'static, Result<String, AnalysisError>>;

/// Where analysis text comes from.
pub trait AnalysisSource: Send + Sync {
    fn open(&self, request: AnalysisRequest)
    -> BoxFuture<'static, Result<ChunkStream, AnalysisError>>;
}

/// Streams analysis text from an HTTP endpoint. The request is a JSON POST;
/// the response body is the text, terminated by close.
pub struct HttpAnalysisSource {
    client: reqwest::Client,
    endpoint: String,
    timeout: Option<Duration>,
}

impl HttpAnalysisSource {
    pub fn new(endpoint: impl Into<String>, timeout: Option<Duration>) -> Result<Self, AnalysisError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            timeout,
        })
    }
}

impl AnalysisSource for HttpAnalysisSource {
    fn open(
        &self,
        request: AnalysisRequest,
    ) -> BoxFuture<'static, Result<ChunkStream, AnalysisError>> {
        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let mode = request.mode;

        Box::pin(async move {
            let response = builder.send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(AnalysisError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            debug!(%mode, "Analysis stream opened");
            let bytes = response
                .bytes_stream()
                .map(|chunk| chunk.map_err(AnalysisError::from));
            Ok(decode_text_stream(bytes))
        })
    }
}

/// Incremental UTF-8 decoder. A multibyte sequence split across chunks is
/// held back until it completes; invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    out.push_str(text);
                    self.pending.clear();
                    return out;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[..valid]));
                    match e.error_len() {
                        // Incomplete sequence at the end: wait for more bytes.
                        None => {
                            self.pending.drain(..valid);
                            return out;
                        }
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid + len);
                        }
                    }
                }
            }
        }
    }

    /// Flush whatever is left at end of stream.
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

/// Turn a byte stream into a text [`ChunkStream`]. Empty decodes are skipped
/// and nothing is yielded after the first error.
pub fn decode_text_stream<S, B>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<B, AnalysisError>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = (Box::pin(bytes), Utf8Decoder::default(), false);
    futures::stream::unfold(state, |(mut bytes, mut decoder, done)| async move {
        if done {
            return None;
        }
        loop {
            match bytes.next().await {
                Some(Ok(chunk)) => {
                    let text = decoder.push(chunk.as_ref());
                    if !text.is_empty() {
                        return Some((Ok(text), (bytes, decoder, false)));
                    }
                }
                Some(Err(e)) => return Some((Err(e), (bytes, decoder, true))),
                None => {
                    let rest = decoder.finish();
                    if rest.is_empty() {
                        return None;
                    }
                    return Some((Ok(rest), (bytes, decoder, true)));
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, http::StatusCode, routing::post};

    #[test]
    fn test_decoder_reassembles_split_multibyte() {
        let mut decoder = Utf8Decoder::default();
        let bytes = "né→".as_bytes();
        // 'é' is 2 bytes, '→' is 3 bytes.
        assert_eq!(decoder.push(&bytes[..2]), "n");
        assert_eq!(decoder.push(&bytes[2..4]), "é");
        assert_eq!(decoder.push(&bytes[4..5]), "");
        assert_eq!(decoder.push(&bytes[5..]), "→");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8Decoder::default();
        assert_eq!(decoder.push(b"a\xffb"), "a\u{FFFD}b");
        // A truncated sequence at end of stream is lossy too.
        assert_eq!(decoder.push(b"\xe2\x86"), "");
        assert_eq!(decoder.finish(), "\u{FFFD}");
    }

    #[tokio::test]
    async fn test_decode_stream_stops_after_error() {
        let items: Vec<Result<Vec<u8>, AnalysisError>> = vec![
            Ok(b"AB".to_vec()),
            Ok(vec![0xc3]),
            Ok(vec![0xa9]),
            Err(AnalysisError::Interrupted("reset".to_string())),
            Ok(b"never".to_vec()),
        ];
        let decoded: Vec<_> = decode_text_stream(futures::stream::iter(items)).collect().await;
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].as_ref().unwrap(), "AB");
        assert_eq!(decoded[1].as_ref().unwrap(), "é");
        assert!(matches!(decoded[2], Err(AnalysisError::Interrupted(_))));
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        format!("http://{}/analyze", addr)
    }

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            mode: AnalysisMode::Team,
            rosters: PerSide::default(),
            lanes: PerSide::default(),
            local_slot: Some(2),
        }
    }

    #[tokio::test]
    async fn test_http_source_streams_body() {
        let app = Router::new().route(
            "/analyze",
            post(|Json(body): Json<serde_json::Value>| async move {
                format!("mode={} slot={}", body["mode"], body["localSlot"])
            }),
        );
        let source = HttpAnalysisSource::new(serve(app).await, Some(Duration::from_secs(5))).unwrap();

        let stream = source.open(request()).await.unwrap();
        let chunks: Vec<_> = stream.collect().await;
        let text: String = chunks.into_iter().map(Result::unwrap).collect();
        assert_eq!(text, r#"mode="team" slot=2"#);
    }

    #[tokio::test]
    async fn test_http_source_reports_status() {
        let app = Router::new().route(
            "/analyze",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "overloaded") }),
        );
        let source = HttpAnalysisSource::new(serve(app).await, None).unwrap();
        match source.open(request()).await {
            Err(AnalysisError::Status { status, body }) => {
                assert_eq!(status, 503);
                assert_eq!(body, "overloaded");
            }
            Err(e) => panic!("unexpected error: {e}"),
            Ok(_) => panic!("expected an error"),
        }
    }
}
