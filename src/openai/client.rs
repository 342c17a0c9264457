use std::pin::Pin;
use std::time::Duration;

use futures_core::Stream;
use futures_util::StreamExt;
use reqwest::{Client, Response};

use super::error::OpenAiError;
use super::types::{ChatChunk, ChatRequest, ChatResponse};
use crate::config::JokeflowConfig;

pub const API_BASE_URL: &str = "https://api.openai.com/v1";

/// Incremental text fragments produced by a streaming completion.
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, OpenAiError>> + Send>>;

/// Anything that can answer a chat request, either in one shot or as a stream.
pub trait ChatModel {
    async fn complete(&self, req: &ChatRequest) -> Result<ChatResponse, OpenAiError>;

    async fn stream(&self, req: &ChatRequest) -> Result<TextStream, OpenAiError>;
}

#[derive(Clone)]
pub struct OpenAiClient {
    api_key: String,
    client: Client,
    base_url: String,
}

impl OpenAiClient {
    #[cfg(test)]
    fn with_base_url(api_key: String, base_url: String) -> Result<Self, OpenAiError> {
        Self::build(api_key, base_url, Duration::from_secs(10), Duration::from_secs(120))
    }

    pub fn from_config(config: &JokeflowConfig) -> Result<Self, OpenAiError> {
        Self::build(
            config.api_key.clone(),
            config.base_url.clone(),
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn build(
        api_key: String,
        base_url: String,
        connect_timeout: Duration,
        timeout: Duration,
    ) -> Result<Self, OpenAiError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            api_key,
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn post(&self, req: &ChatRequest) -> Result<Response, OpenAiError> {
        let mut builder = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(req);
        // Local OpenAI-compatible servers usually run without a key.
        if !self.api_key.is_empty() {
            builder = builder.bearer_auth(&self.api_key);
        }

        tracing::debug!(
            model = %req.model,
            messages = req.messages.len(),
            stream = req.stream,
            "sending chat completion request"
        );
        let response = builder.send().await?;
        check_status(response).await
    }
}

async fn check_status(response: Response) -> Result<Response, OpenAiError> {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|secs| secs.saturating_mul(1000))
            .unwrap_or(1000);
        return Err(OpenAiError::RateLimited {
            retry_after_ms: retry_after,
        });
    }

    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        return Err(OpenAiError::ApiError {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response)
}

impl ChatModel for OpenAiClient {
    async fn complete(&self, req: &ChatRequest) -> Result<ChatResponse, OpenAiError> {
        let mut req = req.clone();
        req.stream = false;
        let body = self.post(&req).await?.json::<ChatResponse>().await?;
        if body.choices.is_empty() {
            return Err(OpenAiError::EmptyResponse);
        }
        Ok(body)
    }

    async fn stream(&self, req: &ChatRequest) -> Result<TextStream, OpenAiError> {
        let mut req = req.clone();
        req.stream = true;
        let response = self.post(&req).await?;

        let stream = async_stream::stream! {
            let mut bytes = response.bytes_stream();
            let mut decoder = SseDecoder::default();

            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(OpenAiError::from(e));
                        return;
                    }
                };
                for frame in decoder.push(&chunk) {
                    match frame {
                        Frame::Text(text) => {
                            yield Ok(text);
                        }
                        Frame::Done => return,
                        Frame::Malformed(reason) => {
                            yield Err(OpenAiError::Stream(reason));
                            return;
                        }
                    }
                }
            }

            // Some servers close the body without a trailing blank line.
            for frame in decoder.finish() {
                match frame {
                    Frame::Text(text) => {
                        yield Ok(text);
                    }
                    Frame::Done => return,
                    Frame::Malformed(reason) => {
                        yield Err(OpenAiError::Stream(reason));
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// One decoded server-sent event.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Text(String),
    Done,
    Malformed(String),
}

/// Splits a byte stream into SSE events and decodes their `data:` payloads.
///
/// Bytes are buffered until a blank line so multi-byte characters split
/// across network chunks are reassembled before UTF-8 decoding.
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some((end, sep)) = find_event_end(&self.buffer) {
            let event: Vec<u8> = self.buffer.drain(..end + sep).take(end).collect();
            decode_event(&String::from_utf8_lossy(&event), &mut frames);
        }
        frames
    }

    fn finish(&mut self) -> Vec<Frame> {
        let rest = std::mem::take(&mut self.buffer);
        let mut frames = Vec::new();
        decode_event(&String::from_utf8_lossy(&rest), &mut frames);
        frames
    }
}

fn find_event_end(buf: &[u8]) -> Option<(usize, usize)> {
    let lf = buf.windows(2).position(|w| w == b"\n\n").map(|i| (i, 2));
    let crlf = buf.windows(4).position(|w| w == b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 <= b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn decode_event(event: &str, frames: &mut Vec<Frame>) {
    for line in event.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim_start();
        if data == "[DONE]" {
            frames.push(Frame::Done);
            return;
        }
        match serde_json::from_str::<ChatChunk>(data) {
            Ok(chunk) if chunk.error.is_some() => {
                let detail = chunk.error.map(|e| e.to_string()).unwrap_or_default();
                frames.push(Frame::Malformed(format!("server error event: {detail}")));
                return;
            }
            Ok(chunk) => {
                if let Some(text) = chunk.text() {
                    frames.push(Frame::Text(text.to_string()));
                }
            }
            Err(e) => {
                frames.push(Frame::Malformed(e.to_string()));
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai::types::ChatMessage;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> ChatRequest {
        ChatRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![
                ChatMessage::system("You are a comedian that tells witty jokes."),
                ChatMessage::user("Rate the joke: ..."),
            ],
            max_tokens: None,
            temperature: None,
            stream: false,
        }
    }

    fn sse_body(fragments: &[&str]) -> String {
        let mut body = String::from(
            "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        );
        for f in fragments {
            let chunk = serde_json::json!({"choices": [{"index": 0, "delta": {"content": f}}]});
            body.push_str(&format!("data: {chunk}\n\n"));
        }
        body.push_str("data: [DONE]\n\n");
        body
    }

    #[tokio::test]
    async fn complete_returns_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(bearer_token("sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-1",
                "model": "gpt-4o-mini",
                "choices": [{
                    "index": 0,
                    "message": {"role": "assistant", "content": "8/10"},
                    "finish_reason": "stop"
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::with_base_url("sk-test".into(), server.uri()).unwrap();
        let resp = client.complete(&request()).await.unwrap();
        assert_eq!(resp.text(), Some("8/10"));
    }

    #[tokio::test]
    async fn complete_maps_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let client = OpenAiClient::with_base_url(String::new(), server.uri()).unwrap();
        let err = client.complete(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            OpenAiError::RateLimited {
                retry_after_ms: 7000
            }
        ));
    }

    #[tokio::test]
    async fn huge_retry_after_saturates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429).insert_header("retry-after", u64::MAX.to_string()),
            )
            .mount(&server)
            .await;

        let client = OpenAiClient::with_base_url(String::new(), server.uri()).unwrap();
        let err = client.complete(&request()).await.unwrap_err();
        assert!(matches!(
            err,
            OpenAiError::RateLimited {
                retry_after_ms: u64::MAX
            }
        ));
    }

    #[tokio::test]
    async fn complete_maps_api_error_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let client = OpenAiClient::with_base_url("bad".into(), server.uri()).unwrap();
        match client.complete(&request()).await.unwrap_err() {
            OpenAiError::ApiError { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "invalid api key");
            }
            other => panic!("expected ApiError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn complete_rejects_empty_choices() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "chatcmpl-2", "model": "gpt-4o-mini", "choices": []
            })))
            .mount(&server)
            .await;

        let client = OpenAiClient::with_base_url(String::new(), server.uri()).unwrap();
        let err = client.complete(&request()).await.unwrap_err();
        assert!(matches!(err, OpenAiError::EmptyResponse));
    }

    #[tokio::test]
    async fn stream_yields_fragments_until_done() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_partial_json(serde_json::json!({"stream": true})))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_body(&["Knock", " knock", "."])),
            )
            .mount(&server)
            .await;

        let client = OpenAiClient::with_base_url(String::new(), server.uri()).unwrap();
        let mut stream = client.stream(&request()).await.unwrap();
        let mut fragments = Vec::new();
        while let Some(item) = stream.next().await {
            fragments.push(item.unwrap());
        }
        assert_eq!(fragments, vec!["Knock", " knock", "."]);
    }

    #[tokio::test]
    async fn stream_surfaces_http_errors_before_streaming() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let client = OpenAiClient::with_base_url(String::new(), server.uri()).unwrap();
        let result = client.stream(&request()).await;
        assert!(matches!(
            result,
            Err(OpenAiError::ApiError { status: 500, .. })
        ));
    }

    #[test]
    fn decoder_reassembles_events_split_across_chunks() {
        let mut decoder = SseDecoder::default();
        let body = sse_body(&["héllo"]);
        let bytes = body.as_bytes();
        let split = body.find("llo").unwrap() - 1; // inside the two-byte 'é'
        let mut frames = decoder.push(&bytes[..split]);
        frames.extend(decoder.push(&bytes[split..]));
        assert_eq!(frames, vec![Frame::Text("héllo".into()), Frame::Done]);
    }

    #[test]
    fn decoder_handles_crlf_separators_and_trailing_event() {
        let mut decoder = SseDecoder::default();
        let frames = decoder.push(
            b"data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\r\n\r\ndata: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}",
        );
        assert_eq!(frames, vec![Frame::Text("a".into())]);
        assert_eq!(decoder.finish(), vec![Frame::Text("b".into())]);
    }

    #[test]
    fn decoder_reports_malformed_payloads() {
        let mut decoder = SseDecoder::default();
        let frames = decoder.push(b"data: {not json}\n\n");
        assert!(matches!(frames.as_slice(), [Frame::Malformed(_)]));
    }

    #[test]
    fn decoder_reports_server_error_events() {
        let mut decoder = SseDecoder::default();
        let frames = decoder.push(b"data: {\"error\":{\"message\":\"overloaded\"}}\n\n");
        match frames.as_slice() {
            [Frame::Malformed(reason)] => assert!(reason.contains("overloaded")),
            other => panic!("unexpected frames: {other:?}"),
        }
    }

    #[test]
    fn decoder_ignores_comments_and_other_fields() {
        let mut decoder = SseDecoder::default();
        let frames = decoder.push(b": keep-alive\n\nevent: message\nid: 4\n\n");
        assert!(frames.is_empty());
    }
}
