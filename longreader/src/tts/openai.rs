//! OpenAI speech backend.
//!
//! Calls `/v1/audio/speech` with `response_format = pcm`, which returns raw
//! 24 kHz mono signed 16-bit little-endian samples with no container.

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};

use super::{TtsBackend, TtsError, Voice};
use crate::audio::AudioSegment;

pub const OPENAI_SPEECH_BASE_URL: &str = "https://api.openai.com/v1";

/// Sample rate of the service's `pcm` response format.
pub const PCM_SAMPLE_RATE: u32 = 24_000;

/// Longest input the service accepts, in characters.
pub const MAX_INPUT_CHARS: usize = 4096;

pub struct OpenAiSpeech {
    model: String,
    api_key: String,
    base_url: String,
    client: Client,
}

impl OpenAiSpeech {
    pub fn new(model: &str, api_key: String) -> Self {
        Self {
            model: model.to_string(),
            api_key,
            base_url: OPENAI_SPEECH_BASE_URL.to_string(),
            client: Client::new(),
        }
    }

    /// Point the backend at a different API host (must include `/v1`).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    input: &'a str,
    voice: &'a str,
    response_format: &'static str,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Check an input against the service limit before sending it.
fn check_input(text: &str) -> Result<(), TtsError> {
    let len = text.chars().count();
    if len > MAX_INPUT_CHARS {
        return Err(TtsError::InputTooLong {
            len,
            max: MAX_INPUT_CHARS,
        });
    }
    Ok(())
}

/// Decode raw s16le PCM bytes.
pub fn decode_pcm(bytes: &[u8], sample_rate: u32) -> Result<AudioSegment, TtsError> {
    if bytes.is_empty() {
        return Err(TtsError::InvalidAudio("empty response body".to_string()));
    }
    if bytes.len() % 2 != 0 {
        return Err(TtsError::InvalidAudio(format!(
            "odd byte count {} for 16-bit samples",
            bytes.len()
        )));
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    Ok(AudioSegment::new(sample_rate, samples))
}

fn classify_status(status: StatusCode, retry_after: Option<u64>, message: String) -> TtsError {
    let code = status.as_u16();
    match code {
        429 => TtsError::RateLimited { retry_after },
        500..=599 => TtsError::ServerError {
            status: code,
            message,
        },
        _ => TtsError::Api {
            status: code,
            message,
        },
    }
}

async fn error_from_response(response: Response) -> TtsError {
    let status = response.status();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorResponse>(&body)
        .map(|e| e.error.message)
        .unwrap_or(body);

    classify_status(status, retry_after, message)
}

#[async_trait]
impl TtsBackend for OpenAiSpeech {
    async fn synthesize(&self, text: &str, voice: Voice) -> Result<AudioSegment, TtsError> {
        check_input(text)?;

        let request = SpeechRequest {
            model: &self.model,
            input: text,
            voice: voice.as_str(),
            response_format: "pcm",
        };

        let response = self
            .client
            .post(format!("{}/audio/speech", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| TtsError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| TtsError::Transport(e.to_string()))?;

        decode_pcm(&bytes, PCM_SAMPLE_RATE)
    }

    fn name(&self) -> &'static str {
        "OpenAI speech"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let request = SpeechRequest {
            model: "tts-1-hd",
            input: "Hello.",
            voice: Voice::Nova.as_str(),
            response_format: "pcm",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "tts-1-hd");
        assert_eq!(json["voice"], "nova");
        assert_eq!(json["response_format"], "pcm");
    }

    #[test]
    fn test_decode_pcm() {
        let bytes = [0x01, 0x00, 0xff, 0xff, 0x00, 0x80];
        let segment = decode_pcm(&bytes, PCM_SAMPLE_RATE).unwrap();
        assert_eq!(segment.sample_rate, 24_000);
        assert_eq!(segment.samples, vec![1, -1, i16::MIN]);
    }

    #[test]
    fn test_decode_rejects_bad_lengths() {
        assert!(matches!(
            decode_pcm(&[], PCM_SAMPLE_RATE),
            Err(TtsError::InvalidAudio(_))
        ));
        assert!(matches!(
            decode_pcm(&[1, 2, 3], PCM_SAMPLE_RATE),
            Err(TtsError::InvalidAudio(_))
        ));
    }

    #[test]
    fn test_input_limit_counts_chars() {
        assert!(check_input(&"é".repeat(MAX_INPUT_CHARS)).is_ok());
        let err = check_input(&"a".repeat(MAX_INPUT_CHARS + 1)).unwrap_err();
        assert!(matches!(err, TtsError::InputTooLong { len: 4097, max: 4096 }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_classify_status() {
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, Some(3), String::new()),
            TtsError::RateLimited {
                retry_after: Some(3)
            }
        ));
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, None, "down".into()),
            TtsError::ServerError { status: 502, .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::UNAUTHORIZED, None, "key".into()),
            TtsError::Api { status: 401, .. }
        ));
    }

    #[tokio::test]
    async fn test_too_long_input_fails_before_request() {
        let backend =
            OpenAiSpeech::new("tts-1-hd", "sk-test".into()).with_base_url("http://127.0.0.1:9");
        let err = backend
            .synthesize(&"word ".repeat(1000), Voice::Alloy)
            .await
            .unwrap_err();
        assert!(matches!(err, TtsError::InputTooLong { .. }));
    }
}
