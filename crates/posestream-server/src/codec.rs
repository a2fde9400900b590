//! Frame and result codec.
//!
//! Inbound frames carry a base64 image (JPEG or PNG), optionally wrapped in a
//! `data:image/...;base64,` URL as produced by browser canvases. Outbound
//! results are `result` envelopes serialised to JSON. Everything here is pure;
//! failures are reported, never retried.

use std::borrow::Cow;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::ImageError;
use posestream_core::{FrameImage, LandmarkSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::processing::job::{Outcome, ProcessingResult};
use crate::protocol::envelope::MessageType;
use crate::session::counters::CounterSnapshot;

/// Why a frame payload could not be turned into an image.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Nothing to decode.
    #[error("frame payload is empty")]
    Empty,
    /// Payload is not valid base64.
    #[error("frame payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    /// A `data:` URL that is not base64 encoded or has no data part.
    #[error("unsupported data URL: {0}")]
    DataUrl(String),
    /// Bytes are not a supported image format.
    #[error("unsupported image format")]
    UnsupportedFormat,
    /// Recognised format but truncated or corrupt data.
    #[error("image data is malformed: {0}")]
    Malformed(String),
}

/// Why an encoded result could not be parsed back.
#[derive(Debug, Error)]
pub enum ResultDecodeError {
    /// Not valid JSON or missing fields.
    #[error("invalid result JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// Envelope `type` is not `result`.
    #[error("expected a result message, got {0}")]
    NotAResult(MessageType),
    /// `detected` status without landmarks.
    #[error("detected result has no landmark payload")]
    MissingLandmarks,
}

/// Result status marker on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    /// `payload` holds landmarks.
    Detected,
    /// Detector found nothing; `payload` is null.
    NoDetection,
    /// Frame could not be decoded; `detail` explains why.
    DecodeFailed,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultWire<'a> {
    #[serde(rename = "type")]
    message_type: MessageType,
    sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<i64>,
    status: ResultStatus,
    payload: Option<Cow<'a, LandmarkSet>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detail: Option<Cow<'a, str>>,
    latency_us: u64,
    counters: CounterSnapshot,
}

/// Decode a frame payload into an RGB image.
pub fn decode_frame(payload: &str) -> Result<FrameImage, DecodeError> {
    let encoded = strip_data_url(payload.trim())?;
    if encoded.is_empty() {
        return Err(DecodeError::Empty);
    }
    let bytes = STANDARD.decode(encoded)?;
    let format = image::guess_format(&bytes).map_err(|_| DecodeError::UnsupportedFormat)?;
    let decoded = image::load_from_memory_with_format(&bytes, format).map_err(|e| match e {
        ImageError::Unsupported(_) => DecodeError::UnsupportedFormat,
        other => DecodeError::Malformed(other.to_string()),
    })?;
    Ok(decoded.to_rgb8())
}

fn strip_data_url(payload: &str) -> Result<&str, DecodeError> {
    let Some(rest) = payload.strip_prefix("data:") else {
        return Ok(payload);
    };
    let (meta, data) = rest
        .split_once(',')
        .ok_or_else(|| DecodeError::DataUrl("missing ',' separator".into()))?;
    if !meta.ends_with(";base64") {
        return Err(DecodeError::DataUrl(meta.to_string()));
    }
    Ok(data)
}

/// Encode a result as a `result` envelope.
///
/// Deterministic: equal results always produce identical bytes.
pub fn encode_result(result: &ProcessingResult) -> String {
    let (status, payload, detail) = match &result.outcome {
        Outcome::Detected(set) => (ResultStatus::Detected, Some(Cow::Borrowed(set)), None),
        Outcome::NoDetection => (ResultStatus::NoDetection, None, None),
        Outcome::DecodeFailed(msg) => (
            ResultStatus::DecodeFailed,
            None,
            Some(Cow::Borrowed(msg.as_str())),
        ),
    };
    let wire = ResultWire {
        message_type: MessageType::Result,
        sequence: result.sequence,
        timestamp: result.client_timestamp,
        status,
        payload,
        detail,
        latency_us: result.latency_us,
        counters: result.counters,
    };
    serde_json::to_string(&wire).unwrap_or_else(|e| {
        tracing::error!(error = %e, sequence = result.sequence, "failed to serialize result");
        format!(
            r#"{{"type":"result","sequence":{},"status":"decode_failed","payload":null,"detail":"result serialization failed","latencyUs":{},"counters":{{"received":0,"processed":0,"dropped":0,"meanLatencyUs":0,"maxLatencyUs":0}}}}"#,
            result.sequence, result.latency_us
        )
    })
}

/// Parse an encoded `result` envelope.
pub fn decode_result(text: &str) -> Result<ProcessingResult, ResultDecodeError> {
    let wire: ResultWire<'static> = serde_json::from_str(text)?;
    if wire.message_type != MessageType::Result {
        return Err(ResultDecodeError::NotAResult(wire.message_type));
    }
    let outcome = match wire.status {
        ResultStatus::Detected => Outcome::Detected(
            wire.payload
                .ok_or(ResultDecodeError::MissingLandmarks)?
                .into_owned(),
        ),
        ResultStatus::NoDetection => Outcome::NoDetection,
        ResultStatus::DecodeFailed => {
            Outcome::DecodeFailed(wire.detail.map(Cow::into_owned).unwrap_or_default())
        }
    };
    Ok(ProcessingResult {
        sequence: wire.sequence,
        client_timestamp: wire.timestamp,
        outcome,
        latency_us: wire.latency_us,
        counters: wire.counters,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{png_payload, jpeg_payload};
    use assert_matches::assert_matches;
    use posestream_core::Landmark;

    fn result_with(outcome: Outcome) -> ProcessingResult {
        ProcessingResult {
            sequence: 42,
            client_timestamp: Some(1_700_000_000_123),
            outcome,
            latency_us: 12_345,
            counters: CounterSnapshot {
                received: 50,
                processed: 40,
                dropped: 10,
                mean_latency_us: 11_000,
                max_latency_us: 30_000,
            },
        }
    }

    #[test]
    fn decodes_png_payload() {
        let img = decode_frame(&png_payload(3, 2)).unwrap();
        assert_eq!(img.dimensions(), (3, 2));
    }

    #[test]
    fn decodes_jpeg_payload() {
        let img = decode_frame(&jpeg_payload(8, 8)).unwrap();
        assert_eq!(img.dimensions(), (8, 8));
    }

    #[test]
    fn decodes_data_url() {
        let url = format!("data:image/png;base64,{}", png_payload(4, 4));
        let img = decode_frame(&url).unwrap();
        assert_eq!(img.dimensions(), (4, 4));
    }

    #[test]
    fn empty_payload_rejected() {
        assert_matches!(decode_frame(""), Err(DecodeError::Empty));
        assert_matches!(decode_frame("   "), Err(DecodeError::Empty));
        assert_matches!(decode_frame("data:image/png;base64,"), Err(DecodeError::Empty));
    }

    #[test]
    fn invalid_base64_rejected() {
        assert_matches!(decode_frame("!!not base64!!"), Err(DecodeError::Base64(_)));
    }

    #[test]
    fn non_base64_data_url_rejected() {
        assert_matches!(
            decode_frame("data:text/plain,hello"),
            Err(DecodeError::DataUrl(_))
        );
        assert_matches!(decode_frame("data:image/png;base64"), Err(DecodeError::DataUrl(_)));
    }

    #[test]
    fn unknown_bytes_rejected() {
        let payload = STANDARD.encode(b"definitely not an image");
        assert_matches!(decode_frame(&payload), Err(DecodeError::UnsupportedFormat));
    }

    #[test]
    fn truncated_png_rejected() {
        let full = STANDARD.decode(png_payload(16, 16)).unwrap();
        let truncated = STANDARD.encode(&full[..full.len() / 2]);
        assert_matches!(decode_frame(&truncated), Err(DecodeError::Malformed(_)));
    }

    #[test]
    fn encode_is_deterministic() {
        let set = LandmarkSet {
            pose: vec![Landmark::new(0.25, 0.5, -0.1).with_visibility(0.9)],
            ..LandmarkSet::default()
        };
        let result = result_with(Outcome::Detected(set));
        assert_eq!(encode_result(&result), encode_result(&result.clone()));
    }

    #[test]
    fn no_detection_round_trips() {
        let result = result_with(Outcome::NoDetection);
        let encoded = encode_result(&result);
        let back = decode_result(&encoded).unwrap();
        assert_eq!(back, result);
        assert_eq!(encode_result(&back), encoded);
    }

    #[test]
    fn no_detection_wire_shape() {
        let encoded = encode_result(&result_with(Outcome::NoDetection));
        let v: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(v["type"], "result");
        assert_eq!(v["sequence"], 42);
        assert_eq!(v["status"], "no_detection");
        assert!(v["payload"].is_null());
        assert!(v.get("detail").is_none());
        assert_eq!(v["counters"]["dropped"], 10);
    }

    #[test]
    fn detected_round_trips() {
        let set = LandmarkSet {
            pose: vec![Landmark::new(0.5, 0.25, 0.0)],
            left_hand: vec![Landmark::new(0.125, 0.75, 0.5)],
            ..LandmarkSet::default()
        };
        let result = result_with(Outcome::Detected(set));
        assert_eq!(decode_result(&encode_result(&result)).unwrap(), result);
    }

    #[test]
    fn decode_failure_carries_detail() {
        let result = result_with(Outcome::DecodeFailed("unsupported image format".into()));
        let encoded = encode_result(&result);
        let v: serde_json::Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(v["status"], "decode_failed");
        assert_eq!(v["detail"], "unsupported image format");
        assert_eq!(decode_result(&encoded).unwrap(), result);
    }

    #[test]
    fn decode_result_rejects_other_types() {
        let text = r#"{"type":"error","sequence":1,"status":"no_detection","payload":null,"latencyUs":0,"counters":{"received":0,"processed":0,"dropped":0,"meanLatencyUs":0,"maxLatencyUs":0}}"#;
        assert_matches!(
            decode_result(text),
            Err(ResultDecodeError::NotAResult(MessageType::Error))
        );
    }

    #[test]
    fn detected_without_payload_rejected() {
        let text = r#"{"type":"result","sequence":1,"status":"detected","payload":null,"latencyUs":0,"counters":{"received":0,"processed":0,"dropped":0,"meanLatencyUs":0,"maxLatencyUs":0}}"#;
        assert_matches!(decode_result(text), Err(ResultDecodeError::MissingLandmarks));
    }
}
