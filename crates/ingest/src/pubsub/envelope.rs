use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use glbtrace_core::error::{GlbError, Result};
use glbtrace_core::model::envelope::PushEnvelope;

/// Standard alphabet, padding optional on decode.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Unwraps a push delivery body and returns the decoded message payload.
///
/// A delivery without `message.data` yields an empty payload; rejecting that
/// is left to whoever parses the payload.
pub fn decode_envelope(body: &[u8]) -> Result<Vec<u8>> {
    let envelope: PushEnvelope =
        serde_json::from_slice(body).map_err(|e| GlbError::MalformedEnvelope(e.to_string()))?;
    tracing::debug!(
        message_id = envelope.message.message_id.as_deref().unwrap_or_default(),
        subscription = envelope.subscription.as_deref().unwrap_or_default(),
        "push envelope received"
    );
    decode_payload(&envelope.message.data)
}

pub fn decode_payload(data: &str) -> Result<Vec<u8>> {
    PAYLOAD_ENGINE
        .decode(data)
        .map_err(|e| GlbError::BadEncoding(e.to_string()))
}
