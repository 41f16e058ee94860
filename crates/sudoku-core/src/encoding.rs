//! Transport encoding for the extractor's line-oriented stdin.
use crate::data_model::TransportEncoding;
use crate::error::PipelineError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// Re-encode raw upload bytes as standard padded base64.
pub fn encode_transport(bytes: &[u8]) -> TransportEncoding {
    let text = STANDARD.encode(bytes);
    debug!("Encoded upload {} bytes → {} bytes base64", bytes.len(), text.len());
    TransportEncoding(text)
}

/// Inverse of [`encode_transport`]. One trailing line terminator is accepted.
pub fn decode_transport(text: &str) -> Result<Vec<u8>, PipelineError> {
    let trimmed = text
        .strip_suffix("\r\n")
        .or_else(|| text.strip_suffix('\n'))
        .unwrap_or(text);
    STANDARD
        .decode(trimmed)
        .map_err(|e| PipelineError::Encoding(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_binary() {
        let bytes: Vec<u8> = (0..=255u8).chain([0x89, b'P', b'N', b'G', 0, 0xff]).collect();
        let encoded = encode_transport(&bytes);
        assert!(encoded.as_str().is_ascii());
        assert!(!encoded.as_str().contains('\n'));
        assert_eq!(decode_transport(encoded.as_str()).unwrap(), bytes);
    }

    #[test]
    fn test_roundtrip_empty() {
        let encoded = encode_transport(&[]);
        assert_eq!(encoded.as_str(), "");
        assert_eq!(decode_transport(encoded.as_str()).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn test_roundtrip_every_length_up_to_padding_cycle() {
        for len in 0..16 {
            let bytes: Vec<u8> = (0..len).map(|i| (i * 37 + 200) as u8).collect();
            let line = String::from_utf8(encode_transport(&bytes).into_stage_input()).unwrap();
            assert_eq!(decode_transport(&line).unwrap(), bytes, "len {len}");
        }
    }

    #[test]
    fn test_stage_input_has_single_terminator() {
        let input = encode_transport(b"sudoku").into_stage_input();
        assert_eq!(input, b"c3Vkb2t1\n");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = decode_transport("not base64!!").unwrap_err();
        assert!(err.to_string().starts_with("ENCODING/"));
    }
}
