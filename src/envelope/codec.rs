//! Compressed envelope encoding: base64 (standard alphabet) over zlib.

use std::io::{self, Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::envelope::error::EnvelopeError;

/// Recover the JSON document from a compressed envelope body.
///
/// CR and LF are skipped before base64 decoding so line-wrapped bodies
/// are accepted.
pub fn decode_compressed(body: &[u8]) -> Result<Bytes, EnvelopeError> {
    let text: Vec<u8> = body
        .iter()
        .copied()
        .filter(|b| !matches!(b, b'\r' | b'\n'))
        .collect();
    let compressed = STANDARD.decode(text)?;

    let mut decoder = ZlibDecoder::new(compressed.as_slice());
    let mut json = Vec::new();
    decoder
        .read_to_end(&mut json)
        .map_err(EnvelopeError::Inflate)?;
    Ok(Bytes::from(json))
}

/// Produce the body a client sends for `application/octet-stream`
/// submissions: base64(zlib(json)).
pub fn encode_compressed(json: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(json)?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed).into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const EVENT: &[u8] = br#"{"event_id":"fc6d8c0c43fc4630ad850ee518f1b9d0","level":"error"}"#;

    #[test]
    fn decodes_what_clients_encode() {
        let body = encode_compressed(EVENT).unwrap();
        assert_eq!(decode_compressed(&body).unwrap(), Bytes::from_static(EVENT));
    }

    #[test]
    fn accepts_wrapped_base64() {
        let body = encode_compressed(EVENT).unwrap();
        let mut wrapped = Vec::new();
        for line in body.chunks(16) {
            wrapped.extend_from_slice(line);
            wrapped.extend_from_slice(b"\r\n");
        }
        assert_eq!(decode_compressed(&wrapped).unwrap(), Bytes::from_static(EVENT));
    }

    #[test]
    fn rejects_bad_base64() {
        let err = decode_compressed(b"not*base64!").unwrap_err();
        assert!(matches!(err, EnvelopeError::Base64(_)));
    }

    #[test]
    fn rejects_non_zlib() {
        let body = STANDARD.encode(b"definitely not zlib");
        let err = decode_compressed(body.as_bytes()).unwrap_err();
        assert!(matches!(err, EnvelopeError::Inflate(_)));
    }
}
