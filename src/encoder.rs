//! Diagram source to URL token encoding.
//!
//! The PlantUML server expects diagram source as a path segment: the raw
//! deflate stream of the UTF-8 bytes (no zlib header, no checksum), encoded
//! with PlantUML's own base64 dialect. The server derives the payload length
//! itself, so no padding characters are emitted.

use base64::{
    Engine,
    alphabet::Alphabet,
    engine::{DecodePaddingMode, GeneralPurposeConfig, general_purpose::GeneralPurpose},
};
use deflate::deflate_bytes;

const ENGINE_CONFIG: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_encode_padding(false)
    .with_decode_padding_mode(DecodePaddingMode::Indifferent);

// The standard alphabet permuted position-for-position: digits first, then
// upper case, lower case, and -_ instead of +/.
const ENGINE: GeneralPurpose =
    match Alphabet::new("0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_") {
        Ok(alphabet) => GeneralPurpose::new(&alphabet, ENGINE_CONFIG),
        Err(_e) => unreachable!(),
    };

/// Compress and encode diagram source into the token the server expects.
/// Deterministic and infallible for any UTF-8 input.
pub fn encode(source: &str) -> String {
    ENGINE.encode(deflate_bytes(source.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Read;

    /// Inverse of [`encode`], only needed to prove the round trip.
    fn decode(token: &str) -> Vec<u8> {
        let compressed = ENGINE.decode(token).unwrap();
        let mut source = Vec::new();
        flate2::read::DeflateDecoder::new(compressed.as_slice())
            .read_to_end(&mut source)
            .unwrap();
        source
    }

    #[test]
    fn encodes_known_token() {
        // Token the official server resolves to this diagram.
        assert_eq!("SrRGrQsnKt0100", encode("C --|> D"));
    }

    #[test]
    fn round_trips() {
        let samples = [
            "",
            "A",
            "C --|> D",
            "@startuml\nBob -> Alice : hello\n@enduml",
            "participant \"Ünïcodé ÿ\" as U\nU -> U : 日本語",
            &"a very repetitive diagram line\n".repeat(100),
        ];
        for source in samples {
            assert_eq!(source.as_bytes(), decode(&encode(source)).as_slice());
        }
    }

    #[test]
    fn output_is_url_path_safe() {
        let source = "@startuml\nclass Foo {\n  +bar(baz: int): str\n}\n@enduml";
        let token = encode(source);
        assert!(!token.is_empty());
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "unsafe character in token {token:?}"
        );
    }

    #[test]
    fn no_padding_regardless_of_length() {
        // Compressed lengths vary with the input, none may produce '='.
        for n in 0..32 {
            let token = encode(&"x".repeat(n));
            assert!(!token.contains('='), "padded token for length {n}: {token:?}");
        }
    }
}
