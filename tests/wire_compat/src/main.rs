fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use trickle_protocol::{
        ChunkData, CodecError, ErrorCode, FileInfo, Message, MessageType, decode, encode,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a hex fixture. `#` starts a comment line; whitespace is ignored.
    fn load_fixture(name: &str) -> Vec<u8> {
        let path = fixtures_dir().join(name);
        let text = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        let digits: String = text
            .lines()
            .filter(|l| !l.trim_start().starts_with('#'))
            .flat_map(|l| l.chars().filter(|c| !c.is_whitespace()))
            .collect();
        hex::decode(&digits)
            .unwrap_or_else(|e| panic!("fixture {} is not valid hex: {e}", path.display()))
    }

    /// Decodes a fixture, compares it to `expected`, and checks that encoding
    /// reproduces the fixture byte for byte.
    fn roundtrip_test(name: &str, expected: Message) {
        let frame = load_fixture(name);
        let parsed = decode(&frame).unwrap_or_else(|e| panic!("failed to decode {name}: {e}"));
        assert_eq!(parsed, expected, "decoded value mismatch for {name}");
        let reencoded = encode(&parsed);
        assert_eq!(
            hex::encode(&reencoded),
            hex::encode(&frame),
            "re-encoding mismatch for {name}"
        );
    }

    fn rejected(name: &str) -> CodecError {
        let frame = load_fixture(name);
        match decode(&frame) {
            Ok(msg) => panic!("{name} decoded to {msg:?}, expected an error"),
            Err(e) => e,
        }
    }

    fn canonical_messages() -> Vec<(&'static str, Message)> {
        vec![
            (
                "handshake.hex",
                Message::Handshake {
                    version: "1.0.0".into(),
                },
            ),
            (
                "file_request.hex",
                Message::FileRequest {
                    filename: "data.bin".into(),
                },
            ),
            (
                "file_info_checksum.hex",
                Message::FileInfo(FileInfo {
                    filename: "data.bin".into(),
                    size: 10_000,
                    chunk_size: 4096,
                    checksum: Some(std::array::from_fn(|i| i as u8)),
                }),
            ),
            (
                "file_info_no_checksum.hex",
                Message::FileInfo(FileInfo {
                    filename: "empty.txt".into(),
                    size: 0,
                    chunk_size: 1024,
                    checksum: None,
                }),
            ),
            (
                "chunk_data_raw.hex",
                Message::ChunkData(ChunkData {
                    index: 2,
                    payload: b"hello".to_vec(),
                    compressed: false,
                    original_len: 5,
                }),
            ),
            (
                "chunk_data_compressed.hex",
                Message::ChunkData(ChunkData {
                    index: 0,
                    payload: vec![0x28, 0xb5, 0x2f, 0xfd, 0x20, 0x00],
                    compressed: true,
                    original_len: 4096,
                }),
            ),
            ("chunk_ack.hex", Message::ChunkAck { index: 7 }),
            (
                "error.hex",
                Message::error(ErrorCode::FileNotFound, "not found"),
            ),
            (
                "error_unknown_code.hex",
                Message::error(ErrorCode::Other(200), ""),
            ),
            ("complete.hex", Message::Complete),
        ]
    }

    // --- Canonical frames ---

    #[test]
    fn fixture_handshake() {
        roundtrip_test(
            "handshake.hex",
            Message::Handshake {
                version: "1.0.0".into(),
            },
        );
    }

    #[test]
    fn fixture_file_info_with_checksum() {
        let (name, msg) = canonical_messages().remove(2);
        roundtrip_test(name, msg);
    }

    #[test]
    fn fixture_file_info_without_checksum_is_zero_padded() {
        let frame = load_fixture("file_info_no_checksum.hex");
        assert_eq!(frame.len(), 50 + "empty.txt".len());
        assert!(frame[14..46].iter().all(|b| *b == 0));
    }

    #[test]
    fn fixture_error_preserves_unknown_code() {
        let frame = load_fixture("error_unknown_code.hex");
        match decode(&frame).unwrap() {
            Message::Error { code, text } => {
                assert_eq!(code, ErrorCode::Other(200));
                assert_eq!(code.as_u8(), 200);
                assert!(text.is_empty());
            }
            other => panic!("expected error frame, got {other:?}"),
        }
    }

    #[test]
    fn all_canonical_fixtures_roundtrip() {
        for (name, msg) in canonical_messages() {
            roundtrip_test(name, msg);
        }
    }

    #[test]
    fn every_message_type_has_a_fixture() {
        let covered: Vec<MessageType> = canonical_messages()
            .into_iter()
            .map(|(_, m)| m.msg_type())
            .collect();
        for tag in 0x01..=0x07u8 {
            let t = MessageType::from_tag(tag).unwrap();
            assert!(covered.contains(&t), "no fixture for {t}");
        }
    }

    // --- Rejected frames ---

    #[test]
    fn fixture_unknown_tag() {
        let err = rejected("invalid/unknown_tag.hex");
        assert_eq!(err, CodecError::UnknownTag(0x09));
        assert_eq!(err.error_code(), ErrorCode::UnknownMessage);
    }

    #[test]
    fn fixture_stray_checksum() {
        assert_eq!(rejected("invalid/stray_checksum.hex"), CodecError::StrayChecksum);
    }

    #[test]
    fn fixture_bad_flag() {
        assert_eq!(
            rejected("invalid/bad_flag.hex"),
            CodecError::InvalidFlag {
                field: "compressed",
                value: 2
            }
        );
    }

    #[test]
    fn fixture_length_mismatch() {
        assert!(matches!(
            rejected("invalid/length_mismatch.hex"),
            CodecError::LengthMismatch {
                msg_type: MessageType::FileRequest,
                declared: 8,
                actual: 9,
            }
        ));
    }

    #[test]
    fn fixture_truncated_ack() {
        assert!(matches!(
            rejected("invalid/truncated_ack.hex"),
            CodecError::Truncated {
                msg_type: MessageType::ChunkAck,
                ..
            }
        ));
    }

    #[test]
    fn fixture_bad_utf8() {
        let err = rejected("invalid/bad_utf8.hex");
        assert_eq!(err, CodecError::InvalidUtf8 { field: "version" });
        assert_eq!(err.error_code(), ErrorCode::MalformedMessage);
    }

    // --- Stream framing ---

    #[tokio::test]
    async fn stream_reader_splits_concatenated_fixtures() {
        let messages = canonical_messages();
        let mut stream = Vec::new();
        for (name, _) in &messages {
            stream.extend_from_slice(&load_fixture(name));
        }

        let mut cursor = &stream[..];
        for (name, expected) in messages {
            let got = trickle_session::wire::read_message(&mut cursor)
                .await
                .unwrap_or_else(|e| panic!("stream read failed at {name}: {e}"));
            assert_eq!(got, expected, "stream mismatch at {name}");
        }
        assert!(cursor.is_empty());
    }
}
