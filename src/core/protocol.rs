use serde::{Deserialize, Serialize};

use crate::utils::{P2PError, Result};

/// The closed set of overlay messages. Internally tagged so the wire payload
/// keeps the `{"type": "bloom_check", ...}` shape peers expect.
///
/// Every message carries a `requestId` correlation token; `BloomCheck`
/// additionally carries the remaining hop budget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Message {
    BloomCheck {
        filename: String,
        request_id: u64,
        ttl: u8,
    },
    BloomCheckResponse {
        filename: String,
        request_id: u64,
        present: bool,
    },
    FileRequest {
        filename: String,
        request_id: u64,
    },
    FileData {
        filename: String,
        request_id: u64,
        #[serde(with = "hex_bytes")]
        data: Vec<u8>,
    },
    FileNotFound {
        filename: String,
        request_id: u64,
    },
}

impl Message {
    pub fn filename(&self) -> &str {
        match self {
            Message::BloomCheck { filename, .. }
            | Message::BloomCheckResponse { filename, .. }
            | Message::FileRequest { filename, .. }
            | Message::FileData { filename, .. }
            | Message::FileNotFound { filename, .. } => filename,
        }
    }

    pub fn request_id(&self) -> u64 {
        match self {
            Message::BloomCheck { request_id, .. }
            | Message::BloomCheckResponse { request_id, .. }
            | Message::FileRequest { request_id, .. }
            | Message::FileData { request_id, .. }
            | Message::FileNotFound { request_id, .. } => *request_id,
        }
    }
}

/// Serialize a message into one frame payload.
pub fn encode(message: &Message) -> Result<Vec<u8>> {
    serde_json::to_vec(message).map_err(|e| P2PError::MalformedMessage(e.to_string()))
}

/// Decode one frame payload. Unknown type tags, missing fields and invalid
/// hex all classify as `MalformedMessage`; the offending connection is
/// closed by the caller.
pub fn decode(bytes: &[u8]) -> Result<Message> {
    serde_json::from_slice(bytes).map_err(|e| P2PError::MalformedMessage(e.to_string()))
}

/// File bytes travel hex-encoded inside the JSON payload.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(&text).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<Message> {
        vec![
            Message::BloomCheck {
                filename: "a.txt".into(),
                request_id: 7,
                ttl: 4,
            },
            Message::BloomCheckResponse {
                filename: "a.txt".into(),
                request_id: 7,
                present: true,
            },
            Message::FileRequest {
                filename: "a.txt".into(),
                request_id: 7,
            },
            Message::FileData {
                filename: "a.txt".into(),
                request_id: 7,
                data: vec![0x00, 0xff, 0x10],
            },
            Message::FileNotFound {
                filename: "a.txt".into(),
                request_id: 7,
            },
        ]
    }

    #[test]
    fn encode_decode_round_trip() {
        for message in all_variants() {
            let bytes = encode(&message).unwrap();
            let back = decode(&bytes).unwrap();
            assert_eq!(message, back);
        }
    }

    #[test]
    fn wire_shape_matches_protocol() {
        let message = Message::BloomCheck {
            filename: "a.txt".into(),
            request_id: 99,
            ttl: 3,
        };
        let value: serde_json::Value = serde_json::from_slice(&encode(&message).unwrap()).unwrap();
        assert_eq!(value["type"], "bloom_check");
        assert_eq!(value["filename"], "a.txt");
        assert_eq!(value["requestId"], 99);
        assert_eq!(value["ttl"], 3);
    }

    #[test]
    fn file_bytes_are_hex_on_the_wire() {
        let message = Message::FileData {
            filename: "a.txt".into(),
            request_id: 1,
            data: vec![0xde, 0xad],
        };
        let value: serde_json::Value = serde_json::from_slice(&encode(&message).unwrap()).unwrap();
        assert_eq!(value["data"], "dead");
    }

    #[test]
    fn unknown_type_tag_is_malformed() {
        let err = decode(br#"{"type":"warp_drive","filename":"x"}"#).unwrap_err();
        assert!(matches!(err, P2PError::MalformedMessage(_)));
    }

    #[test]
    fn truncated_payload_is_malformed() {
        let err = decode(br#"{"type":"bloom_check","filena"#).unwrap_err();
        assert!(matches!(err, P2PError::MalformedMessage(_)));
    }

    #[test]
    fn invalid_hex_is_malformed() {
        let err = decode(br#"{"type":"file_data","filename":"x","requestId":1,"data":"zz!"}"#)
            .unwrap_err();
        assert!(matches!(err, P2PError::MalformedMessage(_)));
    }
}
