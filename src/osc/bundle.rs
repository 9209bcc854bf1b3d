//! OSC bundles
//!
//! Feedback senders may group several messages into one datagram:
//! `#bundle\0`, an 8-byte NTP time tag, then size-prefixed elements.
//! Elements are messages or nested bundles. The time tag is kept for
//! display only; elements are applied in the order they appear.

use bytes::BufMut;

use super::OscMessage;
use crate::error::CodecError;

/// Marker that opens every bundle
pub const BUNDLE_TAG: &[u8; 8] = b"#bundle\0";

/// Time tag meaning "apply immediately"
pub const IMMEDIATELY: u64 = 1;

/// Guard against hostile datagrams nesting bundles without end
const MAX_DEPTH: usize = 8;

/// A bundle of packets sharing one time tag
#[derive(Debug, Clone, PartialEq)]
pub struct OscBundle {
    pub timetag: u64,
    pub content: Vec<OscPacket>,
}

/// Anything that can arrive in one datagram
#[derive(Debug, Clone, PartialEq)]
pub enum OscPacket {
    Message(OscMessage),
    Bundle(OscBundle),
}

impl OscPacket {
    /// Parse a datagram as either a bundle or a single message
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        decode_at_depth(data, 0)
    }

    /// Serialize to wire bytes
    pub fn encode(&self) -> Vec<u8> {
        match self {
            OscPacket::Message(msg) => msg.encode(),
            OscPacket::Bundle(bundle) => {
                let mut buf = Vec::new();
                buf.put_slice(BUNDLE_TAG);
                buf.put_u64(bundle.timetag);
                for element in &bundle.content {
                    let bytes = element.encode();
                    buf.put_u32(bytes.len() as u32);
                    buf.put_slice(&bytes);
                }
                buf
            }
        }
    }

    /// Flatten into messages, depth first, in element order
    pub fn into_messages(self) -> Vec<OscMessage> {
        let mut out = Vec::new();
        self.collect_into(&mut out);
        out
    }

    fn collect_into(self, out: &mut Vec<OscMessage>) {
        match self {
            OscPacket::Message(msg) => out.push(msg),
            OscPacket::Bundle(bundle) => {
                for element in bundle.content {
                    element.collect_into(out);
                }
            }
        }
    }
}

impl From<OscMessage> for OscPacket {
    fn from(msg: OscMessage) -> Self {
        OscPacket::Message(msg)
    }
}

fn decode_at_depth(data: &[u8], depth: usize) -> Result<OscPacket, CodecError> {
    if !data.starts_with(BUNDLE_TAG) {
        return OscMessage::decode(data).map(OscPacket::Message);
    }
    if depth >= MAX_DEPTH {
        return Err(CodecError::InvalidBundle(format!(
            "nested deeper than {} levels",
            MAX_DEPTH
        )));
    }

    let header = BUNDLE_TAG.len() + 8;
    if data.len() < header {
        return Err(CodecError::Truncated {
            offset: BUNDLE_TAG.len(),
            needed: 8,
            available: data.len() - BUNDLE_TAG.len(),
        });
    }

    let mut timetag = [0u8; 8];
    timetag.copy_from_slice(&data[BUNDLE_TAG.len()..header]);
    let timetag = u64::from_be_bytes(timetag);

    let mut content = Vec::new();
    let mut pos = header;
    while pos < data.len() {
        let size_bytes = data.get(pos..pos + 4).ok_or(CodecError::Truncated {
            offset: pos,
            needed: 4,
            available: data.len() - pos,
        })?;
        let size = u32::from_be_bytes([size_bytes[0], size_bytes[1], size_bytes[2], size_bytes[3]])
            as usize;
        pos += 4;

        if size % 4 != 0 {
            return Err(CodecError::InvalidBundle(format!(
                "element size {} is not a multiple of 4",
                size
            )));
        }
        let element = data.get(pos..pos + size).ok_or(CodecError::Truncated {
            offset: pos,
            needed: size,
            available: data.len() - pos,
        })?;
        content.push(decode_at_depth(element, depth + 1)?);
        pos += size;
    }

    Ok(OscPacket::Bundle(OscBundle { timetag, content }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fader(n: u32, v: f32) -> OscMessage {
        OscMessage::float(format!("/1/volume{}", n), v)
    }

    #[test]
    fn test_plain_message_is_not_a_bundle() {
        let bytes = fader(1, 0.5).encode();
        assert_eq!(
            OscPacket::decode(&bytes).unwrap(),
            OscPacket::Message(fader(1, 0.5))
        );
    }

    #[test]
    fn test_bundle_flattens_in_order() {
        let packet = OscPacket::Bundle(OscBundle {
            timetag: IMMEDIATELY,
            content: vec![
                fader(1, 0.1).into(),
                OscPacket::Bundle(OscBundle {
                    timetag: IMMEDIATELY,
                    content: vec![fader(2, 0.2).into()],
                }),
                fader(3, 0.3).into(),
            ],
        });

        let decoded = OscPacket::decode(&packet.encode()).unwrap();
        assert_eq!(decoded, packet);
        assert_eq!(
            decoded.into_messages(),
            vec![fader(1, 0.1), fader(2, 0.2), fader(3, 0.3)]
        );
    }

    #[test]
    fn test_empty_bundle() {
        let mut bytes = BUNDLE_TAG.to_vec();
        bytes.extend_from_slice(&IMMEDIATELY.to_be_bytes());
        assert!(OscPacket::decode(&bytes).unwrap().into_messages().is_empty());
    }

    #[test]
    fn test_bundle_missing_timetag() {
        let bytes = BUNDLE_TAG.to_vec();
        assert!(matches!(
            OscPacket::decode(&bytes),
            Err(CodecError::Truncated { offset: 8, .. })
        ));
    }

    #[test]
    fn test_element_size_exceeds_datagram() {
        let mut bytes = BUNDLE_TAG.to_vec();
        bytes.extend_from_slice(&IMMEDIATELY.to_be_bytes());
        bytes.extend_from_slice(&64u32.to_be_bytes());
        bytes.extend_from_slice(&fader(1, 0.5).encode());
        assert!(matches!(
            OscPacket::decode(&bytes),
            Err(CodecError::Truncated { offset: 20, needed: 64, .. })
        ));
    }

    #[test]
    fn test_misaligned_element_size() {
        let mut bytes = BUNDLE_TAG.to_vec();
        bytes.extend_from_slice(&IMMEDIATELY.to_be_bytes());
        bytes.extend_from_slice(&3u32.to_be_bytes());
        bytes.extend_from_slice(&[0, 0, 0]);
        assert!(matches!(
            OscPacket::decode(&bytes),
            Err(CodecError::InvalidBundle(_))
        ));
    }

    #[test]
    fn test_malformed_element_rejects_whole_bundle() {
        let mut bytes = BUNDLE_TAG.to_vec();
        bytes.extend_from_slice(&IMMEDIATELY.to_be_bytes());
        bytes.extend_from_slice(&4u32.to_be_bytes());
        bytes.extend_from_slice(b"/ab\0");
        assert_eq!(OscPacket::decode(&bytes), Err(CodecError::MissingTypeTags));
    }

    #[test]
    fn test_nesting_limit() {
        let mut packet = OscPacket::Message(fader(1, 0.5));
        for _ in 0..=MAX_DEPTH {
            packet = OscPacket::Bundle(OscBundle {
                timetag: IMMEDIATELY,
                content: vec![packet],
            });
        }
        assert!(matches!(
            OscPacket::decode(&packet.encode()),
            Err(CodecError::InvalidBundle(_))
        ));
    }
}
