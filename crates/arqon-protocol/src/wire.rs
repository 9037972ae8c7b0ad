use crate::envelope::Envelope;
use crate::error::{Error, Result};

/// Which wire encoding a connection is configured to speak.
///
/// Dev permits JSON; staging/prod must use binary (enforced by the caller,
/// not by this type — `arqon-config` carries the profile that decides it).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Json,
    Binary,
}

/// A frame as read off the socket, tagged by how it arrived.
pub enum RawFrame {
    Text(String),
    Binary(Vec<u8>),
}

impl RawFrame {
    fn format(&self) -> WireFormat {
        match self {
            RawFrame::Text(_) => WireFormat::Json,
            RawFrame::Binary(_) => WireFormat::Binary,
        }
    }
}

/// Encode `envelope` for the wire in the configured format.
pub fn encode(envelope: &Envelope, format: WireFormat) -> Result<Vec<u8>> {
    match format {
        WireFormat::Json => Ok(envelope.to_json()?.into_bytes()),
        WireFormat::Binary => envelope.to_binary(),
    }
}

/// Parse an inbound frame, rejecting it if its encoding doesn't match
/// `required` (when one is configured).
pub fn parse(frame: RawFrame, required: Option<WireFormat>) -> Result<Envelope> {
    if let Some(required) = required {
        if frame.format() != required {
            return Err(Error::UnsupportedWireFormat);
        }
    }
    match frame {
        RawFrame::Text(text) => Envelope::from_json(&text),
        RawFrame::Binary(bytes) => Envelope::from_binary(&bytes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::EnvelopeType;

    #[test]
    fn rejects_mismatched_wire_format() {
        let env = Envelope::build(EnvelopeType::Telemetry);
        let json = env.to_json().unwrap();
        let err = parse(RawFrame::Text(json), Some(WireFormat::Binary)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedWireFormat));
    }

    #[test]
    fn accepts_matching_wire_format() {
        let env = Envelope::build(EnvelopeType::Telemetry);
        let bin = env.to_binary().unwrap();
        let parsed = parse(RawFrame::Binary(bin), Some(WireFormat::Binary)).unwrap();
        assert_eq!(parsed.id, env.id);
    }
}
