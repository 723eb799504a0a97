use sensa_core::{Decoder, Point};

use crate::{DecodeError, globalsat, radiobridge, tektelic};

type DecodeFn = fn(&[u8], &mut Vec<Point>) -> Result<(), DecodeError>;

/// Result of running a decoder.
///
/// A malformed payload still returns every point parsed before the error was
/// hit, so callers must publish `points` even when `error` is set.
#[derive(Debug, Default, PartialEq)]
pub struct Decoded {
    pub points: Vec<Point>,
    pub error: Option<DecodeError>,
}

impl Decoded {
    fn not_found(kind: Decoder) -> Self {
        Self {
            points: Vec::new(),
            error: Some(DecodeError::NotFound(kind.as_str().to_owned())),
        }
    }
}

fn lookup(kind: Decoder) -> Option<DecodeFn> {
    match kind {
        Decoder::Raw => Some(raw),
        Decoder::RadioBridgeDoorV1 => Some(radiobridge::door_v1),
        Decoder::RadioBridgeDoorV2 => Some(radiobridge::door_v2),
        Decoder::GlobalsatCo2 => Some(globalsat::co2),
        Decoder::TektelicHomeV1 => Some(tektelic::home_v1),
        Decoder::Unspecified | Decoder::Gateway => None,
    }
}

/// Decode `data` with the decoder registered for `kind`.
pub fn decode(kind: Decoder, data: &[u8]) -> Decoded {
    let Some(decode_fn) = lookup(kind) else {
        return Decoded::not_found(kind);
    };

    let mut points = Vec::new();
    let error = decode_fn(data, &mut points).err();
    Decoded { points, error }
}

// Devices with the raw decoder only report metadata points upstream.
fn raw(_data: &[u8], _points: &mut Vec<Point>) -> Result<(), DecodeError> {
    Ok(())
}
