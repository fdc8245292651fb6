// Copyright Catenary Transit Initiatives
// Encoded polyline decoding for directions provider step geometry

use crate::Coordinate;
use thiserror::Error;

/// Scale factor for the default polyline precision of 1e-5 degrees.
const PRECISION_SCALE: f64 = 1e5;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolylineCodecError {
    /// The byte stream ended in the middle of a coordinate, either inside a
    /// varint run (dangling continuation bit) or with a latitude delta
    /// missing its longitude mate.
    #[error("encoded polyline ends mid-coordinate")]
    MalformedPolyline,

    /// A byte outside the 63..=126 polyline alphabet window.
    #[error("byte {0:#04x} is not in the polyline alphabet")]
    InvalidCharacter(u8),

    #[error("could not encode coordinates as a polyline: {0}")]
    Encode(String),
}

/// Decodes an encoded polyline into an ordered coordinate sequence.
///
/// Each coordinate is reconstructed from two variable-length runs of 5-bit
/// groups (continuation flag in the high bit), zig-zag sign-restored, scaled
/// by 1e-5 and accumulated onto a running (lat, lng) starting at (0, 0).
/// Pure and deterministic; an empty string decodes to an empty sequence.
pub fn decode_polyline(encoded: &str) -> Result<Vec<Coordinate>, PolylineCodecError> {
    let bytes = encoded.as_bytes();
    let mut coordinates = Vec::new();

    let mut cursor = 0usize;
    let mut lat_e5: i64 = 0;
    let mut lng_e5: i64 = 0;

    while cursor < bytes.len() {
        let (lat_delta, after_lat) = decode_delta(bytes, cursor)?;
        if after_lat >= bytes.len() {
            // latitude arrived without its longitude mate
            return Err(PolylineCodecError::MalformedPolyline);
        }
        let (lng_delta, after_lng) = decode_delta(bytes, after_lat)?;

        lat_e5 += lat_delta;
        lng_e5 += lng_delta;

        coordinates.push(Coordinate {
            lat: lat_e5 as f64 / PRECISION_SCALE,
            lng: lng_e5 as f64 / PRECISION_SCALE,
        });

        cursor = after_lng;
    }

    Ok(coordinates)
}

/// One zig-zag encoded delta starting at `start`. Returns the signed delta in
/// 1e-5 units and the index of the byte after the run.
fn decode_delta(bytes: &[u8], start: usize) -> Result<(i64, usize), PolylineCodecError> {
    let mut accumulator: i64 = 0;
    let mut shift = 0u32;
    let mut cursor = start;

    loop {
        let byte = match bytes.get(cursor) {
            Some(byte) => *byte,
            None => return Err(PolylineCodecError::MalformedPolyline),
        };
        if !(63..=126).contains(&byte) {
            return Err(PolylineCodecError::InvalidCharacter(byte));
        }

        let group = (byte - 63) as i64;
        accumulator |= (group & 0x1f) << shift;
        shift += 5;
        cursor += 1;

        if group & 0x20 == 0 {
            break;
        }
    }

    let delta = if accumulator & 1 != 0 {
        !(accumulator >> 1)
    } else {
        accumulator >> 1
    };

    Ok((delta, cursor))
}

/// Encodes coordinates back into the compact polyline form at precision 5.
/// Used for debug dumps of step geometry and for round-trip testing.
pub fn encode_polyline(coordinates: &[Coordinate]) -> Result<String, PolylineCodecError> {
    let linestring: geo::LineString = coordinates
        .iter()
        .map(|c| geo::coord! { x: c.lng, y: c.lat })
        .collect();

    polyline::encode_coordinates(linestring, 5)
        .map_err(|err| PolylineCodecError::Encode(err.to_string()))
}
