use super::LatLng;

const PRECISION: f64 = 1e5;
const CHUNK_MASK: i64 = 0x1f;
const CONTINUATION: i64 = 0x20;
const ASCII_OFFSET: u8 = 63;

/// Codec for the encoded polyline format returned by directions providers.
///
/// Coordinates are scaled by 1e5, delta-encoded against the previous point
/// and written as zig-zag varints in 5-bit printable chunks.
pub struct PolylineCodec;

impl PolylineCodec {
    /// Decodes an encoded polyline.
    ///
    /// Malformed input yields the points decoded before the first bad byte;
    /// an empty string yields an empty path.
    pub fn decode(encoded: &str) -> Vec<LatLng> {
        let bytes = encoded.as_bytes();
        let mut cursor = 0;
        let mut lat: i64 = 0;
        let mut lng: i64 = 0;
        let mut points = Vec::new();

        while cursor < bytes.len() {
            let Some(dlat) = next_value(bytes, &mut cursor) else {
                break;
            };
            let Some(dlng) = next_value(bytes, &mut cursor) else {
                break;
            };
            match (lat.checked_add(dlat), lng.checked_add(dlng)) {
                (Some(next_lat), Some(next_lng)) => {
                    lat = next_lat;
                    lng = next_lng;
                }
                _ => break,
            }
            points.push(LatLng::new(lat as f64 / PRECISION, lng as f64 / PRECISION));
        }

        if cursor < bytes.len() {
            log::debug!(
                "polyline decode stopped at byte {} of {}",
                cursor,
                bytes.len()
            );
        }
        points
    }

    pub fn encode(points: &[LatLng]) -> String {
        let mut encoded = String::new();
        let mut prev_lat = 0i64;
        let mut prev_lng = 0i64;
        for point in points {
            let lat = (point.lat * PRECISION).round() as i64;
            let lng = (point.lng * PRECISION).round() as i64;
            push_value(lat - prev_lat, &mut encoded);
            push_value(lng - prev_lng, &mut encoded);
            prev_lat = lat;
            prev_lng = lng;
        }
        encoded
    }
}

fn next_value(bytes: &[u8], cursor: &mut usize) -> Option<i64> {
    let mut result: i64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = *bytes.get(*cursor)?;
        *cursor += 1;
        if !(ASCII_OFFSET..=126).contains(&byte) || shift > 55 {
            return None;
        }
        let chunk = i64::from(byte - ASCII_OFFSET);
        result |= (chunk & CHUNK_MASK) << shift;
        shift += 5;
        if chunk < CONTINUATION {
            break;
        }
    }
    Some(if result & 1 != 0 {
        !(result >> 1)
    } else {
        result >> 1
    })
}

fn push_value(value: i64, out: &mut String) {
    let mut remaining = if value < 0 { !(value << 1) } else { value << 1 };
    while remaining >= CONTINUATION {
        out.push(char::from(
            ((remaining & CHUNK_MASK) | CONTINUATION) as u8 + ASCII_OFFSET,
        ));
        remaining >>= 5;
    }
    out.push(char::from(remaining as u8 + ASCII_OFFSET));
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = "_p~iF~ps|U_ulLnnqC_mqNvxq`@";

    fn fixture_points() -> Vec<LatLng> {
        vec![
            LatLng::new(38.5, -120.2),
            LatLng::new(40.7, -120.95),
            LatLng::new(43.252, -126.453),
        ]
    }

    #[test]
    fn decodes_reference_fixture_exactly() {
        assert_eq!(PolylineCodec::decode(FIXTURE), fixture_points());
    }

    #[test]
    fn encodes_reference_fixture() {
        assert_eq!(PolylineCodec::encode(&fixture_points()), FIXTURE);
    }

    #[test]
    fn empty_input_yields_empty_path() {
        assert!(PolylineCodec::decode("").is_empty());
        assert_eq!(PolylineCodec::encode(&[]), "");
    }

    #[test]
    fn truncated_input_keeps_complete_points() {
        // second point has a latitude delta but no longitude delta
        let decoded = PolylineCodec::decode("_p~iF~ps|U_ulL");
        assert_eq!(decoded, vec![LatLng::new(38.5, -120.2)]);

        // dangling continuation chunk
        assert!(PolylineCodec::decode("_p~iF~ps|").is_empty());
    }

    #[test]
    fn invalid_bytes_stop_decoding() {
        let decoded = PolylineCodec::decode("_p~iF~ps|U \u{1}");
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn arbitrary_path_survives_encoding_within_precision() {
        let path = vec![
            LatLng::new(32.08531, 34.78182),
            LatLng::new(32.08601, 34.78012),
            LatLng::new(32.07999, 34.79444),
            LatLng::new(-33.86882, 151.20929),
        ];
        let decoded = PolylineCodec::decode(&PolylineCodec::encode(&path));
        assert_eq!(decoded.len(), path.len());
        for (original, restored) in path.iter().zip(&decoded) {
            assert!((original.lat - restored.lat).abs() <= 1e-5);
            assert!((original.lng - restored.lng).abs() <= 1e-5);
        }
    }
}
