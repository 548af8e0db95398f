//! Encode canonical float32 interleaved samples to any destination
//! [`SampleEncoding`].

use proctap_platform::SampleEncoding;

/// Encode `samples` (float32 interleaved) into `encoding`'s byte layout.
/// Clamps to ±1.0 before scaling; integer outputs round-to-nearest-even
/// (`f32::round_ties_even`).
pub fn encode(samples: &[f32], encoding: SampleEncoding) -> Vec<u8> {
    let mut out = Vec::with_capacity(samples.len() * encoding.bytes_per_sample());

    match encoding {
        SampleEncoding::Int16 => {
            for &s in samples {
                let clamped = s.clamp(-1.0, 1.0);
                let v = (clamped * 32767.0).round_ties_even() as i16;
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        SampleEncoding::Int24Packed => {
            for &s in samples {
                let clamped = s.clamp(-1.0, 1.0);
                let v = (clamped * 8_388_607.0).round_ties_even() as i32;
                let bytes = v.to_le_bytes();
                out.extend_from_slice(&bytes[..3]);
            }
        }
        SampleEncoding::Int24In32 => {
            for &s in samples {
                let clamped = s.clamp(-1.0, 1.0);
                let v = (clamped * 8_388_607.0).round_ties_even() as i32;
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        SampleEncoding::Int32 => {
            for &s in samples {
                let clamped = s.clamp(-1.0, 1.0);
                let v = (clamped as f64 * 2_147_483_647.0).round_ties_even() as i32;
                out.extend_from_slice(&v.to_le_bytes());
            }
        }
        SampleEncoding::Float32 => {
            for &s in samples {
                out.extend_from_slice(&s.to_ne_bytes());
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::decode::decode;

    #[test]
    fn encodes_int16_round_trip_within_quantization() {
        let samples = [0.5f32, -0.5, 0.0, 0.999];
        let bytes = encode(&samples, SampleEncoding::Int16);
        let back = decode(&bytes, SampleEncoding::Int16);
        for (a, b) in samples.iter().zip(back.iter()) {
            assert!((a - b).abs() < (1.0 / 32768.0) * 1.5);
        }
    }

    #[test]
    fn clamps_out_of_range_before_scaling() {
        let bytes = encode(&[2.0, -2.0], SampleEncoding::Int16);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), i16::MAX);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), -32767);
    }

    #[test]
    fn float32_is_passthrough() {
        let bytes = encode(&[0.25], SampleEncoding::Float32);
        assert_eq!(f32::from_ne_bytes(bytes.try_into().unwrap()), 0.25);
    }

    #[test]
    fn empty_input_encodes_to_empty() {
        assert!(encode(&[], SampleEncoding::Int16).is_empty());
    }
}
