//! Decode raw PCM bytes in any source [`SampleEncoding`] to canonical
//! float32 interleaved samples.

use proctap_platform::SampleEncoding;

/// Decode `bytes` (a whole number of frames in `encoding`) into interleaved
/// float32 samples, scaled by `1 / 2^(bits-1)` and saturated at ±1.0.
///
/// `bytes.len()` must already be a whole-frame multiple in `channel_count`
/// channels of `encoding`; the converter enforces this before calling in.
pub fn decode(bytes: &[u8], encoding: SampleEncoding) -> Vec<f32> {
    let bytes_per_sample = encoding.bytes_per_sample();
    let sample_count = bytes.len() / bytes_per_sample;
    let mut out = Vec::with_capacity(sample_count);

    match encoding {
        SampleEncoding::Int16 => {
            for chunk in bytes.chunks_exact(2) {
                let v = i16::from_le_bytes([chunk[0], chunk[1]]);
                out.push((v as f32 / 32768.0).clamp(-1.0, 1.0));
            }
        }
        SampleEncoding::Int24Packed => {
            for chunk in bytes.chunks_exact(3) {
                let raw = (chunk[0] as i32) | ((chunk[1] as i32) << 8) | ((chunk[2] as i32) << 16);
                // Sign-extend the 24-bit value held in the low 3 bytes.
                let signed = (raw << 8) >> 8;
                out.push((signed as f32 / 8_388_608.0).clamp(-1.0, 1.0));
            }
        }
        SampleEncoding::Int24In32 => {
            for chunk in bytes.chunks_exact(4) {
                let v = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                out.push((v as f32 / 8_388_608.0).clamp(-1.0, 1.0));
            }
        }
        SampleEncoding::Int32 => {
            for chunk in bytes.chunks_exact(4) {
                let v = i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                out.push((v as f32 / 2_147_483_648.0).clamp(-1.0, 1.0));
            }
        }
        SampleEncoding::Float32 => {
            for chunk in bytes.chunks_exact(4) {
                out.push(f32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_int16_full_scale() {
        let bytes = i16::MAX.to_le_bytes();
        let samples = decode(&bytes, SampleEncoding::Int16);
        assert!((samples[0] - 0.99997).abs() < 0.001);
    }

    #[test]
    fn decodes_int16_negative_full_scale() {
        let bytes = i16::MIN.to_le_bytes();
        let samples = decode(&bytes, SampleEncoding::Int16);
        assert!((samples[0] - (-1.0)).abs() < 0.0001);
    }

    #[test]
    fn decodes_float32_passthrough() {
        let bytes = 0.5f32.to_ne_bytes();
        let samples = decode(&bytes, SampleEncoding::Float32);
        assert_eq!(samples[0], 0.5);
    }

    #[test]
    fn decodes_int24_packed_sign_extends() {
        // -1 in 24-bit two's complement: 0xFFFFFF little-endian
        let bytes = [0xFF, 0xFF, 0xFF];
        let samples = decode(&bytes, SampleEncoding::Int24Packed);
        assert!((samples[0] - (-1.0 / 8_388_608.0 * 8_388_608.0)).abs() < 0.0001);
        assert!(samples[0] < 0.0);
    }

    #[test]
    fn decodes_int24_packed_positive() {
        let bytes = [0x00, 0x00, 0x40]; // 0x400000 = 4194304
        let samples = decode(&bytes, SampleEncoding::Int24Packed);
        assert!((samples[0] - 0.5).abs() < 0.0001);
    }

    #[test]
    fn empty_input_decodes_to_empty() {
        assert!(decode(&[], SampleEncoding::Int16).is_empty());
    }
}
