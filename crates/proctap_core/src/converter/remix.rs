//! Channel remixing between arbitrary channel counts.

/// Remix `src` (interleaved float32 frames of `src_channels` channels) into
/// `dst_channels` channels.
pub fn remix(src: &[f32], src_channels: usize, dst_channels: usize) -> Vec<f32> {
    if src_channels == dst_channels || src_channels == 0 || dst_channels == 0 {
        return src.to_vec();
    }

    let frame_count = src.len() / src_channels;
    let mut out = vec![0.0f32; frame_count * dst_channels];

    match (src_channels, dst_channels) {
        (1, 2) => {
            for i in 0..frame_count {
                let m = src[i];
                out[i * 2] = m;
                out[i * 2 + 1] = m;
            }
        }
        (2, 1) => {
            for i in 0..frame_count {
                let l = src[i * 2];
                let r = src[i * 2 + 1];
                out[i] = (l + r) * 0.5;
            }
        }
        (2, n) if n >= 3 => {
            for i in 0..frame_count {
                out[i * n] = src[i * 2];
                out[i * n + 1] = src[i * 2 + 1];
                // remaining channels left zeroed
            }
        }
        (5, 2) => {
            // Channel order front-L, front-R, center, rear-L, rear-R (no LFE slot).
            for i in 0..frame_count {
                let base = i * 5;
                let fl = src[base];
                let fr = src[base + 1];
                let center = src[base + 2];
                let rl = src[base + 3];
                let rr = src[base + 4];
                let l = fl + 0.707 * center + 0.5 * rl;
                let r = fr + 0.707 * center + 0.5 * rr;
                out[i * 2] = l.clamp(-1.0, 1.0);
                out[i * 2 + 1] = r.clamp(-1.0, 1.0);
            }
        }
        (6, 2) => {
            // 5.1 channel order front-L, front-R, center, LFE, rear-L,
            // rear-R. The LFE channel is not folded into the stereo mix.
            for i in 0..frame_count {
                let base = i * 6;
                let fl = src[base];
                let fr = src[base + 1];
                let center = src[base + 2];
                let rl = src[base + 4];
                let rr = src[base + 5];
                let l = fl + 0.707 * center + 0.5 * rl;
                let r = fr + 0.707 * center + 0.5 * rr;
                out[i * 2] = l.clamp(-1.0, 1.0);
                out[i * 2 + 1] = r.clamp(-1.0, 1.0);
            }
        }
        (n, 2) if n >= 3 => {
            // Unknown layout beyond 5/6 channels: fold center only, ignore
            // anything past front-L/front-R/center.
            for i in 0..frame_count {
                let base = i * n;
                let fl = src[base];
                let fr = src[base + 1];
                let center = src.get(base + 2).copied().unwrap_or(0.0);
                let l = fl + 0.707 * center;
                let r = fr + 0.707 * center;
                out[i * 2] = l.clamp(-1.0, 1.0);
                out[i * 2 + 1] = r.clamp(-1.0, 1.0);
            }
        }
        _ => {
            // Otherwise: truncate or zero-pad per-frame.
            let copy_channels = src_channels.min(dst_channels);
            for i in 0..frame_count {
                for c in 0..copy_channels {
                    out[i * dst_channels + c] = src[i * src_channels + c];
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_to_stereo_duplicates() {
        let out = remix(&[0.5, -0.25], 1, 2);
        assert_eq!(out, vec![0.5, 0.5, -0.25, -0.25]);
    }

    #[test]
    fn stereo_to_mono_averages() {
        let out = remix(&[0.5, -0.5, 1.0, 1.0], 2, 1);
        assert_eq!(out, vec![0.0, 1.0]);
    }

    #[test]
    fn stereo_to_surround_zeroes_extra_channels() {
        let out = remix(&[0.5, -0.5], 2, 6);
        assert_eq!(out.len(), 6);
        assert_eq!(&out[..2], &[0.5, -0.5]);
        assert_eq!(&out[2..], &[0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn surround_to_stereo_downmixes_center_and_rear() {
        // fl, fr, center, rl, rr
        let out = remix(&[0.2, 0.2, 1.0, 0.1, 0.1], 5, 2);
        let expected_l: f32 = 0.2 + 0.707 * 1.0 + 0.5 * 0.1;
        assert!((out[0] - expected_l.clamp(-1.0, 1.0)).abs() < 0.001);
    }

    #[test]
    fn identity_remix_is_passthrough() {
        let out = remix(&[0.1, 0.2, 0.3, 0.4], 2, 2);
        assert_eq!(out, vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn lfe_channel_is_ignored_in_downmix() {
        // 5.1 layout: fl, fr, center, lfe, rear-l, rear-r.
        let quiet_lfe = remix(&[0.2, 0.2, 1.0, 0.0, 0.1, 0.1], 6, 2);
        let loud_lfe = remix(&[0.2, 0.2, 1.0, 0.9, 0.1, 0.1], 6, 2);
        assert_eq!(quiet_lfe, loud_lfe);

        let expected_l = (0.2f32 + 0.707 * 1.0 + 0.5 * 0.1).clamp(-1.0, 1.0);
        let expected_r = (0.2f32 + 0.707 * 1.0 + 0.5 * 0.1).clamp(-1.0, 1.0);
        assert!((quiet_lfe[0] - expected_l).abs() < 0.001);
        assert!((quiet_lfe[1] - expected_r).abs() < 0.001);
    }
}
