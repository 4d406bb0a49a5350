//! Short-time energy of decoded audio.

/// Hop and frame length, in seconds, of the song energy curve.
pub const ENERGY_HOP_S: f64 = 0.5;

/// Centered RMS frames: frame `i` covers `frame_len` samples around sample
/// `i * hop`, zero padded at both edges. A signal of `n` samples yields
/// `1 + n / hop` frames, frame `i` sitting at time `i * hop / sample_rate`.
pub fn rms_frames(samples: &[f32], hop: usize, frame_len: usize) -> Vec<f64> {
    if samples.is_empty() || hop == 0 || frame_len == 0 {
        return Vec::new();
    }

    let n_frames = 1 + samples.len() / hop;
    let half = frame_len / 2;
    let mut frames = Vec::with_capacity(n_frames);

    for i in 0..n_frames {
        let center = i * hop;
        let lo = center.saturating_sub(half);
        let hi = (center + frame_len - half).min(samples.len());
        let sum: f64 = samples[lo.min(hi)..hi]
            .iter()
            .map(|s| (*s as f64) * (*s as f64))
            .sum();
        frames.push((sum / frame_len as f64).sqrt());
    }
    frames
}

/// The song energy curve at [`ENERGY_HOP_S`] resolution.
pub fn song_energy(samples: &[f32], sample_rate: u32) -> Vec<f64> {
    let hop = (ENERGY_HOP_S * sample_rate as f64).round() as usize;
    rms_frames(samples, hop, hop)
}

/// Non-centered RMS over consecutive blocks of `hop` samples.
pub fn block_energy(samples: &[f32], hop: usize) -> Vec<f64> {
    if hop == 0 {
        return Vec::new();
    }
    samples
        .chunks(hop)
        .map(|block| {
            let sum: f64 = block.iter().map(|s| (*s as f64) * (*s as f64)).sum();
            (sum / hop as f64).sqrt()
        })
        .collect()
}
