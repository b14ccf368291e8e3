//! # Linear Interpolation Resampler
//!
//! Converts mono 16-bit PCM from one sample rate to another by estimating each
//! output sample as the weighted average of its two nearest source samples.
//!
//! ## Algorithm:
//! With `ratio = target_rate / source_rate`, output index `i` maps to the source
//! position `p = i / ratio`.
//! With `l = floor(p)` and `r = l + 1`:
//! - **r inside the input**: `out = in[l] * (1 - t) + in[r] * t`, `t = p - l`
//! - **r past the end**: `out = in[l]` (boundary clamp, no extrapolation)
//!
//! Results are narrowed back to `i16` by truncation toward zero.

use std::borrow::Cow;

/// Resample `samples` from `source_rate` to `target_rate`.
///
/// ## Returns:
/// - **Cow::Borrowed**: rates are equal or the input is empty; no allocation
/// - **Cow::Owned**: `floor(len * target_rate / source_rate)` new samples
///
/// ## Preconditions:
/// Both rates must be positive. `WavPcm::parse` rejects a zero header rate and the
/// frame driver rejects a zero target rate before any caller gets here.
///
/// ## Rust Concepts:
/// - **Cow<'a, [i16]>**: "clone on write" - lets the identity case hand back the
///   caller's own slice while every other case returns a fresh `Vec<i16>`
pub fn resample(samples: &[i16], source_rate: u32, target_rate: u32) -> Cow<'_, [i16]> {
    debug_assert!(source_rate > 0 && target_rate > 0, "sample rates must be positive");

    if source_rate == target_rate || samples.is_empty() {
        return Cow::Borrowed(samples);
    }

    let out_len = resampled_len(samples.len(), source_rate, target_rate);
    let last = samples.len() - 1;
    let ratio = target_rate as f64 / source_rate as f64;

    let resampled = (0..out_len)
        .map(|i| {
            let position = i as f64 / ratio;
            let left = (position as usize).min(last);
            let right = left + 1;

            if right > last {
                samples[left]
            } else {
                let weight = position - left as f64;
                let l_value = samples[left] as f64;
                let r_value = samples[right] as f64;
                (l_value * (1.0 - weight) + r_value * weight) as i16
            }
        })
        .collect();

    Cow::Owned(resampled)
}

/// Output length for a conversion: `floor(len * target_rate / source_rate)`.
///
/// Computed in integers so lengths never drift on float rounding.
pub fn resampled_len(len: usize, source_rate: u32, target_rate: u32) -> usize {
    if source_rate == target_rate {
        return len;
    }
    (len as u64 * target_rate as u64 / source_rate as u64) as usize
}
