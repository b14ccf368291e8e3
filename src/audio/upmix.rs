//! Mono → interleaved stereo by duplication.

/// Duplicate every mono sample into a left/right pair.
///
/// Output is exactly `2 * mono.len()` samples laid out `[L0, R0, L1, R1, ...]`
/// with `L == R`. No trailing silence is appended.
pub fn mono_to_stereo(mono: &[i16]) -> Vec<i16> {
    let mut stereo = Vec::with_capacity(mono.len() * 2);
    for &sample in mono {
        stereo.push(sample);
        stereo.push(sample);
    }
    stereo
}
