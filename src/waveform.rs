//! Column peaks for the waveform display.

/// Peak amplitude (0..=1) of `samples` for each of `width` columns.
pub fn column_peaks(samples: &[f32], width: usize) -> Vec<f32> {
    let width = width.max(1);
    let total = samples.len();
    if total == 0 {
        return vec![0.0; width];
    }
    (0..width)
        .map(|x| {
            let start = (x * total / width).min(total - 1);
            let end = ((x + 1) * total / width).clamp(start + 1, total);
            samples[start..end]
                .iter()
                .fold(0.0_f32, |peak, s| peak.max(s.abs().min(1.0)))
        })
        .collect()
}

/// Scale peaks so the loudest column reaches 1.0. Silence stays silent.
pub fn normalize(peaks: &mut [f32]) {
    let max = peaks.iter().copied().fold(0.0_f32, f32::max);
    if max <= f32::EPSILON {
        return;
    }
    for peak in peaks.iter_mut() {
        *peak /= max;
    }
}

/// Group columns into bars of `bar_width` followed by `bar_gap` columns.
///
/// Each bar shows the loudest column it covers; gap columns are zero. Widths
/// below one column collapse to one column per bar with no gap.
pub fn bars(peaks: &[f32], bar_width: f32, bar_gap: f32) -> Vec<f32> {
    let bar = bar_width.round().max(1.0) as usize;
    let gap = if bar_width + bar_gap <= 1.0 {
        0
    } else {
        bar_gap.round().max(0.0) as usize
    };
    let step = bar + gap;
    let mut out = vec![0.0; peaks.len()];
    for (chunk_index, chunk) in peaks.chunks(step).enumerate() {
        let filled = &chunk[..bar.min(chunk.len())];
        let peak = filled.iter().copied().fold(0.0_f32, f32::max);
        let start = chunk_index * step;
        for slot in &mut out[start..start + filled.len()] {
            *slot = peak;
        }
    }
    out
}

/// Peaks ready for display: sampled, optionally normalized, then barred.
pub fn render_peaks(samples: &[f32], width: usize, normalized: bool, bar_width: f32, bar_gap: f32) -> Vec<f32> {
    let mut peaks = column_peaks(samples, width);
    if normalized {
        normalize(&mut peaks);
    }
    bars(&peaks, bar_width, bar_gap)
}
