use spectrum_analyzer::scaling::divide_by_N_sqrt;
use spectrum_analyzer::windows::hann_window;
use spectrum_analyzer::{FrequencyLimit, samples_fft_to_spectrum};

use crate::config::SpectrogramConfig;

// dB below the loudest bin that still gets a color
const DYNAMIC_RANGE_DB: f32 = 80.0;
// anything quieter is drawn as silence
const SILENCE_DB: f32 = -120.0;
const MIN_MAGNITUDE: f32 = 1e-10;

/// Short-time spectrum of the whole track.
///
/// `frames[i][j]` is the intensity (0..=1) of `frequencies[j]` in frame `i`,
/// bins ordered from low to high frequency.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Spectrogram {
    pub frames: Vec<Vec<f32>>,
    pub frequencies: Vec<f32>,
    pub sample_rate: u32,
    pub hop: usize,
}

impl Spectrogram {
    pub fn compute(samples: &[f32], sample_rate: u32, config: &SpectrogramConfig) -> Self {
        let fft_samples = config.fft_samples;
        let hop = fft_samples.saturating_sub(config.noverlap).max(1);
        let nyquist = sample_rate as f32 / 2.0;
        let max_frequency = config.max_frequency.min(nyquist);
        let min_frequency = config.min_frequency.min(max_frequency);
        let limit = if min_frequency < max_frequency {
            FrequencyLimit::Range(min_frequency, max_frequency)
        } else {
            FrequencyLimit::All
        };

        let mut frequencies = Vec::new();
        let mut frames_db = Vec::new();
        let mut window = vec![0.0_f32; fft_samples];
        let mut start = 0;
        while start < samples.len() {
            let end = (start + fft_samples).min(samples.len());
            window[..end - start].copy_from_slice(&samples[start..end]);
            window[end - start..].fill(0.0);

            let hann = hann_window(&window);
            match samples_fft_to_spectrum(&hann, sample_rate, limit, Some(&divide_by_N_sqrt)) {
                Ok(spectrum) => {
                    if frequencies.is_empty() {
                        frequencies = spectrum.data().iter().map(|(f, _)| f.val()).collect();
                    }
                    frames_db.push(
                        spectrum
                            .data()
                            .iter()
                            .map(|(_, v)| 20.0 * v.val().max(MIN_MAGNITUDE).log10())
                            .collect::<Vec<f32>>(),
                    );
                }
                Err(err) => {
                    tracing::warn!(start, "spectrum frame skipped: {err:?}");
                }
            }
            start += hop;
        }

        Self {
            frames: scale_to_unit(frames_db),
            frequencies,
            sample_rate,
            hop,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty() || self.frequencies.is_empty()
    }

    /// Intensity for a display cell. Row 0 is the top, i.e. the highest
    /// frequency band.
    pub fn cell(&self, col: usize, row: usize, width: usize, height: usize) -> f32 {
        if self.is_empty() || width == 0 || height == 0 {
            return 0.0;
        }
        let frame_count = self.frames.len();
        let f_start = (col * frame_count / width).min(frame_count - 1);
        let f_end = ((col + 1) * frame_count / width).clamp(f_start + 1, frame_count);

        let bins = self.frequencies.len();
        let band = height - 1 - row.min(height - 1);
        let b_start = (band * bins / height).min(bins - 1);
        let b_end = ((band + 1) * bins / height).clamp(b_start + 1, bins);

        self.frames[f_start..f_end]
            .iter()
            .flat_map(|frame| frame[b_start..b_end].iter().copied())
            .fold(0.0, f32::max)
    }
}

fn scale_to_unit(frames_db: Vec<Vec<f32>>) -> Vec<Vec<f32>> {
    let peak = frames_db
        .iter()
        .flatten()
        .copied()
        .fold(f32::NEG_INFINITY, f32::max);
    let floor = (peak - DYNAMIC_RANGE_DB).max(SILENCE_DB);
    let range = peak - floor;
    frames_db
        .into_iter()
        .map(|frame| {
            frame
                .into_iter()
                .map(|db| {
                    if range > 0.0 {
                        ((db - floor) / range).clamp(0.0, 1.0)
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn frames_follow_hop_size() {
        let config = SpectrogramConfig::default();
        let spec = Spectrogram::compute(&sine(440.0, 8000, 8000), 8000, &config);
        // 8000 samples, hop 256
        assert_eq!(spec.hop, 256);
        assert_eq!(spec.frames.len(), 8000_usize.div_ceil(256));
        assert!(spec.frames.iter().all(|f| f.len() == spec.frequencies.len()));
    }

    #[test]
    fn band_is_clamped_to_nyquist() {
        let config = SpectrogramConfig::default();
        let spec = Spectrogram::compute(&sine(440.0, 8000, 2048), 8000, &config);
        let top = *spec.frequencies.last().unwrap();
        let bottom = spec.frequencies[0];
        assert!(top <= 4000.0);
        assert!(bottom >= 20.0);
    }

    #[test]
    fn sine_energy_lands_in_its_bin() {
        let config = SpectrogramConfig::default();
        let spec = Spectrogram::compute(&sine(1000.0, 8000, 4096), 8000, &config);
        let frame = &spec.frames[4];
        let (loudest, _) = frame
            .iter()
            .enumerate()
            .fold((0, f32::MIN), |best, (i, v)| if *v > best.1 { (i, *v) } else { best });
        assert!((spec.frequencies[loudest] - 1000.0).abs() < 20.0);
    }

    #[test]
    fn silence_does_not_poison_the_scale() {
        let config = SpectrogramConfig::default();
        let spec = Spectrogram::compute(&vec![0.0; 1024], 8000, &config);
        assert!(spec.frames.iter().flatten().all(|v| *v == 0.0));
    }

    #[test]
    fn top_row_reads_highest_band() {
        let spec = Spectrogram {
            frames: vec![vec![0.1, 0.9]],
            frequencies: vec![100.0, 200.0],
            sample_rate: 8000,
            hop: 256,
        };
        assert_eq!(spec.cell(0, 0, 1, 2), 0.9);
        assert_eq!(spec.cell(0, 1, 1, 2), 0.1);
    }
}
