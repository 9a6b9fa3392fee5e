use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use rodio::Source;
use rodio::source::SeekError;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::analyzer::Spectrogram;
use crate::config::PlayerConfig;
use crate::engine::{Engine, EngineError, EngineEvent, EngineFactory, EngineId, EngineView, Plugin};
use crate::object_url::ObjectUrl;
use crate::timeline::Timeline;
use crate::waveform;

// Samples of the whole file, interleaved
pub type Samples = Arc<[f32]>;
pub type SampleRate = u32;

/// Fully decoded track.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Samples,
    pub sample_rate: SampleRate,
    pub channels: u16,
}

impl DecodedAudio {
    pub fn from_bytes(bytes: Arc<[u8]>) -> Result<Self, EngineError> {
        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        // no extension to go on, let the probe sniff the container
        let hint = Hint::new();
        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();
        let probed = symphonia::default::get_probe().format(&hint, mss, &fmt_opts, &meta_opts)?;
        let mut format = probed.format;

        // Find the first audio track with a known (decodeable) codec.
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(EngineError::NoTrack)?;

        let dec_opts: DecoderOptions = Default::default();
        let mut decoder = symphonia::default::get_codecs().make(&track.codec_params, &dec_opts)?;
        let track_id = track.id;

        let mut all_samples = Vec::<f32>::new();
        let mut sample_buf = None;
        let mut sample_rate = track.codec_params.sample_rate.unwrap_or(44100);
        let mut channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(2);

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                // end of stream
                Err(Error::IoError(_)) => break,
                Err(err) => return Err(err.into()),
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(audio_buf) => {
                    // The first decoded packet fixes the buffer format.
                    if sample_buf.is_none() {
                        let spec = *audio_buf.spec();
                        sample_rate = spec.rate;
                        channels = spec.channels.count() as u16;
                        // Note: this is capacity, not length
                        let duration = audio_buf.capacity() as u64;
                        sample_buf = Some(SampleBuffer::<f32>::new(duration, spec));
                    }

                    if let Some(buf) = &mut sample_buf {
                        buf.copy_interleaved_ref(audio_buf);
                        all_samples.extend_from_slice(buf.samples());
                    }
                }
                Err(Error::DecodeError(err)) => {
                    tracing::debug!("skipping undecodable packet: {err}");
                }
                Err(err) => return Err(err.into()),
            }
        }

        if all_samples.is_empty() {
            return Err(EngineError::NoTrack);
        }
        tracing::info!(
            sample_rate,
            channels,
            frames = all_samples.len() / usize::from(channels.max(1)),
            "decoded audio"
        );
        Ok(Self {
            samples: all_samples.into(),
            sample_rate,
            channels: channels.max(1),
        })
    }

    pub fn duration(&self) -> f64 {
        let frames = self.samples.len() / usize::from(self.channels);
        frames as f64 / f64::from(self.sample_rate)
    }

    /// Average all channels into one.
    pub fn mono(&self) -> Vec<f32> {
        let channels = usize::from(self.channels);
        self.samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    }

    /// Mono mixdown at `target_rate`, linearly interpolated.
    pub fn mono_at(&self, target_rate: SampleRate) -> Vec<f32> {
        resample(&self.mono(), self.sample_rate, target_rate)
    }
}

pub fn resample(samples: &[f32], from: SampleRate, to: SampleRate) -> Vec<f32> {
    if from == to || samples.is_empty() || to == 0 {
        return samples.to_vec();
    }
    let ratio = f64::from(from) / f64::from(to);
    let out_len = ((samples.len() as f64) / ratio).floor().max(1.0) as usize;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * ratio;
            let idx = pos.floor() as usize;
            let frac = (pos - idx as f64) as f32;
            let a = samples[idx.min(samples.len() - 1)];
            let b = samples[(idx + 1).min(samples.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}

/// Playable, seekable view over decoded samples.
#[derive(Clone)]
pub struct AudioFile {
    samples: Samples,
    sample_rate: SampleRate,
    channels: u16,
    // index into the interleaved samples
    playback_position: usize,
}

impl AudioFile {
    pub fn new(audio: &DecodedAudio) -> Self {
        Self {
            samples: Arc::clone(&audio.samples),
            sample_rate: audio.sample_rate,
            channels: audio.channels,
            playback_position: 0,
        }
    }
}

impl Iterator for AudioFile {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let sample = self.samples.get(self.playback_position).copied();
        if sample.is_some() {
            self.playback_position += 1;
        }
        sample
    }
}

impl Source for AudioFile {
    fn current_span_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> rodio::ChannelCount {
        self.channels
    }

    fn sample_rate(&self) -> SampleRate {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        let frames = self.samples.len() / usize::from(self.channels);
        Some(Duration::from_secs_f64(
            frames as f64 / f64::from(self.sample_rate),
        ))
    }

    fn try_seek(&mut self, pos: Duration) -> Result<(), SeekError> {
        let channels = usize::from(self.channels);
        let frame = (pos.as_secs_f64() * f64::from(self.sample_rate)) as usize;
        // stay on a frame boundary so channels don't swap
        self.playback_position = (frame * channels).min(self.samples.len());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackState {
    Playing,
    Paused,
}

/// rodio-backed engine: plays the decoded track and draws it.
pub struct AudioEngine {
    id: EngineId,
    audio: DecodedAudio,
    // visualization samples: mono at options.sample_rate
    viz_samples: Vec<f32>,
    viz_rate: SampleRate,
    options: PlayerConfig,
    _stream_handle: rodio::OutputStream,
    sink: rodio::Sink,
    state: PlaybackState,
    last_time: f64,
    view: EngineView,
}

impl AudioEngine {
    pub fn new(source: &ObjectUrl, options: &PlayerConfig, width: u16) -> Result<Self, EngineError> {
        let bytes = source.bytes();
        if bytes.is_empty() {
            return Err(EngineError::EmptySource(source.to_string()));
        }
        let audio = DecodedAudio::from_bytes(bytes)?;
        let viz_rate = options.sample_rate;
        let viz_samples = audio.mono_at(viz_rate);

        let mut stream_handle = rodio::OutputStreamBuilder::open_default_stream()
            .map_err(|err| EngineError::Output(err.to_string()))?;
        stream_handle.log_on_drop(false);
        let sink = rodio::Sink::connect_new(stream_handle.mixer());
        sink.pause();
        sink.set_speed(options.audio_rate);
        sink.append(AudioFile::new(&audio));

        let view = EngineView {
            duration: audio.duration(),
            ..Default::default()
        };
        let mut engine = Self {
            id: EngineId::next(),
            audio,
            viz_samples,
            viz_rate,
            options: options.clone(),
            _stream_handle: stream_handle,
            sink,
            state: PlaybackState::Paused,
            last_time: 0.0,
            view,
        };
        engine.set_width(width);
        Ok(engine)
    }

    fn current_time(&self) -> f64 {
        self.sink.get_pos().as_secs_f64().min(self.view.duration)
    }

    // queue the track again from the start, paused
    fn rewind(&mut self) {
        self.sink.clear();
        self.sink.append(AudioFile::new(&self.audio));
        self.sink.pause();
        self.state = PlaybackState::Paused;
    }
}

impl Engine for AudioEngine {
    fn id(&self) -> EngineId {
        self.id
    }

    fn play(&mut self) {
        if self.sink.empty() {
            self.rewind();
        }
        self.sink.play();
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn play_pause(&mut self) {
        if self.sink.is_paused() || self.sink.empty() {
            self.play();
        } else {
            self.pause();
        }
    }

    fn seek_to(&mut self, fraction: f64) {
        if self.sink.empty() {
            self.rewind();
        }
        let target = self.view.duration * fraction.clamp(0.0, 1.0);
        if let Err(err) = self.sink.try_seek(Duration::from_secs_f64(target)) {
            tracing::warn!(target, "seek failed: {err}");
        }
    }

    fn set_width(&mut self, width: u16) {
        self.view.width = width;
        self.view.peaks = waveform::render_peaks(
            &self.viz_samples,
            usize::from(width),
            self.options.normalize,
            self.options.bar_width,
            self.options.bar_gap,
        );
    }

    fn register_plugin(&mut self, plugin: Plugin) {
        tracing::debug!(plugin = plugin.name(), "registering plugin");
        match plugin {
            Plugin::Spectrogram(config) => {
                self.view.spectrogram =
                    Some(Spectrogram::compute(&self.viz_samples, self.viz_rate, &config));
            }
            Plugin::Timeline(config) => {
                self.view.timeline = Some(Timeline::build(self.view.duration, &config));
            }
        }
    }

    fn poll_events(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        if self.state == PlaybackState::Playing && self.sink.empty() {
            events.push(EngineEvent::TimeUpdate(self.view.duration));
            events.push(EngineEvent::Finished);
            self.last_time = self.view.duration;
            self.rewind();
            return events;
        }

        let playing = !self.sink.is_paused() && !self.sink.empty();
        match (self.state, playing) {
            (PlaybackState::Paused, true) => {
                self.state = PlaybackState::Playing;
                events.push(EngineEvent::Playing);
            }
            (PlaybackState::Playing, false) => {
                self.state = PlaybackState::Paused;
                events.push(EngineEvent::Paused);
            }
            _ => (),
        }

        let time = self.current_time();
        if (time - self.last_time).abs() >= 0.01 {
            self.last_time = time;
            events.push(EngineEvent::TimeUpdate(time));
        }
        events
    }

    fn view(&self) -> Option<&EngineView> {
        Some(&self.view)
    }
}

/// Factory building [`AudioEngine`]s on the default output device.
pub fn audio_engine_factory() -> impl EngineFactory {
    |source: &ObjectUrl, options: &PlayerConfig, width: u16| -> Result<Box<dyn Engine>, EngineError> {
        let engine = AudioEngine::new(source, options, width)?;
        Ok(Box::new(engine))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 16-bit PCM WAV file in memory.
    pub(crate) fn wav_bytes(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let block_align = channels * 2;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * u32::from(block_align)).to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    #[test]
    fn decodes_wav_from_memory() {
        let samples: Vec<i16> = (0..16000).map(|i| if i % 2 == 0 { 16384 } else { -16384 }).collect();
        let bytes: Arc<[u8]> = wav_bytes(&samples, 8000, 2).into();
        let audio = DecodedAudio::from_bytes(bytes).unwrap();
        assert_eq!(audio.sample_rate, 8000);
        assert_eq!(audio.channels, 2);
        assert_eq!(audio.samples.len(), 16000);
        assert!((audio.duration() - 1.0).abs() < 1e-9);
        // left and right cancel out
        assert!(audio.mono().iter().all(|s| s.abs() < 1e-6));
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let bytes: Arc<[u8]> = vec![0x13u8; 512].into();
        assert!(DecodedAudio::from_bytes(bytes).is_err());
    }

    #[test]
    fn resample_halves_length() {
        let samples: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let out = resample(&samples, 16000, 8000);
        assert_eq!(out.len(), 50);
        assert_eq!(out[10], 20.0);
        assert_eq!(resample(&samples, 8000, 8000), samples);
    }

    #[test]
    fn seek_lands_on_frame_boundary() {
        let audio = DecodedAudio {
            samples: (0..8).map(|i| i as f32).collect::<Vec<_>>().into(),
            sample_rate: 2,
            channels: 2,
        };
        let mut file = AudioFile::new(&audio);
        assert_eq!(file.total_duration(), Some(Duration::from_secs(2)));
        file.try_seek(Duration::from_millis(1500)).unwrap();
        assert_eq!(file.next(), Some(6.0));
        assert_eq!(file.next(), Some(7.0));
        assert_eq!(file.next(), None);
        assert_eq!(file.next(), None);
    }
}
