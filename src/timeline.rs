//! Timeline notches drawn under the waveform.

use crate::config::TimelineConfig;
use crate::shell::format_time;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickKind {
    Primary,
    Secondary,
    Notch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub seconds: f64,
    pub kind: TickKind,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Timeline {
    pub duration: f64,
    pub ticks: Vec<Tick>,
}

impl Timeline {
    pub fn build(duration: f64, config: &TimelineConfig) -> Self {
        let mut ticks = Vec::new();
        if duration.is_finite() && duration > 0.0 && config.time_interval > 0.0 {
            let count = (duration / config.time_interval).floor() as usize;
            for n in 0..=count {
                let seconds = n as f64 * config.time_interval;
                let kind = if is_multiple(seconds, config.primary_label_interval) {
                    TickKind::Primary
                } else if is_multiple(seconds, config.secondary_label_interval) {
                    TickKind::Secondary
                } else {
                    TickKind::Notch
                };
                let label = (kind != TickKind::Notch).then(|| format_time(seconds));
                ticks.push(Tick {
                    seconds,
                    kind,
                    label,
                });
            }
        }
        Self { duration, ticks }
    }

    /// Column of `seconds` in a strip `width` columns wide.
    pub fn column(&self, seconds: f64, width: u16) -> u16 {
        if self.duration <= 0.0 || width == 0 {
            return 0;
        }
        let ratio = (seconds / self.duration).clamp(0.0, 1.0);
        ((ratio * f64::from(width)).floor() as u16).min(width - 1)
    }
}

// Compared in hundredths of a second so fractional intervals still line up.
fn is_multiple(seconds: f64, interval: f64) -> bool {
    if interval <= 0.0 {
        return false;
    }
    let seconds = (seconds * 100.0).round() as i64;
    let interval = (interval * 100.0).round() as i64;
    interval > 0 && seconds % interval == 0
}
