//! Audio reactivity: turn loud moments of an analyser into tertiary bursts.
//!
//! Energy is sampled once per frame from the `Update` hook. The refractory
//! interval is measured in simulation time, so exports see the same beats no
//! matter how fast they render.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Source of samples, as exposed by a host audio analyser.
///
/// Implement whichever read the host supports. Reads are tried in order:
/// float time-domain, frequency magnitudes, byte time-domain.
pub trait AudioAnalyser {
    /// Number of samples per read.
    fn fft_size(&self) -> usize {
        1024
    }

    /// Fill `buf` with samples in `-1.0..=1.0`. Returns `false` if unsupported.
    fn read_float(&self, _buf: &mut [f32]) -> bool {
        false
    }

    /// Fill `buf` with per-bin magnitudes in decibels. Returns `false` if
    /// unsupported. Bins left untouched count as silence.
    fn read_frequency(&self, _buf: &mut [f32]) -> bool {
        false
    }

    /// Fill `buf` with 8-bit samples centred on 128. Returns `false` if unsupported.
    fn read_bytes(&self, _buf: &mut [u8]) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioReactiveOptions {
    /// RMS level a frame must exceed to count as a beat.
    pub threshold: f32,
    /// Minimum simulation time between two beats.
    pub min_interval_ms: f64,
}

impl Default for AudioReactiveOptions {
    fn default() -> Self {
        Self {
            threshold: 0.06,
            min_interval_ms: 150.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioBeat {
    pub rms: f32,
    pub time_ms: f64,
}

/// Root mean square of `samples`; 0 for an empty slice.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|v| v * v).sum();
    (sum / samples.len() as f32).sqrt()
}

/// Linear amplitude of a decibel magnitude; `-inf` and NaN map to 0.
fn db_to_amplitude(db: f32) -> f32 {
    if db.is_nan() {
        return 0.0;
    }
    10f32.powf(db / 20.0)
}

/// Per-connection beat detector.
pub struct AudioReactor {
    analyser: Rc<dyn AudioAnalyser>,
    options: AudioReactiveOptions,
    last_hit_ms: f64,
    samples: Vec<f32>,
    bytes: Vec<u8>,
}

impl AudioReactor {
    pub fn new(analyser: Rc<dyn AudioAnalyser>, options: AudioReactiveOptions) -> Self {
        let size = analyser.fft_size().max(1);
        Self {
            analyser,
            options,
            last_hit_ms: 0.0,
            samples: vec![0.0; size],
            bytes: Vec::new(),
        }
    }

    /// Read one block and report a beat if it is loud enough and outside the
    /// refractory interval.
    pub fn sample(&mut self, now_ms: f64) -> Option<AudioBeat> {
        if !self.read() {
            return None;
        }
        let level = rms(&self.samples);
        if level > self.options.threshold && now_ms - self.last_hit_ms > self.options.min_interval_ms {
            self.last_hit_ms = now_ms;
            return Some(AudioBeat {
                rms: level,
                time_ms: now_ms,
            });
        }
        None
    }

    fn read(&mut self) -> bool {
        if self.analyser.read_float(&mut self.samples) {
            return true;
        }
        self.samples.fill(f32::NEG_INFINITY);
        if self.analyser.read_frequency(&mut self.samples) {
            for v in &mut self.samples {
                *v = db_to_amplitude(*v);
            }
            return true;
        }
        self.bytes.resize(self.samples.len(), 128);
        if !self.analyser.read_bytes(&mut self.bytes) {
            return false;
        }
        for (dst, &b) in self.samples.iter_mut().zip(&self.bytes) {
            *dst = (f32::from(b) - 128.0) / 128.0;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Tone {
        amplitude: Cell<f32>,
    }

    impl AudioAnalyser for Tone {
        fn fft_size(&self) -> usize {
            64
        }
        fn read_float(&self, buf: &mut [f32]) -> bool {
            for (i, v) in buf.iter_mut().enumerate() {
                *v = if i % 2 == 0 { self.amplitude.get() } else { -self.amplitude.get() };
            }
            true
        }
    }

    struct ByteTone;

    impl AudioAnalyser for ByteTone {
        fn fft_size(&self) -> usize {
            4
        }
        fn read_bytes(&self, buf: &mut [u8]) -> bool {
            buf.copy_from_slice(&[192, 64, 192, 64]);
            true
        }
    }

    /// Exposes only frequency bins, half of them filled.
    struct Spectrum {
        db: f32,
    }

    impl AudioAnalyser for Spectrum {
        fn fft_size(&self) -> usize {
            8
        }
        fn read_frequency(&self, buf: &mut [f32]) -> bool {
            let bins = buf.len() / 2;
            buf[..bins].fill(self.db);
            true
        }
        fn read_bytes(&self, _buf: &mut [u8]) -> bool {
            panic!("frequency data should be preferred over bytes");
        }
    }

    struct Silent;
    impl AudioAnalyser for Silent {}

    #[test]
    fn rms_of_square_wave_is_amplitude() {
        assert!((rms(&[0.5, -0.5, 0.5, -0.5]) - 0.5).abs() < 1e-6);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn beats_respect_threshold_and_refractory_interval() {
        let tone = Rc::new(Tone {
            amplitude: Cell::new(0.01),
        });
        let mut reactor = AudioReactor::new(tone.clone(), AudioReactiveOptions::default());
        assert!(reactor.sample(200.0).is_none(), "below threshold");

        tone.amplitude.set(0.5);
        let beat = reactor.sample(200.0).expect("loud frame");
        assert!((beat.rms - 0.5).abs() < 1e-6);
        assert!(reactor.sample(300.0).is_none(), "inside refractory interval");
        assert!(reactor.sample(351.0).is_some());
    }

    #[test]
    fn byte_data_is_dequantized() {
        let mut reactor = AudioReactor::new(Rc::new(ByteTone), AudioReactiveOptions::default());
        let beat = reactor.sample(1000.0).expect("beat");
        assert!((beat.rms - 0.5).abs() < 1e-6);
    }

    #[test]
    fn frequency_bins_are_read_as_linear_amplitude() {
        assert!((db_to_amplitude(-20.0) - 0.1).abs() < 1e-6);
        assert_eq!(db_to_amplitude(f32::NEG_INFINITY), 0.0);
        assert_eq!(db_to_amplitude(f32::NAN), 0.0);

        // Four of eight bins at 0 dB: rms = sqrt(4 / 8).
        let mut reactor =
            AudioReactor::new(Rc::new(Spectrum { db: 0.0 }), AudioReactiveOptions::default());
        let beat = reactor.sample(1000.0).expect("beat");
        assert!((beat.rms - 0.5f32.sqrt()).abs() < 1e-6);

        let mut quiet =
            AudioReactor::new(Rc::new(Spectrum { db: -60.0 }), AudioReactiveOptions::default());
        assert!(quiet.sample(1000.0).is_none(), "-60 dB is below the threshold");
    }

    #[test]
    fn analyser_without_data_never_fires() {
        let mut reactor = AudioReactor::new(Rc::new(Silent), AudioReactiveOptions::default());
        assert!(reactor.sample(1000.0).is_none());
    }
}
