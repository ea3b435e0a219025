//! Capture sample rate conversion
//!
//! A [`Resampler`] converts from the native capture rate to the rate a client
//! asked for. It does not own its input: every [`Resampler::pull`] call is
//! handed the [`FrameSource`] to draw native frames from, which lets the input
//! stream own both the resampler and the capture buffer it reads.

use crate::error::{HalError, HalResult};

/// Supplier of native-rate interleaved frames
pub trait FrameSource {
    /// Borrow up to `max_frames` frames
    ///
    /// May return fewer frames than asked for, but never zero on success.
    fn next_frames(&mut self, max_frames: usize) -> HalResult<&[i16]>;

    /// Mark `frames` frames of the last borrowed slice as consumed
    fn release(&mut self, frames: usize);
}

/// Pull-driven sample rate converter
pub trait Resampler: Send {
    /// Drop all history so the next pull starts from a fresh stream
    fn reset(&mut self);

    /// Produce `*frames` output frames into `out`
    ///
    /// On return `*frames` holds the number of frames actually produced, which
    /// is only short of the request when the source failed.
    fn pull(
        &mut self,
        source: &mut dyn FrameSource,
        out: &mut [i16],
        frames: &mut usize,
    ) -> HalResult<()>;
}

/// Conversion quality requested from a factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResamplerQuality {
    Low,
    #[default]
    Default,
    High,
}

/// Builds resamplers for newly opened input streams
pub trait ResamplerFactory: Send + Sync {
    fn create(
        &self,
        native_rate: u32,
        target_rate: u32,
        channels: usize,
        quality: ResamplerQuality,
    ) -> HalResult<Box<dyn Resampler>>;
}

/// Linear interpolation resampler
///
/// Keeps the two native frames surrounding the current output position and a
/// fractional offset between them, so consecutive pulls continue seamlessly.
#[derive(Debug, Clone)]
pub struct LinearResampler {
    channels: usize,
    /// Native frames consumed per output frame
    step: f64,
    /// Position between `previous` and `next`, in native frames
    fractional_position: f64,
    previous: Vec<i16>,
    next: Vec<i16>,
    primed: bool,
}

impl LinearResampler {
    /// Create a new linear resampler
    pub fn new(native_rate: u32, target_rate: u32, channels: usize) -> HalResult<Self> {
        if native_rate == 0 || target_rate == 0 {
            return Err(HalError::invalid_argument(format!(
                "cannot resample {} Hz -> {} Hz",
                native_rate, target_rate
            )));
        }
        if channels == 0 {
            return Err(HalError::invalid_argument("resampler needs at least one channel"));
        }

        Ok(Self {
            channels,
            step: native_rate as f64 / target_rate as f64,
            fractional_position: 0.0,
            previous: vec![0; channels],
            next: vec![0; channels],
            primed: false,
        })
    }

    fn advance(&mut self, source: &mut dyn FrameSource) -> HalResult<()> {
        let frame = source.next_frames(1)?;
        if frame.len() < self.channels {
            return Err(HalError::device_io("resample", "source returned a short frame"));
        }
        std::mem::swap(&mut self.previous, &mut self.next);
        self.next.copy_from_slice(&frame[..self.channels]);
        source.release(1);
        Ok(())
    }
}

impl Resampler for LinearResampler {
    fn reset(&mut self) {
        self.fractional_position = 0.0;
        self.previous.fill(0);
        self.next.fill(0);
        self.primed = false;
    }

    fn pull(
        &mut self,
        source: &mut dyn FrameSource,
        out: &mut [i16],
        frames: &mut usize,
    ) -> HalResult<()> {
        let requested = (*frames).min(out.len() / self.channels);
        *frames = 0;

        if !self.primed {
            self.advance(source)?;
            self.advance(source)?;
            self.primed = true;
        }

        for frame in out.chunks_exact_mut(self.channels).take(requested) {
            while self.fractional_position >= 1.0 {
                self.advance(source)?;
                self.fractional_position -= 1.0;
            }

            let fraction = self.fractional_position;
            for (channel, sample) in frame.iter_mut().enumerate() {
                let a = self.previous[channel] as f64;
                let b = self.next[channel] as f64;
                *sample = (a + (b - a) * fraction).round() as i16;
            }

            self.fractional_position += self.step;
            *frames += 1;
        }

        Ok(())
    }
}

/// Factory producing [`LinearResampler`]s regardless of quality
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearResamplerFactory;

impl ResamplerFactory for LinearResamplerFactory {
    fn create(
        &self,
        native_rate: u32,
        target_rate: u32,
        channels: usize,
        _quality: ResamplerQuality,
    ) -> HalResult<Box<dyn Resampler>> {
        Ok(Box::new(LinearResampler::new(
            native_rate,
            target_rate,
            channels,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Serves a ramp 0, 1, 2, ... in chunks of `chunk` frames
    struct CountingSource {
        channels: usize,
        chunk: usize,
        next_value: i16,
        buffer: Vec<i16>,
        offset: usize,
        fail: bool,
    }

    impl CountingSource {
        fn new(channels: usize, chunk: usize) -> Self {
            Self {
                channels,
                chunk,
                next_value: 0,
                buffer: Vec::new(),
                offset: 0,
                fail: false,
            }
        }
    }

    impl FrameSource for CountingSource {
        fn next_frames(&mut self, max_frames: usize) -> HalResult<&[i16]> {
            if self.fail {
                return Err(HalError::device_io("read", "unplugged"));
            }
            if self.offset == self.buffer.len() {
                self.buffer.clear();
                self.offset = 0;
                for _ in 0..self.chunk {
                    for _ in 0..self.channels {
                        self.buffer.push(self.next_value);
                    }
                    self.next_value += 1;
                }
            }
            let available = (self.buffer.len() - self.offset) / self.channels;
            let frames = available.min(max_frames);
            Ok(&self.buffer[self.offset..self.offset + frames * self.channels])
        }

        fn release(&mut self, frames: usize) {
            self.offset += frames * self.channels;
        }
    }

    #[test]
    fn test_rejects_zero_rate() {
        assert!(LinearResampler::new(0, 16000, 2).is_err());
        assert!(LinearResampler::new(48000, 16000, 0).is_err());
    }

    #[test]
    fn test_produces_exact_frame_count() {
        let mut resampler = LinearResampler::new(48000, 44100, 2).unwrap();
        let mut source = CountingSource::new(2, 320);
        let mut out = vec![0i16; 441 * 2];

        for _ in 0..5 {
            let mut frames = 441;
            resampler.pull(&mut source, &mut out, &mut frames).unwrap();
            assert_eq!(frames, 441);
        }
    }

    #[test]
    fn test_downsampling_by_three_picks_every_third_frame() {
        let mut resampler = LinearResampler::new(48000, 16000, 1).unwrap();
        let mut source = CountingSource::new(1, 7);
        let mut out = vec![0i16; 4];
        let mut frames = 4;

        resampler.pull(&mut source, &mut out, &mut frames).unwrap();
        assert_eq!(out, vec![0, 3, 6, 9]);
    }

    #[test]
    fn test_reset_restarts_interpolation() {
        let mut resampler = LinearResampler::new(16000, 32000, 1).unwrap();
        let mut source = CountingSource::new(1, 4);
        let mut out = vec![0i16; 3];
        let mut frames = 3;
        resampler.pull(&mut source, &mut out, &mut frames).unwrap();
        assert_eq!(out, vec![0, 1, 1]);

        resampler.reset();
        let mut source = CountingSource::new(1, 4);
        let mut frames = 3;
        resampler.pull(&mut source, &mut out, &mut frames).unwrap();
        assert_eq!(out, vec![0, 1, 1]);
    }

    #[test]
    fn test_source_failure_is_reported() {
        let mut resampler = LinearResampler::new(48000, 8000, 2).unwrap();
        let mut source = CountingSource::new(2, 4);
        source.fail = true;
        let mut out = vec![0i16; 16];
        let mut frames = 8;

        assert!(resampler.pull(&mut source, &mut out, &mut frames).is_err());
        assert_eq!(frames, 0);
    }
}
