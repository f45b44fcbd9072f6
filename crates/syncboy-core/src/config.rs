use thiserror::Error;

/// CPU clock in Hz. Every cycle count in this crate is expressed at this rate.
pub const CPU_CLOCK_HZ: u32 = 4_194_304;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("sample divisor must be at least 1")]
    ZeroDivisor,
    #[error("audio buffers must hold at least one frame")]
    EmptyBuffer,
    #[error("at least two audio buffers are needed, got {0}")]
    TooFewBuffers(usize),
    #[error("{frames} frames of {divisor} cycles don't fit in the scheduler range")]
    BufferTooLong { frames: usize, divisor: u32 },
}

/// Audio sample pipeline parameters.
///
/// One stereo frame is produced every `sample_divisor` CPU cycles and frames
/// are handed over `buffer_frames` at a time through a ring of
/// `buffer_count` buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct AudioConfig {
    pub sample_divisor: u32,
    pub buffer_frames: usize,
    pub buffer_count: usize,
}

impl AudioConfig {
    pub const DEFAULT_SAMPLE_DIVISOR: u32 = 64;
    pub const DEFAULT_BUFFER_FRAMES: usize = 2048;
    pub const DEFAULT_BUFFER_COUNT: usize = 2;

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_divisor == 0 {
            return Err(ConfigError::ZeroDivisor);
        }
        if self.buffer_frames == 0 {
            return Err(ConfigError::EmptyBuffer);
        }
        if self.buffer_count < 2 {
            return Err(ConfigError::TooFewBuffers(self.buffer_count));
        }
        // The APU schedules itself a whole buffer ahead
        let span = (self.buffer_frames as u64).saturating_mul(self.sample_divisor as u64);
        if span >= i32::MAX as u64 {
            return Err(ConfigError::BufferTooLong {
                frames: self.buffer_frames,
                divisor: self.sample_divisor,
            });
        }
        Ok(())
    }

    /// Output sample rate in Hz (65536 with the defaults).
    pub fn sample_rate_hz(&self) -> u32 {
        CPU_CLOCK_HZ / self.sample_divisor.max(1)
    }

    /// CPU cycles needed to fill one buffer.
    pub fn buffer_cycles(&self) -> u64 {
        self.buffer_frames as u64 * self.sample_divisor as u64
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_divisor: Self::DEFAULT_SAMPLE_DIVISOR,
            buffer_frames: Self::DEFAULT_BUFFER_FRAMES,
            buffer_count: Self::DEFAULT_BUFFER_COUNT,
        }
    }
}
