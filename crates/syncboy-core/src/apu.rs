use log::debug;

use crate::audio_queue::{AudioConsumer, AudioProducer, Frame, audio_queue_from};
use crate::config::{AudioConfig, ConfigError};
use crate::sync::{Scheduler, SyncToken};

#[cfg(feature = "apu-trace")]
macro_rules! apu_trace {
    ($($arg:tt)*) => {
        log::trace!($($arg)*);
    };
}
#[cfg(not(feature = "apu-trace"))]
macro_rules! apu_trace {
    ($($arg:tt)*) => {};
}

/// Size of the wave pattern RAM in bytes, two 4-bit samples per byte.
pub const WAVE_RAM_SIZE: usize = 32;
const WAVE_SAMPLES: usize = WAVE_RAM_SIZE * 2;

/// Size of the wave RAM window on the memory bus (0xFF30..=0xFF3F).
pub const WAVE_RAM_WINDOW: usize = 0x10;

const T1_MAX: u32 = 0xFF;
// Duration counter unit, 1/256th of a second
const DURATION_UNIT: u32 = 0x4000;

/// Amplification applied to the 4-bit channel output.
const SAMPLE_SHIFT: u32 = 11;

/// Length counter. Only runs while enabled.
#[derive(Clone, Copy, Debug, Default)]
struct Duration {
    enable: bool,
    counter: u32,
}

impl Duration {
    fn reload(&mut self, t1: u8) {
        self.counter = (T1_MAX + 1 - t1 as u32) * DURATION_UNIT;
    }

    /// Returns true if the counter ran out at least once.
    fn update(&mut self, mut cycles: u32) -> bool {
        if !self.enable {
            return false;
        }

        let mut expired = false;
        while cycles > 0 {
            if self.counter > cycles {
                self.counter -= cycles;
                cycles = 0;
            } else {
                expired = true;
                cycles -= self.counter;
                // Wraps around to the longest duration
                self.reload(0);
            }
        }
        expired
    }
}

/// Frequency divider clocking the position in the wave pattern.
#[derive(Clone, Copy, Debug, Default)]
struct Divider {
    /// 11-bit frequency value from NR33/NR34
    offset: u16,
    counter: u32,
}

impl Divider {
    fn reload(&mut self) {
        self.counter = 2 * (0x800 - (self.offset & 0x7FF) as u32);
    }

    /// Run the divider for `cycles` and return how many times it expired.
    fn update(&mut self, mut cycles: u32) -> u32 {
        let mut count = 0;
        while cycles > 0 {
            if self.counter > cycles {
                self.counter -= cycles;
                cycles = 0;
            } else {
                count += 1;
                cycles -= self.counter;
                self.reload();
            }
        }
        count
    }
}

/// Programmable wave channel (sound 3).
#[derive(Clone, Debug)]
pub struct WaveChannel {
    /// DAC enable (NR30 bit 7)
    enable: bool,
    running: bool,
    duration: Duration,
    /// Length register, reloaded into the duration counter on write
    t1: u8,
    /// 0 mutes, 1 plays at full volume, 2 at half, 3 at quarter
    volume_shift: u8,
    divider: Divider,
    /// Position in the pattern, 0..64
    index: usize,
    ram: [u8; WAVE_RAM_SIZE],
}

impl WaveChannel {
    pub fn new() -> Self {
        let mut ch = Self {
            enable: false,
            running: false,
            duration: Duration::default(),
            t1: 0,
            volume_shift: 0,
            divider: Divider::default(),
            index: 0,
            ram: [0; WAVE_RAM_SIZE],
        };
        ch.divider.reload();
        ch
    }

    /// Reset every register. The pattern RAM is left untouched.
    pub fn reset(&mut self) {
        let ram = self.ram;
        *self = Self::new();
        self.ram = ram;
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn enabled(&self) -> bool {
        self.enable
    }

    pub fn set_enable(&mut self, enable: bool) {
        self.enable = enable;
        if !enable {
            self.running = false;
        }
    }

    pub fn volume_shift(&self) -> u8 {
        self.volume_shift
    }

    pub fn set_volume_shift(&mut self, shift: u8) {
        self.volume_shift = shift & 3;
    }

    pub fn set_length(&mut self, t1: u8) {
        self.t1 = t1;
        self.duration.reload(t1);
    }

    pub fn length(&self) -> u8 {
        self.t1
    }

    pub fn set_length_enable(&mut self, enable: bool) {
        self.duration.enable = enable;
    }

    pub fn length_enabled(&self) -> bool {
        self.duration.enable
    }

    pub fn frequency(&self) -> u16 {
        self.divider.offset
    }

    pub fn set_frequency(&mut self, offset: u16) {
        self.divider.offset = offset & 0x7FF;
    }

    pub fn position(&self) -> usize {
        self.index
    }

    pub fn read_ram(&self, index: usize) -> u8 {
        self.ram[index % WAVE_RAM_SIZE]
    }

    pub fn write_ram(&mut self, index: usize, val: u8) {
        self.ram[index % WAVE_RAM_SIZE] = val;
    }

    /// Restart the pattern from the beginning. Does nothing while the DAC is
    /// disabled.
    pub fn start(&mut self) {
        if !self.enable {
            return;
        }
        self.index = 0;
        self.running = true;
        self.divider.reload();
    }

    /// Advance the channel by `cycles` and return the 4-bit sample at the
    /// new position, after volume shift.
    pub fn next_sample(&mut self, cycles: u32) -> u8 {
        // The length counter runs even if the channel is stopped
        if self.duration.update(cycles) {
            apu_trace!("wave channel length expired");
            self.running = false;
        }

        if !self.running {
            return 0;
        }

        let steps = self.divider.update(cycles) as usize;
        self.index = (self.index + steps) % WAVE_SAMPLES;

        if self.volume_shift == 0 {
            return 0;
        }

        let byte = self.ram[self.index / 2];
        let sample = if self.index & 1 != 0 {
            byte & 0x0F
        } else {
            byte >> 4
        };
        sample >> (self.volume_shift - 1)
    }
}

impl Default for WaveChannel {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Apu {
    enable: bool,
    pub wave: WaveChannel,
    config: AudioConfig,
    /// Cycles of the current sample period already applied to the channel
    sample_period_frac: u32,
    /// Next frame to write in the current buffer
    sample_index: usize,
    buffer_index: usize,
    buffers_completed: u64,
    output: Option<AudioProducer>,
}

impl Apu {
    pub fn new(config: AudioConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            enable: true,
            wave: WaveChannel::new(),
            config,
            sample_period_frac: 0,
            sample_index: 0,
            buffer_index: 0,
            buffers_completed: 0,
            output: None,
        })
    }

    /// Back to power-on state. The sample ring position and the output
    /// connection are kept.
    pub fn reset(&mut self) {
        self.enable = true;
        self.wave.reset();
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    pub fn enabled(&self) -> bool {
        self.enable
    }

    /// Number of buffers filled since creation, whether or not an output is
    /// connected.
    pub fn buffers_completed(&self) -> u64 {
        self.buffers_completed
    }

    pub fn sample_index(&self) -> usize {
        self.sample_index
    }

    /// Connect a consumer to the sample pipeline. From now on the emulation
    /// blocks whenever the consumer falls `buffer_count` buffers behind.
    ///
    /// Frames produced before the next buffer boundary are not delivered.
    pub fn enable_output(&mut self, sched: &mut dyn Scheduler) -> AudioConsumer {
        self.sync(sched);

        // First buffer the producer will acquire
        let first = if self.sample_index == 0 {
            self.buffer_index
        } else {
            self.buffer_index + 1
        };
        let (producer, consumer) = audio_queue_from(&self.config, first);
        self.output = Some(producer);
        debug!(
            "Audio output enabled at {} Hz, {} buffers of {} frames",
            self.config.sample_rate_hz(),
            self.config.buffer_count,
            self.config.buffer_frames
        );
        consumer
    }

    /// Disconnect the consumer. The buffer being filled is never posted,
    /// buffers already handed over can still be drained.
    pub fn disable_output(&mut self, sched: &mut dyn Scheduler) {
        self.sync(sched);

        if let Some(producer) = self.output.take()
            && producer.is_filling()
        {
            debug!("Audio output disabled, dropping {} partial frames", self.sample_index);
        }
    }

    fn send_frame(&mut self, frame: Frame) {
        if let Some(out) = self.output.as_mut() {
            if self.sample_index == 0 {
                // Blocks until the consumer gave this buffer back
                out.acquire(self.buffer_index);
            }
            out.write(frame);
        }

        self.sample_index += 1;
        if self.sample_index == self.config.buffer_frames {
            if let Some(out) = self.output.as_mut() {
                out.post();
            }
            self.buffers_completed += 1;
            self.buffer_index = (self.buffer_index + 1) % self.config.buffer_count;
            self.sample_index = 0;
            apu_trace!("audio buffer {} ready", self.buffers_completed);
        }
    }

    /// Produce every sample due since the last sync and schedule the next
    /// one for when the current buffer will be full.
    pub fn sync(&mut self, sched: &mut dyn Scheduler) {
        let divisor = self.config.sample_divisor;
        let mut frac = self.sample_period_frac;
        let elapsed = sched.resync(SyncToken::Apu).saturating_add(frac);
        let nsamples = elapsed / divisor;

        for _ in 0..nsamples {
            let sample = self.wave.next_sample(divisor - frac) as i16;
            let out = sample << SAMPLE_SHIFT;
            self.send_frame([out, out]);
            frac = 0;
        }

        // Run the channel up to now even though the next sample isn't due,
        // its status flags must be current.
        let leftover = elapsed % divisor;
        self.wave.next_sample(leftover - frac);
        self.sample_period_frac = leftover;

        let frames_left = (self.config.buffer_frames - self.sample_index) as u32;
        let next_sync = frames_left * divisor - leftover;
        sched.schedule_next(SyncToken::Apu, next_sync as i32);
    }

    pub fn read_reg(&mut self, addr: u16, sched: &mut dyn Scheduler) -> u8 {
        self.sync(sched);

        match addr {
            0xFF1A => (self.wave.enabled() as u8) << 7 | 0x7F,
            0xFF1B => self.wave.length(),
            0xFF1C => self.wave.volume_shift() << 5 | 0x9F,
            0xFF1D => 0xFF,
            0xFF1E => (self.wave.length_enabled() as u8) << 6 | 0xBF,
            0xFF26 => (self.wave.running() as u8) << 2 | (self.enable as u8) << 7,
            0xFF30..=0xFF3F => self.wave.read_ram((addr - 0xFF30) as usize),
            _ => 0xFF,
        }
    }

    pub fn write_reg(&mut self, addr: u16, val: u8, sched: &mut dyn Scheduler) {
        self.sync(sched);

        if (0xFF30..=0xFF3F).contains(&addr) {
            let offset = (addr - 0xFF30) as usize;
            // The bus window is half the pattern size, both halves see it
            self.wave.write_ram(offset, val);
            self.wave.write_ram(offset + WAVE_RAM_WINDOW, val);
            return;
        }

        if addr == 0xFF26 {
            self.set_enable(val & 0x80 != 0);
            return;
        }

        if !self.enable {
            debug!("Write to {addr:04X} ignored while the APU is off");
            return;
        }

        match addr {
            0xFF1A => self.wave.set_enable(val & 0x80 != 0),
            0xFF1B => self.wave.set_length(val),
            0xFF1C => self.wave.set_volume_shift((val >> 5) & 3),
            0xFF1D => {
                let freq = (self.wave.frequency() & 0x700) | val as u16;
                self.wave.set_frequency(freq);
            }
            0xFF1E => {
                let freq = (self.wave.frequency() & 0xFF) | ((val as u16 & 0x07) << 8);
                self.wave.set_frequency(freq);
                self.wave.set_length_enable(val & 0x40 != 0);
                if val & 0x80 != 0 {
                    self.wave.start();
                }
            }
            _ => {}
        }
    }

    fn set_enable(&mut self, enable: bool) {
        if enable == self.enable {
            return;
        }
        if !enable {
            self.wave.reset();
        }
        self.enable = enable;
        debug!("APU {}", if enable { "on" } else { "off" });
    }
}
