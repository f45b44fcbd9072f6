use crate::{
    apu::Apu,
    audio_queue::AudioConsumer,
    config::{AudioConfig, ConfigError},
    frontend::VideoSink,
    irq::Interrupts,
    ppu::{Ppu, PpuCtx},
    sync::{SyncClock, SyncToken},
    vram::VideoMemory,
};

// Largest jump handed to the clock at once, keeps the i32 timestamps far
// from overflowing between two rebases.
const MAX_ADVANCE: u32 = 1 << 24;

/// Returns true if `addr` is backed by one of the emulated devices.
pub const fn is_mapped(addr: u16) -> bool {
    matches!(
        addr,
        0x8000..=0x9FFF
            | 0xFE00..=0xFE9F
            | 0xFF0F
            | 0xFF1A..=0xFF1E
            | 0xFF26
            | 0xFF30..=0xFF3F
            | 0xFF40..=0xFF45
            | 0xFF47..=0xFF4B
    )
}

/// PPU and APU driven by a shared cycle clock.
///
/// Devices are only brought up to date when their scheduled event is due or
/// when the bus touches them, so `advance` is cheap when nothing happens.
pub struct GameBoy<V: VideoSink> {
    pub clock: SyncClock,
    pub ppu: Ppu,
    pub apu: Apu,
    pub vram: VideoMemory,
    pub irq: Interrupts,
    pub video: V,
    total_cycles: u64,
}

impl<V: VideoSink> GameBoy<V> {
    pub fn new(audio: AudioConfig, video: V) -> Result<Self, ConfigError> {
        let mut gb = Self {
            clock: SyncClock::new(),
            ppu: Ppu::new(),
            apu: Apu::new(audio)?,
            vram: VideoMemory::new(),
            irq: Interrupts::new(),
            video,
            total_cycles: 0,
        };
        gb.reset();
        Ok(gb)
    }

    /// Reset to the power-on state. The video sink and a connected audio
    /// output are kept.
    pub fn reset(&mut self) {
        self.clock.reset();
        self.ppu.reset();
        self.apu.reset();
        self.vram.reset();
        self.irq.reset();
        self.total_cycles = 0;

        // Get both devices scheduled
        self.sync_ppu();
        self.sync_apu();
    }

    /// CPU cycles emulated since the last reset.
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    pub fn sync_ppu(&mut self) {
        let mut ctx = PpuCtx {
            sched: &mut self.clock,
            irq: &mut self.irq,
            mem: &self.vram,
            sink: &mut self.video,
        };
        self.ppu.sync(&mut ctx);
    }

    pub fn sync_apu(&mut self) {
        self.apu.sync(&mut self.clock);
    }

    /// Let `cycles` CPU cycles elapse, running every sync that comes due.
    pub fn advance(&mut self, cycles: u32) {
        let mut remaining = cycles;
        while remaining > 0 {
            let step = remaining.min(MAX_ADVANCE);
            self.clock.advance(step);
            self.run_due_events();
            self.clock.rebase();
            remaining -= step;
        }
        self.total_cycles += cycles as u64;
    }

    fn run_due_events(&mut self) {
        while self.clock.pending() {
            for token in SyncToken::ALL {
                if !self.clock.is_due(token) {
                    continue;
                }
                match token {
                    SyncToken::Ppu => self.sync_ppu(),
                    SyncToken::Apu => self.sync_apu(),
                }
            }
        }
    }

    /// Run until the PPU completes a frame or `max_cycles` have elapsed.
    /// Returns the number of cycles run.
    pub fn run_frame(&mut self, max_cycles: u32) -> u32 {
        let mut ran = 0;
        while ran < max_cycles && !self.ppu.frame_ready() {
            let next = self.clock.next_event(SyncToken::Ppu) - self.clock.timestamp();
            let step = (next.max(1) as u32).min(max_cycles - ran);
            self.advance(step);
            ran += step;
        }
        ran
    }

    pub fn frame_ready(&self) -> bool {
        self.ppu.frame_ready()
    }

    pub fn clear_frame_flag(&mut self) {
        self.ppu.clear_frame_flag();
    }

    /// Connect an audio consumer. See [`Apu::enable_output`].
    pub fn enable_audio_output(&mut self) -> AudioConsumer {
        self.apu.enable_output(&mut self.clock)
    }

    /// Disconnect the audio consumer. See [`Apu::disable_output`].
    pub fn disable_audio_output(&mut self) {
        self.apu.disable_output(&mut self.clock);
    }

    pub fn read_byte(&mut self, addr: u16) -> u8 {
        match addr {
            0x8000..=0x9FFF => self.vram.read_vram((addr - 0x8000) as usize),
            0xFE00..=0xFE9F => self.vram.read_oam((addr - 0xFE00) as usize),
            0xFF0F => self.irq.if_reg | 0xE0,
            0xFF1A..=0xFF1E | 0xFF26 | 0xFF30..=0xFF3F => {
                self.apu.read_reg(addr, &mut self.clock)
            }
            0xFF40..=0xFF45 | 0xFF47..=0xFF4B => {
                let mut ctx = PpuCtx {
                    sched: &mut self.clock,
                    irq: &mut self.irq,
                    mem: &self.vram,
                    sink: &mut self.video,
                };
                self.ppu.read_reg(addr, &mut ctx)
            }
            _ => 0xFF,
        }
    }

    pub fn write_byte(&mut self, addr: u16, val: u8) {
        match addr {
            0x8000..=0x9FFF => {
                // Lines already due must be drawn with the old contents
                self.sync_ppu();
                self.vram.write_vram((addr - 0x8000) as usize, val);
            }
            0xFE00..=0xFE9F => {
                self.sync_ppu();
                self.vram.write_oam((addr - 0xFE00) as usize, val);
            }
            0xFF0F => self.irq.if_reg = val & 0x1F,
            0xFF1A..=0xFF1E | 0xFF26 | 0xFF30..=0xFF3F => {
                self.apu.write_reg(addr, val, &mut self.clock)
            }
            0xFF40..=0xFF45 | 0xFF47..=0xFF4B => {
                let mut ctx = PpuCtx {
                    sched: &mut self.clock,
                    irq: &mut self.irq,
                    mem: &self.vram,
                    sink: &mut self.video,
                };
                self.ppu.write_reg(addr, val, &mut ctx);
            }
            _ => {}
        }
    }
}
