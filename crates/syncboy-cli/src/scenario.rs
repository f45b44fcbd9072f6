use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

use syncboy_core::config::AudioConfig;
use syncboy_core::frontend::VideoSink;
use syncboy_core::gameboy::{GameBoy, is_mapped};
use syncboy_core::ppu::FRAME_CYCLES;

use crate::error::CliError;

const DEFAULT_FRAMES: u32 = 60;

// A scenario that can't produce frames (LCD left off) is stopped after
// this many frame durations.
const FRAME_TIMEOUT: u64 = 4;

/// Bytes stored at consecutive addresses before the first cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poke {
    pub addr: u16,
    pub bytes: Vec<u8>,
}

/// `len` copies of `value` starting at `addr`, before the first cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fill {
    pub addr: u16,
    pub len: u16,
    pub value: u8,
}

/// Bus write performed once `cycle` cycles have elapsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimedWrite {
    #[serde(default)]
    pub cycle: u64,
    pub addr: u16,
    pub value: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub frames: u32,
    pub audio: AudioConfig,
    #[serde(rename = "fill")]
    pub fills: Vec<Fill>,
    #[serde(rename = "poke")]
    pub pokes: Vec<Poke>,
    #[serde(rename = "write")]
    pub writes: Vec<TimedWrite>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            frames: DEFAULT_FRAMES,
            audio: AudioConfig::default(),
            fills: Vec::new(),
            pokes: Vec::new(),
            writes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub frames: u32,
    pub cycles: u64,
}

impl Scenario {
    /// Scrolling checkerboard with a couple of sprites and a triangle wave.
    pub fn demo() -> Self {
        let solid = |color: u8| -> Vec<u8> {
            let lo = if color & 1 != 0 { 0xFF } else { 0x00 };
            let hi = if color & 2 != 0 { 0xFF } else { 0x00 };
            [lo, hi].repeat(8)
        };
        let diamond: Vec<u8> = [0x18u8, 0x3C, 0x7E, 0xFF, 0xFF, 0x7E, 0x3C, 0x18]
            .iter()
            .flat_map(|&row| [row, row])
            .collect();

        let map: Vec<u8> = (0..32 * 32).map(|i| 1 + ((i / 32 + i % 32) % 2) as u8).collect();

        let triangle: Vec<u8> = (0..16u8)
            .map(|i| {
                let a = if i < 8 { 2 * i } else { 31 - 2 * i };
                let b = if i < 8 { 2 * i + 1 } else { 30 - 2 * i };
                a << 4 | b
            })
            .collect();

        let sprites: Vec<u8> = [(40u8, 60u8, 0x00u8), (80, 100, 0x20), (120, 60, 0x10)]
            .iter()
            .flat_map(|&(y, x, flags)| [y + 16, x + 8, 3, flags])
            .collect();

        let mut writes = vec![
            TimedWrite { cycle: 0, addr: 0xFF47, value: 0xE4 },
            TimedWrite { cycle: 0, addr: 0xFF48, value: 0xE4 },
            TimedWrite { cycle: 0, addr: 0xFF49, value: 0x1B },
            TimedWrite { cycle: 0, addr: 0xFF40, value: 0x93 },
            TimedWrite { cycle: 0, addr: 0xFF1A, value: 0x80 },
            TimedWrite { cycle: 0, addr: 0xFF1C, value: 0x20 },
            TimedWrite { cycle: 0, addr: 0xFF1D, value: 0x00 },
            TimedWrite { cycle: 0, addr: 0xFF1E, value: 0x87 },
        ];
        for frame in 1..DEFAULT_FRAMES as u64 {
            writes.push(TimedWrite {
                cycle: frame * FRAME_CYCLES as u64,
                addr: 0xFF43,
                value: frame as u8,
            });
        }

        Self {
            frames: DEFAULT_FRAMES,
            audio: AudioConfig::default(),
            fills: vec![Fill {
                addr: 0x8000,
                len: 16,
                value: 0x00,
            }],
            pokes: vec![
                Poke { addr: 0x8010, bytes: solid(1) },
                Poke { addr: 0x8020, bytes: solid(2) },
                Poke { addr: 0x8030, bytes: diamond },
                Poke { addr: 0x9800, bytes: map },
                Poke { addr: 0xFE00, bytes: sprites },
                Poke { addr: 0xFF30, bytes: triangle },
            ],
            writes,
        }
    }

    /// Check that every address the scenario touches is mapped.
    pub fn validate(&self) -> Result<(), CliError> {
        let fills = self
            .fills
            .iter()
            .flat_map(|f| (0..f.len as u32).map(move |i| f.addr as u32 + i));
        let pokes = self
            .pokes
            .iter()
            .flat_map(|p| (0..p.bytes.len() as u32).map(move |i| p.addr as u32 + i));
        let writes = self.writes.iter().map(|w| w.addr as u32);

        for addr in fills.chain(pokes).chain(writes) {
            match u16::try_from(addr) {
                Ok(a) if is_mapped(a) => {}
                _ => return Err(CliError::UnmappedAddress { addr: addr as u16 }),
            }
        }
        self.audio.validate()?;
        Ok(())
    }

    fn apply_setup<V: VideoSink>(&self, gb: &mut GameBoy<V>) {
        for fill in &self.fills {
            for i in 0..fill.len {
                gb.write_byte(fill.addr.wrapping_add(i), fill.value);
            }
        }
        for poke in &self.pokes {
            for (i, &b) in poke.bytes.iter().enumerate() {
                gb.write_byte(poke.addr.wrapping_add(i as u16), b);
            }
        }
    }

    /// Run until `frames` frames have been completed, performing the timed
    /// writes along the way.
    pub fn run<V: VideoSink>(&self, gb: &mut GameBoy<V>, frames: u32) -> RunStats {
        self.apply_setup(gb);

        let mut writes: Vec<&TimedWrite> = self.writes.iter().collect();
        writes.sort_by_key(|w| w.cycle);
        let mut pending = writes.into_iter().peekable();

        let budget = (frames as u64 + 1) * FRAME_TIMEOUT * FRAME_CYCLES as u64;
        let mut now = 0u64;
        let mut done = 0;

        gb.clear_frame_flag();
        while done < frames {
            while let Some(w) = pending.next_if(|w| w.cycle <= now) {
                debug!("cycle {now}: [{:04X}] <- {:02X}", w.addr, w.value);
                gb.write_byte(w.addr, w.value);
            }

            let until_write = pending.peek().map_or(u64::MAX, |w| w.cycle - now);
            let max = until_write.min(FRAME_CYCLES as u64) as u32;
            now += gb.run_frame(max) as u64;

            if gb.frame_ready() {
                gb.clear_frame_flag();
                done += 1;
            }
            if now >= budget {
                warn!("Stopped after {now} cycles with {done}/{frames} frames completed");
                break;
            }
        }

        RunStats { frames: done, cycles: now }
    }
}

/// Load a scenario. An unreadable file falls back to the defaults, a
/// malformed one is an error.
pub fn load_from_file(path: &Path) -> Result<Scenario, CliError> {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            warn!(
                "Failed to read scenario {}: {e}; using defaults",
                path.display()
            );
            return Ok(Scenario::default());
        }
    };

    toml::from_str::<Scenario>(&text).map_err(|source| CliError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
