#![allow(dead_code)]

use syncboy_core::config::AudioConfig;
use syncboy_core::frontend::FrameBuffer;
use syncboy_core::gameboy::GameBoy;

pub const LCDC: u16 = 0xFF40;
pub const STAT: u16 = 0xFF41;
pub const SCY: u16 = 0xFF42;
pub const SCX: u16 = 0xFF43;
pub const LY: u16 = 0xFF44;
pub const LYC: u16 = 0xFF45;
pub const BGP: u16 = 0xFF47;
pub const OBP0: u16 = 0xFF48;
pub const OBP1: u16 = 0xFF49;
pub const WY: u16 = 0xFF4A;
pub const WX: u16 = 0xFF4B;

pub const NR30: u16 = 0xFF1A;
pub const NR31: u16 = 0xFF1B;
pub const NR32: u16 = 0xFF1C;
pub const NR33: u16 = 0xFF1D;
pub const NR34: u16 = 0xFF1E;
pub const NR52: u16 = 0xFF26;
pub const WAVE_RAM: u16 = 0xFF30;

/// LCD on, unsigned tile set, sprites and background enabled.
pub const LCDC_DEFAULT: u8 = 0x93;

/// Identity palette: raw color N displays as shade N.
pub const IDENTITY_PALETTE: u8 = 0xE4;

pub fn machine() -> GameBoy<FrameBuffer> {
    GameBoy::new(AudioConfig::default(), FrameBuffer::new()).expect("default audio config")
}

pub fn machine_with_audio(config: AudioConfig) -> GameBoy<FrameBuffer> {
    GameBoy::new(config, FrameBuffer::new()).expect("valid audio config")
}

/// Tile where every pixel has raw color `color`.
pub fn solid_tile(color: u8) -> [u8; 16] {
    let lo = if color & 1 != 0 { 0xFF } else { 0x00 };
    let hi = if color & 2 != 0 { 0xFF } else { 0x00 };
    let mut tile = [0; 16];
    for row in tile.chunks_exact_mut(2) {
        row[0] = lo;
        row[1] = hi;
    }
    tile
}

/// Tile whose left column has raw color `color`, everything else 0.
pub fn left_column_tile(color: u8) -> [u8; 16] {
    let mut tile = [0; 16];
    for row in tile.chunks_exact_mut(2) {
        row[0] = if color & 1 != 0 { 0x80 } else { 0 };
        row[1] = if color & 2 != 0 { 0x80 } else { 0 };
    }
    tile
}

/// Load `data` into tile `index` of the unsigned set through the bus.
pub fn write_tile(gb: &mut GameBoy<FrameBuffer>, index: u8, data: &[u8; 16]) {
    let base = 0x8000 + index as u16 * 16;
    for (i, &b) in data.iter().enumerate() {
        gb.write_byte(base + i as u16, b);
    }
}

/// Write sprite `index` using screen coordinates.
pub fn write_sprite(gb: &mut GameBoy<FrameBuffer>, index: u16, x: i16, y: i16, tile: u8, flags: u8) {
    let base = 0xFE00 + index * 4;
    gb.write_byte(base, (y + 16) as u8);
    gb.write_byte(base + 1, (x + 8) as u8);
    gb.write_byte(base + 2, tile);
    gb.write_byte(base + 3, flags);
}

/// Fill the low tile map with `tile`.
pub fn fill_bg_map(gb: &mut GameBoy<FrameBuffer>, tile: u8) {
    for addr in 0x9800..0x9C00u16 {
        gb.write_byte(addr, tile);
    }
}

/// Advance until the next completed frame and clear the flag.
pub fn next_frame(gb: &mut GameBoy<FrameBuffer>) {
    gb.clear_frame_flag();
    let ran = gb.run_frame(200_000);
    assert!(gb.frame_ready(), "no frame after {ran} cycles");
    gb.clear_frame_flag();
}
