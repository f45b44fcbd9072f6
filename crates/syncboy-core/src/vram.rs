//! Video memory shared between the memory bus (writer) and the PPU (reader).
//!
//! Every accessor masks its index so an out-of-range address simply wraps
//! inside the backing array.

pub const VRAM_SIZE: usize = 0x2000;
pub const OAM_SIZE: usize = 0xA0;

/// Number of sprite entries in OAM.
pub const TOTAL_SPRITES: usize = 40;

// Each tile is 8x8 pixels at 2 bits per pixel
const TILE_SIZE: usize = 16;

const TILE_MAP_0_BASE: usize = 0x1800;
const TILE_MAP_1_BASE: usize = 0x1C00;
const SIGNED_TILE_BASE: usize = 0x1000;

/// Selects one of the two 32x32 tile maps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileMap {
    /// Map at 0x9800
    Low,
    /// Map at 0x9C00
    High,
}

impl TileMap {
    const fn base(self) -> usize {
        match self {
            TileMap::Low => TILE_MAP_0_BASE,
            TileMap::High => TILE_MAP_1_BASE,
        }
    }
}

/// How a tile index is turned into a pattern address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileAddressing {
    /// Index 0..=255 from 0x8000. Always used by sprites.
    Unsigned,
    /// Index -128..=127 around 0x9000. Indices 128..=255 address back into
    /// 0x8800..0x8FFF, the half shared with the unsigned set.
    Signed,
}

impl TileAddressing {
    /// Offset of the first byte of `tile_index` within VRAM.
    pub const fn tile_addr(self, tile_index: u8) -> usize {
        match self {
            TileAddressing::Unsigned => tile_index as usize * TILE_SIZE,
            TileAddressing::Signed => {
                let offset = tile_index as i8 as isize * TILE_SIZE as isize;
                (SIGNED_TILE_BASE as isize + offset) as usize
            }
        }
    }
}

/// Decoded OAM entry with the display offsets already applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OamEntry {
    pub y: i16,
    pub x: i16,
    pub tile: u8,
    pub flags: u8,
}

impl OamEntry {
    pub const FLAG_OBP1: u8 = 0x10;
    pub const FLAG_X_FLIP: u8 = 0x20;
    pub const FLAG_Y_FLIP: u8 = 0x40;
    pub const FLAG_BEHIND_BG: u8 = 0x80;

    pub fn use_obp1(&self) -> bool {
        self.flags & Self::FLAG_OBP1 != 0
    }

    pub fn x_flip(&self) -> bool {
        self.flags & Self::FLAG_X_FLIP != 0
    }

    pub fn y_flip(&self) -> bool {
        self.flags & Self::FLAG_Y_FLIP != 0
    }

    pub fn behind_bg(&self) -> bool {
        self.flags & Self::FLAG_BEHIND_BG != 0
    }
}

#[derive(Clone)]
pub struct VideoMemory {
    vram: [u8; VRAM_SIZE],
    oam: [u8; OAM_SIZE],
}

impl VideoMemory {
    pub fn new() -> Self {
        Self {
            vram: [0; VRAM_SIZE],
            oam: [0; OAM_SIZE],
        }
    }

    pub fn reset(&mut self) {
        self.vram.fill(0);
        self.oam.fill(0);
    }

    #[inline]
    pub fn read_vram(&self, offset: usize) -> u8 {
        self.vram[offset % VRAM_SIZE]
    }

    #[inline]
    pub fn write_vram(&mut self, offset: usize, val: u8) {
        self.vram[offset % VRAM_SIZE] = val;
    }

    #[inline]
    pub fn read_oam(&self, offset: usize) -> u8 {
        self.oam[offset % OAM_SIZE]
    }

    #[inline]
    pub fn write_oam(&mut self, offset: usize, val: u8) {
        self.oam[offset % OAM_SIZE] = val;
    }

    /// Copy a pattern (16 bytes) into tile slot `tile_index`.
    pub fn load_tile(&mut self, addressing: TileAddressing, tile_index: u8, data: &[u8; TILE_SIZE]) {
        let base = addressing.tile_addr(tile_index);
        for (i, &b) in data.iter().enumerate() {
            self.write_vram(base + i, b);
        }
    }

    /// Raw pattern bytes of one pixel row: (low bit plane, high bit plane).
    pub fn tile_row(&self, addressing: TileAddressing, tile_index: u8, row: u8) -> (u8, u8) {
        let addr = addressing.tile_addr(tile_index) + (row as usize & 7) * 2;
        (self.read_vram(addr), self.read_vram(addr + 1))
    }

    /// Raw 2-bit color of pixel (`x`, `y`) inside a tile, before palette
    /// translation. Bit 7 of each plane holds the leftmost pixel.
    pub fn tile_color(&self, addressing: TileAddressing, tile_index: u8, x: u8, y: u8) -> u8 {
        let (lo, hi) = self.tile_row(addressing, tile_index, y);
        let bit = 7 - (x & 7);
        ((hi >> bit) & 1) << 1 | ((lo >> bit) & 1)
    }

    /// Tile index stored at (`col`, `row`) of a 32x32 tile map.
    pub fn map_entry(&self, map: TileMap, col: u8, row: u8) -> u8 {
        let offset = (row as usize & 31) * 32 + (col as usize & 31);
        self.read_vram(map.base() + offset)
    }

    pub fn set_map_entry(&mut self, map: TileMap, col: u8, row: u8, tile_index: u8) {
        let offset = (row as usize & 31) * 32 + (col as usize & 31);
        self.write_vram(map.base() + offset, tile_index);
    }

    /// Decode sprite `index` (0..40) from OAM.
    pub fn oam_entry(&self, index: usize) -> OamEntry {
        let base = (index % TOTAL_SPRITES) * 4;
        OamEntry {
            y: self.oam[base] as i16 - 16,
            x: self.oam[base + 1] as i16 - 8,
            tile: self.oam[base + 2],
            flags: self.oam[base + 3],
        }
    }

    /// Store sprite `index` using raw OAM coordinates (y + 16, x + 8).
    pub fn set_oam_entry(&mut self, index: usize, raw_y: u8, raw_x: u8, tile: u8, flags: u8) {
        let base = (index % TOTAL_SPRITES) * 4;
        self.oam[base] = raw_y;
        self.oam[base + 1] = raw_x;
        self.oam[base + 2] = tile;
        self.oam[base + 3] = flags;
    }
}

impl Default for VideoMemory {
    fn default() -> Self {
        Self::new()
    }
}
