use log::debug;

use crate::frontend::{SCREEN_HEIGHT, SCREEN_WIDTH, VideoSink, WHITE};
use crate::irq::{Interrupt, InterruptSink};
use crate::sync::{NEVER, Scheduler, SyncToken};
use crate::vram::{OamEntry, TOTAL_SPRITES, TileAddressing, TileMap, VideoMemory};

#[cfg(feature = "ppu-trace")]
macro_rules! ppu_trace {
    ($($arg:tt)*) => {
        log::trace!($($arg)*);
    };
}
#[cfg(not(feature = "ppu-trace"))]
macro_rules! ppu_trace {
    ($($arg:tt)*) => {};
}

// Timing constants per LCD mode in T-cycles. Lines are drawn in one go at
// the mode 3 -> mode 0 boundary.
const MODE2_CYCLES: u16 = 80; // OAM scan
const MODE3_CYCLES: u16 = 172; // Pixel transfer
const MODE3_END: u16 = MODE2_CYCLES + MODE3_CYCLES;
const MODE0_CYCLES: u16 = 204; // HBlank

/// Cycles per scanline, VBlank lines included.
pub const LINE_CYCLES: u16 = MODE2_CYCLES + MODE3_CYCLES + MODE0_CYCLES;

// First line of the vertical blanking
const VBLANK_START: u8 = SCREEN_HEIGHT as u8;
// Number of lines spent in VBlank
const VBLANK_LINES: u8 = 10;

/// Lines per frame, VBlank lines included.
pub const TOTAL_LINES: u8 = VBLANK_START + VBLANK_LINES;

/// Cycles per frame.
pub const FRAME_CYCLES: u32 = LINE_CYCLES as u32 * TOTAL_LINES as u32;

// Sprite limits
const MAX_SPRITES_PER_LINE: usize = 10;
// X position of the entry terminating a sprite list, never reached by a pixel
const SPRITE_SENTINEL_X: i16 = SCREEN_WIDTH as i16 * 2;

// Window X position is clipped if greater than this value
const WINDOW_X_MAX: u8 = 166;

// LCD modes as reported in STAT bits 0-1
pub const MODE_HBLANK: u8 = 0;
pub const MODE_VBLANK: u8 = 1;
pub const MODE_OAM: u8 = 2;
pub const MODE_TRANSFER: u8 = 3;

/// Everything the PPU touches outside of its own registers while syncing.
pub struct PpuCtx<'a> {
    pub sched: &'a mut dyn Scheduler,
    pub irq: &'a mut dyn InterruptSink,
    pub mem: &'a VideoMemory,
    pub sink: &'a mut dyn VideoSink,
}

/// Outcome of a single [`Ppu::step`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LineStep {
    /// Cycles taken from the budget
    pub consumed: u32,
    /// Line to render now that its mode 3 -> mode 0 boundary has been reached
    pub draw: Option<u8>,
    /// Line that started at the end of this step
    pub entered_line: Option<u8>,
}

/// Sprites of one scanline, sorted by priority and terminated by an
/// off-screen entry.
#[derive(Clone, Copy, Debug)]
pub struct LineSprites {
    entries: [OamEntry; MAX_SPRITES_PER_LINE + 1],
    count: usize,
}

impl LineSprites {
    const SENTINEL: OamEntry = OamEntry {
        y: 0,
        x: SPRITE_SENTINEL_X,
        tile: 0,
        flags: 0,
    };

    fn empty() -> Self {
        Self {
            entries: [Self::SENTINEL; MAX_SPRITES_PER_LINE + 1],
            count: 0,
        }
    }

    /// Selected sprites, without the terminating entry.
    pub fn as_slice(&self) -> &[OamEntry] {
        &self.entries[..self.count]
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[derive(Clone, Copy)]
struct Pixel {
    /// Shade after palette translation
    color: u8,
    /// True if the raw color index wasn't 0
    opaque: bool,
}

impl Pixel {
    const BLANK: Pixel = Pixel {
        color: WHITE,
        opaque: false,
    };
}

#[inline(always)]
fn dmg_shade(palette: u8, color_id: u8) -> u8 {
    (palette >> (color_id * 2)) & 0x03
}

pub struct Ppu {
    scx: u8,
    scy: u8,
    ly: u8,
    lyc: u8,
    bgp: u8,
    obp0: u8,
    obp1: u8,
    wy: u8,
    wx: u8,

    iten_lyc: bool,
    iten_mode0: bool,
    iten_mode1: bool,
    iten_mode2: bool,

    master_enable: bool,
    bg_enable: bool,
    window_enable: bool,
    sprite_enable: bool,
    tall_sprites: bool,
    bg_use_high_tm: bool,
    window_use_high_tm: bool,
    /// LCDC bit 4: background and window use the unsigned tile set
    bg_window_unsigned_ts: bool,

    /// Position within the current line, 0..LINE_CYCLES
    line_pos: u16,
    /// Internal window line counter
    win_line_counter: u8,
    /// Indicates a completed frame has been sent to the sink
    frame_ready: bool,
    frame_counter: u64,
}

impl Ppu {
    pub fn new() -> Self {
        Self {
            scx: 0,
            scy: 0,
            ly: 0,
            lyc: 0,
            bgp: 0,
            obp0: 0,
            obp1: 0,
            wy: 0,
            wx: 0,
            iten_lyc: false,
            iten_mode0: false,
            iten_mode1: false,
            iten_mode2: false,
            master_enable: true,
            bg_enable: false,
            window_enable: false,
            sprite_enable: false,
            tall_sprites: false,
            bg_use_high_tm: false,
            window_use_high_tm: false,
            bg_window_unsigned_ts: false,
            line_pos: 0,
            win_line_counter: 0,
            frame_ready: false,
            frame_counter: 0,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn ly(&self) -> u8 {
        self.ly
    }

    pub fn line_pos(&self) -> u16 {
        self.line_pos
    }

    pub fn lcd_enabled(&self) -> bool {
        self.master_enable
    }

    /// Returns true if a full frame has been sent to the sink since the last
    /// call to `clear_frame_flag()`.
    pub fn frame_ready(&self) -> bool {
        self.frame_ready
    }

    pub fn clear_frame_flag(&mut self) {
        self.frame_ready = false;
    }

    /// Number of times VBlank has been entered since reset.
    pub fn frames(&self) -> u64 {
        self.frame_counter
    }

    /// Current LCD mode, derived from the line and the position within it.
    pub fn mode(&self) -> u8 {
        mode_at(self.ly, self.line_pos)
    }

    fn line_remaining(&self) -> u16 {
        LINE_CYCLES - self.line_pos
    }

    /// Run one iteration of the timing loop: either finish the current line
    /// or move within it, whichever comes first with `budget` cycles.
    pub fn step(&mut self, budget: u32) -> LineStep {
        let remaining = self.line_remaining() as u32;
        let prev_mode = self.mode();

        if budget < remaining {
            self.line_pos += budget as u16;
            let draw = (prev_mode != MODE_HBLANK && self.mode() == MODE_HBLANK).then_some(self.ly);
            return LineStep {
                consumed: budget,
                draw,
                entered_line: None,
            };
        }

        // The line ends before the budget runs out. If we never got to mode 0
        // the line hasn't been drawn yet.
        let draw = matches!(prev_mode, MODE_OAM | MODE_TRANSFER).then_some(self.ly);

        self.ly += 1;
        if self.ly >= TOTAL_LINES {
            self.ly = 0;
        }
        self.line_pos = 0;

        LineStep {
            consumed: remaining,
            draw,
            entered_line: Some(self.ly),
        }
    }

    /// Catch up with the scheduler, drawing lines and raising interrupts
    /// along the way, then ask to be woken up at the end of the current line.
    pub fn sync(&mut self, ctx: &mut PpuCtx<'_>) {
        let mut elapsed = ctx.sched.resync(SyncToken::Ppu);

        if !self.master_enable {
            ctx.sched.schedule_next(SyncToken::Ppu, NEVER);
            return;
        }

        while elapsed > 0 {
            let step = self.step(elapsed);
            elapsed -= step.consumed;

            if let Some(line) = step.draw {
                self.render_line(line, ctx.mem, ctx.sink);
            }
            if let Some(line) = step.entered_line {
                self.enter_line(line, ctx.irq);
            }
        }

        ctx.sched
            .schedule_next(SyncToken::Ppu, self.line_remaining() as i32);
    }

    fn enter_line(&mut self, line: u8, irq: &mut dyn InterruptSink) {
        if line == VBLANK_START {
            self.frame_ready = true;
            self.frame_counter = self.frame_counter.wrapping_add(1);
            irq.trigger(Interrupt::VBlank);
            if self.iten_mode1 {
                irq.trigger(Interrupt::LcdStat);
            }
        }
        if line == 0 {
            self.win_line_counter = 0;
        }
        if self.iten_lyc && line == self.lyc {
            irq.trigger(Interrupt::LcdStat);
        }
        if self.iten_mode2 && line < VBLANK_START {
            irq.trigger(Interrupt::LcdStat);
        }
    }

    fn bg_tile_addressing(&self) -> TileAddressing {
        if self.bg_window_unsigned_ts {
            TileAddressing::Unsigned
        } else {
            TileAddressing::Signed
        }
    }

    /// Sample the background or window tile map at (`x`, `y`) in map space.
    fn map_pixel(&self, mem: &VideoMemory, map: TileMap, x: u8, y: u8) -> Pixel {
        let tile_index = mem.map_entry(map, x / 8, y / 8);
        let raw = mem.tile_color(self.bg_tile_addressing(), tile_index, x % 8, y % 8);
        Pixel {
            color: dmg_shade(self.bgp, raw),
            opaque: raw != 0,
        }
    }

    fn bg_pixel(&self, mem: &VideoMemory, x: usize, ly: u8) -> Pixel {
        let bgx = (x as u16 + self.scx as u16) as u8;
        let bgy = ly.wrapping_add(self.scy);
        let map = if self.bg_use_high_tm {
            TileMap::High
        } else {
            TileMap::Low
        };
        self.map_pixel(mem, map, bgx, bgy)
    }

    /// Leftmost screen column covered by the window on line `ly`, if any.
    fn window_start(&self, ly: u8) -> Option<i16> {
        if self.bg_enable && self.window_enable && ly >= self.wy && self.wx <= WINDOW_X_MAX {
            Some(self.wx as i16 - 7)
        } else {
            None
        }
    }

    /// Select the sprites overlapping line `ly`, at most 10, in display
    /// priority order.
    pub fn line_sprites(&self, mem: &VideoMemory, ly: u8) -> LineSprites {
        let mut sprites = LineSprites::empty();

        if !self.sprite_enable {
            return sprites;
        }

        let sprite_height: i16 = if self.tall_sprites { 16 } else { 8 };
        let line = ly as i16;

        for i in 0..TOTAL_SPRITES {
            let s = mem.oam_entry(i);
            if line < s.y || line >= s.y + sprite_height {
                continue;
            }
            sprites.entries[sprites.count] = s;
            sprites.count += 1;
            if sprites.count >= MAX_SPRITES_PER_LINE {
                break;
            }
        }

        // Sprites sharing an X coordinate are prioritized by OAM order, which
        // the stable sort preserves.
        sprites.entries[..sprites.count].sort_by_key(|s| s.x);
        sprites
    }

    /// Color of sprite `s` at screen column `x`, or `None` if the sprite is
    /// transparent there or hidden behind an opaque background pixel.
    fn sprite_color(
        &self,
        mem: &VideoMemory,
        s: &OamEntry,
        x: i16,
        ly: u8,
        bg_opaque: bool,
    ) -> Option<u8> {
        if s.behind_bg() && bg_opaque {
            return None;
        }

        let mut sprite_x = (x - s.x) as u8;
        let mut sprite_y = (ly as i16 - s.y) as u8;

        let (tile, flip_height) = if self.tall_sprites {
            // 8x16 sprites use two consecutive tiles, the first one even
            (s.tile & 0xFE, 15)
        } else {
            (s.tile, 7)
        };

        if s.x_flip() {
            sprite_x = 7 - sprite_x;
        }
        if s.y_flip() {
            sprite_y = flip_height - sprite_y;
        }

        let raw = mem.tile_color(
            TileAddressing::Unsigned,
            tile.wrapping_add(sprite_y / 8),
            sprite_x,
            sprite_y % 8,
        );
        if raw == 0 {
            return None;
        }

        let palette = if s.use_obp1() { self.obp1 } else { self.obp0 };
        Some(dmg_shade(palette, raw))
    }

    fn render_line(&mut self, ly: u8, mem: &VideoMemory, sink: &mut dyn VideoSink) {
        let sprites = self.line_sprites(mem, ly);
        let window_start = self.window_start(ly);
        let window_map = if self.window_use_high_tm {
            TileMap::High
        } else {
            TileMap::Low
        };
        let mut window_drawn = false;
        let mut line = [WHITE; SCREEN_WIDTH];
        let mut next_sprite = 0;

        for (x, out) in line.iter_mut().enumerate() {
            let sx = x as i16;

            // Skip the sprites we're done displaying
            while sprites.entries[next_sprite].x + 8 <= sx {
                next_sprite += 1;
            }

            let mut pix = Pixel::BLANK;
            if self.bg_enable {
                pix = match window_start {
                    Some(start) if sx >= start => {
                        window_drawn = true;
                        let wx = (sx - start) as u8;
                        self.map_pixel(mem, window_map, wx, self.win_line_counter)
                    }
                    _ => self.bg_pixel(mem, x, ly),
                };
            }

            // The first visible sprite at this position wins
            let mut i = next_sprite;
            while sprites.entries[i].x <= sx {
                if let Some(color) = self.sprite_color(mem, &sprites.entries[i], sx, ly, pix.opaque) {
                    pix.color = color;
                    break;
                }
                i += 1;
            }

            *out = pix.color;
        }

        if window_drawn {
            self.win_line_counter = self.win_line_counter.wrapping_add(1);
        }

        ppu_trace!("draw line {ly} ({} sprites)", sprites.len());
        sink.draw_line(ly, &line);
    }

    fn blank_frame(&mut self, sink: &mut dyn VideoSink) {
        let line = [WHITE; SCREEN_WIDTH];
        for ly in 0..SCREEN_HEIGHT as u8 {
            sink.draw_line(ly, &line);
        }
        self.frame_ready = true;
    }

    fn lcdc(&self) -> u8 {
        (self.bg_enable as u8)
            | (self.sprite_enable as u8) << 1
            | (self.tall_sprites as u8) << 2
            | (self.bg_use_high_tm as u8) << 3
            | (self.bg_window_unsigned_ts as u8) << 4
            | (self.window_enable as u8) << 5
            | (self.window_use_high_tm as u8) << 6
            | (self.master_enable as u8) << 7
    }

    fn set_lcdc(&mut self, val: u8, ctx: &mut PpuCtx<'_>) {
        self.sync(ctx);

        self.bg_enable = val & 0x01 != 0;
        self.sprite_enable = val & 0x02 != 0;
        self.tall_sprites = val & 0x04 != 0;
        self.bg_use_high_tm = val & 0x08 != 0;
        self.bg_window_unsigned_ts = val & 0x10 != 0;
        self.window_enable = val & 0x20 != 0;
        self.window_use_high_tm = val & 0x40 != 0;
        let master_enable = val & 0x80 != 0;

        if master_enable != self.master_enable {
            self.master_enable = master_enable;
            if !master_enable {
                self.blank_frame(ctx.sink);
                self.ly = 0;
                self.line_pos = 0;
                self.win_line_counter = 0;
            }
            debug!("LCD {}", if master_enable { "on" } else { "off" });
            // Drops the cycles spent while the LCD was off and reschedules
            self.sync(ctx);
        }
    }

    fn stat(&self) -> u8 {
        self.mode()
            | ((self.ly == self.lyc) as u8) << 2
            | (self.iten_mode0 as u8) << 3
            | (self.iten_mode1 as u8) << 4
            | (self.iten_mode2 as u8) << 5
            | (self.iten_lyc as u8) << 6
    }

    fn set_stat(&mut self, val: u8) {
        self.iten_mode0 = val & 0x08 != 0;
        self.iten_mode1 = val & 0x10 != 0;
        self.iten_mode2 = val & 0x20 != 0;
        self.iten_lyc = val & 0x40 != 0;

        debug!(
            "PPU ITEN: mode0: {}, mode1: {}, mode2: {}, lyc: {}",
            self.iten_mode0, self.iten_mode1, self.iten_mode2, self.iten_lyc
        );
    }

    pub fn read_reg(&mut self, addr: u16, ctx: &mut PpuCtx<'_>) -> u8 {
        if addr == 0xFF41 && !self.master_enable {
            return 0;
        }

        self.sync(ctx);

        match addr {
            0xFF40 => self.lcdc(),
            0xFF41 => self.stat(),
            0xFF42 => self.scy,
            0xFF43 => self.scx,
            0xFF44 => self.ly,
            0xFF45 => self.lyc,
            0xFF47 => self.bgp,
            0xFF48 => self.obp0,
            0xFF49 => self.obp1,
            0xFF4A => self.wy,
            0xFF4B => self.wx,
            _ => 0xFF,
        }
    }

    pub fn write_reg(&mut self, addr: u16, val: u8, ctx: &mut PpuCtx<'_>) {
        if addr == 0xFF40 {
            self.set_lcdc(val, ctx);
            return;
        }

        self.sync(ctx);

        match addr {
            0xFF41 => self.set_stat(val),
            0xFF42 => self.scy = val,
            0xFF43 => self.scx = val,
            0xFF44 => {}
            0xFF45 => self.lyc = val,
            0xFF47 => self.bgp = val,
            0xFF48 => self.obp0 = val,
            0xFF49 => self.obp1 = val,
            0xFF4A => self.wy = val,
            0xFF4B => self.wx = val,
            _ => {}
        }
    }
}

impl Default for Ppu {
    fn default() -> Self {
        Self::new()
    }
}

/// LCD mode at position `line_pos` of line `ly`.
pub const fn mode_at(ly: u8, line_pos: u16) -> u8 {
    if ly >= VBLANK_START {
        MODE_VBLANK
    } else if line_pos < MODE2_CYCLES {
        MODE_OAM
    } else if line_pos < MODE3_END {
        MODE_TRANSFER
    } else {
        MODE_HBLANK
    }
}
