mod common;

use common::*;
use syncboy_core::frontend::{FrameBuffer, SCREEN_HEIGHT, SCREEN_WIDTH};
use syncboy_core::gameboy::GameBoy;
use syncboy_core::irq::Interrupt;
use syncboy_core::ppu::{FRAME_CYCLES, LINE_CYCLES};
use syncboy_core::vram::OamEntry;

/// Run `total` cycles applying `events` (cycle, address, value) at their
/// exact time, slicing the remaining time with `chunk`.
fn run_script(
    gb: &mut GameBoy<FrameBuffer>,
    total: u32,
    events: &[(u32, u16, u8)],
    mut chunk: impl FnMut(u32) -> u32,
) {
    let mut now = 0;
    let mut pending = events.iter().peekable();
    while now < total {
        while let Some(&&(t, addr, val)) = pending.peek() {
            if t != now {
                break;
            }
            gb.write_byte(addr, val);
            pending.next();
        }
        let limit = pending.peek().map_or(total, |e| e.0);
        let step = chunk(now).clamp(1, limit - now);
        gb.advance(step);
        now += step;
    }
}

fn busy_scene(gb: &mut GameBoy<FrameBuffer>) {
    write_tile(gb, 1, &solid_tile(3));
    write_tile(gb, 2, &left_column_tile(2));
    write_tile(gb, 3, &solid_tile(1));
    for addr in 0x9800..0x9C00u16 {
        gb.write_byte(addr, (addr % 3) as u8 + 1);
    }
    for i in 0..16 {
        let x = (i as i16 * 9) % 170 - 4;
        let y = (i as i16 * 11) % 150;
        let flags = (i as u8 % 4) << 5 | (i as u8 & 1) << 4;
        write_sprite(gb, i, x, y, 2 + (i % 2) as u8, flags);
    }
    gb.write_byte(BGP, IDENTITY_PALETTE);
    gb.write_byte(OBP0, IDENTITY_PALETTE);
    gb.write_byte(OBP1, 0x1B);
    gb.write_byte(SCX, 3);
    gb.write_byte(SCY, 5);
    gb.write_byte(STAT, 0x78);
    gb.write_byte(LYC, 77);
    gb.write_byte(LCDC, LCDC_DEFAULT | 0x04);
}

#[test]
fn frame_lasts_70224_cycles() {
    let mut gb = machine();
    next_frame(&mut gb);

    gb.advance(FRAME_CYCLES - 1);
    assert!(!gb.frame_ready());
    gb.advance(1);
    assert!(gb.frame_ready());
    assert_eq!(gb.read_byte(LY), 144);
}

#[test]
fn one_vblank_per_frame() {
    let mut gb = machine();
    gb.advance(10 * FRAME_CYCLES);
    assert_eq!(gb.irq.count(Interrupt::VBlank), 10);
    assert!(gb.irq.is_pending(Interrupt::VBlank));
    assert_eq!(gb.ppu.frames(), 10);
}

#[test]
fn every_line_drawn_once_per_frame() {
    let mut gb = machine();
    gb.advance(FRAME_CYCLES);
    for ly in 0..SCREEN_HEIGHT {
        assert_eq!(gb.video.draws_of(ly), 1, "line {ly}");
    }
    gb.advance(3 * FRAME_CYCLES);
    assert_eq!(gb.video.total_draws(), 4 * SCREEN_HEIGHT as u64);
}

#[test]
fn line_is_drawn_at_start_of_hblank() {
    let mut gb = machine();
    gb.advance(80 + 172 - 1);
    assert_eq!(gb.video.total_draws(), 0);
    // The read forces a catch-up, it must not draw early either
    gb.read_byte(STAT);
    assert_eq!(gb.video.total_draws(), 0);
    gb.advance(1);
    gb.read_byte(STAT);
    assert_eq!(gb.video.draws_of(0), 1);
}

#[test]
fn stat_reports_mode_and_coincidence() {
    let mut gb = machine();
    assert_eq!(gb.read_byte(STAT), 0x06);
    gb.advance(80);
    assert_eq!(gb.read_byte(STAT), 0x07);
    gb.advance(172);
    assert_eq!(gb.read_byte(STAT), 0x04);
    gb.advance(204);
    assert_eq!(gb.read_byte(LY), 1);
    assert_eq!(gb.read_byte(STAT), 0x02);

    gb.advance(143 * LINE_CYCLES as u32);
    assert_eq!(gb.read_byte(LY), 144);
    assert_eq!(gb.read_byte(STAT) & 0x03, 0x01);

    gb.write_byte(STAT, 0xFF);
    gb.write_byte(LYC, 144);
    assert_eq!(gb.read_byte(STAT), 0x7D);
}

#[test]
fn ly_is_read_only() {
    let mut gb = machine();
    gb.advance(3 * LINE_CYCLES as u32);
    gb.write_byte(LY, 99);
    assert_eq!(gb.read_byte(LY), 3);
}

#[test]
fn lyc_interrupt_fires_once_per_frame() {
    let mut gb = machine();
    gb.write_byte(STAT, 0x40);
    gb.write_byte(LYC, 10);
    gb.advance(FRAME_CYCLES);
    assert_eq!(gb.irq.count(Interrupt::LcdStat), 1);
    gb.advance(FRAME_CYCLES);
    assert_eq!(gb.irq.count(Interrupt::LcdStat), 2);
}

#[test]
fn stat_mode_interrupts() {
    let mut gb = machine();
    gb.write_byte(STAT, 0x10);
    gb.advance(FRAME_CYCLES);
    assert_eq!(gb.irq.count(Interrupt::LcdStat), 1);

    let mut gb = machine();
    gb.write_byte(STAT, 0x20);
    gb.advance(FRAME_CYCLES);
    // Lines 1..=143 plus line 0 of the next frame
    assert_eq!(gb.irq.count(Interrupt::LcdStat), 144);

    // HBlank STAT interrupts aren't generated
    let mut gb = machine();
    gb.write_byte(STAT, 0x08);
    gb.advance(FRAME_CYCLES);
    assert_eq!(gb.irq.count(Interrupt::LcdStat), 0);
    assert_eq!(gb.read_byte(STAT) & 0x08, 0x08);
}

#[test]
fn results_do_not_depend_on_chunking() {
    let events = [
        (0, LCDC, LCDC_DEFAULT),
        (31_337, SCX, 17),
        (40_000, 0x8010, 0x55),
        (90_001, WY, 40),
        (90_002, WX, 50),
        (90_003, LCDC, LCDC_DEFAULT | 0x20),
        (150_000, LCDC, 0x13),
        (151_000, LCDC, LCDC_DEFAULT),
    ];
    let total = 4 * FRAME_CYCLES + 1234;

    let mut whole = machine();
    busy_scene(&mut whole);
    run_script(&mut whole, total, &events, |_| u32::MAX);

    let mut sliced = machine();
    busy_scene(&mut sliced);
    run_script(&mut sliced, total, &events, |now| 1 + (now.wrapping_mul(7) + 13) % 997);

    let mut single = machine();
    busy_scene(&mut single);
    run_script(&mut single, total, &events, |_| 1);

    for other in [&sliced, &single] {
        assert_eq!(whole.video.to_rgb(), other.video.to_rgb());
        assert_eq!(whole.video.total_draws(), other.video.total_draws());
        assert_eq!(whole.ppu.ly(), other.ppu.ly());
        assert_eq!(whole.ppu.line_pos(), other.ppu.line_pos());
        for irq in [Interrupt::VBlank, Interrupt::LcdStat] {
            assert_eq!(whole.irq.count(irq), other.irq.count(irq));
        }
    }
    assert!(whole.irq.count(Interrupt::LcdStat) > 0);
}

#[test]
fn disabling_lcd_blanks_screen_and_stops_timing() {
    let mut gb = machine();
    fill_bg_map(&mut gb, 1);
    write_tile(&mut gb, 1, &solid_tile(3));
    gb.write_byte(BGP, IDENTITY_PALETTE);
    next_frame(&mut gb);
    assert!(!gb.video.is_blank());

    gb.advance(5 * LINE_CYCLES as u32 + 100);
    let vblanks = gb.irq.count(Interrupt::VBlank);
    gb.write_byte(LCDC, LCDC_DEFAULT & 0x7F);
    assert!(gb.frame_ready());
    assert!(gb.video.is_blank());
    assert_eq!(gb.read_byte(LY), 0);
    assert_eq!(gb.read_byte(STAT), 0);
    gb.clear_frame_flag();

    gb.advance(3 * FRAME_CYCLES);
    assert!(!gb.frame_ready());
    assert_eq!(gb.irq.count(Interrupt::VBlank), vblanks);
    assert_eq!(gb.read_byte(LY), 0);

    // Back on: starts from line 0 without counting the time spent off
    gb.write_byte(LCDC, LCDC_DEFAULT);
    assert_eq!(gb.ppu.line_pos(), 0);
    gb.advance(144 * LINE_CYCLES as u32 - 1);
    assert!(!gb.frame_ready());
    gb.advance(1);
    assert!(gb.frame_ready());
    assert_eq!(gb.irq.count(Interrupt::VBlank), vblanks + 1);
    assert!(!gb.video.is_blank());
}

#[test]
fn lcd_off_for_minutes_then_back_on() {
    let mut gb = machine();
    gb.write_byte(LCDC, LCDC_DEFAULT & 0x7F);
    gb.clear_frame_flag();

    // More than 2^31 cycles with the PPU unscheduled
    for _ in 0..130 {
        gb.advance(1 << 24);
    }
    assert!(!gb.frame_ready());

    gb.write_byte(LCDC, LCDC_DEFAULT);
    assert_eq!(gb.ppu.ly(), 0);
    assert_eq!(gb.ppu.line_pos(), 0);
    gb.advance(LINE_CYCLES as u32 + 4);
    assert_eq!(gb.read_byte(LY), 1);
    assert_eq!(gb.ppu.line_pos(), 4);
}

#[test]
fn rewriting_lcd_on_is_not_a_toggle() {
    let mut gb = machine();
    gb.advance(1000);
    gb.write_byte(LCDC, LCDC_DEFAULT);
    assert!(!gb.frame_ready());
    assert_eq!(gb.ppu.ly(), 2);
}

#[test]
fn background_uses_palette_and_scroll() {
    let mut gb = machine();
    write_tile(&mut gb, 1, &solid_tile(1));
    write_tile(&mut gb, 2, &solid_tile(2));
    // Checkerboard of tiles 1 and 2
    for row in 0..32u16 {
        for col in 0..32u16 {
            gb.write_byte(0x9800 + row * 32 + col, 1 + ((row + col) % 2) as u8);
        }
    }
    gb.write_byte(BGP, 0b00_11_01_00); // 1 -> 1, 2 -> 3
    gb.write_byte(LCDC, LCDC_DEFAULT);
    next_frame(&mut gb);
    assert_eq!(gb.video.pixel(0, 0), 1);
    assert_eq!(gb.video.pixel(8, 0), 3);
    assert_eq!(gb.video.pixel(8, 8), 1);

    gb.write_byte(SCX, 4);
    gb.write_byte(SCY, 8);
    next_frame(&mut gb);
    assert_eq!(gb.video.pixel(0, 0), 3);
    assert_eq!(gb.video.pixel(3, 0), 3);
    assert_eq!(gb.video.pixel(4, 0), 1);
}

#[test]
fn signed_tile_set_reads_around_0x9000() {
    let mut gb = machine();
    // Tile 0 of the signed set lives at 0x9000
    for i in 0..16 {
        gb.write_byte(0x9000 + i, solid_tile(3)[i as usize]);
    }
    // Tile 0x80 of both sets is at 0x8800
    for i in 0..16 {
        gb.write_byte(0x8800 + i, solid_tile(1)[i as usize]);
    }
    for col in 0..32u16 {
        gb.write_byte(0x9800 + col, if col % 2 == 0 { 0x00 } else { 0x80 });
    }
    gb.write_byte(BGP, IDENTITY_PALETTE);
    gb.write_byte(LCDC, 0x81);
    next_frame(&mut gb);
    assert_eq!(gb.video.pixel(0, 0), 3);
    assert_eq!(gb.video.pixel(8, 0), 1);
}

#[test]
fn disabled_background_is_white_and_transparent() {
    let mut gb = machine();
    fill_bg_map(&mut gb, 1);
    write_tile(&mut gb, 1, &solid_tile(3));
    write_tile(&mut gb, 2, &solid_tile(2));
    gb.write_byte(BGP, IDENTITY_PALETTE);
    gb.write_byte(OBP0, IDENTITY_PALETTE);
    write_sprite(&mut gb, 0, 20, 20, 2, OamEntry::FLAG_BEHIND_BG);
    gb.write_byte(LCDC, 0x92);
    next_frame(&mut gb);
    assert_eq!(gb.video.pixel(0, 0), 0);
    // Behind-background sprites show through a disabled background
    assert_eq!(gb.video.pixel(20, 20), 2);
}

#[test]
fn sprite_priority_against_background() {
    let mut gb = machine();
    write_tile(&mut gb, 1, &left_column_tile(1));
    write_tile(&mut gb, 2, &solid_tile(2));
    fill_bg_map(&mut gb, 1);
    gb.write_byte(BGP, IDENTITY_PALETTE);
    gb.write_byte(OBP0, IDENTITY_PALETTE);
    gb.write_byte(OBP1, 0b11_10_00_00); // 2 -> 2, 3 -> 3, 1 -> 0
    // Sprite 0 covers x 8..16: column 8 has opaque background
    write_sprite(&mut gb, 0, 8, 0, 2, OamEntry::FLAG_BEHIND_BG);
    // Sprite 1 is drawn over everything
    write_sprite(&mut gb, 1, 32, 0, 2, OamEntry::FLAG_OBP1);
    gb.write_byte(LCDC, LCDC_DEFAULT);
    next_frame(&mut gb);

    assert_eq!(gb.video.pixel(8, 0), 1, "hidden behind opaque background");
    assert_eq!(gb.video.pixel(9, 0), 2, "visible over background color 0");
    assert_eq!(gb.video.pixel(32, 0), 2);
    assert_eq!(gb.video.pixel(33, 0), 2);
}

#[test]
fn transparent_sprite_pixels_reveal_lower_priority_sprite() {
    let mut gb = machine();
    write_tile(&mut gb, 1, &left_column_tile(3));
    write_tile(&mut gb, 2, &solid_tile(2));
    write_tile(&mut gb, 3, &solid_tile(3));
    gb.write_byte(OBP0, IDENTITY_PALETTE);
    // Same X: OAM order decides, sprite 0 wins where it is opaque
    write_sprite(&mut gb, 0, 40, 10, 1, 0);
    write_sprite(&mut gb, 1, 40, 10, 2, 0);
    // Lower X wins over a sprite earlier in OAM
    write_sprite(&mut gb, 2, 64, 10, 2, 0);
    write_sprite(&mut gb, 3, 60, 10, 3, 0);
    gb.write_byte(LCDC, 0x82);
    next_frame(&mut gb);

    assert_eq!(gb.video.pixel(40, 10), 3);
    assert_eq!(gb.video.pixel(41, 10), 2);
    assert_eq!(gb.video.pixel(48, 10), 0);
    assert_eq!(gb.video.pixel(64, 10), 3);
    assert_eq!(gb.video.pixel(67, 10), 3);
    assert_eq!(gb.video.pixel(68, 10), 2);
}

#[test]
fn sprite_flips() {
    let mut gb = machine();
    write_tile(&mut gb, 1, &left_column_tile(3));
    let mut top_row = [0u8; 16];
    top_row[0] = 0xFF;
    write_tile(&mut gb, 2, &top_row);
    gb.write_byte(OBP0, IDENTITY_PALETTE);
    write_sprite(&mut gb, 0, 16, 30, 1, OamEntry::FLAG_X_FLIP);
    write_sprite(&mut gb, 1, 40, 30, 2, OamEntry::FLAG_Y_FLIP);
    gb.write_byte(LCDC, 0x82);
    next_frame(&mut gb);

    assert_eq!(gb.video.pixel(16, 30), 0);
    assert_eq!(gb.video.pixel(23, 30), 3);
    assert_eq!(gb.video.pixel(40, 30), 0);
    assert_eq!(gb.video.pixel(40, 37), 1);
}

#[test]
fn tall_sprites_span_two_tiles() {
    let mut gb = machine();
    write_tile(&mut gb, 4, &solid_tile(1));
    write_tile(&mut gb, 5, &solid_tile(2));
    gb.write_byte(OBP0, IDENTITY_PALETTE);
    // Odd tile index: bit 0 is ignored in 8x16 mode
    write_sprite(&mut gb, 0, 0, 0, 5, 0);
    write_sprite(&mut gb, 1, 16, 0, 5, OamEntry::FLAG_Y_FLIP);
    gb.write_byte(LCDC, 0x86);
    next_frame(&mut gb);

    assert_eq!(gb.video.pixel(0, 0), 1);
    assert_eq!(gb.video.pixel(0, 8), 2);
    assert_eq!(gb.video.pixel(0, 15), 2);
    assert_eq!(gb.video.pixel(0, 16), 0);
    assert_eq!(gb.video.pixel(16, 0), 2);
    assert_eq!(gb.video.pixel(16, 15), 1);
}

#[test]
fn sprites_partially_off_screen() {
    let mut gb = machine();
    write_tile(&mut gb, 1, &left_column_tile(3));
    gb.write_byte(OBP0, IDENTITY_PALETTE);
    // Only the flipped right column is visible
    write_sprite(&mut gb, 0, -7, 50, 1, OamEntry::FLAG_X_FLIP);
    write_sprite(&mut gb, 1, SCREEN_WIDTH as i16 - 1, 50, 1, 0);
    gb.write_byte(LCDC, 0x82);
    next_frame(&mut gb);

    assert_eq!(gb.video.pixel(0, 50), 3);
    assert_eq!(gb.video.pixel(1, 50), 0);
    assert_eq!(gb.video.pixel(SCREEN_WIDTH - 1, 50), 3);
}

#[test]
fn window_covers_background() {
    let mut gb = machine();
    write_tile(&mut gb, 1, &solid_tile(1));
    write_tile(&mut gb, 2, &solid_tile(3));
    fill_bg_map(&mut gb, 1);
    for addr in 0x9C00..0xA000u16 {
        gb.write_byte(addr, 2);
    }
    gb.write_byte(BGP, IDENTITY_PALETTE);
    gb.write_byte(WY, 100);
    gb.write_byte(WX, 87);
    gb.write_byte(LCDC, LCDC_DEFAULT | 0x60);
    next_frame(&mut gb);

    assert_eq!(gb.video.pixel(100, 99), 1);
    assert_eq!(gb.video.pixel(79, 100), 1);
    assert_eq!(gb.video.pixel(80, 100), 3);
    assert_eq!(gb.video.pixel(SCREEN_WIDTH - 1, SCREEN_HEIGHT - 1), 3);

    // Clipped past the right edge
    gb.write_byte(WX, 167);
    next_frame(&mut gb);
    assert_eq!(gb.video.pixel(SCREEN_WIDTH - 1, SCREEN_HEIGHT - 1), 1);
}

#[test]
fn window_line_counter_restarts_each_frame() {
    let mut gb = machine();
    let mut stripes = [0u8; 16];
    // Row 0 color 3, other rows color 0
    stripes[0] = 0xFF;
    stripes[1] = 0xFF;
    write_tile(&mut gb, 1, &stripes);
    for addr in 0x9C00..0xA000u16 {
        gb.write_byte(addr, 1);
    }
    gb.write_byte(BGP, IDENTITY_PALETTE);
    gb.write_byte(WY, 20);
    gb.write_byte(WX, 7);
    gb.write_byte(LCDC, LCDC_DEFAULT | 0x60);
    for _ in 0..2 {
        next_frame(&mut gb);
        assert_eq!(gb.video.pixel(0, 20), 3);
        assert_eq!(gb.video.pixel(0, 21), 0);
        assert_eq!(gb.video.pixel(0, 28), 3);
    }
}

#[test]
fn at_most_ten_sprites_per_line_in_oam_order() {
    let mut gb = machine();
    for i in 0..12 {
        write_sprite(&mut gb, i, 150 - i as i16 * 10, 40, 0, 0);
    }
    gb.write_byte(LCDC, LCDC_DEFAULT);

    let sprites = gb.ppu.line_sprites(&gb.vram, 40);
    assert_eq!(sprites.len(), 10);
    let xs: Vec<i16> = sprites.as_slice().iter().map(|s| s.x).collect();
    // OAM entries 0..10 were picked, then sorted by X
    assert_eq!(xs, (0..10).rev().map(|i| 150 - i * 10).collect::<Vec<_>>());
}

#[test]
fn equal_x_sprites_keep_oam_order() {
    let mut gb = machine();
    for i in 0..6u8 {
        let x = if i % 2 == 0 { 30 } else { 10 };
        write_sprite(&mut gb, i as u16, x, 0, i, 0);
    }
    gb.write_byte(LCDC, LCDC_DEFAULT);

    let sprites = gb.ppu.line_sprites(&gb.vram, 3);
    let order: Vec<(i16, u8)> = sprites.as_slice().iter().map(|s| (s.x, s.tile)).collect();
    assert_eq!(order, vec![(10, 1), (10, 3), (10, 5), (30, 0), (30, 2), (30, 4)]);
}

#[test]
fn sprite_selection_honours_height_and_enable() {
    let mut gb = machine();
    write_sprite(&mut gb, 0, 0, 10, 0, 0);
    gb.write_byte(LCDC, LCDC_DEFAULT);
    assert_eq!(gb.ppu.line_sprites(&gb.vram, 9).len(), 0);
    assert_eq!(gb.ppu.line_sprites(&gb.vram, 10).len(), 1);
    assert_eq!(gb.ppu.line_sprites(&gb.vram, 17).len(), 1);
    assert_eq!(gb.ppu.line_sprites(&gb.vram, 18).len(), 0);

    gb.write_byte(LCDC, LCDC_DEFAULT | 0x04);
    assert_eq!(gb.ppu.line_sprites(&gb.vram, 25).len(), 1);
    assert_eq!(gb.ppu.line_sprites(&gb.vram, 26).len(), 0);

    gb.write_byte(LCDC, LCDC_DEFAULT & !0x02);
    assert!(gb.ppu.line_sprites(&gb.vram, 10).is_empty());
}

#[test]
fn vram_writes_apply_to_lines_not_yet_drawn() {
    let mut gb = machine();
    fill_bg_map(&mut gb, 1);
    gb.write_byte(BGP, IDENTITY_PALETTE);
    gb.write_byte(LCDC, LCDC_DEFAULT);

    // Change the tile half way through the frame
    gb.advance(72 * LINE_CYCLES as u32);
    write_tile(&mut gb, 1, &solid_tile(3));
    gb.run_frame(FRAME_CYCLES);

    assert_eq!(gb.video.pixel(0, 71), 0);
    assert_eq!(gb.video.pixel(0, 72), 3);
    assert_eq!(gb.video.line(SCREEN_HEIGHT - 1), &[3; SCREEN_WIDTH]);
}
