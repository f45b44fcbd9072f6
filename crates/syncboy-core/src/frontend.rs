/// Screen resolution of the LCD
pub const SCREEN_WIDTH: usize = 160;
pub const SCREEN_HEIGHT: usize = 144;

/// Shade 0, the color of a blank screen.
pub const WHITE: u8 = 0;

/// Default DMG palette colors in 0x00RRGGBB order, indexed by shade.
pub const DMG_PALETTE: [u32; 4] = [0x009BBC0F, 0x008BAC0F, 0x00306230, 0x000F380F];

/// Destination of finished scanlines. Each entry of `line` is a shade (0..=3)
/// after palette translation.
pub trait VideoSink {
    fn draw_line(&mut self, ly: u8, line: &[u8; SCREEN_WIDTH]);
}

/// Sink keeping the last drawn frame in memory.
#[derive(Clone)]
pub struct FrameBuffer {
    pixels: [[u8; SCREEN_WIDTH]; SCREEN_HEIGHT],
    line_draws: [u64; SCREEN_HEIGHT],
    total_draws: u64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self {
            pixels: [[WHITE; SCREEN_WIDTH]; SCREEN_HEIGHT],
            line_draws: [0; SCREEN_HEIGHT],
            total_draws: 0,
        }
    }

    pub fn line(&self, ly: usize) -> &[u8; SCREEN_WIDTH] {
        &self.pixels[ly % SCREEN_HEIGHT]
    }

    pub fn pixel(&self, x: usize, y: usize) -> u8 {
        self.pixels[y % SCREEN_HEIGHT][x % SCREEN_WIDTH]
    }

    /// Number of times line `ly` has been drawn.
    pub fn draws_of(&self, ly: usize) -> u64 {
        self.line_draws[ly % SCREEN_HEIGHT]
    }

    pub fn total_draws(&self) -> u64 {
        self.total_draws
    }

    /// Returns true if every pixel of the frame is shade 0.
    pub fn is_blank(&self) -> bool {
        self.pixels.iter().flatten().all(|&p| p == WHITE)
    }

    /// Convert the frame to packed RGB bytes using [`DMG_PALETTE`].
    pub fn to_rgb(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SCREEN_WIDTH * SCREEN_HEIGHT * 3);
        for &shade in self.pixels.iter().flatten() {
            let color = DMG_PALETTE[(shade & 3) as usize];
            out.extend_from_slice(&[(color >> 16) as u8, (color >> 8) as u8, color as u8]);
        }
        out
    }
}

impl VideoSink for FrameBuffer {
    fn draw_line(&mut self, ly: u8, line: &[u8; SCREEN_WIDTH]) {
        let ly = ly as usize;
        if ly >= SCREEN_HEIGHT {
            return;
        }
        self.pixels[ly] = *line;
        self.line_draws[ly] += 1;
        self.total_draws += 1;
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
