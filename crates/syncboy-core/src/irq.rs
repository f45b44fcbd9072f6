/// Interrupt sources raised by the PPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
    VBlank,
    LcdStat,
}

impl Interrupt {
    /// Bit of this interrupt in the IF/IE registers.
    pub const fn mask(self) -> u8 {
        match self {
            Interrupt::VBlank => 0x01,
            Interrupt::LcdStat => 0x02,
        }
    }
}

/// Receives interrupt requests. Dispatching them to the CPU is up to the
/// implementor.
pub trait InterruptSink {
    fn trigger(&mut self, irq: Interrupt);
}

/// Interrupt flag register (IF) with per-source request counters.
#[derive(Debug, Default, Clone)]
pub struct Interrupts {
    pub if_reg: u8,
    vblank_count: u64,
    stat_count: u64,
}

impl Interrupts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `irq` has been requested and not acknowledged yet.
    pub fn is_pending(&self, irq: Interrupt) -> bool {
        self.if_reg & irq.mask() != 0
    }

    /// Clear the request bit, as the CPU does when it services `irq`.
    pub fn acknowledge(&mut self, irq: Interrupt) {
        self.if_reg &= !irq.mask();
    }

    /// Number of times `irq` has been triggered since the last reset.
    pub fn count(&self, irq: Interrupt) -> u64 {
        match irq {
            Interrupt::VBlank => self.vblank_count,
            Interrupt::LcdStat => self.stat_count,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

impl InterruptSink for Interrupts {
    fn trigger(&mut self, irq: Interrupt) {
        self.if_reg |= irq.mask();
        match irq {
            Interrupt::VBlank => self.vblank_count += 1,
            Interrupt::LcdStat => self.stat_count += 1,
        }
    }
}
