//! Lazily synchronized Game Boy video and wave-channel audio emulation.
//!
//! Devices don't run in lockstep with the CPU. They record when they were
//! last brought up to date and ask the shared [`sync::SyncClock`] to wake
//! them up when something observable happens (end of a scanline, audio
//! buffer full). Bus accesses force an early catch-up so results never
//! depend on how the elapsed time was chunked.
//!
//! The [`gameboy`] facade wires everything together.

/// Wave channel (sound 3) and the audio sample pipeline.
pub mod apu;

/// Blocking ring of sample buffers between the emulator and an audio thread.
pub mod audio_queue;

/// Tunable parameters and their validation errors.
pub mod config;

/// Video output interface and an in-memory frame buffer.
pub mod frontend;

/// High-level facade wiring the clock, PPU, APU and video memory together.
pub mod gameboy;

/// Interrupt requests raised by the PPU.
pub mod irq;

/// Pixel Processing Unit (PPU) emulation.
pub mod ppu;

/// Cycle accounting shared by every lazily synchronized device.
pub mod sync;

/// VRAM and OAM storage with tile and sprite decoding helpers.
pub mod vram;
