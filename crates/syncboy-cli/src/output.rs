use crossbeam_channel as cb;
use log::{info, warn};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use syncboy_core::audio_queue::AudioConsumer;
use syncboy_core::frontend::{FrameBuffer, SCREEN_HEIGHT, SCREEN_WIDTH};

use crate::error::CliError;

const POLL_INTERVAL: Duration = Duration::from_millis(20);

fn create_file(path: &Path) -> Result<BufWriter<File>, CliError> {
    if let Some(parent) = path
        .parent()
        .and_then(|p| (!p.as_os_str().is_empty()).then_some(p))
    {
        std::fs::create_dir_all(parent).map_err(|source| CliError::Io {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let file = File::create(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufWriter::new(file))
}

/// Save the frame as an RGB PNG using the DMG palette.
pub fn write_png(path: &Path, frame: &FrameBuffer) -> Result<(), CliError> {
    let out = create_file(path)?;
    let mut encoder = png::Encoder::new(out, SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32);
    encoder.set_color(png::ColorType::Rgb);
    encoder.set_depth(png::BitDepth::Eight);
    let mut writer = encoder.write_header()?;
    writer.write_image_data(&frame.to_rgb())?;
    writer.finish()?;
    Ok(())
}

/// Drains the audio pipeline into a WAV file on a dedicated thread.
pub struct WavRecorder {
    stop: cb::Sender<()>,
    handle: JoinHandle<Result<u64, CliError>>,
    path: PathBuf,
}

impl WavRecorder {
    pub fn start(
        path: &Path,
        mut consumer: AudioConsumer,
        sample_rate: u32,
    ) -> Result<Self, CliError> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::new(create_file(path)?, spec)?;
        let (stop, stop_rx) = cb::bounded::<()>(1);

        let handle = thread::spawn(move || -> Result<u64, CliError> {
            let mut frames = 0u64;
            // The buffers have to keep flowing even if the file can't be
            // written anymore, otherwise the emulator blocks.
            let mut failure = None;

            let mut store = |buf: &[[i16; 2]], failure: &mut Option<hound::Error>| {
                if failure.is_some() {
                    return;
                }
                for &[left, right] in buf {
                    if let Err(e) = writer
                        .write_sample(left)
                        .and_then(|_| writer.write_sample(right))
                    {
                        warn!("WAV write failed: {e}");
                        *failure = Some(e);
                        return;
                    }
                    frames += 1;
                }
            };

            loop {
                if let Some(buf) = consumer.recv_timeout(POLL_INTERVAL) {
                    store(&buf[..], &mut failure);
                    continue;
                }
                match stop_rx.try_recv() {
                    Err(cb::TryRecvError::Empty) => {}
                    Ok(()) | Err(cb::TryRecvError::Disconnected) => break,
                }
            }
            while let Some(buf) = consumer.try_recv() {
                store(&buf[..], &mut failure);
            }
            drop(store);

            if let Some(e) = failure {
                return Err(e.into());
            }
            writer.finalize()?;
            Ok(frames)
        });

        Ok(Self {
            stop,
            handle,
            path: path.to_path_buf(),
        })
    }

    /// Stop recording once the pending buffers are written. Returns the
    /// number of stereo frames in the file.
    pub fn finish(self) -> Result<u64, CliError> {
        let _ = self.stop.send(());
        let frames = self
            .handle
            .join()
            .map_err(|_| CliError::RecorderPanicked)??;
        info!("Wrote {frames} audio frames to {}", self.path.display());
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syncboy_core::config::AudioConfig;
    use syncboy_core::gameboy::GameBoy;

    #[test]
    fn png_has_screen_dimensions() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("shots").join("frame.png");
        write_png(&path, &FrameBuffer::new()).expect("png written");

        let decoder = png::Decoder::new(std::io::BufReader::new(File::open(&path).expect("open png")));
        let reader = decoder.read_info().expect("png header");
        let info = reader.info();
        assert_eq!((info.width, info.height), (160, 144));
        assert_eq!(info.color_type, png::ColorType::Rgb);
    }

    #[test]
    fn recorder_captures_every_buffer() {
        let config = AudioConfig {
            sample_divisor: 64,
            buffer_frames: 256,
            buffer_count: 2,
        };
        let mut gb = GameBoy::new(config, FrameBuffer::new()).expect("machine");
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("out.wav");
        let recorder =
            WavRecorder::start(&path, gb.enable_audio_output(), config.sample_rate_hz())
                .expect("recorder");

        gb.advance(8 * config.buffer_cycles() as u32);
        gb.disable_audio_output();
        let frames = recorder.finish().expect("recording");
        assert_eq!(frames, 8 * 256);

        let reader = hound::WavReader::open(&path).expect("wav");
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 65_536);
        assert_eq!(reader.len(), 2 * 8 * 256);
    }
}
