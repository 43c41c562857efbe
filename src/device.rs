//! Framebuffer output and evdev input for the handheld.

use anyhow::{Context, Result};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::fd::AsFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::canvas::Canvas;
use crate::config::{DeviceConfig, PixelFormat};

const EV_KEY: u16 = 0x01;
const KEY_DOWN: i32 = 1;
const EVENT_SIZE: usize = std::mem::size_of::<libc::input_event>();
const TIME_SIZE: usize = std::mem::size_of::<libc::timeval>();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    /// Terminate request from outside the program.
    Quit,
    KeyDown(u16),
}

/// Where finished frames go.
pub trait Display {
    fn present(&mut self, canvas: &Canvas) -> Result<()>;
}

/// Poll-style queue of pending input. Never blocks.
pub trait InputSource {
    fn poll_events(&mut self) -> Vec<InputEvent>;
}

pub struct Framebuffer {
    file: File,
    path: PathBuf,
    format: PixelFormat,
    line_length: Option<usize>,
}

impl Framebuffer {
    pub fn open(config: &DeviceConfig) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .open(&config.framebuffer)
            .with_context(|| format!("Failed to open framebuffer {}", config.framebuffer.display()))?;
        log::info!("Drawing to {} ({:?})", config.framebuffer.display(), config.pixel_format);
        Ok(Self {
            file,
            path: config.framebuffer.clone(),
            format: config.pixel_format,
            line_length: config.line_length,
        })
    }
}

impl Display for Framebuffer {
    fn present(&mut self, canvas: &Canvas) -> Result<()> {
        let bpp = self.format.bytes_per_pixel();
        let line_length = self.line_length.unwrap_or(canvas.width() as usize * bpp);
        let raw = match self.format {
            PixelFormat::Rgb565 => canvas.pixels_rgb565(line_length),
            PixelFormat::Xrgb8888 => canvas.pixels_xrgb8888(line_length),
        };
        self.file.seek(SeekFrom::Start(0))?;
        self.file
            .write_all(&raw)
            .with_context(|| format!("Failed to write framebuffer {}", self.path.display()))?;
        Ok(())
    }
}

/// Key-down events from evdev nodes plus the process terminate request.
pub struct EvdevInput {
    devices: Vec<(PathBuf, File)>,
    terminate: Arc<AtomicBool>,
}

impl EvdevInput {
    /// Open every readable device in `paths`. Missing devices are logged and skipped.
    pub fn open(paths: &[PathBuf], terminate: Arc<AtomicBool>) -> Self {
        let devices = paths
            .iter()
            .filter_map(|path| match File::open(path) {
                Ok(file) => {
                    log::info!("Reading input from {}", path.display());
                    Some((path.clone(), file))
                }
                Err(e) => {
                    log::warn!("{} unavailable: {}", path.display(), e);
                    None
                }
            })
            .collect();
        Self { devices, terminate }
    }
}

impl InputSource for EvdevInput {
    fn poll_events(&mut self) -> Vec<InputEvent> {
        let mut events = Vec::new();
        if self.terminate.load(Ordering::SeqCst) {
            events.push(InputEvent::Quit);
        }
        self.devices.retain(|(path, file)| match drain_keys(file, &mut events) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Dropping input device {}: {}", path.display(), e);
                false
            }
        });
        events
    }
}

fn readable(file: &File) -> io::Result<bool> {
    let mut fds = [PollFd::new(file.as_fd(), PollFlags::POLLIN)];
    let n = poll(&mut fds, PollTimeout::ZERO).map_err(io::Error::from)?;
    Ok(n > 0 && fds[0].revents().map_or(false, |r| r.contains(PollFlags::POLLIN)))
}

fn drain_keys(mut file: &File, out: &mut Vec<InputEvent>) -> io::Result<()> {
    let mut buf = [0u8; EVENT_SIZE * 16];
    while readable(file)? {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        out.extend(buf[..n].chunks_exact(EVENT_SIZE).filter_map(decode_key_down));
    }
    Ok(())
}

/// Decode one raw `struct input_event`; only key presses are of interest.
fn decode_key_down(raw: &[u8]) -> Option<InputEvent> {
    let field = &raw[TIME_SIZE..];
    let kind = u16::from_ne_bytes([field[0], field[1]]);
    let code = u16::from_ne_bytes([field[2], field[3]]);
    let value = i32::from_ne_bytes([field[4], field[5], field[6], field[7]]);
    (kind == EV_KEY && value == KEY_DOWN).then_some(InputEvent::KeyDown(code))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_event(kind: u16, code: u16, value: i32) -> Vec<u8> {
        let mut raw = vec![0u8; TIME_SIZE];
        raw.extend(kind.to_ne_bytes());
        raw.extend(code.to_ne_bytes());
        raw.extend(value.to_ne_bytes());
        assert_eq!(raw.len(), EVENT_SIZE);
        raw
    }

    #[test]
    fn decodes_key_presses_only() {
        assert_eq!(decode_key_down(&raw_event(EV_KEY, 28, 1)), Some(InputEvent::KeyDown(28)));
        assert_eq!(decode_key_down(&raw_event(EV_KEY, 28, 0)), None);
        assert_eq!(decode_key_down(&raw_event(EV_KEY, 28, 2)), None);
        assert_eq!(decode_key_down(&raw_event(0x00, 0, 0)), None);
    }

    #[test]
    fn reads_queued_events_from_device_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event0");
        let mut bytes = raw_event(EV_KEY, 1, 1);
        bytes.extend(raw_event(0x00, 0, 0));
        bytes.extend(raw_event(EV_KEY, 1, 0));
        std::fs::write(&path, bytes).unwrap();

        let mut input = EvdevInput::open(&[path, dir.path().join("missing")], Arc::new(AtomicBool::new(false)));
        assert_eq!(input.devices.len(), 1);
        assert_eq!(input.poll_events(), vec![InputEvent::KeyDown(1)]);
        assert!(input.poll_events().is_empty());
    }

    #[test]
    fn terminate_request_becomes_quit() {
        let terminate = Arc::new(AtomicBool::new(false));
        let mut input = EvdevInput::open(&[], terminate.clone());
        assert!(input.poll_events().is_empty());
        terminate.store(true, Ordering::SeqCst);
        assert_eq!(input.poll_events(), vec![InputEvent::Quit]);
    }

    #[test]
    fn framebuffer_receives_packed_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fb0");
        std::fs::write(&path, b"").unwrap();
        let config = DeviceConfig { framebuffer: path.clone(), ..DeviceConfig::default() };

        let mut fb = Framebuffer::open(&config).unwrap();
        let mut canvas = Canvas::new(4, 2).unwrap();
        canvas.clear([0, 0, 0, 0xFF]);
        fb.present(&canvas).unwrap();
        fb.present(&canvas).unwrap();

        assert_eq!(std::fs::read(&path).unwrap().len(), 4 * 2 * 2);
    }
}
