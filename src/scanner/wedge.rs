//! Keyboard-wedge scanners.
//!
//! Handheld badge scanners usually present as a keyboard: they type the code
//! and press Enter. Each input line is treated as one frame.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{BarcodeDecoder, CameraDevice, Frame, FrameSource};
use crate::config::ScannerConfig;
use crate::error::{Error, Result};

pub type LineReader = Lines<Box<dyn AsyncBufRead + Send + Unpin>>;

/// Input lines shared between the scanner and interactive prompts. Whoever
/// holds the lock owns the keyboard.
pub type SharedLines = Arc<Mutex<LineReader>>;

pub fn stdin_lines() -> SharedLines {
    shared_lines(BufReader::new(tokio::io::stdin()))
}

pub fn shared_lines(reader: impl AsyncBufRead + Send + Unpin + 'static) -> SharedLines {
    let reader: Box<dyn AsyncBufRead + Send + Unpin> = Box::new(reader);
    Arc::new(Mutex::new(reader.lines()))
}

pub struct WedgeCamera {
    lines: SharedLines,
}

impl WedgeCamera {
    pub fn new(lines: SharedLines) -> Self {
        Self { lines }
    }
}

struct WedgeSource {
    input: Option<OwnedMutexGuard<LineReader>>,
}

#[async_trait]
impl CameraDevice for WedgeCamera {
    async fn acquire(&self) -> Result<Box<dyn FrameSource>> {
        let input = self.lines.clone().lock_owned().await;
        Ok(Box::new(WedgeSource { input: Some(input) }))
    }
}

#[async_trait]
impl FrameSource for WedgeSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        let input = self
            .input
            .as_mut()
            .ok_or_else(|| Error::Camera("scanner input released".to_string()))?;

        let line = input
            .next_line()
            .await
            .map_err(|e| Error::Camera(format!("failed to read scanner input: {}", e)))?;
        Ok(line.map(Frame::new))
    }

    fn release(&mut self) {
        self.input.take();
    }
}

/// Accepts alphanumeric badge codes within configured length bounds
#[derive(Debug, Clone)]
pub struct SymbologyDecoder {
    min_length: usize,
    max_length: usize,
}

impl SymbologyDecoder {
    pub fn new(config: &ScannerConfig) -> Self {
        Self {
            min_length: config.min_length,
            max_length: config.max_length,
        }
    }
}

impl BarcodeDecoder for SymbologyDecoder {
    fn decode(&self, frame: &Frame) -> Option<String> {
        let text = frame.as_text()?.trim();
        let code = strip_symbology_identifier(text);

        let length = code.chars().count();
        if length < self.min_length || length > self.max_length {
            return None;
        }
        if !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return None;
        }
        Some(code.to_string())
    }
}

/// Drop an AIM symbology identifier such as `]C0` (Code 128)
fn strip_symbology_identifier(text: &str) -> &str {
    match text.strip_prefix(']') {
        Some(rest) if rest.len() >= 2 && rest.is_char_boundary(2) => &rest[2..],
        _ => text,
    }
}
