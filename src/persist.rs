//! Frame persistence hand-off.
//!
//! The sequencing thread never blocks on file I/O: frames are copied out
//! of device buffers, pushed into a bounded channel, and written by one
//! worker thread. The file format encoder sits behind [`FrameWriter`] so a
//! different archive format (e.g. FITS) can be swapped in; [`PgmWriter`]
//! is the in-tree implementation.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, Sender};
use tracing::{debug, error};

use crate::error::{CaptureError, Result};

/// Per-frame metadata attached at retrieval time.
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    /// Host-clock acquisition timestamp.
    pub timestamp: DateTime<Local>,
    /// Exposure duration in seconds.
    pub exposure_seconds: f64,
    /// Sequence repetition index, 0-based.
    pub sequence_index: u32,
    /// Exposure level index within the plan, 0-based.
    pub exposure_index: usize,
    /// Frame index within the burst, 0-based.
    pub frame_index: u32,
}

/// A frame fully copied out of its device buffer, safe to persist after
/// the original buffer has been requeued.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Significant bits per pixel.
    pub bit_depth: u8,
    /// Owned copy of the pixel payload.
    pub pixels: Vec<u16>,
    /// Acquisition metadata.
    pub metadata: FrameMetadata,
}

/// Deterministic artifact name:
/// `<stem>_<YYYYMMDD_HHMMSS>_seq<seq>_exp<level>_i<frame:02>.<ext>`
/// with the exposure level 1-based.
#[must_use]
pub fn frame_path(
    base_dir: &Path,
    stem: &str,
    metadata: &FrameMetadata,
    extension: &str,
) -> PathBuf {
    let stamp = metadata.timestamp.format("%Y%m%d_%H%M%S");
    base_dir.join(format!(
        "{stem}_{stamp}_seq{seq}_exp{exp}_i{frame:02}.{extension}",
        seq = metadata.sequence_index,
        exp = metadata.exposure_index + 1,
        frame = metadata.frame_index,
    ))
}

/// Encodes one captured frame to disk.
pub trait FrameWriter {
    /// File extension produced by this writer, without the dot.
    fn extension(&self) -> &str;

    /// Write the frame to `path`.
    fn write(&mut self, frame: &CapturedFrame, path: &Path) -> io::Result<()>;
}

/// 16-bit binary PGM writer with acquisition metadata in header comments.
#[derive(Debug, Default)]
pub struct PgmWriter;

impl FrameWriter for PgmWriter {
    fn extension(&self) -> &str {
        "pgm"
    }

    fn write(&mut self, frame: &CapturedFrame, path: &Path) -> io::Result<()> {
        let file = File::create(path)?;
        let mut out = BufWriter::new(file);
        writeln!(out, "P5")?;
        writeln!(out, "# DATE-OBS: {}", frame.metadata.timestamp.to_rfc3339())?;
        writeln!(out, "# EXPTIME: {}", frame.metadata.exposure_seconds)?;
        writeln!(out, "{} {}", frame.width, frame.height)?;
        writeln!(out, "65535")?;
        for pixel in &frame.pixels {
            out.write_all(&pixel.to_be_bytes())?;
        }
        out.flush()
    }
}

/// Destination for copied-out frames.
pub trait FrameSink {
    /// Hand one frame off for persistence. Blocks only on queue admission.
    fn submit(&mut self, frame: CapturedFrame) -> Result<()>;
}

/// One writer thread fed by a bounded channel.
///
/// The worker keeps draining after a write failure so the sequencing
/// thread is never wedged on a full queue; the first failure is surfaced
/// by [`PersistenceWorker::finish`].
pub struct PersistenceWorker {
    tx: Option<Sender<CapturedFrame>>,
    handle: Option<JoinHandle<(u64, Option<CaptureError>)>>,
}

impl PersistenceWorker {
    /// Spawn the worker. `queue_depth` bounds the hand-off channel.
    pub fn spawn<W>(mut writer: W, base_dir: PathBuf, stem: String, queue_depth: usize) -> Self
    where
        W: FrameWriter + Send + 'static,
    {
        let (tx, rx) = bounded::<CapturedFrame>(queue_depth);
        let handle = thread::spawn(move || {
            let mut written = 0u64;
            let mut first_error: Option<CaptureError> = None;
            for frame in rx {
                if first_error.is_some() {
                    continue;
                }
                let path = frame_path(&base_dir, &stem, &frame.metadata, writer.extension());
                match writer.write(&frame, &path) {
                    Ok(()) => {
                        written += 1;
                        debug!(path = %path.display(), "persisted frame");
                    }
                    Err(err) => {
                        error!(path = %path.display(), %err, "frame write failed");
                        first_error = Some(CaptureError::Persistence(err));
                    }
                }
            }
            (written, first_error)
        });
        Self {
            tx: Some(tx),
            handle: Some(handle),
        }
    }

    /// Close the queue, join the worker, and report frames written or the
    /// first write error.
    pub fn finish(mut self) -> Result<u64> {
        self.tx.take();
        let Some(handle) = self.handle.take() else {
            return Ok(0);
        };
        let (written, first_error) = handle.join().map_err(|_| CaptureError::Device {
            reason: "persistence worker panicked".to_owned(),
        })?;
        match first_error {
            Some(err) => Err(err),
            None => Ok(written),
        }
    }
}

impl FrameSink for PersistenceWorker {
    fn submit(&mut self, frame: CapturedFrame) -> Result<()> {
        let Some(tx) = self.tx.as_ref() else {
            return Err(CaptureError::Persistence(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "persistence worker already finished",
            )));
        };
        tx.send(frame).map_err(|_| {
            CaptureError::Persistence(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "persistence worker stopped",
            ))
        })
    }
}
