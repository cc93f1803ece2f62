//! Video probing and frame extraction.
//!
//! Decoding is delegated to `ffmpeg`/`ffprobe` processes.
//! Frames are streamed as raw `rgb24` over a pipe and read one
//! at a time, so at most one frame per video is resident.
use std::{
    io::{ErrorKind, Read},
    path::{Path, PathBuf},
    process::{Child, ChildStdout, Command, Stdio},
};

use anyhow::{anyhow, bail, ensure, Context, Result};
use image::RgbImage;
use serde_derive::*;

/// Frame geometry of a video's first video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
}

pub type Frames<'a> = Box<dyn Iterator<Item = Result<RgbImage>> + Send + 'a>;

/// Access to video files.
pub trait VideoSource: Send + Sync {
    fn probe(&self, path: &Path) -> Result<VideoInfo>;

    /// Every `stride`-th frame of the video, starting with the
    /// first, in presentation order.
    fn frames<'a>(&'a self, path: &Path, stride: u32) -> Result<Frames<'a>>;
}

/// [`VideoSource`] backed by the `ffmpeg` and `ffprobe`
/// binaries.
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for Ffmpeg {
    fn default() -> Self {
        Ffmpeg {
            ffmpeg: "ffmpeg".into(),
            ffprobe: "ffprobe".into(),
        }
    }
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: u32,
    height: u32,
}

fn parse_probe(json: &[u8]) -> Result<VideoInfo> {
    let out: ProbeOutput = serde_json::from_slice(json).context("parsing ffprobe output")?;
    let stream = out
        .streams
        .first()
        .ok_or_else(|| anyhow!("no video stream"))?;
    Ok(VideoInfo {
        width: stream.width,
        height: stream.height,
    })
}

impl VideoSource for Ffmpeg {
    fn probe(&self, path: &Path) -> Result<VideoInfo> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-select_streams", "v:0"])
            .args(["-show_entries", "stream=width,height", "-of", "json"])
            .arg(path)
            .output()
            .with_context(|| format!("running {}", self.ffprobe.display()))?;
        ensure!(
            output.status.success(),
            "ffprobe failed on {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
        parse_probe(&output.stdout).with_context(|| format!("probing {}", path.display()))
    }

    fn frames<'a>(&'a self, path: &Path, stride: u32) -> Result<Frames<'a>> {
        ensure!(stride > 0, "frame stride must be positive");
        let info = self.probe(path)?;

        let filter = format!("select='not(mod(n\\,{}))'", stride);
        let mut command = Command::new(&self.ffmpeg);
        command
            .args(["-v", "error", "-i"])
            .arg(path)
            .args(["-vf", &filter, "-vsync", "vfr"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"]);
        let frames = FfmpegFrames::spawn(command, info)
            .with_context(|| format!("running {}", self.ffmpeg.display()))?;
        Ok(Box::new(frames))
    }
}

/// Splits a stream of packed `rgb24` frames.
pub struct RawFrames<R> {
    rdr: R,
    info: VideoInfo,
    done: bool,
}

impl<R: Read> RawFrames<R> {
    pub fn new(rdr: R, info: VideoInfo) -> Self {
        RawFrames {
            rdr,
            info,
            done: false,
        }
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let len = 3 * self.info.width as usize * self.info.height as usize;
        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            match self.rdr.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        match filled {
            0 => Ok(None),
            n if n == len => Ok(RgbImage::from_raw(self.info.width, self.info.height, buf)),
            n => bail!("truncated frame: {} of {} bytes", n, len),
        }
    }
}

impl<R: Read> Iterator for RawFrames<R> {
    type Item = Result<RgbImage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let res = self.next_frame().transpose();
        if !matches!(res, Some(Ok(_))) {
            self.done = true;
        }
        res
    }
}

/// Frames read from a decoder process. The stream ends after
/// the first error: a truncated or unreadable frame, or else a
/// failed exit status.
struct FfmpegFrames {
    frames: RawFrames<ChildStdout>,
    child: Child,
    finished: bool,
}

impl FfmpegFrames {
    fn spawn(mut command: Command, info: VideoInfo) -> Result<Self> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                bail!("stdout not captured");
            }
        };
        Ok(FfmpegFrames {
            frames: RawFrames::new(stdout, info),
            child,
            finished: false,
        })
    }
}

impl Iterator for FfmpegFrames {
    type Item = Result<RgbImage>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.frames.next() {
            Some(Ok(frame)) => Some(Ok(frame)),
            Some(Err(e)) => {
                self.finished = true;
                Some(Err(e))
            }
            None => {
                self.finished = true;
                match self.child.wait() {
                    Ok(status) if !status.success() => Some(Err(anyhow!("ffmpeg exited with {}", status))),
                    Ok(_) => None,
                    Err(e) => Some(Err(e.into())),
                }
            }
        }
    }
}

impl Drop for FfmpegFrames {
    fn drop(&mut self) {
        // Stops decoding when the consumer stops early.
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
