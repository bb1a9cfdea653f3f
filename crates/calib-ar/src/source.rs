//! Frame sources: image directories, in-memory frames and (with the
//! `opencv` feature) video files.

use crate::error::StreamError;
use calib_ar_core::Frame;
use log::{debug, warn};
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};

/// Pull-based producer of decoded frames.
///
/// `None` means end of stream. Read failures after the first frame end the
/// stream; they are logged by the implementation, not reported.
pub trait FrameSource {
    fn read_next(&mut self) -> Option<Frame>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read_next(&mut self) -> Option<Frame> {
        (**self).read_next()
    }
}

impl<S: FrameSource + ?Sized> FrameSource for &mut S {
    fn read_next(&mut self) -> Option<Frame> {
        (**self).read_next()
    }
}

/// An opened source that is known to produce at least one frame.
pub struct FrameStream<S = Box<dyn FrameSource>> {
    source: S,
    pending: Option<Frame>,
    frames_read: usize,
}

impl<S: FrameSource> FrameStream<S> {
    /// Prime the first frame of `source`.
    ///
    /// `name` identifies the source in the error when nothing can be read.
    pub fn open(mut source: S, name: impl fmt::Display) -> Result<Self, StreamError> {
        let first = source
            .read_next()
            .ok_or_else(|| StreamError::UnreadableSource(name.to_string()))?;
        Ok(Self {
            source,
            pending: Some(first),
            frames_read: 0,
        })
    }

    /// Frames handed out so far.
    pub fn frames_read(&self) -> usize {
        self.frames_read
    }
}

impl<S: FrameSource> Iterator for FrameStream<S> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        let frame = self.pending.take().or_else(|| self.source.read_next())?;
        self.frames_read += 1;
        Some(frame)
    }
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

fn is_image_file(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false)
}

/// Still images from a directory, in lexicographic file-name order.
#[derive(Debug)]
pub struct ImageSequence {
    paths: VecDeque<PathBuf>,
}

impl ImageSequence {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StreamError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir)
            .map_err(|e| StreamError::UnreadableSource(format!("{}: {e}", dir.display())))?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if is_image_file(&path) {
                paths.push(path);
            }
        }
        if paths.is_empty() {
            return Err(StreamError::UnreadableSource(format!(
                "{}: no image files",
                dir.display()
            )));
        }
        paths.sort();
        debug!("image sequence {}: {} files", dir.display(), paths.len());
        Ok(Self::from_paths(paths))
    }

    /// Use `paths` as given, in order.
    pub fn from_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }
}

impl FrameSource for ImageSequence {
    fn read_next(&mut self) -> Option<Frame> {
        let path = self.paths.pop_front()?;
        match image::open(&path) {
            Ok(img) => Some(img.to_rgb8()),
            Err(err) => {
                warn!("stopping at {}: {err}", path.display());
                self.paths.clear();
                None
            }
        }
    }
}

/// Frames already held in memory.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    frames: VecDeque<Frame>,
}

impl MemorySource {
    pub fn new(frames: impl IntoIterator<Item = Frame>) -> Self {
        Self {
            frames: frames.into_iter().collect(),
        }
    }
}

impl FrameSource for MemorySource {
    fn read_next(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }
}

impl FromIterator<Frame> for MemorySource {
    fn from_iter<T: IntoIterator<Item = Frame>>(iter: T) -> Self {
        Self::new(iter)
    }
}

/// Where frames come from, resolved from a path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    /// A directory of still images.
    ImageDir(PathBuf),
    /// A single image file, played as a one-frame stream.
    Image(PathBuf),
    /// Anything else is treated as a video file.
    Video(PathBuf),
}

impl SourceSpec {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if path.is_dir() {
            Self::ImageDir(path)
        } else if is_image_file(&path) {
            Self::Image(path)
        } else {
            Self::Video(path)
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::ImageDir(p) | Self::Image(p) | Self::Video(p) => p,
        }
    }

    /// Open a fresh stream. Each call starts from the first frame.
    pub fn open(&self) -> Result<FrameStream, StreamError> {
        let path = self.path();
        if !path.exists() {
            return Err(StreamError::UnreadableSource(format!(
                "{}: no such file or directory",
                path.display()
            )));
        }
        let source: Box<dyn FrameSource> = match self {
            Self::ImageDir(dir) => Box::new(ImageSequence::open(dir)?),
            Self::Image(file) => Box::new(ImageSequence::from_paths([file.clone()])),
            Self::Video(file) => open_video(file)?,
        };
        FrameStream::open(source, self)
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path().display())
    }
}

#[cfg(feature = "opencv")]
fn open_video(path: &Path) -> Result<Box<dyn FrameSource>, StreamError> {
    Ok(Box::new(crate::cv::VideoFile::open(path)?))
}

#[cfg(not(feature = "opencv"))]
fn open_video(path: &Path) -> Result<Box<dyn FrameSource>, StreamError> {
    Err(StreamError::UnsupportedSource(path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(value: u8) -> Frame {
        Frame::from_pixel(4, 3, Rgb([value, value, value]))
    }

    #[test]
    fn empty_source_is_unreadable() {
        let err = FrameStream::open(MemorySource::default(), "memory").err();
        assert!(matches!(err, Some(StreamError::UnreadableSource(name)) if name == "memory"));
    }

    #[test]
    fn primed_frame_comes_first() {
        let stream = FrameStream::open(MemorySource::new([solid(1), solid(2), solid(3)]), "m")
            .expect("stream");
        let values: Vec<u8> = stream.map(|f| f.get_pixel(0, 0).0[0]).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn directory_frames_are_sorted() {
        let dir = tempfile::tempdir().expect("tempdir");
        for (name, value) in [("b.png", 20u8), ("a.png", 10), ("c.png", 30)] {
            solid(value).save(dir.path().join(name)).expect("save");
        }
        std::fs::write(dir.path().join("notes.txt"), "not a frame").expect("write");

        let stream = SourceSpec::from_path(dir.path()).open().expect("stream");
        let values: Vec<u8> = stream.map(|f| f.get_pixel(0, 0).0[0]).collect();
        assert_eq!(values, vec![10, 20, 30]);
    }

    #[test]
    fn corrupt_frame_ends_the_sequence() {
        let dir = tempfile::tempdir().expect("tempdir");
        solid(10).save(dir.path().join("0.png")).expect("save");
        std::fs::write(dir.path().join("1.png"), b"garbage").expect("write");
        solid(30).save(dir.path().join("2.png")).expect("save");

        let stream = SourceSpec::from_path(dir.path()).open().expect("stream");
        assert_eq!(stream.count(), 1);
    }

    #[test]
    fn missing_and_empty_sources_fail_at_open() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            SourceSpec::from_path(dir.path()).open(),
            Err(StreamError::UnreadableSource(_))
        ));
        assert!(matches!(
            SourceSpec::from_path(dir.path().join("missing.mp4")).open(),
            Err(StreamError::UnreadableSource(_))
        ));
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn video_needs_opencv() {
        let dir = tempfile::tempdir().expect("tempdir");
        let video = dir.path().join("clip.mp4");
        std::fs::write(&video, b"\0\0\0").expect("write");
        assert!(matches!(
            SourceSpec::from_path(&video).open(),
            Err(StreamError::UnsupportedSource(_))
        ));
    }
}
