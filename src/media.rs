//! Video download and transcode adapters.
//!
//! [`VideoBackend`] resolves a watch URL into its available streams and
//! downloads one of them; [`Transcoder`] converts a downloaded stream into the
//! target file. [`MediaPipeline`] combines the two into the per-song media
//! step the orchestrator calls through [`MediaFetcher`].

use crate::error::MediaError;
use crate::models::watch_url;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, warn};

const TMP_VIDEO: &str = "download_video.tmp.mp4";
const TMP_AUDIO: &str = "download_audio.tmp.m4a";
const AUDIO_MIME: &str = "audio/mp4";
const STDERR_TAIL: usize = 600;

// ============================================================================
// Streams
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    AudioOnly,
    VideoOnly,
    Muxed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    pub format_id: String,
    pub kind: StreamKind,
    pub mime_type: String,
    /// Vertical resolution in pixels
    pub height: Option<u32>,
    /// Bitrate in kbit/s
    pub bitrate: Option<f64>,
}

/// A resolved video and its downloadable streams.
#[derive(Debug, Clone)]
pub struct VideoHandle {
    pub url: String,
    pub streams: Vec<Stream>,
}

impl VideoHandle {
    pub fn streams_of(&self, kind: StreamKind) -> impl Iterator<Item = &Stream> {
        self.streams.iter().filter(move |s| s.kind == kind)
    }

    /// Highest-resolution video-only stream; bitrate breaks ties.
    pub fn best_video(&self) -> Option<&Stream> {
        self.streams_of(StreamKind::VideoOnly).max_by(|a, b| {
            a.height
                .cmp(&b.height)
                .then_with(|| a.bitrate.unwrap_or(0.0).total_cmp(&b.bitrate.unwrap_or(0.0)))
        })
    }

    /// Highest-bitrate audio-only `audio/mp4` stream.
    pub fn best_audio(&self) -> Option<&Stream> {
        self.streams_of(StreamKind::AudioOnly)
            .filter(|s| s.mime_type == AUDIO_MIME)
            .max_by(|a, b| a.bitrate.unwrap_or(0.0).total_cmp(&b.bitrate.unwrap_or(0.0)))
    }
}

pub trait VideoBackend {
    fn resolve(&self, url: &str) -> Result<VideoHandle, MediaError>;

    /// Download one stream to `dir/file_name`, returning the bytes on disk.
    fn download(
        &self,
        handle: &VideoHandle,
        stream: &Stream,
        dir: &Path,
        file_name: &str,
    ) -> Result<u64, MediaError>;
}

// ============================================================================
// Transcoding
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Audio-only job producing mp3
    Mp3,
    /// Video-only job producing mpeg4
    Mpeg4,
}

impl Codec {
    pub fn args(self) -> [&'static str; 2] {
        match self {
            Codec::Mp3 => ["-acodec", "mp3"],
            Codec::Mpeg4 => ["-vcodec", "mpeg4"],
        }
    }
}

pub trait Transcoder {
    /// Transcode `dir/input` into `dir/output`.
    fn transcode(&self, dir: &Path, input: &str, output: &str, codec: Codec) -> Result<(), MediaError>;
}

fn stderr_tail(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    let start = text
        .char_indices()
        .rev()
        .nth(STDERR_TAIL)
        .map_or(0, |(i, _)| i);
    text[start..].to_string()
}

/// Run a subprocess to completion, failing on a non-zero exit.
fn run(program: &Path, cmd: &mut Command) -> Result<Vec<u8>, MediaError> {
    let name = program.display().to_string();
    debug!("Running {:?}", cmd);
    let output = cmd.output().map_err(|source| MediaError::Spawn {
        program: name.clone(),
        source,
    })?;
    if !output.status.success() {
        return Err(MediaError::ExitStatus {
            program: name,
            status: output.status.to_string(),
            stderr: stderr_tail(&output.stderr),
        });
    }
    Ok(output.stdout)
}

/// `ffmpeg -y -i <input> <codec args> <output>`, run inside the song folder.
pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Transcoder for FfmpegTranscoder {
    fn transcode(&self, dir: &Path, input: &str, output: &str, codec: Codec) -> Result<(), MediaError> {
        let mut cmd = Command::new(&self.program);
        cmd.current_dir(dir)
            .args(["-y", "-loglevel", "error", "-i", input])
            .args(codec.args())
            .arg(output);
        run(&self.program, &mut cmd).map(|_| ())
    }
}

// ============================================================================
// yt-dlp Backend
// ============================================================================

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    formats: Vec<ManifestFormat>,
}

#[derive(Debug, Deserialize)]
struct ManifestFormat {
    format_id: String,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    vcodec: Option<String>,
    #[serde(default)]
    acodec: Option<String>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    abr: Option<f64>,
    #[serde(default)]
    tbr: Option<f64>,
}

fn has_codec(codec: &Option<String>) -> bool {
    codec.as_deref().is_some_and(|c| c != "none")
}

impl ManifestFormat {
    fn into_stream(self) -> Option<Stream> {
        let kind = match (has_codec(&self.vcodec), has_codec(&self.acodec)) {
            (true, true) => StreamKind::Muxed,
            (true, false) => StreamKind::VideoOnly,
            (false, true) => StreamKind::AudioOnly,
            (false, false) => return None,
        };
        let major = if kind == StreamKind::AudioOnly { "audio" } else { "video" };
        let subtype = match self.ext.as_deref() {
            Some("m4a") | Some("mp4") => "mp4",
            Some(other) => other,
            None => "unknown",
        };
        Some(Stream {
            mime_type: format!("{}/{}", major, subtype),
            format_id: self.format_id,
            kind,
            height: self.height,
            bitrate: self.abr.or(self.tbr),
        })
    }
}

/// Parse the JSON manifest printed by `yt-dlp -J`.
pub fn parse_manifest(url: &str, json: &str) -> Result<VideoHandle, MediaError> {
    let manifest: Manifest = serde_json::from_str(json)?;
    Ok(VideoHandle {
        url: url.to_string(),
        streams: manifest
            .formats
            .into_iter()
            .filter_map(ManifestFormat::into_stream)
            .collect(),
    })
}

/// Video backend driving the `yt-dlp` executable.
pub struct YtDlp {
    program: PathBuf,
}

impl YtDlp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl VideoBackend for YtDlp {
    fn resolve(&self, url: &str) -> Result<VideoHandle, MediaError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(["-J", "--no-playlist", "--no-warnings", url]);
        let stdout = run(&self.program, &mut cmd)?;
        parse_manifest(url, &String::from_utf8_lossy(&stdout))
    }

    fn download(
        &self,
        handle: &VideoHandle,
        stream: &Stream,
        dir: &Path,
        file_name: &str,
    ) -> Result<u64, MediaError> {
        let target = dir.join(file_name);
        let mut cmd = Command::new(&self.program);
        cmd.args(["--no-playlist", "--no-part", "--force-overwrites", "-f"])
            .arg(&stream.format_id)
            .arg("-o")
            .arg(&target)
            .arg(&handle.url);
        run(&self.program, &mut cmd)?;
        Ok(fs::metadata(&target)?.len())
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Per-song media step: produce `audio_file` (and `video_file`) inside `dir`.
pub trait MediaFetcher {
    fn fetch(&self, video_id: &str, dir: &Path, audio_file: &str, video_file: &str) -> Result<(), MediaError>;
}

pub struct MediaPipeline<B, C> {
    backend: B,
    transcoder: C,
}

/// File in a song folder that is deleted on drop unless kept.
///
/// A failed media step must not leave files behind: three stray files would
/// make the library index treat the folder as complete.
struct PartialFile {
    path: PathBuf,
    keep: bool,
}

impl PartialFile {
    fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    fn keep(mut self) {
        self.keep = true;
    }
}

impl Drop for PartialFile {
    fn drop(&mut self) {
        if self.keep || !self.path.exists() {
            return;
        }
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove {}: {}", self.path.display(), e);
        }
    }
}

impl<B: VideoBackend, C: Transcoder> MediaPipeline<B, C> {
    pub fn new(backend: B, transcoder: C) -> Self {
        Self { backend, transcoder }
    }

    /// Download one stream and transcode it into `output`. The temporary
    /// download is always removed; the output is removed unless the caller
    /// keeps the returned guard.
    fn fetch_stream(
        &self,
        handle: &VideoHandle,
        stream: &Stream,
        dir: &Path,
        tmp_file: &str,
        output: &str,
        codec: Codec,
    ) -> Result<PartialFile, MediaError> {
        let _download = PartialFile::new(dir.join(tmp_file));
        let target = PartialFile::new(dir.join(output));

        let bytes = self.backend.download(handle, stream, dir, tmp_file)?;
        debug!("Downloaded stream {} ({} bytes)", stream.format_id, bytes);
        self.transcoder.transcode(dir, tmp_file, output, codec)?;
        Ok(target)
    }
}

impl<B: VideoBackend, C: Transcoder> MediaFetcher for MediaPipeline<B, C> {
    fn fetch(&self, video_id: &str, dir: &Path, audio_file: &str, video_file: &str) -> Result<(), MediaError> {
        let handle = self.backend.resolve(&watch_url(video_id))?;

        let video = handle.best_video().ok_or(MediaError::NoStream("video-only"))?;
        let video_out = self.fetch_stream(&handle, video, dir, TMP_VIDEO, video_file, Codec::Mpeg4)?;

        // a video without its audio would still count toward a complete folder
        let audio = handle.best_audio().ok_or(MediaError::NoStream("audio-only"))?;
        let audio_out = self.fetch_stream(&handle, audio, dir, TMP_AUDIO, audio_file, Codec::Mp3)?;

        video_out.keep();
        audio_out.keep();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    const MANIFEST: &str = r#"{
        "id": "abc123",
        "formats": [
            {"format_id": "sb0", "ext": "mhtml", "vcodec": "none", "acodec": "none"},
            {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2", "abr": 129.5},
            {"format_id": "139", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.5", "abr": 48.8},
            {"format_id": "251", "ext": "webm", "vcodec": "none", "acodec": "opus", "abr": 160.0},
            {"format_id": "137", "ext": "mp4", "vcodec": "avc1.640028", "acodec": "none", "height": 1080, "tbr": 4400.0},
            {"format_id": "136", "ext": "mp4", "vcodec": "avc1.4d401f", "acodec": "none", "height": 720, "tbr": 2300.0},
            {"format_id": "18", "ext": "mp4", "vcodec": "avc1.42001E", "acodec": "mp4a.40.2", "height": 360}
        ]
    }"#;

    #[test]
    fn test_parse_manifest_kinds() {
        let handle = parse_manifest("u", MANIFEST).unwrap();
        assert_eq!(handle.streams.len(), 6);
        assert_eq!(handle.streams_of(StreamKind::AudioOnly).count(), 3);
        assert_eq!(handle.streams_of(StreamKind::VideoOnly).count(), 2);
        assert_eq!(handle.streams_of(StreamKind::Muxed).count(), 1);
    }

    #[test]
    fn test_best_streams() {
        let handle = parse_manifest("u", MANIFEST).unwrap();
        assert_eq!(handle.best_video().unwrap().format_id, "137");
        // opus has the higher bitrate but is not audio/mp4
        assert_eq!(handle.best_audio().unwrap().format_id, "140");
    }

    #[test]
    fn test_codec_args() {
        assert_eq!(Codec::Mp3.args(), ["-acodec", "mp3"]);
        assert_eq!(Codec::Mpeg4.args(), ["-vcodec", "mpeg4"]);
    }

    #[test]
    fn test_stderr_tail_keeps_end() {
        let long = "x".repeat(2000) + "END";
        let tail = stderr_tail(long.as_bytes());
        assert!(tail.ends_with("END"));
        assert!(tail.len() <= STDERR_TAIL + 1);
    }

    struct FakeBackend;

    impl VideoBackend for FakeBackend {
        fn resolve(&self, url: &str) -> Result<VideoHandle, MediaError> {
            parse_manifest(url, MANIFEST)
        }

        fn download(&self, _: &VideoHandle, stream: &Stream, dir: &Path, file_name: &str) -> Result<u64, MediaError> {
            fs::write(dir.join(file_name), stream.format_id.as_bytes())?;
            Ok(stream.format_id.len() as u64)
        }
    }

    #[derive(Default)]
    struct CopyTranscoder {
        jobs: RefCell<Vec<(String, String, Codec)>>,
    }

    impl Transcoder for CopyTranscoder {
        fn transcode(&self, dir: &Path, input: &str, output: &str, codec: Codec) -> Result<(), MediaError> {
            fs::copy(dir.join(input), dir.join(output))?;
            self.jobs
                .borrow_mut()
                .push((input.to_string(), output.to_string(), codec));
            Ok(())
        }
    }

    #[test]
    fn test_pipeline_produces_targets_and_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = MediaPipeline::new(FakeBackend, CopyTranscoder::default());
        pipeline.fetch("abc123", tmp.path(), "song.mp3", "song.mp4").unwrap();

        assert_eq!(fs::read_to_string(tmp.path().join("song.mp4")).unwrap(), "137");
        assert_eq!(fs::read_to_string(tmp.path().join("song.mp3")).unwrap(), "140");
        assert!(!tmp.path().join(TMP_VIDEO).exists());
        assert!(!tmp.path().join(TMP_AUDIO).exists());

        let jobs = pipeline.transcoder.jobs.borrow();
        assert_eq!(jobs[0].2, Codec::Mpeg4);
        assert_eq!(jobs[1].2, Codec::Mp3);
    }

    /// Leaves a half-written output behind and fails on the given codec.
    struct FailingTranscoder {
        fail_on: Codec,
    }

    impl Transcoder for FailingTranscoder {
        fn transcode(&self, dir: &Path, input: &str, output: &str, codec: Codec) -> Result<(), MediaError> {
            if codec == self.fail_on {
                fs::write(dir.join(output), b"partial")?;
                return Err(MediaError::ExitStatus {
                    program: "ffmpeg".to_string(),
                    status: "exit status: 1".to_string(),
                    stderr: "Conversion failed!".to_string(),
                });
            }
            fs::copy(dir.join(input), dir.join(output))?;
            Ok(())
        }
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_failed_video_transcode_leaves_no_files() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("A - B");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("A - B.txt"), b"#TITLE:B").unwrap();
        fs::write(dir.join("A - B.jpg"), b"jpg").unwrap();

        let pipeline = MediaPipeline::new(FakeBackend, FailingTranscoder { fail_on: Codec::Mpeg4 });
        let err = pipeline.fetch("abc123", &dir, "A - B.mp3", "A - B.mp4").unwrap_err();

        assert!(matches!(err, MediaError::ExitStatus { .. }));
        assert_eq!(files_in(&dir), vec!["A - B.jpg", "A - B.txt"]);
        assert!(!crate::library::LibraryIndex::scan(root.path()).contains("A - B"));
    }

    #[test]
    fn test_failed_audio_transcode_removes_video() {
        let tmp = tempfile::tempdir().unwrap();
        let pipeline = MediaPipeline::new(FakeBackend, FailingTranscoder { fail_on: Codec::Mp3 });
        assert!(pipeline.fetch("abc123", tmp.path(), "s.mp3", "s.mp4").is_err());
        assert!(files_in(tmp.path()).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_ffmpeg_nonzero_exit() {
        let tmp = tempfile::tempdir().unwrap();
        let err = FfmpegTranscoder::new("false")
            .transcode(tmp.path(), "in.m4a", "out.mp3", Codec::Mp3)
            .unwrap_err();
        assert!(matches!(err, MediaError::ExitStatus { ref program, .. } if program == "false"));
    }

    #[test]
    fn test_missing_program() {
        let tmp = tempfile::tempdir().unwrap();
        let err = YtDlp::new(tmp.path().join("no-such-yt-dlp"))
            .resolve("https://www.youtube.com/watch?v=x")
            .unwrap_err();
        assert!(matches!(err, MediaError::Spawn { .. }));
    }
}
