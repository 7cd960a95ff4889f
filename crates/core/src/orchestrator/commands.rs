//! Command lines for the external tools.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// File stem the fetcher saves its merged output under.
pub const SAVE_NAME: &str = "raw_video";

/// Scratch name of the transcoded file before it is moved into place.
pub const TRANSCODED_NAME: &str = "converted.mp4";

/// Arguments for the segment fetcher.
pub fn fetch_args(locator: &str, save_dir: &Path, transcoder: &Path) -> Vec<OsString> {
    vec![
        locator.into(),
        "--save-dir".into(),
        save_dir.into(),
        "--save-name".into(),
        SAVE_NAME.into(),
        "--binary-merge".into(),
        "--auto-select".into(),
        "--ffmpeg-binary-path".into(),
        transcoder.into(),
    ]
}

/// Arguments for a stream-copy remux with the index moved to the front.
pub fn transcode_args(input: &Path, output: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-i".into(),
        input.into(),
        "-c".into(),
        "copy".into(),
        "-movflags".into(),
        "+faststart".into(),
        output.into(),
    ]
}

/// Returns true for files the fetcher produced under [`SAVE_NAME`].
pub fn is_artifact_name(file_name: &str) -> bool {
    file_name
        .strip_prefix(SAVE_NAME)
        .is_some_and(|rest| rest.starts_with('.'))
}

/// Video containers, preferred when the fetcher leaves several artifacts
/// behind (separate subtitle or audio tracks, for instance).
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "ts", "mkv", "m4v", "webm", "flv", "mov"];

/// Audio-only tracks, used when no video container is present.
const AUDIO_EXTENSIONS: &[&str] = &["m4a", "aac", "mp3"];

/// Picks the artifact to transcode from the file names found in the save
/// directory: video containers first, then audio-only tracks, then anything
/// else, in name order within each group.
pub fn pick_artifact(file_names: &[String]) -> Option<&str> {
    file_names
        .iter()
        .map(String::as_str)
        .filter(|name| is_artifact_name(name))
        .min_by(|a, b| artifact_rank(a).cmp(&artifact_rank(b)).then_with(|| a.cmp(b)))
}

fn artifact_rank(file_name: &str) -> u8 {
    let Some(ext) = Path::new(file_name).extension().and_then(|ext| ext.to_str()) else {
        return 2;
    };
    let listed = |list: &[&str]| list.iter().any(|known| ext.eq_ignore_ascii_case(known));
    if listed(VIDEO_EXTENSIONS) {
        0
    } else if listed(AUDIO_EXTENSIONS) {
        1
    } else {
        2
    }
}

/// Scratch output path for the transcoder inside a working directory.
pub fn transcoded_path(work_dir: &Path) -> PathBuf {
    work_dir.join(TRANSCODED_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_fetch_args() {
        let args = fetch_args(
            "http://host/a.m3u8",
            Path::new("/srv/out/t1"),
            Path::new("/usr/bin/ffmpeg"),
        );
        assert_eq!(
            strings(args),
            vec![
                "http://host/a.m3u8",
                "--save-dir",
                "/srv/out/t1",
                "--save-name",
                "raw_video",
                "--binary-merge",
                "--auto-select",
                "--ffmpeg-binary-path",
                "/usr/bin/ffmpeg",
            ]
        );
    }

    #[test]
    fn test_transcode_args() {
        let args = transcode_args(
            Path::new("/srv/out/t1/raw_video.ts"),
            Path::new("/srv/out/t1/converted.mp4"),
        );
        assert_eq!(
            strings(args),
            vec![
                "-y",
                "-i",
                "/srv/out/t1/raw_video.ts",
                "-c",
                "copy",
                "-movflags",
                "+faststart",
                "/srv/out/t1/converted.mp4",
            ]
        );
    }

    #[test]
    fn test_artifact_names() {
        assert!(is_artifact_name("raw_video.mp4"));
        assert!(is_artifact_name("raw_video.ts"));
        assert!(is_artifact_name("raw_video.en.srt"));
        assert!(!is_artifact_name("raw_video"));
        assert!(!is_artifact_name("raw_videos.mp4"));
        assert!(!is_artifact_name("converted.mp4"));
    }

    #[test]
    fn test_pick_artifact() {
        let names = |list: &[&str]| list.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        assert_eq!(pick_artifact(&names(&["raw_video.ts"])), Some("raw_video.ts"));
        assert_eq!(
            pick_artifact(&names(&["raw_video.en.srt", "raw_video.mp4", "playlist.m3u8"])),
            Some("raw_video.mp4")
        );
        assert_eq!(
            pick_artifact(&names(&["raw_video.mp4", "raw_video.m4a"])),
            Some("raw_video.mp4")
        );
        assert_eq!(
            pick_artifact(&names(&["raw_video.m4a", "raw_video.en.srt"])),
            Some("raw_video.m4a")
        );
        assert_eq!(
            pick_artifact(&names(&["raw_video.ts", "raw_video.mkv"])),
            Some("raw_video.mkv")
        );
        assert_eq!(
            pick_artifact(&names(&["raw_video.bin"])),
            Some("raw_video.bin")
        );
        assert_eq!(pick_artifact(&names(&["playlist.m3u8", "converted.mp4"])), None);
        assert_eq!(pick_artifact(&[]), None);
    }
}
