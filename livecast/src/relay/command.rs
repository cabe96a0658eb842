use crate::config::{AudioProfile, IcecastTarget};
use crate::process::CommandSpec;

/// Pulls the broadcast and hands the audio track, untouched, to stdout.
pub fn puller(ffmpeg: &str, manifest_url: &str) -> CommandSpec {
    CommandSpec::new(ffmpeg)
        .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
        .args(["-i", manifest_url])
        .args(["-vn", "-map", "0:a:0?", "-c:a", "copy"])
        .args(["-f", "matroska", "pipe:1"])
}

/// Reads the puller's output from stdin, encodes it and pushes it to the mount.
pub fn encoder(ffmpeg: &str, icecast: &IcecastTarget, audio: &AudioProfile) -> CommandSpec {
    CommandSpec::new(ffmpeg)
        .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
        .args(["-f", "matroska", "-i", "pipe:0", "-vn"])
        .args(["-c:a", audio.codec.as_str()])
        .args(["-b:a", audio.bitrate.as_str()])
        .arg("-ac")
        .arg(audio.channels.to_string())
        .args(["-content_type", audio.content_type()])
        .args(["-f", audio.container()])
        .arg(icecast.source_url())
        .secret(icecast.source_password.as_str())
}
