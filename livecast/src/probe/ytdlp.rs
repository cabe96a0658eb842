use serde::Deserialize;

use crate::config::{ChannelTarget, Platform};
use crate::process::{CommandOutput, CommandSpec, ExitInfo};

use super::{LiveInfo, ProbeError, ProbeOutcome};

/// Resolver messages that mean "nothing is broadcasting right now".
const OFFLINE_MARKERS: &[&str] = &[
    "not currently live",
    "is offline",
    "will begin",
    "does not exist",
    "not found",
    "no video formats found",
    "premieres in",
];

/// `live_status` values that mean the broadcast is not running.
const NOT_LIVE_STATUSES: &[&str] = &["not_live", "was_live", "is_upcoming", "post_live"];

/// Channel tabs that never point at the live broadcast themselves.
const YOUTUBE_TABS: &[&str] = &[
    "streams", "videos", "featured", "shorts", "playlists", "community", "about",
];

/**
    The subset of `yt-dlp --dump-single-json` output we care about.
*/
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    url: Option<String>,
    title: Option<String>,
    description: Option<String>,
    is_live: Option<bool>,
    live_status: Option<String>,
    requested_formats: Option<Vec<YtDlpFormat>>,
    formats: Option<Vec<YtDlpFormat>>,
}

#[derive(Debug, Deserialize)]
struct YtDlpFormat {
    url: Option<String>,
    protocol: Option<String>,
}

impl YtDlpInfo {
    fn is_live(&self) -> bool {
        if let Some(status) = self.live_status.as_deref() {
            return !NOT_LIVE_STATUSES.contains(&status);
        }
        self.is_live.unwrap_or(true)
    }

    /**
        Pick the URL to pull audio from: the selected format's own URL,
        then the last HLS format, then the last format with any URL.
    */
    fn stream_url(&self) -> Option<String> {
        if let Some(url) = non_empty(self.url.as_deref()) {
            return Some(url);
        }

        let groups = [self.requested_formats.as_deref(), self.formats.as_deref()];

        let hls = groups.iter().flatten().find_map(|formats| {
            formats.iter().rev().find_map(|f| {
                let is_hls = f.protocol.as_deref().is_some_and(|p| p.contains("m3u8"));
                if is_hls { non_empty(f.url.as_deref()) } else { None }
            })
        });

        hls.or_else(|| {
            groups.iter().flatten().find_map(|formats| {
                formats.iter().rev().find_map(|f| non_empty(f.url.as_deref()))
            })
        })
    }

    fn broadcast_title(&self, platform: Platform) -> Option<String> {
        match platform {
            // Twitch puts the stream title in the description; `title` carries
            // the channel name and a timestamp.
            Platform::Twitch => non_empty(self.description.as_deref())
                .or_else(|| non_empty(self.title.as_deref())),
            Platform::YouTube => non_empty(self.title.as_deref()),
        }
    }
}

/// URL handed to the resolver for a channel.
pub fn resolver_url(target: &ChannelTarget) -> String {
    let url = target.channel_url.trim();
    match target.platform {
        Platform::Twitch => url.to_string(),
        Platform::YouTube => {
            let points_at_video = url.contains("/watch")
                || url.contains("/live/")
                || url.contains("youtu.be/")
                || url.trim_end_matches('/').ends_with("/live");
            if points_at_video {
                url.to_string()
            } else {
                format!("{}/live", channel_root(url))
            }
        }
    }
}

/// Channel page without a trailing tab such as `/streams` or `/videos`.
fn channel_root(url: &str) -> &str {
    let url = url.trim_end_matches('/');
    match url.rsplit_once('/') {
        Some((root, tab)) if YOUTUBE_TABS.contains(&tab) && is_channel_page(root) => root,
        _ => url,
    }
}

/// `/@handle`, `/channel/<id>`, `/c/<name>` or `/user/<name>`.
fn is_channel_page(url: &str) -> bool {
    let mut segments = url.rsplit('/');
    let last = segments.next().unwrap_or_default();
    let parent = segments.next().unwrap_or_default();
    last.starts_with('@') || matches!(parent, "channel" | "c" | "user")
}

pub fn command(program: &str, url: &str) -> CommandSpec {
    CommandSpec::new(program)
        .args([
            "--dump-single-json",
            "--no-warnings",
            "--no-playlist",
            "--no-check-certificate",
            "-f",
            "bestaudio/best",
        ])
        .arg(url)
}

/// Turn a finished resolver run into a probe outcome.
pub fn classify(platform: Platform, output: &CommandOutput) -> Result<ProbeOutcome, ProbeError> {
    if !output.success() {
        let stderr = output.stderr.to_ascii_lowercase();
        if OFFLINE_MARKERS.iter().any(|marker| stderr.contains(marker)) {
            return Ok(ProbeOutcome::NotLive);
        }
        return Err(ProbeError::ResolverFailed {
            exit: ExitInfo { code: output.code },
            message: last_line(&output.stderr),
        });
    }

    let info: YtDlpInfo = serde_json::from_str(output.stdout.trim())?;

    if !info.is_live() {
        return Ok(ProbeOutcome::NotLive);
    }

    let manifest_url = info.stream_url().ok_or(ProbeError::NoStreamUrl)?;

    Ok(ProbeOutcome::Live(LiveInfo {
        manifest_url,
        title: info.broadcast_title(platform),
    }))
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn last_line(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .unwrap_or("no output")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    fn failed(code: i32, stderr: &str) -> CommandOutput {
        CommandOutput {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    fn target(platform: Platform, url: &str) -> ChannelTarget {
        ChannelTarget {
            platform,
            channel_url: url.to_string(),
            channel_name: "Test".to_string(),
        }
    }

    #[test]
    fn test_twitch_live_uses_description_as_title() {
        let json = r#"{
            "id": "v123",
            "title": "somechannel 2026-10-17 20:00",
            "description": "Late night synth session",
            "is_live": true,
            "live_status": "is_live",
            "url": "https://video-weaver.example.net/v1/playlist/abc.m3u8",
            "protocol": "m3u8_native"
        }"#;

        let outcome = classify(Platform::Twitch, &ok(json)).unwrap();
        assert_eq!(
            outcome,
            ProbeOutcome::Live(LiveInfo {
                manifest_url: "https://video-weaver.example.net/v1/playlist/abc.m3u8".to_string(),
                title: Some("Late night synth session".to_string()),
            })
        );
    }

    #[test]
    fn test_twitch_falls_back_to_title() {
        let json = r#"{"title": "somechannel", "description": "", "url": "https://a/b.m3u8"}"#;
        let ProbeOutcome::Live(info) = classify(Platform::Twitch, &ok(json)).unwrap() else {
            panic!("expected live");
        };
        assert_eq!(info.title.as_deref(), Some("somechannel"));
    }

    #[test]
    fn test_youtube_live_uses_title() {
        let json = r#"{
            "title": "Morning radio",
            "description": "Links and credits below",
            "live_status": "is_live",
            "url": "https://manifest.googlevideo.com/api/manifest/hls_playlist/index.m3u8"
        }"#;

        let ProbeOutcome::Live(info) = classify(Platform::YouTube, &ok(json)).unwrap() else {
            panic!("expected live");
        };
        assert_eq!(info.title.as_deref(), Some("Morning radio"));
    }

    #[test]
    fn test_not_live_status() {
        for status in ["not_live", "was_live", "is_upcoming", "post_live"] {
            let json = format!(r#"{{"live_status": "{status}", "url": "https://a/b.m3u8"}}"#);
            assert_eq!(
                classify(Platform::YouTube, &ok(&json)).unwrap(),
                ProbeOutcome::NotLive,
                "{status}"
            );
        }

        let json = r#"{"is_live": false, "url": "https://a/b.mp4"}"#;
        assert_eq!(
            classify(Platform::YouTube, &ok(json)).unwrap(),
            ProbeOutcome::NotLive
        );
    }

    #[test]
    fn test_fallback_to_hls_format() {
        let json = r#"{
            "is_live": true,
            "url": null,
            "requested_formats": null,
            "formats": [
                {"url": "https://a/audio_only.m3u8", "protocol": "m3u8_native"},
                {"url": "https://a/low.m3u8", "protocol": "m3u8_native"},
                {"url": "https://a/direct.mp4", "protocol": "https"}
            ]
        }"#;

        let ProbeOutcome::Live(info) = classify(Platform::Twitch, &ok(json)).unwrap() else {
            panic!("expected live");
        };
        assert_eq!(info.manifest_url, "https://a/low.m3u8");
        assert_eq!(info.title, None);
    }

    #[test]
    fn test_fallback_to_any_format_url() {
        let json = r#"{"formats": [{"url": "https://a/one.mp4"}, {"url": "https://a/two.mp4"}, {"protocol": "https"}]}"#;
        let ProbeOutcome::Live(info) = classify(Platform::YouTube, &ok(json)).unwrap() else {
            panic!("expected live");
        };
        assert_eq!(info.manifest_url, "https://a/two.mp4");
    }

    #[test]
    fn test_live_without_url_is_error() {
        let json = r#"{"is_live": true, "formats": []}"#;
        assert!(matches!(
            classify(Platform::Twitch, &ok(json)),
            Err(ProbeError::NoStreamUrl)
        ));
    }

    #[test]
    fn test_malformed_json_is_error() {
        assert!(matches!(
            classify(Platform::Twitch, &ok("https://not-json.example.com/stream.m3u8")),
            Err(ProbeError::MalformedOutput(_))
        ));
    }

    #[test]
    fn test_offline_stderr_is_not_live() {
        let stderr = "ERROR: [twitch:stream] somechannel: The channel is not currently live";
        assert_eq!(
            classify(Platform::Twitch, &failed(1, stderr)).unwrap(),
            ProbeOutcome::NotLive
        );

        let stderr = "ERROR: [youtube] abc: This live event will begin in 3 hours.";
        assert_eq!(
            classify(Platform::YouTube, &failed(1, stderr)).unwrap(),
            ProbeOutcome::NotLive
        );
    }

    #[test]
    fn test_unknown_failure_is_error() {
        let stderr = "WARNING: something\nERROR: Unable to download webpage: HTTP Error 503\n";
        let err = classify(Platform::Twitch, &failed(1, stderr)).unwrap_err();
        let ProbeError::ResolverFailed { exit, message } = err else {
            panic!("unexpected error: {err}");
        };
        assert_eq!(exit.code, Some(1));
        assert_eq!(message, "ERROR: Unable to download webpage: HTTP Error 503");
    }

    #[test]
    fn test_resolver_url_platform_dispatch() {
        let twitch = target(Platform::Twitch, "https://www.twitch.tv/somechannel");
        assert_eq!(resolver_url(&twitch), "https://www.twitch.tv/somechannel");

        let channel = target(Platform::YouTube, "https://www.youtube.com/@somechannel/");
        assert_eq!(
            resolver_url(&channel),
            "https://www.youtube.com/@somechannel/live"
        );

        for url in [
            "https://www.youtube.com/watch?v=abc",
            "https://www.youtube.com/live/abc",
            "https://youtu.be/abc",
            "https://www.youtube.com/channel/UCxyz/live",
        ] {
            assert_eq!(resolver_url(&target(Platform::YouTube, url)), url);
        }
    }

    #[test]
    fn test_resolver_url_strips_channel_tab() {
        for url in [
            "https://www.youtube.com/@somechannel/streams",
            "https://www.youtube.com/@somechannel/videos/",
            "https://www.youtube.com/@somechannel/featured",
        ] {
            assert_eq!(
                resolver_url(&target(Platform::YouTube, url)),
                "https://www.youtube.com/@somechannel/live"
            );
        }
        assert_eq!(
            resolver_url(&target(Platform::YouTube, "https://www.youtube.com/channel/UCxyz/streams")),
            "https://www.youtube.com/channel/UCxyz/live"
        );
        // A channel literally named "videos" keeps its name.
        assert_eq!(
            resolver_url(&target(Platform::YouTube, "https://www.youtube.com/c/videos")),
            "https://www.youtube.com/c/videos/live"
        );
    }

    #[test]
    fn test_command_args() {
        let cmd = command("yt-dlp", "https://www.twitch.tv/somechannel");
        assert_eq!(cmd.program, "yt-dlp");
        assert_eq!(cmd.args.last().unwrap(), "https://www.twitch.tv/somechannel");
        assert!(cmd.args.iter().any(|a| a == "--dump-single-json"));
        assert!(cmd.args.iter().any(|a| a == "--no-check-certificate"));
    }
}
