use std::time::Duration;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::MetadataTarget;

use super::{NowPlaying, SoftFailure};

#[derive(Debug, Default, Deserialize)]
struct NowPlayingResponse {
    #[serde(default)]
    now_playing: Option<NowPlayingEntry>,
}

#[derive(Debug, Default, Deserialize)]
struct NowPlayingEntry {
    #[serde(default)]
    song: Option<Song>,
}

#[derive(Debug, Default, Deserialize)]
struct Song {
    title: Option<String>,
    artist: Option<String>,
}

#[derive(Debug, Serialize)]
struct UpdateRequest<'a> {
    title: &'a str,
    artist: &'a str,
}

/**
    Minimal AzuraCast API client: read and replace a station's now-playing entry.
*/
pub struct AzuraCastClient {
    http: Client,
    timeout: Duration,
}

impl AzuraCastClient {
    pub fn new(timeout: Duration) -> Self {
        Self {
            http: Client::new(),
            timeout,
        }
    }

    fn authorized(&self, target: &MetadataTarget, request: RequestBuilder) -> RequestBuilder {
        request
            .header("X-API-Key", &target.api_key)
            .header("Accept", "application/json")
            .timeout(self.timeout)
    }

    /// `GET {api}/api/nowplaying/{station}`. Missing song fields read as empty strings.
    pub async fn current(&self, target: &MetadataTarget) -> Result<NowPlaying, SoftFailure> {
        let url = format!("{}/api/nowplaying/{}", target.api_url, target.station);
        let response = self.authorized(target, self.http.get(&url)).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(SoftFailure::Status(status));
        }

        let body: NowPlayingResponse = response.json().await?;
        let song = body
            .now_playing
            .and_then(|entry| entry.song)
            .unwrap_or_default();

        Ok(NowPlaying {
            title: song.title.unwrap_or_default(),
            artist: song.artist.unwrap_or_default(),
        })
    }

    /// `POST {api}/api/station/{station}/nowplaying/update`. Only 200 counts as success.
    pub async fn update(
        &self,
        target: &MetadataTarget,
        now_playing: &NowPlaying,
    ) -> Result<(), SoftFailure> {
        let url = format!(
            "{}/api/station/{}/nowplaying/update",
            target.api_url, target.station
        );
        let body = UpdateRequest {
            title: &now_playing.title,
            artist: &now_playing.artist,
        };

        let response = self
            .authorized(target, self.http.post(&url))
            .json(&body)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(()),
            status => Err(SoftFailure::Status(status)),
        }
    }
}
