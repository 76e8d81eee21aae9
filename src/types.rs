use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabled::Tabled;

/// The access/refresh token pair held by the token manager.
///
/// Both halves are optional: a missing access token means every protected
/// call short-circuits, a missing refresh token means recovery needs a new login.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionTokens {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl SessionTokens {
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub expires_in: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenErrorResponse {
    pub error: String,
    pub error_description: Option<String>,
}

/// Identity of a track plus whatever display metadata came with it.
///
/// Two refs are the same track when their URIs match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackRef {
    pub uri: String,
    pub name: Option<String>,
    pub artists: Vec<String>,
}

impl TrackRef {
    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            name: None,
            artists: Vec::new(),
        }
    }
}

impl PartialEq for TrackRef {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
    }
}

impl Eq for TrackRef {}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackState {
    pub is_playing: bool,
    pub current_track: Option<TrackRef>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeviceState {
    #[default]
    Uninitialized,
    Connecting,
    Ready,
    NotReady,
}

impl std::fmt::Display for DeviceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DeviceState::Uninitialized => "uninitialized",
            DeviceState::Connecting => "connecting",
            DeviceState::Ready => "ready",
            DeviceState::NotReady => "not ready",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceHandle {
    pub id: Option<String>,
    pub state: DeviceState,
    /// Playback was moved to this device since it last reported ready.
    pub transferred: bool,
}

/// Push events delivered by a player binding.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    Ready { device_id: String },
    NotReady { device_id: String },
    /// `None` means there is no active playback context.
    StateChanged(Option<PlayerStateSnapshot>),
}

/// Payload of a `player_state_changed` push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStateSnapshot {
    pub paused: bool,
    pub track_window: TrackWindow,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackWindow {
    pub current_track: Option<PushTrack>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushTrack {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ArtistName>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtistName {
    pub name: String,
}

impl From<&PushTrack> for TrackRef {
    fn from(track: &PushTrack) -> Self {
        Self {
            uri: track.uri.clone(),
            name: Some(track.name.clone()),
            artists: track.artists.iter().map(|a| a.name.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferPlaybackRequest {
    pub device_ids: Vec<String>,
    pub play: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartPlaybackRequest {
    pub uris: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesResponse {
    pub devices: Vec<Device>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentPlaybackResponse {
    pub is_playing: bool,
    pub device: Option<Device>,
    pub item: Option<PushTrack>,
}

/// A protected request, rebuilt for every attempt so it can be replayed
/// after a token refresh.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub body: Option<Value>,
}

impl ApiRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            body: None,
        }
    }

    pub fn put(url: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method: Method::PUT,
            url: url.into(),
            body,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

#[derive(Tabled)]
pub struct StatusTableRow {
    pub key: String,
    pub value: String,
}
