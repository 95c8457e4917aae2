//! Messages exchanged over the per-room WebSocket protocol.
//!
//! Both directions use internally tagged JSON (`"type"` discriminant) with
//! the event names the web client listens for.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::game::GameSnapshot;
use crate::state::game::Track;

/// Handshake messages accepted before a socket is tied to a player.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// First message on every socket: which player this connection backs.
    Identification {
        /// Player identity previously used to join a room.
        id: Uuid,
    },
    /// Anything else; handled by the action parser instead.
    #[serde(other)]
    Unknown,
}

/// A track supplied by the client when starting a game.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackInput {
    /// Song title.
    pub name: String,
    /// Performing artist.
    pub artist: String,
    /// Stated release year.
    pub release_year: i32,
    /// Identity and playback key.
    pub url: String,
}

impl From<TrackInput> for Track {
    fn from(value: TrackInput) -> Self {
        Self {
            name: value.name,
            artist: value.artist,
            release_year: value.release_year,
            url: value.url,
        }
    }
}

/// Inbound game actions, one variant per protocol event.
///
/// The engine validates each against the current phase; anything that does
/// not fit is dropped without a reply.
#[derive(Debug, Clone, PartialEq, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GameAction {
    /// Start the game with a track pool and token settings.
    #[serde(rename_all = "camelCase")]
    StartGame {
        /// Candidate tracks drawn from the selected playlists.
        track_list: Vec<TrackInput>,
        /// Token balance every player starts with.
        start_tokens: u32,
        /// Token cost of buying a bonus timeline entry.
        tokens_to_buy: u32,
        /// Source playlist identifiers, for display only.
        #[serde(default)]
        playlists: Vec<String>,
    },
    /// Place the active track at an index in the current player's timeline.
    PlaceTimelineEntry {
        /// Claimed insertion index.
        position: usize,
    },
    /// Wager a token on a position, or pass with `null`.
    PlaceToken {
        /// Claimed correct index, absent to pass.
        #[serde(default)]
        position: Option<usize>,
    },
    /// Guess the active track's title and artist; empty fields pass.
    GuessSong {
        /// Claimed title.
        #[serde(default)]
        name: Option<String>,
        /// Claimed artist.
        #[serde(default)]
        artist: Option<String>,
    },
    /// Contest the active track's stated release year.
    AppealSong {
        /// Proposed replacement year.
        year: i32,
    },
    /// Accept the stated year and resolve the placement.
    ConfirmSong,
    /// Vote on an open year appeal.
    ActionAppealSong {
        /// Yes/no vote.
        action: bool,
    },
    /// Vote on the guess currently under review.
    ActionGuess {
        /// Yes/no vote.
        action: bool,
    },
    /// Spend one token to redraw the active track.
    BuyAnotherSong,
    /// Spend the configured cost to add a drawn track to one's own timeline.
    BuyTimelineEntry,
}

/// Severity tag attached to player-facing alerts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AlertKind {
    /// The addressed player got something right.
    Success,
    /// The addressed player got something wrong.
    Failure,
    /// Informational.
    Normal,
}

/// Outbound notifications delivered to room members.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerEvent {
    /// A player joined or reconnected; carries the fresh snapshot.
    Joined {
        /// Authoritative room state.
        game: GameSnapshot,
    },
    /// A player left; carries the fresh snapshot.
    Left {
        /// Authoritative room state.
        game: GameSnapshot,
    },
    /// The room state changed; carries the full snapshot.
    Updated {
        /// Authoritative room state.
        game: GameSnapshot,
    },
    /// Clients should start playback of a new song.
    ChangeSong {
        /// Playback key of the song.
        url: String,
    },
    /// A countdown began.
    #[serde(rename_all = "camelCase")]
    StartedTimer {
        /// Countdown length in seconds.
        seconds: u32,
        /// Whether clients should pop a dialog for it.
        show_dialog: bool,
        /// Caption shown next to the countdown.
        message: String,
    },
    /// One second elapsed on the running countdown.
    TimerUpdated {
        /// Seconds remaining.
        seconds: u32,
    },
    /// The countdown reached zero.
    TimerFinished,
    /// A transient alert for one player or the whole room.
    #[serde(rename_all = "camelCase")]
    AlertMessage {
        /// Alert text.
        message: String,
        /// Severity tag.
        alert_type: AlertKind,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_parse_from_tagged_json() {
        let action: GameAction =
            serde_json::from_str(r#"{"type":"placeTimelineEntry","position":2}"#).unwrap();
        assert_eq!(action, GameAction::PlaceTimelineEntry { position: 2 });

        let action: GameAction = serde_json::from_str(r#"{"type":"placeToken"}"#).unwrap();
        assert_eq!(action, GameAction::PlaceToken { position: None });

        let action: GameAction = serde_json::from_str(r#"{"type":"confirmSong"}"#).unwrap();
        assert_eq!(action, GameAction::ConfirmSong);
    }

    #[test]
    fn identification_parses_and_other_types_fall_through() {
        let id = Uuid::new_v4();
        let raw = format!(r#"{{"type":"identification","id":"{id}"}}"#);
        let message: ClientMessage = serde_json::from_str(&raw).unwrap();
        assert!(matches!(message, ClientMessage::Identification { id: got } if got == id));

        let message: ClientMessage =
            serde_json::from_str(r#"{"type":"guessSong","name":"x"}"#).unwrap();
        assert!(matches!(message, ClientMessage::Unknown));
    }

    #[test]
    fn server_events_use_client_facing_names() {
        let event = ServerEvent::StartedTimer {
            seconds: 5,
            show_dialog: true,
            message: "Place your tokens!".into(),
        };
        let raw = serde_json::to_value(&event).unwrap();
        assert_eq!(raw["type"], "startedTimer");
        assert_eq!(raw["showDialog"], true);

        let event = ServerEvent::AlertMessage {
            message: "nope".into(),
            alert_type: AlertKind::Failure,
        };
        let raw = serde_json::to_value(&event).unwrap();
        assert_eq!(raw["alertType"], "failure");
    }
}
