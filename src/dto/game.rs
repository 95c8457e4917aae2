//! Snapshot and request payloads for the room REST surface.
//!
//! The snapshot is the authoritative document broadcast to the room after
//! every successful mutation; clients rebuild their view from it wholesale.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::state::game::{Game, Guess, LogEntry, Player, TokenWager, Track, TurnState};

/// Body of the join and create requests.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinRequest {
    /// Display name for the joining player.
    #[validate(length(min = 1, max = 32, message = "name must be 1 to 32 characters"))]
    pub name: String,
}

/// Full state of a room as seen by its players.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    /// Room code.
    pub id: String,
    /// Seats keyed by player id, in join order.
    #[schema(value_type = Object)]
    pub players: IndexMap<Uuid, PlayerSnapshot>,
    /// Source playlist identifiers.
    pub playlists: Vec<String>,
    /// Remaining track pool.
    pub tracks: Vec<TrackSnapshot>,
    /// Whether the game has started.
    pub started: bool,
    /// Seat currently holding the turn.
    pub current_player_id: Option<Uuid>,
    /// Phase the current turn is in.
    #[schema(value_type = String)]
    pub turn_state: TurnState,
    /// Track being placed this turn.
    pub active_track: Option<TrackSnapshot>,
    /// Proposed replacement year while an appeal is open.
    pub track_appeal: Option<i32>,
    /// Guesses submitted this turn.
    pub guesses: Vec<GuessSnapshot>,
    /// Player whose guess is being voted on.
    pub guess_to_action_id: Option<Uuid>,
    /// Token cost of a bonus timeline entry.
    pub tokens_to_buy: u32,
    /// Room event log.
    pub logs: Vec<LogSnapshot>,
}

/// Public projection of a seat.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlayerSnapshot {
    /// Player identity.
    pub id: Uuid,
    /// Whether a live connection backs the seat.
    pub connected: bool,
    /// Display name.
    pub name: String,
    /// Phase-scoped acknowledgement flag.
    pub ready: bool,
    /// Position in the turn rotation.
    pub turn_order: usize,
    /// Personal timeline.
    pub timeline: Vec<TrackSnapshot>,
    /// Wagers pending against this player's timeline.
    pub timeline_tokens: Vec<TokenWagerSnapshot>,
    /// Token balance.
    pub tokens: u32,
    /// Transient vote flag.
    pub action: bool,
}

/// Public projection of a track.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrackSnapshot {
    /// Song title.
    pub name: String,
    /// Performing artist.
    pub artist: String,
    /// Stated release year.
    pub release_year: i32,
    /// Identity and playback key.
    pub url: String,
}

/// Public projection of a pending token wager.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TokenWagerSnapshot {
    /// Player who wagered.
    pub player_id: Uuid,
    /// Claimed insertion index.
    pub position: usize,
}

/// Public projection of a guess.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GuessSnapshot {
    /// Player who guessed.
    pub player_id: Uuid,
    /// Claimed title.
    pub name: String,
    /// Claimed artist.
    pub artist: String,
}

/// Public projection of a log entry.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LogSnapshot {
    /// Human-readable description.
    pub message: String,
    /// Whether clients should highlight this entry.
    pub important: bool,
    /// RFC 3339 timestamp.
    pub at: String,
}

impl From<&Track> for TrackSnapshot {
    fn from(value: &Track) -> Self {
        Self {
            name: value.name.clone(),
            artist: value.artist.clone(),
            release_year: value.release_year,
            url: value.url.clone(),
        }
    }
}

impl From<&TokenWager> for TokenWagerSnapshot {
    fn from(value: &TokenWager) -> Self {
        Self {
            player_id: value.player_id,
            position: value.position,
        }
    }
}

impl From<&Guess> for GuessSnapshot {
    fn from(value: &Guess) -> Self {
        Self {
            player_id: value.player_id,
            name: value.name.clone(),
            artist: value.artist.clone(),
        }
    }
}

impl From<&LogEntry> for LogSnapshot {
    fn from(value: &LogEntry) -> Self {
        Self {
            message: value.message.clone(),
            important: value.important,
            at: value.at.clone(),
        }
    }
}

impl From<&Player> for PlayerSnapshot {
    fn from(value: &Player) -> Self {
        Self {
            id: value.id,
            connected: value.connected,
            name: value.name.clone(),
            ready: value.ready,
            turn_order: value.turn_order,
            timeline: value.timeline.iter().map(Into::into).collect(),
            timeline_tokens: value.timeline_tokens.iter().map(Into::into).collect(),
            tokens: value.tokens,
            action: value.action,
        }
    }
}

impl From<&Game> for GameSnapshot {
    fn from(value: &Game) -> Self {
        Self {
            id: value.id.clone(),
            players: value
                .players
                .iter()
                .map(|(id, player)| (*id, player.into()))
                .collect(),
            playlists: value.playlists.clone(),
            tracks: value.tracks.iter().map(Into::into).collect(),
            started: value.started,
            current_player_id: value.current_player_id,
            turn_state: value.turn_state,
            active_track: value.active_track.as_ref().map(Into::into),
            track_appeal: value.track_appeal,
            guesses: value.guesses.iter().map(Into::into).collect(),
            guess_to_action_id: value.guess_to_action_id,
            tokens_to_buy: value.tokens_to_buy,
            logs: value.logs.iter().map(Into::into).collect(),
        }
    }
}
