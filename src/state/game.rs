//! In-memory data model for a single game room.

use indexmap::IndexMap;
use rand::Rng;
use rand::seq::SliceRandom;
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use uuid::Uuid;

/// Phases a turn cycles through. The active phase decides which inbound
/// actions are accepted; everything else is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum TurnState {
    /// The current player is placing the active track into their timeline.
    PlaceTimelineEntry,
    /// Grace countdown before token wagering opens.
    PendingPlaceTokens,
    /// Other players may wager tokens against the placement.
    PlaceTokens,
    /// Everyone may guess the active track's title and artist.
    GuessSong,
    /// The stated release year may be appealed and voted on.
    SongAppeal,
    /// Submitted guesses are voted on one by one.
    ActionGuesses,
}

/// A song candidate. Two tracks are the same track iff their URLs match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Song title.
    pub name: String,
    /// Performing artist.
    pub artist: String,
    /// Stated release year.
    pub release_year: i32,
    /// Stable identity key, also used to start playback on clients.
    pub url: String,
}

/// A token wagered against a position in the current player's timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenWager {
    /// Player who placed the wager.
    pub player_id: Uuid,
    /// Claimed correct insertion index.
    pub position: usize,
}

/// A title/artist guess for the active track; at most one per player per turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guess {
    /// Player who guessed.
    pub player_id: Uuid,
    /// Claimed title.
    pub name: String,
    /// Claimed artist.
    pub artist: String,
}

/// A seat in the room. Seats survive disconnects so players can reclaim them.
#[derive(Debug, Clone)]
pub struct Player {
    /// Trusted identity supplied by the caller.
    pub id: Uuid,
    /// Whether a live connection currently backs this seat.
    pub connected: bool,
    /// Display name.
    pub name: String,
    /// Phase-scoped acknowledgement flag, reset at every phase boundary.
    pub ready: bool,
    /// Dense position in the turn rotation, assigned at game start.
    pub turn_order: usize,
    /// Personal timeline, sorted by release year at rest.
    pub timeline: Vec<Track>,
    /// Wagers other players placed against this player's timeline this turn.
    pub timeline_tokens: Vec<TokenWager>,
    /// Spendable token balance.
    pub tokens: u32,
    /// Transient yes/no vote used during voting phases.
    pub action: bool,
}

impl Player {
    fn new(id: Uuid, name: String) -> Self {
        Self {
            id,
            connected: true,
            name,
            ready: false,
            turn_order: 0,
            timeline: Vec::new(),
            timeline_tokens: Vec::new(),
            tokens: 0,
            action: false,
        }
    }
}

/// Append-only room event visible to players.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Human-readable description.
    pub message: String,
    /// Whether clients should surface this entry prominently.
    pub important: bool,
    /// RFC 3339 timestamp taken when the entry was appended.
    pub at: String,
}

/// Returned when a join attempt cannot be honoured.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinError {
    /// The game already started and the joiner holds no seat in it.
    #[error("the game has already started")]
    AlreadyStarted,
}

/// Aggregate state of one room. Only the owning room task mutates it.
#[derive(Debug, Clone)]
pub struct Game {
    /// Room code.
    pub id: String,
    /// Seats keyed by player identity, in join order.
    pub players: IndexMap<Uuid, Player>,
    /// Source playlist identifiers the track pool was built from.
    pub playlists: Vec<String>,
    /// Remaining track pool; draws remove, nothing ever returns.
    pub tracks: Vec<Track>,
    /// Whether the game has been started.
    pub started: bool,
    /// Seat whose turn it is, `None` before start.
    pub current_player_id: Option<Uuid>,
    /// Phase the current turn is in.
    pub turn_state: TurnState,
    /// Track currently being placed and resolved.
    pub active_track: Option<Track>,
    /// Proposed replacement year while an appeal is open.
    pub track_appeal: Option<i32>,
    /// Guesses submitted this turn.
    pub guesses: Vec<Guess>,
    /// Player whose guess is currently being voted on.
    pub guess_to_action_id: Option<Uuid>,
    /// Token cost of buying a bonus timeline entry.
    pub tokens_to_buy: u32,
    /// Append-only event log.
    pub logs: Vec<LogEntry>,
}

impl Game {
    /// Create an empty, not-yet-started room.
    pub fn new(id: String) -> Self {
        Self {
            id,
            players: IndexMap::new(),
            playlists: Vec::new(),
            tracks: Vec::new(),
            started: false,
            current_player_id: None,
            turn_state: TurnState::PlaceTimelineEntry,
            active_track: None,
            track_appeal: None,
            guesses: Vec::new(),
            guess_to_action_id: None,
            tokens_to_buy: 0,
            logs: Vec::new(),
        }
    }

    /// Add a player, or reconnect them into the seat they already hold.
    ///
    /// Joining a started game is rejected unless the joiner is an existing
    /// member reclaiming their seat.
    pub fn add_player(&mut self, id: Uuid, name: String) -> Result<(), JoinError> {
        if let Some(player) = self.players.get_mut(&id) {
            player.connected = true;
            let name = player.name.clone();
            self.log(format!("{name} is back"), false);
            return Ok(());
        }

        if self.started {
            return Err(JoinError::AlreadyStarted);
        }

        self.log(format!("{name} joined the room"), false);
        self.players.insert(id, Player::new(id, name));
        Ok(())
    }

    /// Remove a player before start, or mark their seat disconnected after.
    ///
    /// Seats are kept once the game started so the rotation stays intact and
    /// the player can reconnect later.
    pub fn remove_player(&mut self, id: Uuid) {
        if self.started {
            self.set_connected(id, false);
            return;
        }

        if let Some(player) = self.players.shift_remove(&id) {
            self.log(format!("{} left the room", player.name), false);
        }
    }

    /// Flip the connected flag of a seat, if it exists.
    pub fn set_connected(&mut self, id: Uuid, connected: bool) {
        let Some(player) = self.players.get_mut(&id) else {
            return;
        };

        let was_connected = player.connected;
        player.connected = connected;

        if was_connected && !connected {
            let name = self.players[&id].name.clone();
            self.log(format!("{name} disconnected"), false);
        }
    }

    /// Seed the pool from a track list, keeping the first track per URL.
    pub fn seed_pool(&mut self, tracks: Vec<Track>) {
        self.tracks.clear();
        for track in tracks {
            if !self.tracks.iter().any(|known| known.url == track.url) {
                self.tracks.push(track);
            }
        }
    }

    /// Draw a uniformly random track from the pool, removing it for good.
    pub fn draw_track(&mut self) -> Option<Track> {
        if self.tracks.is_empty() {
            return None;
        }
        let index = rand::rng().random_range(0..self.tracks.len());
        Some(self.tracks.swap_remove(index))
    }

    /// Shuffle the seats into a fresh dense turn rotation.
    pub fn shuffle_turn_order(&mut self) {
        let mut ids: Vec<Uuid> = self.players.keys().copied().collect();
        ids.shuffle(&mut rand::rng());
        for (order, id) in ids.into_iter().enumerate() {
            if let Some(player) = self.players.get_mut(&id) {
                player.turn_order = order;
            }
        }
    }

    /// Seat holding the turn, if the game is running.
    pub fn current_player(&self) -> Option<&Player> {
        self.players.get(&self.current_player_id?)
    }

    /// Circular successor in the turn rotation: `turn_order + 1`, wrapping to
    /// the seat with order 0 when no higher order exists.
    pub fn next_in_rotation(&self) -> Option<Uuid> {
        let current_order = self.current_player()?.turn_order;
        self.players
            .values()
            .find(|player| player.turn_order == current_order + 1)
            .or_else(|| self.players.values().find(|player| player.turn_order == 0))
            .map(|player| player.id)
    }

    /// Clear every phase-scoped flag (ready acknowledgements and votes).
    pub fn reset_ready(&mut self) {
        for player in self.players.values_mut() {
            player.ready = false;
            player.action = false;
        }
    }

    /// Append an entry to the room log.
    pub fn log(&mut self, message: String, important: bool) {
        self.logs.push(LogEntry {
            message,
            important,
            at: rfc3339_now(),
        });
    }
}

fn rfc3339_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
