//! Turn-phase state machine driving a single room.
//!
//! Every inbound action is validated against the current phase in one place;
//! anything that does not fit the phase, the actor, or the resources at hand
//! is dropped without a reply. Clients receive the authoritative snapshot
//! after every successful mutation, so an ignored action self-corrects on
//! their next render.

use tracing::debug;
use uuid::Uuid;

use crate::dto::game::GameSnapshot;
use crate::dto::ws::{AlertKind, GameAction, ServerEvent};
use crate::state::game::{Game, Guess, JoinError, TokenWager, Track, TurnState};
use crate::state::placement::correct_positions;

/// Outbound notification capability the engine depends on.
///
/// Implementations fan events out to the room or to a single player; the
/// engine never talks to a transport directly.
pub trait Notify {
    /// Deliver an event to every member of the room.
    fn room(&self, event: ServerEvent);
    /// Deliver an event to one player.
    fn player(&self, player: Uuid, event: ServerEvent);
}

/// Countdown capability the engine depends on.
///
/// The implementation must emit timer progress events itself and must
/// deliver completion back through the room's serialization point, tagged
/// with the epoch it was started with.
pub trait Countdown {
    /// Start a countdown, cancelling any previous one.
    fn start(&mut self, seconds: u32, message: &str, epoch: u64);
    /// Cancel the running countdown, if any.
    fn cancel(&mut self);
}

/// The authoritative game engine for one room.
pub struct Engine {
    game: Game,
    countdown_secs: u32,
    timer_epoch: u64,
}

impl Engine {
    /// Wrap a game and remember the configured wagering-countdown length.
    pub fn new(game: Game, countdown_secs: u32) -> Self {
        Self {
            game,
            countdown_secs,
            timer_epoch: 0,
        }
    }

    /// Read-only view of the room state.
    pub fn game(&self) -> &Game {
        &self.game
    }

    /// Snapshot of the room state for replies and broadcasts.
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot::from(&self.game)
    }

    /// Add a player or reconnect them into their seat.
    pub fn add_player(&mut self, id: Uuid, name: String) -> Result<(), JoinError> {
        self.game.add_player(id, name)
    }

    /// Remove a player pre-start, or vacate their seat post-start.
    pub fn remove_player<N: Notify, C: Countdown>(&mut self, notify: &N, countdown: &mut C, id: Uuid) {
        if self.game.started {
            self.set_connected(notify, countdown, id, false);
        } else {
            self.game.remove_player(id);
        }
    }

    /// Update a seat's connected flag.
    ///
    /// A disconnect may complete a readiness tally the vanished player was
    /// blocking, so the current phase is re-evaluated afterwards.
    pub fn set_connected<N: Notify, C: Countdown>(
        &mut self,
        notify: &N,
        countdown: &mut C,
        id: Uuid,
        connected: bool,
    ) {
        if !self.game.players.contains_key(&id) {
            return;
        }
        self.game.set_connected(id, connected);
        self.broadcast_updated(notify);
        if !connected {
            self.recheck_phase(notify, countdown);
        }
    }

    /// Apply one inbound action from `actor`.
    ///
    /// This is the single dispatch point: the `(phase, action)` admissibility
    /// check happens here, so out-of-phase input is uniformly ignored.
    pub fn handle<N: Notify, C: Countdown>(
        &mut self,
        notify: &N,
        countdown: &mut C,
        actor: Uuid,
        action: GameAction,
    ) {
        if !self.game.players.contains_key(&actor) {
            debug!(room = %self.game.id, player = %actor, "action from unknown player dropped");
            return;
        }

        if !Self::admissible(self.game.turn_state, self.game.started, &action) {
            debug!(
                room = %self.game.id,
                player = %actor,
                phase = ?self.game.turn_state,
                action = ?action,
                "out-of-phase action dropped"
            );
            return;
        }

        match action {
            GameAction::StartGame {
                track_list,
                start_tokens,
                tokens_to_buy,
                playlists,
            } => {
                let tracks = track_list.into_iter().map(Into::into).collect();
                self.start_game(notify, tracks, start_tokens, tokens_to_buy, playlists);
            }
            GameAction::PlaceTimelineEntry { position } => {
                self.place_timeline_entry(notify, countdown, actor, position);
            }
            GameAction::PlaceToken { position } => self.place_token(notify, actor, position),
            GameAction::GuessSong { name, artist } => {
                self.guess_song(notify, actor, name, artist);
            }
            GameAction::AppealSong { year } => self.appeal_song(notify, actor, year),
            GameAction::ConfirmSong => self.confirm_song(notify, countdown, actor),
            GameAction::ActionAppealSong { action } => {
                self.action_appeal_song(notify, countdown, actor, action);
            }
            GameAction::ActionGuess { action } => {
                self.action_guess(notify, countdown, actor, action);
            }
            GameAction::BuyAnotherSong => self.buy_another_song(notify, actor),
            GameAction::BuyTimelineEntry => self.buy_timeline_entry(notify, actor),
        }
    }

    /// Completion callback of the wagering countdown.
    ///
    /// Must be invoked from the room's serialization point. A completion
    /// carrying a stale epoch belongs to a cancelled countdown and is inert.
    pub fn countdown_elapsed<N: Notify>(&mut self, notify: &N, epoch: u64) {
        if epoch != self.timer_epoch {
            debug!(room = %self.game.id, epoch, "stale countdown completion ignored");
            return;
        }
        if self.game.turn_state != TurnState::PendingPlaceTokens {
            return;
        }

        self.enter(TurnState::PlaceTokens);
        // Token holders may have vanished while the countdown ran.
        if self.wagering_settled() {
            self.enter(TurnState::GuessSong);
        }
        self.broadcast_updated(notify);
    }

    /// The single `(phase, action)` admissibility table.
    fn admissible(phase: TurnState, started: bool, action: &GameAction) -> bool {
        match action {
            GameAction::StartGame { .. } => !started,
            _ if !started => false,
            GameAction::PlaceTimelineEntry { .. } => phase == TurnState::PlaceTimelineEntry,
            GameAction::PlaceToken { .. } => phase == TurnState::PlaceTokens,
            GameAction::GuessSong { .. } => phase == TurnState::GuessSong,
            GameAction::AppealSong { .. }
            | GameAction::ConfirmSong
            | GameAction::ActionAppealSong { .. } => phase == TurnState::SongAppeal,
            GameAction::ActionGuess { .. } => phase == TurnState::ActionGuesses,
            GameAction::BuyAnotherSong => phase != TurnState::PlaceTimelineEntry,
            GameAction::BuyTimelineEntry => true,
        }
    }

    fn start_game<N: Notify>(
        &mut self,
        notify: &N,
        tracks: Vec<Track>,
        start_tokens: u32,
        tokens_to_buy: u32,
        playlists: Vec<String>,
    ) {
        let game = &mut self.game;
        if game.players.is_empty() {
            debug!(room = %game.id, "start without players dropped");
            return;
        }

        game.seed_pool(tracks);
        // One seed per timeline plus the first mystery track.
        if game.tracks.len() <= game.players.len() {
            debug!(
                room = %game.id,
                tracks = game.tracks.len(),
                players = game.players.len(),
                "start with too few distinct tracks dropped"
            );
            return;
        }

        game.playlists = playlists;
        game.tokens_to_buy = tokens_to_buy;
        game.guesses.clear();
        game.guess_to_action_id = None;
        game.track_appeal = None;
        game.shuffle_turn_order();

        let ids: Vec<Uuid> = game.players.keys().copied().collect();
        for id in ids {
            let Some(seed) = game.draw_track() else {
                break;
            };
            if let Some(player) = game.players.get_mut(&id) {
                player.tokens = start_tokens;
                player.ready = false;
                player.action = false;
                player.timeline = vec![seed];
                player.timeline_tokens.clear();
            }
        }

        game.started = true;
        game.active_track = game.draw_track();
        game.current_player_id = game
            .players
            .values()
            .find(|player| player.turn_order == 0)
            .map(|player| player.id);
        game.turn_state = TurnState::PlaceTimelineEntry;
        game.log("The game has started".into(), true);
        if let Some(name) = game.current_player().map(|player| player.name.clone()) {
            game.log(format!("It's {name}'s turn"), false);
        }

        if let Some(track) = &self.game.active_track {
            notify.room(ServerEvent::ChangeSong {
                url: track.url.clone(),
            });
        }
        self.broadcast_updated(notify);
    }

    fn place_timeline_entry<N: Notify, C: Countdown>(
        &mut self,
        notify: &N,
        countdown: &mut C,
        actor: Uuid,
        position: usize,
    ) {
        let Some(current_id) = self.game.current_player_id else {
            return;
        };
        if actor != current_id {
            debug!(room = %self.game.id, player = %actor, "placement from non-current player dropped");
            return;
        }
        let Some(track) = self.game.active_track.clone() else {
            return;
        };
        let Some(player) = self.game.players.get_mut(&current_id) else {
            return;
        };

        // The claim is recorded as-is; correctness is judged at resolution.
        let position = position.min(player.timeline.len());
        player.timeline.insert(position, track);

        let others_hold_tokens = self
            .game
            .players
            .values()
            .any(|player| player.id != current_id && player.connected && player.tokens > 0);

        if others_hold_tokens {
            self.enter(TurnState::PendingPlaceTokens);
            let epoch = self.bump_epoch();
            countdown.start(self.countdown_secs, "Get ready to place your tokens!", epoch);
        } else {
            self.enter(TurnState::GuessSong);
        }
        self.broadcast_updated(notify);
    }

    fn place_token<N: Notify>(&mut self, notify: &N, actor: Uuid, position: Option<usize>) {
        let Some(current_id) = self.game.current_player_id else {
            return;
        };
        // Wagering against one's own timeline makes no sense.
        if actor == current_id {
            return;
        }

        if let Some(position) = position {
            let spent = match self.game.players.get_mut(&actor) {
                Some(player) if player.tokens > 0 => {
                    player.tokens -= 1;
                    Some(player.name.clone())
                }
                _ => None,
            };
            if let Some(name) = spent {
                if let Some(current) = self.game.players.get_mut(&current_id) {
                    current.timeline_tokens.push(TokenWager {
                        player_id: actor,
                        position,
                    });
                }
                self.game.log(format!("{name} wagered a token"), false);
            }
        }

        if let Some(player) = self.game.players.get_mut(&actor) {
            player.ready = true;
        }

        if self.wagering_settled() {
            self.enter(TurnState::GuessSong);
        }
        self.broadcast_updated(notify);
    }

    fn guess_song<N: Notify>(
        &mut self,
        notify: &N,
        actor: Uuid,
        name: Option<String>,
        artist: Option<String>,
    ) {
        let name = name.unwrap_or_default();
        let artist = artist.unwrap_or_default();
        let already_guessed = self
            .game
            .guesses
            .iter()
            .any(|guess| guess.player_id == actor);

        if !name.trim().is_empty() && !artist.trim().is_empty() && !already_guessed {
            self.game.guesses.push(Guess {
                player_id: actor,
                name: name.trim().to_string(),
                artist: artist.trim().to_string(),
            });
            if let Some(who) = self.game.players.get(&actor).map(|p| p.name.clone()) {
                self.game.log(format!("{who} guessed the song"), false);
            }
        }

        if let Some(player) = self.game.players.get_mut(&actor) {
            player.ready = true;
        }

        if self.all_ready() {
            self.enter(TurnState::SongAppeal);
        }
        self.broadcast_updated(notify);
    }

    fn appeal_song<N: Notify>(&mut self, notify: &N, actor: Uuid, year: i32) {
        self.game.track_appeal = Some(year);
        // A re-raised appeal restarts the vote from scratch.
        self.game.reset_ready();

        if let Some(who) = self.game.players.get(&actor).map(|p| p.name.clone()) {
            self.game
                .log(format!("{who} claims the song is from {year}"), true);
            notify.room(ServerEvent::AlertMessage {
                message: format!("{who} claims the song is from {year}"),
                alert_type: AlertKind::Normal,
            });
        }
        self.broadcast_updated(notify);
    }

    fn confirm_song<N: Notify, C: Countdown>(&mut self, notify: &N, countdown: &mut C, actor: Uuid) {
        if Some(actor) != self.game.current_player_id {
            return;
        }
        // A raised appeal has to be voted down, not waved through.
        if self.game.track_appeal.is_some() {
            return;
        }
        self.resolve_placement(notify, countdown);
    }

    fn action_appeal_song<N: Notify, C: Countdown>(
        &mut self,
        notify: &N,
        countdown: &mut C,
        actor: Uuid,
        vote: bool,
    ) {
        if self.game.track_appeal.is_none() {
            return;
        }
        if Some(actor) == self.game.current_player_id {
            return;
        }

        if let Some(player) = self.game.players.get_mut(&actor) {
            player.action = vote;
            player.ready = true;
        }

        if !self.try_settle_appeal(notify, countdown) {
            self.broadcast_updated(notify);
        }
    }

    /// Tally the appeal once every non-current player has voted.
    ///
    /// Majority yes rewrites the active track's year, both on the track and
    /// on the copy already sitting in the current player's timeline. Ties
    /// reject. Either way the placement is resolved next.
    fn try_settle_appeal<N: Notify, C: Countdown>(&mut self, notify: &N, countdown: &mut C) -> bool {
        let Some(year) = self.game.track_appeal else {
            return false;
        };
        let Some(current_id) = self.game.current_player_id else {
            return false;
        };

        let voters: Vec<_> = self
            .game
            .players
            .values()
            .filter(|player| player.id != current_id)
            .collect();
        if !voters.iter().all(|player| player.ready || !player.connected) {
            return false;
        }

        let yes = voters
            .iter()
            .filter(|player| player.connected && player.action)
            .count();
        let no = voters
            .iter()
            .filter(|player| player.connected && !player.action)
            .count();

        if yes > no {
            if let Some(track) = &mut self.game.active_track {
                track.release_year = year;
                let url = track.url.clone();
                if let Some(current) = self.game.players.get_mut(&current_id) {
                    if let Some(entry) = current.timeline.iter_mut().find(|t| t.url == url) {
                        entry.release_year = year;
                    }
                }
            }
            self.game
                .log(format!("The room corrected the year to {year}"), true);
        } else {
            self.game.log("The appeal was rejected".into(), false);
        }

        self.game.track_appeal = None;
        self.resolve_placement(notify, countdown);
        true
    }

    /// Judge the recorded placement and settle all wagers against it.
    fn resolve_placement<N: Notify, C: Countdown>(&mut self, notify: &N, countdown: &mut C) {
        let Some(current_id) = self.game.current_player_id else {
            return;
        };
        let Some(active) = self.game.active_track.clone() else {
            return;
        };
        let Some(current) = self.game.players.get(&current_id) else {
            return;
        };
        let current_name = current.name.clone();

        let correct = correct_positions(&active, &current.timeline);
        let placed_at = current
            .timeline
            .iter()
            .position(|entry| entry.url == active.url);
        let placement_correct = placed_at.is_some_and(|index| correct.contains(&index));

        // Wagered tokens were consumed up front; the wagers themselves are
        // settled below and never survive the turn.
        let wagers = match self.game.players.get_mut(&current_id) {
            Some(current) => std::mem::take(&mut current.timeline_tokens),
            None => Vec::new(),
        };

        if placement_correct {
            self.alert(
                notify,
                current_id,
                AlertKind::Success,
                format!("You placed {} correctly!", active.name),
            );
            self.alert_others(
                notify,
                current_id,
                AlertKind::Normal,
                format!("{current_name} placed {} correctly", active.name),
            );
            self.game.log(
                format!(
                    "{current_name} placed {} ({}) correctly",
                    active.name, active.release_year
                ),
                true,
            );
        } else {
            if let Some(index) = placed_at {
                if let Some(current) = self.game.players.get_mut(&current_id) {
                    current.timeline.remove(index);
                }
            }
            self.alert(
                notify,
                current_id,
                AlertKind::Failure,
                format!("{} was not placed correctly", active.name),
            );
            self.alert_others(
                notify,
                current_id,
                AlertKind::Normal,
                format!("{current_name} misplaced {}", active.name),
            );
            self.game.log(
                format!(
                    "{current_name} misplaced {} ({})",
                    active.name, active.release_year
                ),
                true,
            );

            for wager in &wagers {
                if correct.contains(&wager.position) {
                    self.steal_track(notify, wager.player_id, &active);
                } else {
                    self.alert(
                        notify,
                        wager.player_id,
                        AlertKind::Failure,
                        format!("Your token on {} was lost", active.name),
                    );
                }
            }
        }

        if self.game.guesses.is_empty() {
            self.next_turn(notify, countdown);
        } else {
            self.game.guess_to_action_id =
                self.game.guesses.first().map(|guess| guess.player_id);
            self.enter(TurnState::ActionGuesses);
            self.broadcast_updated(notify);
        }
    }

    /// Relocate a correctly wagered track into the stealing player's own
    /// timeline, at that player's own correct position.
    fn steal_track<N: Notify>(&mut self, notify: &N, stealer_id: Uuid, track: &Track) {
        let Some(stealer) = self.game.players.get_mut(&stealer_id) else {
            return;
        };
        let own = correct_positions(track, &stealer.timeline);
        let at = own
            .first()
            .copied()
            .unwrap_or(stealer.timeline.len())
            .min(stealer.timeline.len());
        stealer.timeline.insert(at, track.clone());
        let name = stealer.name.clone();

        self.alert(
            notify,
            stealer_id,
            AlertKind::Success,
            format!("You stole {}!", track.name),
        );
        self.game
            .log(format!("{name} stole {} with a token", track.name), true);
    }

    fn action_guess<N: Notify, C: Countdown>(
        &mut self,
        notify: &N,
        countdown: &mut C,
        actor: Uuid,
        vote: bool,
    ) {
        if let Some(player) = self.game.players.get_mut(&actor) {
            player.action = vote;
            player.ready = true;
        }

        if !self.try_settle_guess_vote(notify, countdown) {
            self.broadcast_updated(notify);
        }
    }

    /// Tally the vote on the guess under review once everyone has voted.
    /// Majority yes grants the guesser one token; ties grant nothing.
    fn try_settle_guess_vote<N: Notify, C: Countdown>(
        &mut self,
        notify: &N,
        countdown: &mut C,
    ) -> bool {
        if !self.all_ready() {
            return false;
        }
        let Some(guesser_id) = self.game.guess_to_action_id else {
            return false;
        };

        let yes = self
            .game
            .players
            .values()
            .filter(|player| player.connected && player.action)
            .count();
        let no = self
            .game
            .players
            .values()
            .filter(|player| player.connected && !player.action)
            .count();

        if yes > no {
            if let Some(guesser) = self.game.players.get_mut(&guesser_id) {
                guesser.tokens += 1;
                let name = guesser.name.clone();
                self.game
                    .log(format!("{name} earned a token for their guess"), true);
            }
            self.alert(
                notify,
                guesser_id,
                AlertKind::Success,
                "The room accepted your guess, token earned".into(),
            );
        } else {
            self.alert(
                notify,
                guesser_id,
                AlertKind::Failure,
                "The room rejected your guess".into(),
            );
        }

        self.game.reset_ready();

        let next = self
            .game
            .guesses
            .iter()
            .position(|guess| guess.player_id == guesser_id)
            .and_then(|index| self.game.guesses.get(index + 1))
            .map(|guess| guess.player_id);

        match next {
            Some(player_id) => {
                self.game.guess_to_action_id = Some(player_id);
                self.broadcast_updated(notify);
            }
            None => self.next_turn(notify, countdown),
        }
        true
    }

    /// Hand the turn to the circular successor and draw a fresh track.
    fn next_turn<N: Notify, C: Countdown>(&mut self, notify: &N, countdown: &mut C) {
        // Leaving the turn invalidates whatever countdown might still run.
        self.bump_epoch();
        countdown.cancel();

        self.game.current_player_id = self.game.next_in_rotation();
        self.game.guesses.clear();
        self.game.guess_to_action_id = None;
        self.game.track_appeal = None;
        self.game.active_track = self.game.draw_track();
        self.enter(TurnState::PlaceTimelineEntry);

        match self.game.active_track.clone() {
            Some(track) => {
                notify.room(ServerEvent::ChangeSong { url: track.url });
                if let Some(name) = self.game.current_player().map(|p| p.name.clone()) {
                    self.game.log(format!("It's {name}'s turn"), false);
                    notify.room(ServerEvent::AlertMessage {
                        message: format!("It's {name}'s turn"),
                        alert_type: AlertKind::Normal,
                    });
                }
            }
            None => {
                self.game.log("The track pool is exhausted".into(), true);
                notify.room(ServerEvent::AlertMessage {
                    message: "No tracks left, the game is over".into(),
                    alert_type: AlertKind::Normal,
                });
            }
        }
        self.broadcast_updated(notify);
    }

    fn buy_another_song<N: Notify>(&mut self, notify: &N, actor: Uuid) {
        if Some(actor) != self.game.current_player_id {
            return;
        }
        let has_token = self
            .game
            .players
            .get(&actor)
            .is_some_and(|player| player.tokens > 0);
        if !has_token {
            return;
        }
        let Some(track) = self.game.draw_track() else {
            return;
        };

        if let Some(player) = self.game.players.get_mut(&actor) {
            player.tokens -= 1;
            let name = player.name.clone();
            self.game.log(format!("{name} bought another song"), false);
        }
        notify.room(ServerEvent::ChangeSong {
            url: track.url.clone(),
        });
        self.game.active_track = Some(track);
        self.broadcast_updated(notify);
    }

    fn buy_timeline_entry<N: Notify>(&mut self, notify: &N, actor: Uuid) {
        let cost = self.game.tokens_to_buy;
        let affordable = self
            .game
            .players
            .get(&actor)
            .is_some_and(|player| player.tokens >= cost);
        if !affordable {
            return;
        }
        let Some(track) = self.game.draw_track() else {
            return;
        };

        let Some(player) = self.game.players.get_mut(&actor) else {
            // Nobody to charge; the drawn track is forfeit either way.
            return;
        };
        player.tokens -= cost;
        let own = correct_positions(&track, &player.timeline);
        let at = own
            .first()
            .copied()
            .unwrap_or(player.timeline.len())
            .min(player.timeline.len());
        player.timeline.insert(at, track.clone());
        let name = player.name.clone();

        self.alert(
            notify,
            actor,
            AlertKind::Success,
            format!("{} was added to your timeline", track.name),
        );
        self.game
            .log(format!("{name} bought a timeline entry"), false);
        self.broadcast_updated(notify);
    }

    /// Re-evaluate the current phase after a disconnect, in case the
    /// vanished player was the last one a tally waited for.
    fn recheck_phase<N: Notify, C: Countdown>(&mut self, notify: &N, countdown: &mut C) {
        if !self.game.started {
            return;
        }
        match self.game.turn_state {
            TurnState::PlaceTokens => {
                if self.wagering_settled() {
                    self.enter(TurnState::GuessSong);
                    self.broadcast_updated(notify);
                }
            }
            TurnState::GuessSong => {
                if self.all_ready() {
                    self.enter(TurnState::SongAppeal);
                    self.broadcast_updated(notify);
                }
            }
            TurnState::SongAppeal => {
                let _ = self.try_settle_appeal(notify, countdown);
            }
            TurnState::ActionGuesses => {
                let _ = self.try_settle_guess_vote(notify, countdown);
            }
            TurnState::PlaceTimelineEntry | TurnState::PendingPlaceTokens => {}
        }
    }

    /// Wagering closes once every seat is ready, exempt (current player),
    /// broke, or gone.
    fn wagering_settled(&self) -> bool {
        self.game.players.values().all(|player| {
            player.ready
                || Some(player.id) == self.game.current_player_id
                || player.tokens == 0
                || !player.connected
        })
    }

    fn all_ready(&self) -> bool {
        self.game
            .players
            .values()
            .all(|player| player.ready || !player.connected)
    }

    /// Move to `phase`, clearing every phase-scoped flag.
    fn enter(&mut self, phase: TurnState) {
        self.game.reset_ready();
        self.game.turn_state = phase;
    }

    fn bump_epoch(&mut self) -> u64 {
        self.timer_epoch += 1;
        self.timer_epoch
    }

    fn broadcast_updated<N: Notify>(&self, notify: &N) {
        notify.room(ServerEvent::Updated {
            game: self.snapshot(),
        });
    }

    fn alert<N: Notify>(&self, notify: &N, player: Uuid, kind: AlertKind, message: String) {
        notify.player(
            player,
            ServerEvent::AlertMessage {
                message,
                alert_type: kind,
            },
        );
    }

    fn alert_others<N: Notify>(&self, notify: &N, except: Uuid, kind: AlertKind, message: String) {
        for player in self.game.players.values().filter(|p| p.id != except) {
            notify.player(
                player.id,
                ServerEvent::AlertMessage {
                    message: message.clone(),
                    alert_type: kind,
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::dto::ws::TrackInput;

    #[derive(Debug)]
    enum Outbound {
        Room(ServerEvent),
        Player(Uuid, ServerEvent),
    }

    #[derive(Default)]
    struct RecordingNotify {
        events: RefCell<Vec<Outbound>>,
    }

    impl Notify for RecordingNotify {
        fn room(&self, event: ServerEvent) {
            self.events.borrow_mut().push(Outbound::Room(event));
        }
        fn player(&self, player: Uuid, event: ServerEvent) {
            self.events.borrow_mut().push(Outbound::Player(player, event));
        }
    }

    impl RecordingNotify {
        fn alerts_for(&self, player: Uuid) -> Vec<(String, AlertKind)> {
            self.events
                .borrow()
                .iter()
                .filter_map(|outbound| match outbound {
                    Outbound::Player(
                        target,
                        ServerEvent::AlertMessage {
                            message,
                            alert_type,
                        },
                    ) if *target == player => Some((message.clone(), *alert_type)),
                    _ => None,
                })
                .collect()
        }
    }

    #[derive(Default)]
    struct FakeCountdown {
        started: Vec<(u32, u64)>,
        cancels: usize,
    }

    impl Countdown for FakeCountdown {
        fn start(&mut self, seconds: u32, _message: &str, epoch: u64) {
            self.started.push((seconds, epoch));
        }
        fn cancel(&mut self) {
            self.cancels += 1;
        }
    }

    fn track(year: i32, url: &str) -> Track {
        Track {
            name: url.to_uppercase(),
            artist: "artist".into(),
            release_year: year,
            url: url.into(),
        }
    }

    fn track_inputs(count: usize) -> Vec<TrackInput> {
        (0..count)
            .map(|index| TrackInput {
                name: format!("Song {index}"),
                artist: "Artist".into(),
                release_year: 1960 + index as i32,
                url: format!("spotify:track:{index}"),
            })
            .collect()
    }

    /// Start a real game with `players` seats and the given token settings.
    fn started_engine(players: usize, start_tokens: u32) -> (Engine, Vec<Uuid>) {
        let mut game = Game::new("ROOM1".into());
        let ids: Vec<Uuid> = (0..players).map(|_| Uuid::new_v4()).collect();
        for (index, id) in ids.iter().enumerate() {
            game.add_player(*id, format!("Player {index}")).unwrap();
        }

        let mut engine = Engine::new(game, 5);
        let notify = RecordingNotify::default();
        let mut countdown = FakeCountdown::default();
        engine.handle(
            &notify,
            &mut countdown,
            ids[0],
            GameAction::StartGame {
                track_list: track_inputs(players + 8),
                start_tokens,
                tokens_to_buy: 3,
                playlists: vec!["playlist-1".into()],
            },
        );
        assert!(engine.game().started);
        (engine, ids)
    }

    fn current(engine: &Engine) -> Uuid {
        engine.game().current_player_id.unwrap()
    }

    #[test]
    fn start_deals_one_seed_track_and_first_active_track() {
        let (engine, ids) = started_engine(3, 2);
        let game = engine.game();

        assert_eq!(game.turn_state, TurnState::PlaceTimelineEntry);
        assert!(game.active_track.is_some());
        for id in &ids {
            let player = &game.players[id];
            assert_eq!(player.timeline.len(), 1);
            assert_eq!(player.tokens, 2);
        }
        // 3 seeds + 1 active drawn from 11.
        assert_eq!(game.tracks.len(), 7);

        let mut orders: Vec<usize> = game.players.values().map(|p| p.turn_order).collect();
        orders.sort_unstable();
        assert_eq!(orders, vec![0, 1, 2]);
        assert_eq!(game.players[&current(&engine)].turn_order, 0);
    }

    #[test]
    fn no_token_holders_means_no_wagering_window() {
        // Two players, zero start tokens: placement goes straight to guessing,
        // and two passed guesses skip the vote phase entirely.
        let (mut engine, _ids) = started_engine(2, 0);
        let notify = RecordingNotify::default();
        let mut countdown = FakeCountdown::default();

        let first = current(&engine);
        engine.handle(
            &notify,
            &mut countdown,
            first,
            GameAction::PlaceTimelineEntry { position: 0 },
        );
        assert_eq!(engine.game().turn_state, TurnState::GuessSong);
        assert!(countdown.started.is_empty());

        let everyone: Vec<Uuid> = engine.game().players.keys().copied().collect();
        for id in everyone {
            engine.handle(
                &notify,
                &mut countdown,
                id,
                GameAction::GuessSong {
                    name: None,
                    artist: None,
                },
            );
        }

        // No guesses were recorded, so SongAppeal needed only the confirm.
        assert_eq!(engine.game().turn_state, TurnState::SongAppeal);
        engine.handle(&notify, &mut countdown, first, GameAction::ConfirmSong);

        let game = engine.game();
        assert_eq!(game.turn_state, TurnState::PlaceTimelineEntry);
        assert!(game.guesses.is_empty());
        assert_ne!(current(&engine), first);
    }

    #[test]
    fn token_holders_open_the_wagering_countdown() {
        let (mut engine, _ids) = started_engine(3, 1);
        let notify = RecordingNotify::default();
        let mut countdown = FakeCountdown::default();

        engine.handle(
            &notify,
            &mut countdown,
            current(&engine),
            GameAction::PlaceTimelineEntry { position: 1 },
        );
        assert_eq!(engine.game().turn_state, TurnState::PendingPlaceTokens);
        assert_eq!(countdown.started.len(), 1);

        // Nobody wagers; the countdown forces the transition on its own.
        let (_, epoch) = countdown.started[0];
        engine.countdown_elapsed(&notify, epoch);
        assert_eq!(engine.game().turn_state, TurnState::PlaceTokens);
    }

    #[test]
    fn stale_countdown_completion_is_inert() {
        let (mut engine, _ids) = started_engine(3, 1);
        let notify = RecordingNotify::default();
        let mut countdown = FakeCountdown::default();

        engine.handle(
            &notify,
            &mut countdown,
            current(&engine),
            GameAction::PlaceTimelineEntry { position: 0 },
        );
        let (_, epoch) = countdown.started[0];

        engine.countdown_elapsed(&notify, epoch + 7);
        assert_eq!(engine.game().turn_state, TurnState::PendingPlaceTokens);

        engine.countdown_elapsed(&notify, epoch);
        assert_eq!(engine.game().turn_state, TurnState::PlaceTokens);
    }

    #[test]
    fn out_of_phase_actions_are_dropped_silently() {
        let (mut engine, ids) = started_engine(2, 0);
        let notify = RecordingNotify::default();
        let mut countdown = FakeCountdown::default();

        let before = engine.game().turn_state;
        engine.handle(
            &notify,
            &mut countdown,
            ids[0],
            GameAction::ActionGuess { action: true },
        );
        engine.handle(
            &notify,
            &mut countdown,
            ids[1],
            GameAction::PlaceToken { position: Some(0) },
        );

        assert_eq!(engine.game().turn_state, before);
        assert!(notify.events.borrow().is_empty());
    }

    #[test]
    fn placement_from_non_current_player_is_dropped() {
        let (mut engine, _ids) = started_engine(2, 0);
        let notify = RecordingNotify::default();
        let mut countdown = FakeCountdown::default();

        let bystander = engine
            .game()
            .players
            .keys()
            .copied()
            .find(|id| *id != current(&engine))
            .unwrap();
        let timeline_before = engine.game().players[&current(&engine)].timeline.len();

        engine.handle(
            &notify,
            &mut countdown,
            bystander,
            GameAction::PlaceTimelineEntry { position: 0 },
        );
        assert_eq!(
            engine.game().players[&current(&engine)].timeline.len(),
            timeline_before
        );
        assert_eq!(engine.game().turn_state, TurnState::PlaceTimelineEntry);
    }

    /// Craft a three-seat game in `SongAppeal` with a deliberately misplaced
    /// active track and full control over timelines and wagers.
    fn crafted_resolution_game() -> (Engine, Uuid, Uuid, Uuid) {
        let mut game = Game::new("ROOM2".into());
        let current = Uuid::new_v4();
        let right = Uuid::new_v4();
        let wrong = Uuid::new_v4();
        game.add_player(current, "Current".into()).unwrap();
        game.add_player(right, "Right".into()).unwrap();
        game.add_player(wrong, "Wrong".into()).unwrap();
        game.started = true;
        game.current_player_id = Some(current);
        game.turn_state = TurnState::SongAppeal;
        game.tracks = vec![track(1970, "refill-1"), track(1971, "refill-2")];

        let active = track(2000, "active");
        game.active_track = Some(active.clone());

        {
            let seats: Vec<Uuid> = game.players.keys().copied().collect();
            for (order, id) in seats.iter().enumerate() {
                game.players.get_mut(id).unwrap().turn_order = order;
            }
        }

        // Active (2000) wrongly placed at index 0; the only correct slot is 1.
        let current_seat = game.players.get_mut(&current).unwrap();
        current_seat.timeline = vec![active, track(1990, "a"), track(2010, "b")];
        current_seat.timeline_tokens = vec![
            TokenWager {
                player_id: right,
                position: 1,
            },
            TokenWager {
                player_id: wrong,
                position: 0,
            },
        ];

        game.players.get_mut(&right).unwrap().timeline = vec![track(1995, "c")];
        game.players.get_mut(&wrong).unwrap().timeline = vec![track(1980, "d")];

        (Engine::new(game, 5), current, right, wrong)
    }

    #[test]
    fn misplaced_track_is_removed_and_stolen_by_the_correct_wager() {
        let (mut engine, current, right, wrong) = crafted_resolution_game();
        let notify = RecordingNotify::default();
        let mut countdown = FakeCountdown::default();

        engine.handle(&notify, &mut countdown, current, GameAction::ConfirmSong);

        let game = engine.game();
        // The misplaced entry is gone from the placer's timeline.
        assert!(
            game.players[&current]
                .timeline
                .iter()
                .all(|entry| entry.url != "active")
        );
        // The correct wager relocated it at the stealer's own correct spot.
        let stolen = &game.players[&right].timeline;
        assert_eq!(
            stolen.iter().map(|t| t.url.as_str()).collect::<Vec<_>>(),
            vec!["c", "active"]
        );
        // The wrong wager got nothing but a failure alert.
        assert_eq!(game.players[&wrong].timeline.len(), 1);
        assert!(
            notify
                .alerts_for(wrong)
                .iter()
                .any(|(_, kind)| *kind == AlertKind::Failure)
        );
        // Wagers never survive resolution.
        assert!(game.players[&current].timeline_tokens.is_empty());
    }

    #[test]
    fn next_turn_wraps_from_last_seat_to_first() {
        let (engine, current, right, wrong) = crafted_resolution_game();
        let notify = RecordingNotify::default();
        let mut countdown = FakeCountdown::default();

        // Hand the turn to the seat with the highest order and drop the
        // crafted wagers so resolution falls straight through to next_turn.
        let last = [current, right, wrong]
            .into_iter()
            .max_by_key(|id| engine.game().players[id].turn_order)
            .unwrap();
        let first = [current, right, wrong]
            .into_iter()
            .find(|id| engine.game().players[id].turn_order == 0)
            .unwrap();

        let mut game = engine.game().clone();
        game.current_player_id = Some(last);
        if let Some(seat) = game.players.get_mut(&current) {
            seat.timeline_tokens.clear();
        }
        let mut engine = Engine::new(game, 5);

        engine.handle(&notify, &mut countdown, last, GameAction::ConfirmSong);
        assert_eq!(engine.game().current_player_id, Some(first));
        assert_eq!(engine.game().turn_state, TurnState::PlaceTimelineEntry);
        assert_eq!(countdown.cancels, 1);
    }

    #[test]
    fn appeal_majority_overwrites_year_everywhere() {
        let (mut engine, current, right, wrong) = crafted_resolution_game();
        let notify = RecordingNotify::default();
        let mut countdown = FakeCountdown::default();

        engine.handle(
            &notify,
            &mut countdown,
            right,
            GameAction::AppealSong { year: 1985 },
        );
        assert_eq!(engine.game().track_appeal, Some(1985));

        engine.handle(
            &notify,
            &mut countdown,
            right,
            GameAction::ActionAppealSong { action: true },
        );
        // One of two votes in: nothing settles yet.
        assert_eq!(engine.game().turn_state, TurnState::SongAppeal);

        engine.handle(
            &notify,
            &mut countdown,
            wrong,
            GameAction::ActionAppealSong { action: true },
        );

        // 2-0 among non-current players: the year is rewritten on the track
        // copy that resolution then judges. 1985 at index 0 of [1990, 2010]
        // makes the original placement correct.
        let game = engine.game();
        assert!(game.track_appeal.is_none());
        let placed = game.players[&current]
            .timeline
            .iter()
            .find(|t| t.url == "active")
            .expect("corrected placement stays in the timeline");
        assert_eq!(placed.release_year, 1985);
        assert_eq!(game.turn_state, TurnState::PlaceTimelineEntry);
    }

    #[test]
    fn appeal_tie_is_a_rejection() {
        let (mut engine, current, right, wrong) = crafted_resolution_game();
        let notify = RecordingNotify::default();
        let mut countdown = FakeCountdown::default();

        engine.handle(
            &notify,
            &mut countdown,
            right,
            GameAction::AppealSong { year: 1985 },
        );
        engine.handle(
            &notify,
            &mut countdown,
            right,
            GameAction::ActionAppealSong { action: true },
        );
        engine.handle(
            &notify,
            &mut countdown,
            wrong,
            GameAction::ActionAppealSong { action: false },
        );

        // 1-1: the stated year stands, and the misplaced track is removed.
        let game = engine.game();
        assert!(
            game.players[&current]
                .timeline
                .iter()
                .all(|entry| entry.url != "active")
        );
    }

    #[test]
    fn confirm_cannot_bypass_an_open_appeal() {
        let (mut engine, current, right, _wrong) = crafted_resolution_game();
        let notify = RecordingNotify::default();
        let mut countdown = FakeCountdown::default();

        engine.handle(
            &notify,
            &mut countdown,
            right,
            GameAction::AppealSong { year: 1985 },
        );
        engine.handle(&notify, &mut countdown, current, GameAction::ConfirmSong);
        assert_eq!(engine.game().turn_state, TurnState::SongAppeal);
    }

    #[test]
    fn wagering_consumes_a_token_and_settles_when_everyone_is_done() {
        let (mut engine, _ids) = started_engine(3, 1);
        let notify = RecordingNotify::default();
        let mut countdown = FakeCountdown::default();

        let turn_holder = current(&engine);
        engine.handle(
            &notify,
            &mut countdown,
            turn_holder,
            GameAction::PlaceTimelineEntry { position: 0 },
        );
        let (_, epoch) = countdown.started[0];
        engine.countdown_elapsed(&notify, epoch);
        assert_eq!(engine.game().turn_state, TurnState::PlaceTokens);

        let others: Vec<Uuid> = engine
            .game()
            .players
            .keys()
            .copied()
            .filter(|id| *id != turn_holder)
            .collect();

        engine.handle(
            &notify,
            &mut countdown,
            others[0],
            GameAction::PlaceToken { position: Some(1) },
        );
        assert_eq!(engine.game().players[&others[0]].tokens, 0);
        assert_eq!(engine.game().players[&turn_holder].timeline_tokens.len(), 1);
        assert_eq!(engine.game().turn_state, TurnState::PlaceTokens);

        // The second holder passes; everyone is now settled.
        engine.handle(
            &notify,
            &mut countdown,
            others[1],
            GameAction::PlaceToken { position: None },
        );
        assert_eq!(engine.game().players[&others[1]].tokens, 1);
        assert_eq!(engine.game().turn_state, TurnState::GuessSong);
    }

    #[test]
    fn a_guess_needs_both_fields() {
        let (mut engine, _ids) = started_engine(2, 0);
        let notify = RecordingNotify::default();
        let mut countdown = FakeCountdown::default();

        let first = current(&engine);
        engine.handle(
            &notify,
            &mut countdown,
            first,
            GameAction::PlaceTimelineEntry { position: 0 },
        );

        engine.handle(
            &notify,
            &mut countdown,
            first,
            GameAction::GuessSong {
                name: Some("Song".into()),
                artist: Some("  ".into()),
            },
        );
        assert!(engine.game().guesses.is_empty());
        assert!(engine.game().players[&first].ready);
    }

    #[test]
    fn accepted_guess_earns_a_token_and_tie_does_not() {
        let (mut engine, _ids) = started_engine(2, 0);
        let notify = RecordingNotify::default();
        let mut countdown = FakeCountdown::default();

        let first = current(&engine);
        let second = engine
            .game()
            .players
            .keys()
            .copied()
            .find(|id| *id != first)
            .unwrap();

        engine.handle(
            &notify,
            &mut countdown,
            first,
            GameAction::PlaceTimelineEntry { position: 0 },
        );
        engine.handle(
            &notify,
            &mut countdown,
            second,
            GameAction::GuessSong {
                name: Some("Starman".into()),
                artist: Some("David Bowie".into()),
            },
        );
        engine.handle(
            &notify,
            &mut countdown,
            first,
            GameAction::GuessSong {
                name: None,
                artist: None,
            },
        );
        assert_eq!(engine.game().turn_state, TurnState::SongAppeal);
        engine.handle(&notify, &mut countdown, first, GameAction::ConfirmSong);

        // One guess recorded: the vote phase runs.
        assert_eq!(engine.game().turn_state, TurnState::ActionGuesses);
        assert_eq!(engine.game().guess_to_action_id, Some(second));

        engine.handle(
            &notify,
            &mut countdown,
            first,
            GameAction::ActionGuess { action: true },
        );
        engine.handle(
            &notify,
            &mut countdown,
            second,
            GameAction::ActionGuess { action: false },
        );

        // 1-1 is a rejection: no token granted.
        let game = engine.game();
        assert_eq!(game.players[&second].tokens, 0);
        assert_eq!(game.turn_state, TurnState::PlaceTimelineEntry);
        assert!(game.guesses.is_empty());
    }

    #[test]
    fn buying_a_timeline_entry_inserts_at_the_correct_spot() {
        let mut game = Game::new("ROOM3".into());
        let buyer = Uuid::new_v4();
        game.add_player(buyer, "Buyer".into()).unwrap();
        game.started = true;
        game.current_player_id = Some(buyer);
        game.turn_state = TurnState::GuessSong;
        game.tokens_to_buy = 2;
        game.tracks = vec![track(2001, "bonus")];
        game.players.get_mut(&buyer).unwrap().tokens = 2;
        game.players.get_mut(&buyer).unwrap().timeline =
            vec![track(1990, "a"), track(2010, "b")];

        let mut engine = Engine::new(game, 5);
        let notify = RecordingNotify::default();
        let mut countdown = FakeCountdown::default();
        engine.handle(&notify, &mut countdown, buyer, GameAction::BuyTimelineEntry);

        let seat = &engine.game().players[&buyer];
        assert_eq!(seat.tokens, 0);
        assert_eq!(
            seat.timeline
                .iter()
                .map(|t| t.release_year)
                .collect::<Vec<_>>(),
            vec![1990, 2001, 2010]
        );
        assert!(engine.game().tracks.is_empty());
    }

    #[test]
    fn buying_another_song_redraws_the_active_track() {
        let (mut engine, _ids) = started_engine(2, 1);
        let notify = RecordingNotify::default();
        let mut countdown = FakeCountdown::default();

        let first = current(&engine);
        engine.handle(
            &notify,
            &mut countdown,
            first,
            GameAction::PlaceTimelineEntry { position: 0 },
        );
        // Redraws are barred while placing, allowed afterwards.
        let before = engine.game().active_track.clone().unwrap();
        let pool_before = engine.game().tracks.len();

        engine.handle(&notify, &mut countdown, first, GameAction::BuyAnotherSong);

        let game = engine.game();
        let after = game.active_track.clone().unwrap();
        assert_ne!(before.url, after.url);
        assert_eq!(game.players[&first].tokens, 0);
        assert_eq!(game.tracks.len(), pool_before - 1);
    }

    #[test]
    fn disconnect_of_the_last_awaited_player_completes_the_phase() {
        let (mut engine, _ids) = started_engine(2, 0);
        let notify = RecordingNotify::default();
        let mut countdown = FakeCountdown::default();

        let first = current(&engine);
        let second = engine
            .game()
            .players
            .keys()
            .copied()
            .find(|id| *id != first)
            .unwrap();

        engine.handle(
            &notify,
            &mut countdown,
            first,
            GameAction::PlaceTimelineEntry { position: 0 },
        );
        engine.handle(
            &notify,
            &mut countdown,
            first,
            GameAction::GuessSong {
                name: None,
                artist: None,
            },
        );
        assert_eq!(engine.game().turn_state, TurnState::GuessSong);

        // The only player still awaited drops; the phase must not stall.
        engine.set_connected(&notify, &mut countdown, second, false);
        assert_eq!(engine.game().turn_state, TurnState::SongAppeal);
    }
}
