//! A room: one match's participants, its round state machine, and the
//! timers that drive it.
//!
//! Every mutating method runs to completion on the engine task and returns
//! the messages it produced as `(Recipient, ServerMessage)` pairs. The
//! caller delivers them; the room never touches a connection.
//!
//! ```text
//! Waiting ──start──→ Drawing ──all guessed / clock 0──→ RoundEnd ──delay──→ Drawing
//!    ↑                                                     │    ╲
//!    └──────────────── too few players ────────────────────┘     → GameEnd ──start──→ Drawing
//! ```
//!
//! # Timers
//!
//! A room owns up to four [`TimerHandle`]s: the 1 Hz round clock, the
//! reveal scheduler, the inter-round delay, and the drawer grace timer
//! (held inside the pending drawer slot). Replacing or clearing a handle
//! cancels the job; every firing is checked against the handle currently
//! stored, so an event queued just before cancellation is ignored.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use scrawl_protocol::{
    ChatLine, GuessOutcome, ParticipantView, Phase, PlayerId, RankEntry, Recipient, RoomCode,
    RoomListEntry, RoomSnapshot, ScoreDelta, ServerMessage,
};
use scrawl_timer::{SharedClock, TimerHandle, TimerId, spawn_interval, spawn_once};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

use crate::logic::{self, ScoreInput};
use crate::{GameConfig, RoomError};

/// Messages produced by one room operation.
pub type Outbound = Vec<(Recipient, ServerMessage)>;

// ---------------------------------------------------------------------------
// Timer events
// ---------------------------------------------------------------------------

/// Which of a room's timers fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomTimer {
    RoundClock,
    Reveal,
    NextRound,
    DrawerGrace,
}

/// Delivered to the engine when a room timer fires.
#[derive(Debug, Clone)]
pub struct RoomTimerFired {
    pub code: RoomCode,
    pub timer: RoomTimer,
    pub id: TimerId,
}

pub type TimerSender = mpsc::UnboundedSender<RoomTimerFired>;

// ---------------------------------------------------------------------------
// Participant
// ---------------------------------------------------------------------------

/// One seat in a room. The `Vec<Participant>` order is the turn order.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: PlayerId,
    pub display_name: String,
    pub score: u32,
    /// The identity currently has a live connection.
    pub connected: bool,
    /// Has a correct guess recorded this round.
    pub guessed: bool,
    /// Was a guesser when the round started; only these gate completion.
    pub eligible: bool,
}

impl Participant {
    fn view(&self) -> ParticipantView {
        ParticipantView {
            identity: self.id.clone(),
            display_name: self.display_name.clone(),
            score: self.score,
            connected: self.connected,
            guessed: self.guessed,
        }
    }
}

/// Who holds the drawer role.
///
/// `Pending` is shared by both ways of losing the drawer mid-round (dropped
/// connection and explicit leave). It owns the grace timer, so leaving the
/// state in any direction cancels it.
#[derive(Debug)]
enum DrawerSlot {
    Empty,
    Active(PlayerId),
    Pending { drawer: PlayerId, grace: TimerHandle },
}

impl DrawerSlot {
    fn id(&self) -> Option<&PlayerId> {
        match self {
            Self::Empty => None,
            Self::Active(id) | Self::Pending { drawer: id, .. } => Some(id),
        }
    }
}

/// State of the round in progress (or just finished).
#[derive(Debug)]
struct Round {
    word: String,
    revealed: Vec<bool>,
    remaining: u32,
    correct: usize,
    deltas: HashMap<PlayerId, u32>,
    /// Everyone who held the drawer role this round, in order.
    drawers: Vec<PlayerId>,
}

impl Round {
    fn revealed_count(&self) -> usize {
        self.revealed.iter().filter(|r| **r).count()
    }

    fn masked(&self) -> String {
        logic::mask(&self.word, &self.revealed)
    }
}

/// Everything a room needs from its registry.
#[derive(Clone)]
pub(crate) struct RoomContext {
    pub game: Arc<GameConfig>,
    pub max_players: usize,
    pub max_chat_log: usize,
    pub clock: SharedClock,
    pub timers: TimerSender,
}

// ---------------------------------------------------------------------------
// Room
// ---------------------------------------------------------------------------

pub struct Room {
    code: RoomCode,
    participants: Vec<Participant>,
    phase: Phase,
    round_number: u32,
    /// Index in `participants` where the search for the next drawer starts.
    next_turn: usize,
    drawer: DrawerSlot,
    round: Option<Round>,
    used_words: Vec<String>,
    messages: VecDeque<ChatLine>,
    strokes: Vec<Value>,
    round_started_at: Instant,

    round_clock: Option<TimerHandle>,
    reveal: Option<TimerHandle>,
    next_round: Option<TimerHandle>,

    ctx: RoomContext,
}

impl Room {
    pub(crate) fn new(code: RoomCode, ctx: RoomContext) -> Self {
        let round_started_at = ctx.clock.now();
        Self {
            code,
            participants: Vec::new(),
            phase: Phase::Waiting,
            round_number: 0,
            next_turn: 0,
            drawer: DrawerSlot::Empty,
            round: None,
            used_words: Vec::new(),
            messages: VecDeque::new(),
            strokes: Vec::new(),
            round_started_at,
            round_clock: None,
            reveal: None,
            next_round: None,
            ctx,
        }
    }

    // -- Accessors --------------------------------------------------------

    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn round_number(&self) -> u32 {
        self.round_number
    }

    /// Participants in turn order.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, id: &PlayerId) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == *id)
    }

    pub fn contains(&self, id: &PlayerId) -> bool {
        self.participant(id).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn drawer(&self) -> Option<&PlayerId> {
        self.drawer.id()
    }

    /// The drawer lost its connection and the grace timer is running.
    pub fn drawer_pending(&self) -> bool {
        matches!(self.drawer, DrawerSlot::Pending { .. })
    }

    pub fn secret_word(&self) -> Option<&str> {
        self.round.as_ref().map(|r| r.word.as_str())
    }

    pub fn revealed_count(&self) -> usize {
        self.round.as_ref().map_or(0, Round::revealed_count)
    }

    pub fn remaining_secs(&self) -> u32 {
        self.round.as_ref().map_or(0, |r| r.remaining)
    }

    pub fn round_started_at(&self) -> Instant {
        self.round_started_at
    }

    /// Returns `true` if the given timer is currently scheduled.
    pub fn has_timer(&self, timer: RoomTimer) -> bool {
        match timer {
            RoomTimer::RoundClock => self.round_clock.is_some(),
            RoomTimer::Reveal => self.reveal.is_some(),
            RoomTimer::NextRound => self.next_round.is_some(),
            RoomTimer::DrawerGrace => self.drawer_pending(),
        }
    }

    /// Last round start older than `idle_timeout`.
    pub fn is_idle(&self, now: Instant, idle_timeout: Duration) -> bool {
        now.saturating_duration_since(self.round_started_at) > idle_timeout
    }

    pub fn snapshot(&self) -> RoomSnapshot {
        RoomSnapshot {
            code: self.code.clone(),
            phase: self.phase,
            round: self.round_number,
            max_rounds: self.ctx.game.max_rounds,
            participants: self.participants.iter().map(Participant::view).collect(),
            drawer: self.drawer.id().cloned(),
            drawer_pending: self.drawer_pending(),
            masked_word: self.round.as_ref().map(Round::masked),
            revealed: self
                .round
                .as_ref()
                .map(|r| r.revealed.clone())
                .unwrap_or_default(),
            remaining_secs: self.remaining_secs(),
            messages: self.messages.iter().cloned().collect(),
            strokes: self.strokes.clone(),
        }
    }

    /// Discovery entry, or `None` for an empty room.
    pub fn list_entry(&self) -> Option<RoomListEntry> {
        let owner = self.participants.first()?;
        Some(RoomListEntry {
            code: self.code.clone(),
            participant_count: self.participants.len(),
            phase: self.phase,
            started: self.phase.has_started(),
            owner_display_name: owner.display_name.clone(),
        })
    }

    /// Full state for one identity: the snapshot, plus the secret word if
    /// that identity is drawing.
    pub fn resync(&self, id: &PlayerId) -> Outbound {
        let mut out = vec![(
            Recipient::Player(id.clone()),
            ServerMessage::RoomSnapshot {
                snapshot: self.snapshot(),
            },
        )];
        out.extend(self.secret_for(id));
        out
    }

    // -- Membership -------------------------------------------------------

    /// Adds `id` to the room, or marks an existing participant connected.
    ///
    /// Returns `true` in the first slot if the identity was already seated.
    ///
    /// # Errors
    /// [`RoomError::RoomFull`] if a new seat is needed and none is free.
    pub fn join(&mut self, id: &PlayerId, display_name: &str) -> Result<(bool, Outbound), RoomError> {
        if let Some(p) = self.participant_mut(id) {
            p.display_name = display_name.to_string();
            p.connected = true;
            let out = self.resume(id);
            return Ok((true, self.with_snapshot(out)));
        }

        if self.participants.len() >= self.ctx.max_players {
            return Err(RoomError::RoomFull(self.code.clone()));
        }

        self.participants.push(Participant {
            id: id.clone(),
            display_name: display_name.to_string(),
            score: 0,
            connected: true,
            guessed: false,
            eligible: false,
        });
        tracing::info!(room = %self.code, player_id = %id, players = self.participants.len(), "player joined");

        let mut out = self.system(format!("{display_name} joined"));
        out.extend(self.resume(id));
        Ok((false, self.with_snapshot(out)))
    }

    /// Removes `id` from the participant list and the turn order.
    ///
    /// A drawer leaving mid-round enters the grace path rather than being
    /// replaced on the spot.
    pub fn leave(&mut self, id: &PlayerId) -> Result<Outbound, RoomError> {
        let index = self
            .participants
            .iter()
            .position(|p| p.id == *id)
            .ok_or_else(|| RoomError::NotInRoom(id.clone(), self.code.clone()))?;
        let gone = self.participants.remove(index);
        if index < self.next_turn {
            self.next_turn -= 1;
        }
        tracing::info!(room = %self.code, player_id = %id, players = self.participants.len(), "player left");

        if self.participants.is_empty() {
            self.clear_timers();
            return Ok(Vec::new());
        }

        let mut out = self.system(format!("{} left", gone.display_name));
        out.extend(self.drawer_lost(id));
        out.extend(self.check_round_complete());
        Ok(self.with_snapshot(out))
    }

    /// The identity's connection dropped; it keeps its seat.
    pub fn disconnect(&mut self, id: &PlayerId) -> Outbound {
        match self.participant_mut(id) {
            Some(p) if p.connected => p.connected = false,
            _ => return Vec::new(),
        }
        let mut out = self.drawer_lost(id);
        out.extend(self.check_round_complete());
        self.with_snapshot(out)
    }

    /// The identity is back on a new connection.
    pub fn reconnect(&mut self, id: &PlayerId) -> Outbound {
        match self.participant_mut(id) {
            Some(p) => p.connected = true,
            None => return Vec::new(),
        }
        let out = self.resume(id);
        self.with_snapshot(out)
    }

    // -- Round control ----------------------------------------------------

    /// Starts a fresh game: scores reset, first drawer from the top of the
    /// turn order.
    ///
    /// # Errors
    /// - [`RoomError::NotInRoom`]: `by` is not seated here
    /// - [`RoomError::InvalidPhase`]: a game is in progress
    /// - [`RoomError::NotEnoughPlayers`]: too few connected participants
    pub fn start(&mut self, by: &PlayerId) -> Result<Outbound, RoomError> {
        self.require_member(by)?;
        if !matches!(self.phase, Phase::Waiting | Phase::GameEnd) {
            return Err(RoomError::InvalidPhase(self.phase));
        }
        let present = self.connected_count();
        if present < self.ctx.game.min_players {
            return Err(RoomError::NotEnoughPlayers {
                needed: self.ctx.game.min_players,
                present,
            });
        }

        self.initialize();
        tracing::info!(room = %self.code, player_id = %by, players = present, "game started");
        let out = self.begin_round();
        Ok(self.with_snapshot(out))
    }

    /// Checks a guess against the secret word.
    ///
    /// # Errors
    /// - [`RoomError::EmptyText`]: blank guess
    /// - [`RoomError::NotInRoom`]: `by` is not seated here
    /// - [`RoomError::InvalidPhase`]: no round is live
    /// - [`RoomError::DrawerCannotGuess`]: `by` is the drawer
    pub fn guess(&mut self, by: &PlayerId, text: &str) -> Result<(GuessOutcome, Outbound), RoomError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RoomError::EmptyText);
        }
        self.require_member(by)?;
        if self.phase != Phase::Drawing {
            return Err(RoomError::InvalidPhase(self.phase));
        }
        let Some(round) = self.round.as_mut() else {
            return Err(RoomError::InvalidPhase(self.phase));
        };
        // A replaced drawer has already seen the word.
        if self.drawer.id() == Some(by) || round.drawers.contains(by) {
            return Err(RoomError::DrawerCannotGuess);
        }
        let Some(guesser) = self.participants.iter_mut().find(|p| p.id == *by) else {
            return Err(RoomError::NotInRoom(by.clone(), self.code.clone()));
        };

        let is_correct = logic::is_match(text, &round.word);
        let reply = |outcome: GuessOutcome| {
            (
                Recipient::Player(by.clone()),
                ServerMessage::GuessResult { outcome },
            )
        };

        if !is_correct {
            let outcome = GuessOutcome {
                is_correct: false,
                score_delta: 0,
                already_guessed: false,
            };
            let line = ChatLine::chat(by.clone(), guesser.display_name.clone(), text);
            let mut out = vec![reply(outcome)];
            out.extend(self.push_line(line));
            return Ok((outcome, self.with_snapshot(out)));
        }

        if guesser.guessed {
            let outcome = GuessOutcome {
                is_correct: true,
                score_delta: 0,
                already_guessed: true,
            };
            return Ok((outcome, vec![reply(outcome)]));
        }

        let score_delta = logic::guess_score(ScoreInput {
            base: self.ctx.game.guess_points,
            time_bonus: self.ctx.game.time_bonus,
            letters: logic::revealable_letters(&round.word),
            revealed: round.revealed_count(),
            remaining_secs: round.remaining,
            round_secs: self.ctx.game.round_secs(),
        });
        guesser.score += score_delta;
        guesser.guessed = true;
        round.correct += 1;
        *round.deltas.entry(by.clone()).or_default() += score_delta;
        let name = guesser.display_name.clone();
        tracing::info!(room = %self.code, player_id = %by, score_delta, "correct guess");

        let outcome = GuessOutcome {
            is_correct: true,
            score_delta,
            already_guessed: false,
        };
        let mut out = vec![reply(outcome)];
        out.extend(self.system(format!("{name} guessed the word!")));
        out.extend(self.check_round_complete());
        Ok((outcome, self.with_snapshot(out)))
    }

    /// Appends a chat line from a participant.
    pub fn chat(&mut self, by: &PlayerId, text: &str) -> Result<Outbound, RoomError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RoomError::EmptyText);
        }
        let name = self.require_member(by)?.display_name.clone();
        let out = self.push_line(ChatLine::chat(by.clone(), name, text));
        Ok(self.with_snapshot(out))
    }

    /// Appends to the stroke log. Only the active drawer may draw.
    pub fn stroke_append(&mut self, by: &PlayerId, stroke: Value) -> Result<Outbound, RoomError> {
        self.require_canvas(by)?;
        self.strokes.push(stroke.clone());
        Ok(vec![(
            Recipient::AllExcept(by.clone()),
            ServerMessage::StrokeAppended { stroke },
        )])
    }

    /// Clears the stroke log. Only the active drawer may clear.
    pub fn stroke_clear(&mut self, by: &PlayerId) -> Result<Outbound, RoomError> {
        self.require_canvas(by)?;
        self.strokes.clear();
        Ok(vec![(Recipient::All, ServerMessage::StrokeCleared)])
    }

    /// Handles a timer firing. Stale firings are ignored.
    pub fn on_timer(&mut self, timer: RoomTimer, id: TimerId) -> Outbound {
        let current = match timer {
            RoomTimer::RoundClock => self.round_clock.as_ref(),
            RoomTimer::Reveal => self.reveal.as_ref(),
            RoomTimer::NextRound => self.next_round.as_ref(),
            RoomTimer::DrawerGrace => match &self.drawer {
                DrawerSlot::Pending { grace, .. } => Some(grace),
                _ => None,
            },
        };
        if !current.is_some_and(|h| h.matches(id)) {
            tracing::debug!(room = %self.code, ?timer, %id, "stale timer ignored");
            return Vec::new();
        }

        match timer {
            RoomTimer::RoundClock => self.tick_clock(),
            RoomTimer::Reveal => self.tick_reveal(),
            RoomTimer::NextRound => {
                self.next_round = None;
                self.advance()
            }
            RoomTimer::DrawerGrace => self.reassign_drawer(),
        }
    }

    // -- Transitions ------------------------------------------------------

    /// Resets the game: scores to zero, turn order from the top.
    fn initialize(&mut self) {
        self.clear_timers();
        for p in &mut self.participants {
            p.score = 0;
            p.guessed = false;
            p.eligible = false;
        }
        self.round_number = 0;
        self.next_turn = 0;
        self.drawer = DrawerSlot::Empty;
        self.round = None;
        self.used_words.clear();
        self.strokes.clear();
        self.phase = Phase::Waiting;
    }

    fn begin_round(&mut self) -> Outbound {
        self.clear_timers();

        let Some((index, drawer)) = self.next_drawer(|_| true) else {
            return self.back_to_waiting("Not enough players, waiting for more");
        };
        let word = {
            let mut rng = rand::rng();
            logic::pick_word(&self.ctx.game.words, &self.used_words, &mut rng).cloned()
        };
        let Some(word) = word else {
            tracing::warn!(room = %self.code, "no words configured");
            return self.back_to_waiting("No words configured");
        };

        self.next_turn = index + 1;
        self.round_number += 1;
        for p in &mut self.participants {
            p.guessed = false;
            p.eligible = p.connected && p.id != drawer;
        }
        self.used_words.push(word.clone());
        let word_length = word.chars().count();
        self.round = Some(Round {
            revealed: vec![false; word_length],
            word,
            remaining: self.ctx.game.round_secs(),
            correct: 0,
            deltas: HashMap::new(),
            drawers: vec![drawer.clone()],
        });
        self.drawer = DrawerSlot::Active(drawer.clone());
        self.strokes.clear();
        self.round_started_at = self.ctx.clock.now();
        self.phase = Phase::Drawing;
        self.round_clock = Some(self.spawn_periodic(RoomTimer::RoundClock, Duration::from_secs(1)));
        self.reveal = Some(self.spawn_periodic(RoomTimer::Reveal, self.ctx.game.reveal_interval));

        tracing::info!(room = %self.code, round = self.round_number, drawer = %drawer, "round started");

        let name = self.display_name(&drawer);
        let mut out = vec![(
            Recipient::All,
            ServerMessage::RoundStarted {
                round: self.round_number,
                max_rounds: self.ctx.game.max_rounds,
                drawer: drawer.clone(),
                word_length,
            },
        )];
        out.extend(self.secret_for(&drawer));
        out.extend(self.system(format!("Round {}: {name} is drawing", self.round_number)));
        out
    }

    fn end_round(&mut self) -> Outbound {
        self.round_clock = None;
        self.reveal = None;
        // Dropping a pending slot cancels the grace timer.
        self.drawer = match std::mem::replace(&mut self.drawer, DrawerSlot::Empty) {
            DrawerSlot::Pending { drawer, .. } | DrawerSlot::Active(drawer) => DrawerSlot::Active(drawer),
            DrawerSlot::Empty => DrawerSlot::Empty,
        };
        let Some(round) = self.round.as_mut() else {
            return Vec::new();
        };

        if round.correct > 0 {
            if let Some(drawer) = self.drawer.id() {
                if let Some(p) = self.participants.iter_mut().find(|p| p.id == *drawer) {
                    p.score += self.ctx.game.draw_points;
                    *round.deltas.entry(drawer.clone()).or_default() += self.ctx.game.draw_points;
                }
            }
        }
        round.revealed.iter_mut().for_each(|r| *r = true);
        let word = round.word.clone();
        let deltas: Vec<ScoreDelta> = self
            .participants
            .iter()
            .map(|p| ScoreDelta {
                identity: p.id.clone(),
                display_name: p.display_name.clone(),
                delta: round.deltas.get(&p.id).copied().unwrap_or(0),
                total: p.score,
            })
            .collect();

        self.phase = Phase::RoundEnd;
        tracing::info!(room = %self.code, round = self.round_number, correct = round.correct, "round ended");

        let mut out = vec![(
            Recipient::All,
            ServerMessage::RoundEnded {
                round: self.round_number,
                word: word.clone(),
                deltas,
            },
        )];
        out.extend(self.system(format!("The word was {word}")));

        if self.round_number >= self.ctx.game.max_rounds {
            self.phase = Phase::GameEnd;
            tracing::info!(room = %self.code, "game ended");
            out.push((
                Recipient::All,
                ServerMessage::GameEnded {
                    ranking: self.ranking(),
                },
            ));
        } else {
            let code = self.code.clone();
            self.next_round = Some(spawn_once(
                self.ctx.game.next_round_delay,
                self.ctx.timers.clone(),
                move |id| RoomTimerFired {
                    code,
                    timer: RoomTimer::NextRound,
                    id,
                },
            ));
        }
        out
    }

    /// Inter-round delay elapsed.
    fn advance(&mut self) -> Outbound {
        if self.phase != Phase::RoundEnd {
            return Vec::new();
        }
        let out = if self.connected_count() < self.ctx.game.min_players {
            self.back_to_waiting("Not enough players, waiting for more")
        } else {
            self.begin_round()
        };
        self.with_snapshot(out)
    }

    fn back_to_waiting(&mut self, why: &str) -> Outbound {
        self.clear_timers();
        self.drawer = DrawerSlot::Empty;
        self.round = None;
        self.phase = Phase::Waiting;
        tracing::info!(room = %self.code, "back to waiting");
        self.system(why.to_string())
    }

    fn tick_clock(&mut self) -> Outbound {
        let Some(round) = self.round.as_mut() else {
            return Vec::new();
        };
        round.remaining = round.remaining.saturating_sub(1);
        let remaining = round.remaining;
        let mut out = vec![(Recipient::All, ServerMessage::RoundClock { remaining })];
        if remaining == 0 {
            out.extend(self.end_round());
            return self.with_snapshot(out);
        }
        out
    }

    fn tick_reveal(&mut self) -> Outbound {
        let Some(round) = self.round.as_mut() else {
            return Vec::new();
        };
        let mut rng = rand::rng();
        if logic::reveal_one(&round.word, &mut round.revealed, &mut rng).is_none() {
            self.reveal = None;
            return Vec::new();
        }
        let out = vec![(
            Recipient::All,
            ServerMessage::RoundHint {
                masked_word: round.masked(),
                revealed_count: round.revealed_count(),
            },
        )];
        self.with_snapshot(out)
    }

    /// Enters the pending state if `id` is the active drawer of a live round.
    fn drawer_lost(&mut self, id: &PlayerId) -> Outbound {
        if self.phase != Phase::Drawing {
            return Vec::new();
        }
        match &self.drawer {
            DrawerSlot::Active(drawer) if drawer == id => {}
            _ => return Vec::new(),
        }
        let code = self.code.clone();
        let grace = spawn_once(self.ctx.game.drawer_grace, self.ctx.timers.clone(), move |id| {
            RoomTimerFired {
                code,
                timer: RoomTimer::DrawerGrace,
                id,
            }
        });
        self.drawer = DrawerSlot::Pending {
            drawer: id.clone(),
            grace,
        };
        tracing::info!(room = %self.code, drawer = %id, "drawer lost, grace started");
        vec![(
            Recipient::All,
            ServerMessage::DrawerDisconnected {
                drawer: id.clone(),
                grace_secs: self.ctx.game.drawer_grace.as_secs(),
            },
        )]
    }

    /// Restores a pending drawer and resends the secret if needed.
    fn resume(&mut self, id: &PlayerId) -> Outbound {
        let mut out = Vec::new();
        let returning = matches!(&self.drawer, DrawerSlot::Pending { drawer, .. } if drawer == id);
        if returning {
            self.drawer = DrawerSlot::Active(id.clone());
            tracing::info!(room = %self.code, drawer = %id, "drawer reconnected");
            out.push((
                Recipient::All,
                ServerMessage::DrawerReconnected { drawer: id.clone() },
            ));
        }
        out.extend(self.secret_for(id));
        out
    }

    /// Grace elapsed: hand the role to the next connected identity in turn
    /// order that has neither drawn nor guessed this round, or end the round
    /// if there is none.
    fn reassign_drawer(&mut self) -> Outbound {
        let previous = match std::mem::replace(&mut self.drawer, DrawerSlot::Empty) {
            DrawerSlot::Pending { drawer, .. } => drawer,
            other => {
                self.drawer = other;
                return Vec::new();
            }
        };

        let successor = {
            let drew = self.round.as_ref().map(|r| r.drawers.as_slice()).unwrap_or_default();
            self.next_drawer(|p| p.id != previous && !p.guessed && !drew.contains(&p.id))
        };
        let Some((index, next)) = successor else {
            tracing::info!(room = %self.code, %previous, "no one to take over drawing");
            self.drawer = DrawerSlot::Active(previous);
            let out = self.end_round();
            return self.with_snapshot(out);
        };

        self.next_turn = index + 1;
        if let Some(p) = self.participants.get_mut(index) {
            p.eligible = false;
        }
        if let Some(round) = self.round.as_mut() {
            round.drawers.push(next.clone());
        }
        self.drawer = DrawerSlot::Active(next.clone());
        self.strokes.clear();
        tracing::info!(room = %self.code, %previous, drawer = %next, "drawer reassigned");

        let name = self.display_name(&next);
        let mut out = vec![
            (
                Recipient::All,
                ServerMessage::DrawerChanged {
                    previous,
                    drawer: next.clone(),
                },
            ),
            (Recipient::All, ServerMessage::StrokeCleared),
        ];
        out.extend(self.secret_for(&next));
        out.extend(self.system(format!("{name} is now drawing")));
        out.extend(self.check_round_complete());
        self.with_snapshot(out)
    }

    /// Ends the round once every eligible, connected guesser has guessed.
    fn check_round_complete(&mut self) -> Outbound {
        if self.phase != Phase::Drawing {
            return Vec::new();
        }
        let all_guessed = {
            let drawer = self.drawer.id();
            let mut waiting_on = self
                .participants
                .iter()
                .filter(|p| p.eligible && p.connected && Some(&p.id) != drawer)
                .peekable();
            waiting_on.peek().is_some() && waiting_on.all(|p| p.guessed)
        };
        if all_guessed { self.end_round() } else { Vec::new() }
    }

    // -- Helpers ----------------------------------------------------------

    /// First connected participant at or after `next_turn` that passes
    /// `allowed`, wrapping.
    fn next_drawer(&self, allowed: impl Fn(&Participant) -> bool) -> Option<(usize, PlayerId)> {
        let len = self.participants.len();
        (0..len)
            .map(|k| (self.next_turn + k) % len)
            .find(|&i| {
                let p = &self.participants[i];
                p.connected && allowed(p)
            })
            .map(|i| (i, self.participants[i].id.clone()))
    }

    fn ranking(&self) -> Vec<RankEntry> {
        let mut sorted: Vec<&Participant> = self.participants.iter().collect();
        sorted.sort_by(|a, b| b.score.cmp(&a.score));
        let mut ranking: Vec<RankEntry> = Vec::with_capacity(sorted.len());
        for (i, p) in sorted.into_iter().enumerate() {
            let rank = match ranking.last() {
                Some(prev) if prev.score == p.score => prev.rank,
                _ => i + 1,
            };
            ranking.push(RankEntry {
                rank,
                identity: p.id.clone(),
                display_name: p.display_name.clone(),
                score: p.score,
            });
        }
        ranking
    }

    fn secret_for(&self, id: &PlayerId) -> Outbound {
        match (&self.drawer, &self.round) {
            (DrawerSlot::Active(drawer), Some(round)) if self.phase == Phase::Drawing && drawer == id => {
                vec![(
                    Recipient::Player(id.clone()),
                    ServerMessage::RoundSecret {
                        word: round.word.clone(),
                    },
                )]
            }
            _ => Vec::new(),
        }
    }

    fn require_member(&self, id: &PlayerId) -> Result<&Participant, RoomError> {
        self.participant(id)
            .ok_or_else(|| RoomError::NotInRoom(id.clone(), self.code.clone()))
    }

    fn require_canvas(&self, by: &PlayerId) -> Result<(), RoomError> {
        self.require_member(by)?;
        if self.phase != Phase::Drawing {
            return Err(RoomError::InvalidPhase(self.phase));
        }
        match &self.drawer {
            DrawerSlot::Active(drawer) if drawer == by => Ok(()),
            _ => Err(RoomError::NotDrawer(by.clone())),
        }
    }

    fn participant_mut(&mut self, id: &PlayerId) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.id == *id)
    }

    fn display_name(&self, id: &PlayerId) -> String {
        self.participant(id)
            .map_or_else(|| id.to_string(), |p| p.display_name.clone())
    }

    fn connected_count(&self) -> usize {
        self.participants.iter().filter(|p| p.connected).count()
    }

    fn system(&mut self, text: String) -> Outbound {
        self.push_line(ChatLine::system(text))
    }

    fn push_line(&mut self, line: ChatLine) -> Outbound {
        self.messages.push_back(line.clone());
        while self.messages.len() > self.ctx.max_chat_log {
            self.messages.pop_front();
        }
        vec![(Recipient::All, ServerMessage::RoomChat { line })]
    }

    fn with_snapshot(&self, mut out: Outbound) -> Outbound {
        out.push((
            Recipient::All,
            ServerMessage::RoomSnapshot {
                snapshot: self.snapshot(),
            },
        ));
        out
    }

    fn spawn_periodic(&self, timer: RoomTimer, period: Duration) -> TimerHandle {
        let code = self.code.clone();
        spawn_interval(period, self.ctx.timers.clone(), move |id, _| RoomTimerFired {
            code: code.clone(),
            timer,
            id,
        })
    }

    fn clear_timers(&mut self) {
        self.round_clock = None;
        self.reveal = None;
        self.next_round = None;
        if self.drawer_pending() {
            if let DrawerSlot::Pending { drawer, .. } = std::mem::replace(&mut self.drawer, DrawerSlot::Empty) {
                self.drawer = DrawerSlot::Active(drawer);
            }
        }
    }
}
