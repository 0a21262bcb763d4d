use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use session_types::{
    GUESS_MAX, GUESS_MIN, GuessScore, LeaderboardRow, NetMessage, Participant, ParticipantId,
    RoundPhase, RoundState, SessionError, guess_in_range,
};
use tracing::{info, warn};

use crate::leaderboard;
use crate::scoring::points;
use crate::{Delivery, Directive, GuessCollector, PairOutcome, Roster, SessionTotals, TimerKind};

/// Fixed-delay policy knobs. Plain constants with no backoff or jitter.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub total_rounds: u32,
    pub round_advance_delay: Duration,
    pub restart_settle_delay: Duration,
    pub finalize_grace: Duration,
    /// When set, the authority defers the secret draw to the round host,
    /// who supplies it together with the hint.
    pub host_picks_secret: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            total_rounds: 5,
            round_advance_delay: Duration::from_secs(5),
            restart_settle_delay: Duration::from_secs(1),
            finalize_grace: Duration::from_secs(5),
            host_picks_secret: false,
        }
    }
}

/// The per-peer round state machine.
///
/// One controller runs on every participant; the one whose id the roster
/// elects as authority advances phases, everyone else mirrors authoritative
/// broadcasts. Each inbound event is processed to completion before the
/// next (cooperative dispatch), and every side effect is returned as a
/// [`Directive`] for the embedding runtime to execute.
#[derive(Debug)]
pub struct RoundController {
    local: Participant,
    config: SessionConfig,
    roster: Roster,
    phase: RoundPhase,
    round: Option<RoundState>,
    guesses: GuessCollector,
    totals: SessionTotals,
    hosted: BTreeSet<ParticipantId>,
    total_rounds: u32,
    finalized_round: u32,
    restart_pending: bool,
    leaderboard: Option<Vec<LeaderboardRow>>,
    timers: HashMap<TimerKind, u64>,
    next_timer_generation: u64,
    rng: StdRng,
}

impl RoundController {
    pub fn new(local: Participant, config: SessionConfig) -> Self {
        Self::with_rng(local, config, StdRng::from_entropy())
    }

    /// Deterministic construction for tests.
    pub fn with_seed(local: Participant, config: SessionConfig, seed: u64) -> Self {
        Self::with_rng(local, config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(local: Participant, config: SessionConfig, rng: StdRng) -> Self {
        let mut roster = Roster::new();
        roster.upsert(local.clone());
        let total_rounds = config.total_rounds;
        Self {
            local,
            config,
            roster,
            phase: RoundPhase::Idle,
            round: None,
            guesses: GuessCollector::new(),
            totals: SessionTotals::new(),
            hosted: BTreeSet::new(),
            total_rounds,
            finalized_round: 0,
            restart_pending: false,
            leaderboard: None,
            timers: HashMap::new(),
            next_timer_generation: 0,
            rng,
        }
    }

    pub fn local_id(&self) -> ParticipantId {
        self.local.id
    }

    pub fn phase(&self) -> RoundPhase {
        self.phase
    }

    pub fn round(&self) -> Option<&RoundState> {
        self.round.as_ref()
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn totals(&self) -> &SessionTotals {
        &self.totals
    }

    pub fn guesses(&self) -> &GuessCollector {
        &self.guesses
    }

    pub fn leaderboard(&self) -> Option<&[LeaderboardRow]> {
        self.leaderboard.as_deref()
    }

    pub fn is_authority(&self) -> bool {
        self.roster.authority() == Some(self.local.id)
    }

    /// Move the engine's vantage point to another known participant.
    ///
    /// Hosted runtimes run a single engine per session on behalf of the
    /// current authority; after an authority departure they re-seat the
    /// engine as the successor before reporting the departure, so the
    /// takeover paths run on the surviving state.
    pub fn seat(&mut self, participant: ParticipantId) -> Result<(), SessionError> {
        let known = self
            .roster
            .get(participant)
            .ok_or(SessionError::ParticipantNotFound { id: participant })?;
        self.local = known.clone();
        Ok(())
    }

    /// Broadcast the local identity record; the runtime sends this when the
    /// local participant enters a session.
    pub fn announce_local(&self) -> Vec<Directive> {
        vec![Directive::Send {
            to: Delivery::All,
            message: NetMessage::AnnounceIdentity {
                participant: self.local.clone(),
            },
        }]
    }

    // ---- match lifecycle -------------------------------------------------

    /// Authority-only: begin a fresh match of `total_rounds` rounds.
    pub fn start_match(&mut self, total_rounds: u32) -> Result<Vec<Directive>, SessionError> {
        if self.phase == RoundPhase::Cancelled {
            return Err(SessionError::MatchCancelled.into());
        }
        if !self.is_authority() {
            return Err(SessionError::NotAuthority {
                participant: self.local.id,
            }
            .into());
        }
        if total_rounds == 0 {
            return Err(SessionError::InvalidRoundCount.into());
        }
        if self.phase != RoundPhase::Idle {
            return Err(SessionError::WrongPhase { phase: self.phase }.into());
        }

        self.total_rounds = total_rounds;
        self.reset_match_state();
        let mut out = Vec::new();
        self.begin_host_selection(false, &mut out);
        Ok(out)
    }

    /// Any peer may request a restart; only the authority acts on it, and a
    /// request while one is already pending is a no-op.
    pub fn request_restart(&mut self) -> Result<Vec<Directive>, SessionError> {
        if self.phase == RoundPhase::Cancelled {
            return Err(SessionError::MatchCancelled.into());
        }
        let mut out = vec![Directive::Send {
            to: Delivery::All,
            message: NetMessage::RequestRestart,
        }];
        self.handle_restart_request(&mut out);
        Ok(out)
    }

    // ---- local input -----------------------------------------------------

    /// Host-only: confirm the hint (and the secret, when its choice was
    /// deferred). Empty hints are rejected before anything hits the wire.
    pub fn submit_hint(
        &mut self,
        hint: &str,
        chosen_secret: Option<u8>,
    ) -> Result<Vec<Directive>, SessionError> {
        if self.phase == RoundPhase::Cancelled {
            return Err(SessionError::MatchCancelled.into());
        }
        let local_id = self.local.id;
        let round = self
            .round
            .as_mut()
            .ok_or(SessionError::WrongPhase { phase: self.phase })?;
        if round.phase != RoundPhase::HintPending {
            return Err(SessionError::WrongPhase { phase: round.phase }.into());
        }
        if round.host != local_id {
            return Err(SessionError::NotHost {
                participant: local_id,
            }
            .into());
        }
        let hint = hint.trim();
        if hint.is_empty() {
            return Err(SessionError::EmptyHint.into());
        }
        let secret = match round.secret {
            Some(secret) => secret,
            None => {
                let secret = chosen_secret.ok_or(SessionError::SecretRequired)?;
                if !guess_in_range(secret) {
                    return Err(SessionError::GuessOutOfRange { value: secret }.into());
                }
                secret
            }
        };

        round.hint = Some(hint.to_string());
        round.secret = Some(secret);
        info!(round = round.round_index, "hint confirmed, voting open");
        self.set_phase(RoundPhase::Voting);

        Ok(vec![Directive::Send {
            to: Delivery::All,
            message: NetMessage::BroadcastHint {
                hint: hint.to_string(),
                secret,
            },
        }])
    }

    /// Local guess input. Out-of-range values are rejected with no network
    /// effect; a second local guess in the same round is a silent no-op.
    pub fn submit_local_guess(
        &mut self,
        value: u8,
    ) -> Result<Vec<Directive>, SessionError> {
        if self.phase == RoundPhase::Cancelled {
            return Err(SessionError::MatchCancelled.into());
        }
        let round = self
            .round
            .as_ref()
            .ok_or(SessionError::WrongPhase { phase: self.phase })?;
        if round.phase != RoundPhase::Voting {
            return Err(SessionError::WrongPhase { phase: round.phase }.into());
        }
        if round.host == self.local.id {
            return Err(SessionError::HostCannotGuess.into());
        }
        if !guess_in_range(value) {
            return Err(SessionError::GuessOutOfRange { value }.into());
        }

        let mut out = Vec::new();
        if self.is_authority() {
            self.authority_accept_guess(self.local.id, value, &mut out);
        } else {
            if !self.guesses.submit(self.local.id, value)? {
                return Ok(out);
            }
            let authority = self
                .roster
                .authority()
                .ok_or(SessionError::MatchCancelled)?;
            out.push(Directive::Send {
                to: Delivery::One(authority),
                message: NetMessage::SubmitGuess {
                    participant: self.local.id,
                    guess: value,
                },
            });
        }
        Ok(out)
    }

    // ---- membership ------------------------------------------------------

    /// Membership-changed notification: a participant joined. Existing
    /// peers answer with a targeted identity announcement so the newcomer
    /// catches up on the roster.
    pub fn participant_joined(
        &mut self,
        participant: Participant,
    ) -> Result<Vec<Directive>, SessionError> {
        let newcomer = participant.id;
        let newly_known = self.roster.handle_announce(&participant)?;
        let mut out = Vec::new();
        if newly_known && newcomer != self.local.id {
            out.push(Directive::Send {
                to: Delivery::One(newcomer),
                message: NetMessage::AnnounceIdentity {
                    participant: self.local.clone(),
                },
            });
        }
        Ok(out)
    }

    /// Membership-changed notification: a participant left. Handles host
    /// departure, authority takeover, completion re-checks and the terminal
    /// population collapse.
    pub fn participant_left(&mut self, id: ParticipantId) -> Vec<Directive> {
        self.roster.mark_left(id);
        let mut out = Vec::new();
        if matches!(
            self.phase,
            RoundPhase::Idle | RoundPhase::LeaderboardDisplay | RoundPhase::Cancelled
        ) {
            return out;
        }

        if self.roster.connected_count() <= 1 {
            info!("population collapsed, cancelling match");
            self.cancel_all_timers(&mut out);
            self.set_phase(RoundPhase::Cancelled);
            out.push(Directive::MatchCancelled);
            return out;
        }

        if !self.is_authority() {
            // Followers only react to authoritative broadcasts.
            return out;
        }

        let host_departed = self
            .round
            .as_ref()
            .is_some_and(|r| r.host == id && r.phase != RoundPhase::RoundComplete);
        if host_departed {
            info!(host = %id, "host departed mid-round, reselecting");
            self.cancel_timer(TimerKind::FinalizeGrace, &mut out);
            self.begin_host_selection(true, &mut out);
            return out;
        }

        match self.phase {
            RoundPhase::Voting => {
                // The departed guesser no longer counts toward completion.
                if self.guesses.is_complete(self.expected_guess_count()) {
                    self.finalize_round(&mut out);
                } else if !self.timers.contains_key(&TimerKind::FinalizeGrace) {
                    self.arm_timer(TimerKind::FinalizeGrace, self.config.finalize_grace, &mut out);
                }
            }
            RoundPhase::RoundComplete => {
                // Authority takeover between rounds: the old authority's
                // advance timer died with it.
                if !self.timers.contains_key(&TimerKind::NextRound) {
                    self.arm_timer(TimerKind::NextRound, self.config.round_advance_delay, &mut out);
                }
            }
            RoundPhase::HostSelection => {
                // Took over before the old authority announced a host.
                self.begin_host_selection(false, &mut out);
            }
            _ => {}
        }
        out
    }

    // ---- inbound protocol ------------------------------------------------

    /// Typed dispatch for one inbound peer message. Messages arriving after
    /// cancellation are dropped.
    pub fn handle_message(
        &mut self,
        from: ParticipantId,
        message: NetMessage,
    ) -> Result<Vec<Directive>, SessionError> {
        if self.phase == RoundPhase::Cancelled {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        match message {
            NetMessage::SetHost { host, secret } => {
                self.handle_set_host(from, host, secret);
            }
            NetMessage::BroadcastHint { hint, secret } => {
                self.handle_broadcast_hint(from, hint, secret);
            }
            NetMessage::SubmitGuess { participant, guess } => {
                if self.is_authority() {
                    self.authority_accept_guess(participant, guess, &mut out);
                } else {
                    warn!(from = %from, "guess addressed to a non-authority peer, dropping");
                }
            }
            NetMessage::MirrorGuess { participant, guess } => {
                // Read-only mirror for display; the authority alone decides
                // completion from its own collector.
                if !self.is_authority() && self.phase == RoundPhase::Voting {
                    if let Err(err) = self.guesses.submit(participant, guess) {
                        warn!(%err, "ignoring invalid mirrored guess");
                    }
                }
            }
            NetMessage::FinalizeRound {
                round_index,
                results,
            } => {
                self.handle_finalize(from, round_index, &results, &mut out);
            }
            NetMessage::ShowLeaderboard { rows } => {
                if Some(from) == self.roster.authority() {
                    self.leaderboard = Some(rows);
                    self.set_phase(RoundPhase::LeaderboardDisplay);
                }
            }
            NetMessage::RequestRestart => {
                self.handle_restart_request(&mut out);
            }
            NetMessage::AnnounceIdentity { participant } => {
                self.roster.handle_announce(&participant)?;
            }
        }
        Ok(out)
    }

    /// A previously armed timer fired. Stale generations are superseded
    /// timers and must be ignored.
    pub fn timer_fired(&mut self, kind: TimerKind, generation: u64) -> Vec<Directive> {
        let mut out = Vec::new();
        if self.timers.get(&kind) != Some(&generation) {
            return out;
        }
        self.timers.remove(&kind);
        if self.phase == RoundPhase::Cancelled || !self.is_authority() {
            return out;
        }
        match kind {
            TimerKind::NextRound => {
                if self.phase == RoundPhase::RoundComplete {
                    self.begin_host_selection(false, &mut out);
                }
            }
            TimerKind::RestartSettle => {
                self.reset_match_state();
                self.begin_host_selection(false, &mut out);
            }
            TimerKind::FinalizeGrace => {
                if self.phase == RoundPhase::Voting {
                    info!("finalize grace elapsed, scoring with received guesses");
                    self.finalize_round(&mut out);
                }
            }
        }
        out
    }

    // ---- internals -------------------------------------------------------

    fn set_phase(&mut self, phase: RoundPhase) {
        self.phase = phase;
        if let Some(round) = self.round.as_mut() {
            round.phase = phase;
        }
    }

    fn reset_match_state(&mut self) {
        self.totals.reset();
        self.guesses.clear();
        self.hosted.clear();
        self.finalized_round = 0;
        self.leaderboard = None;
        self.restart_pending = false;
        self.round = None;
        self.set_phase(RoundPhase::Idle);
    }

    /// Authority-side host selection. `same_round` re-runs the current
    /// round after a host departure instead of advancing the index.
    fn begin_host_selection(&mut self, same_round: bool, out: &mut Vec<Directive>) {
        let connected: Vec<Participant> = self.roster.connected().cloned().collect();
        if connected.len() <= 1 {
            self.cancel_all_timers(out);
            self.set_phase(RoundPhase::Cancelled);
            out.push(Directive::MatchCancelled);
            return;
        }

        let host = connected[self.rng.gen_range(0..connected.len())].id;
        let secret = if self.config.host_picks_secret {
            None
        } else {
            Some(self.rng.gen_range(GUESS_MIN..=GUESS_MAX))
        };
        let round_index = if same_round {
            self.round
                .as_ref()
                .map(|r| r.round_index)
                .unwrap_or(self.finalized_round + 1)
        } else {
            self.finalized_round + 1
        };

        self.guesses.clear();
        let mut state = RoundState::new(round_index, host, secret);
        state.phase = RoundPhase::HintPending;
        self.round = Some(state);
        self.phase = RoundPhase::HintPending;
        self.hosted.insert(host);
        info!(round = round_index, host = %host, "host selected");

        out.push(Directive::Send {
            to: Delivery::All,
            message: NetMessage::SetHost { host, secret },
        });
    }

    /// Follower-side adoption of the authoritative host/secret pair. A
    /// follower never draws its own secret; it waits for this value.
    fn handle_set_host(&mut self, from: ParticipantId, host: ParticipantId, secret: Option<u8>) {
        if Some(from) != self.roster.authority() {
            warn!(from = %from, "SetHost from non-authority peer, dropping");
            return;
        }
        if self.is_authority() {
            return;
        }

        // A pending restart supersedes whatever round is in flight; the
        // incoming host opens the rematch at round one. Only without one is
        // a SetHost during an active round a host reselection that keeps
        // the current index.
        if self.restart_pending {
            self.reset_match_state();
        }
        let reselect = matches!(
            self.phase,
            RoundPhase::HintPending | RoundPhase::Voting | RoundPhase::Finalizing
        );
        let round_index = if reselect {
            self.round
                .as_ref()
                .map(|r| r.round_index)
                .unwrap_or(self.finalized_round + 1)
        } else {
            self.finalized_round + 1
        };

        self.guesses.clear();
        let mut state = RoundState::new(round_index, host, secret);
        state.phase = RoundPhase::HintPending;
        self.round = Some(state);
        self.phase = RoundPhase::HintPending;
        self.hosted.insert(host);
    }

    fn handle_broadcast_hint(&mut self, from: ParticipantId, hint: String, secret: u8) {
        let Some(round) = self.round.as_mut() else {
            return;
        };
        if round.host != from {
            warn!(from = %from, "hint from a non-host peer, dropping");
            return;
        }
        if round.phase != RoundPhase::HintPending {
            return;
        }
        if hint.trim().is_empty() || !guess_in_range(secret) {
            warn!(from = %from, "malformed hint broadcast, dropping");
            return;
        }
        round.hint = Some(hint);
        round.secret = Some(secret);
        self.set_phase(RoundPhase::Voting);
    }

    /// Authority-side guess intake: dedup, mirror, completion check.
    fn authority_accept_guess(
        &mut self,
        from: ParticipantId,
        value: u8,
        out: &mut Vec<Directive>,
    ) {
        let Some(round) = self.round.as_ref() else {
            return;
        };
        if round.phase != RoundPhase::Voting || round.host == from {
            return;
        }
        if self.roster.get(from).is_none() {
            warn!(from = %from, "guess from unknown participant, dropping");
            return;
        }
        match self.guesses.submit(from, value) {
            Ok(true) => {
                out.push(Directive::Send {
                    to: Delivery::AllExcept(from),
                    message: NetMessage::MirrorGuess {
                        participant: from,
                        guess: value,
                    },
                });
                if self.guesses.is_complete(self.expected_guess_count()) {
                    self.finalize_round(out);
                }
            }
            Ok(false) => {} // duplicate, first submission wins
            Err(err) => warn!(%err, from = %from, "rejecting invalid guess"),
        }
    }

    /// Connected participants minus the host.
    fn expected_guess_count(&self) -> usize {
        let host = self.round.as_ref().map(|r| r.host);
        self.roster
            .connected()
            .filter(|p| Some(p.id) != host)
            .count()
    }

    /// Authority-side: score every received guess and broadcast the full
    /// finalized set once, so divergence cannot survive lost mirrors.
    fn finalize_round(&mut self, out: &mut Vec<Directive>) {
        let Some(round) = self.round.clone() else {
            return;
        };
        let Some(secret) = round.secret else {
            warn!("cannot finalize a round without an authoritative secret");
            return;
        };
        self.cancel_timer(TimerKind::FinalizeGrace, out);
        self.set_phase(RoundPhase::Finalizing);

        let results: Vec<GuessScore> = self
            .guesses
            .iter()
            .map(|(participant, guess)| GuessScore {
                participant,
                guess,
                points: points(secret, guess),
            })
            .collect();

        out.push(Directive::Send {
            to: Delivery::All,
            message: NetMessage::FinalizeRound {
                round_index: round.round_index,
                results: results.clone(),
            },
        });
        self.apply_finalize(round.round_index, round.host, &results, out);
        self.advance_or_finish(out);
    }

    /// Apply a finalized result set. Idempotent: a round index at or below
    /// the last applied one is a duplicate delivery and a no-op.
    fn apply_finalize(
        &mut self,
        round_index: u32,
        host: ParticipantId,
        results: &[GuessScore],
        out: &mut Vec<Directive>,
    ) {
        if round_index <= self.finalized_round {
            return;
        }

        let host_avatar = self
            .roster
            .get(host)
            .map(|p| p.avatar_index)
            .unwrap_or_default();
        let mut outcomes = Vec::with_capacity(results.len());
        for result in results {
            self.totals.add(result.participant, result.points);
            let guesser_avatar = self
                .roster
                .get(result.participant)
                .map(|p| p.avatar_index)
                .unwrap_or_default();
            outcomes.push(PairOutcome {
                guesser: result.participant,
                guesser_avatar,
                host,
                host_avatar,
                points: result.points,
            });
        }
        self.finalized_round = round_index;
        self.set_phase(RoundPhase::RoundComplete);
        info!(round = round_index, scored = results.len(), "round finalized");
        if !outcomes.is_empty() {
            out.push(Directive::RecordOutcomes { outcomes });
        }
    }

    fn handle_finalize(
        &mut self,
        from: ParticipantId,
        round_index: u32,
        results: &[GuessScore],
        out: &mut Vec<Directive>,
    ) {
        if Some(from) != self.roster.authority() {
            warn!(from = %from, "finalize from non-authority peer, dropping");
            return;
        }
        let Some(host) = self.round.as_ref().map(|r| r.host) else {
            return;
        };
        // Converge the local mirror on the authoritative set; a mirror that
        // raced past the finalize is overridden by first-wins semantics.
        for result in results {
            let _ = self.guesses.submit(result.participant, result.guess);
        }
        self.apply_finalize(round_index, host, results, out);
    }

    fn handle_restart_request(&mut self, out: &mut Vec<Directive>) {
        if self.restart_pending {
            return; // restart already in flight
        }
        self.restart_pending = true;
        if !self.is_authority() {
            return;
        }
        info!("restart requested, settling");
        self.cancel_timer(TimerKind::NextRound, out);
        self.cancel_timer(TimerKind::FinalizeGrace, out);
        self.arm_timer(
            TimerKind::RestartSettle,
            self.config.restart_settle_delay,
            out,
        );
    }

    fn advance_or_finish(&mut self, out: &mut Vec<Directive>) {
        if self.finalized_round < self.total_rounds {
            self.arm_timer(TimerKind::NextRound, self.config.round_advance_delay, out);
        } else {
            let rows = leaderboard::aggregate(&self.totals, &self.roster, &self.hosted);
            self.leaderboard = Some(rows.clone());
            self.set_phase(RoundPhase::LeaderboardDisplay);
            out.push(Directive::Send {
                to: Delivery::All,
                message: NetMessage::ShowLeaderboard { rows },
            });
        }
    }

    fn arm_timer(&mut self, kind: TimerKind, delay: Duration, out: &mut Vec<Directive>) {
        self.next_timer_generation += 1;
        let generation = self.next_timer_generation;
        self.timers.insert(kind, generation);
        out.push(Directive::StartTimer {
            kind,
            generation,
            delay,
        });
    }

    fn cancel_timer(&mut self, kind: TimerKind, out: &mut Vec<Directive>) {
        if self.timers.remove(&kind).is_some() {
            out.push(Directive::CancelTimer { kind });
        }
    }

    fn cancel_all_timers(&mut self, out: &mut Vec<Directive>) {
        for kind in [
            TimerKind::NextRound,
            TimerKind::RestartSettle,
            TimerKind::FinalizeGrace,
        ] {
            self.cancel_timer(kind, out);
        }
    }
}
