use std::collections::{BTreeMap, BTreeSet};

use session_core::{
    Delivery, Directive, PairOutcome, RoundController, SessionConfig, TimerKind,
};
use session_types::{Participant, ParticipantId, RoundPhase};

/// In-memory hub wiring several controllers together: sends are delivered
/// synchronously per the directive's delivery target, timers are recorded
/// and fired explicitly by the test, recorded outcomes are captured.
struct Hub {
    peers: BTreeMap<u32, RoundController>,
    timers: BTreeMap<(u32, TimerKind), u64>,
    outcomes: Vec<(u32, Vec<PairOutcome>)>,
    cancelled: BTreeSet<u32>,
}

fn participant(id: u32) -> Participant {
    Participant {
        id: ParticipantId(id),
        display_name: format!("Peer{}", id),
        avatar_index: (id % 4) as u8,
    }
}

impl Hub {
    fn new(ids: &[u32]) -> Self {
        let mut hub = Self {
            peers: BTreeMap::new(),
            timers: BTreeMap::new(),
            outcomes: Vec::new(),
            cancelled: BTreeSet::new(),
        };
        for (i, &id) in ids.iter().enumerate() {
            hub.peers.insert(
                id,
                RoundController::with_seed(participant(id), SessionConfig::default(), 100 + i as u64),
            );
        }
        // Everyone learns about everyone, as the announce exchange would do.
        let ids: Vec<u32> = hub.peers.keys().copied().collect();
        for &a in &ids {
            for &b in &ids {
                if a != b {
                    let directives = hub
                        .peers
                        .get_mut(&a)
                        .unwrap()
                        .participant_joined(participant(b))
                        .unwrap();
                    hub.dispatch(a, directives);
                }
            }
        }
        hub
    }

    fn dispatch(&mut self, from: u32, directives: Vec<Directive>) {
        for directive in directives {
            match directive {
                Directive::Send { to, message } => {
                    let targets: Vec<u32> = match to {
                        Delivery::All => {
                            self.peers.keys().copied().filter(|&id| id != from).collect()
                        }
                        Delivery::AllExcept(except) => self
                            .peers
                            .keys()
                            .copied()
                            .filter(|&id| id != from && id != except.0)
                            .collect(),
                        Delivery::One(target) => {
                            self.peers.keys().copied().filter(|&id| id == target.0).collect()
                        }
                    };
                    for target in targets {
                        let produced = self
                            .peers
                            .get_mut(&target)
                            .unwrap()
                            .handle_message(ParticipantId(from), message.clone())
                            .unwrap();
                        self.dispatch(target, produced);
                    }
                }
                Directive::StartTimer {
                    kind, generation, ..
                } => {
                    self.timers.insert((from, kind), generation);
                }
                Directive::CancelTimer { kind } => {
                    self.timers.remove(&(from, kind));
                }
                Directive::RecordOutcomes { outcomes } => {
                    self.outcomes.push((from, outcomes));
                }
                Directive::MatchCancelled => {
                    self.cancelled.insert(from);
                }
            }
        }
    }

    fn fire(&mut self, peer: u32, kind: TimerKind) {
        let generation = self
            .timers
            .remove(&(peer, kind))
            .expect("timer must be armed");
        let directives = self.peers.get_mut(&peer).unwrap().timer_fired(kind, generation);
        self.dispatch(peer, directives);
    }

    fn leave(&mut self, id: u32) {
        self.peers.remove(&id);
        let remaining: Vec<u32> = self.peers.keys().copied().collect();
        for peer in remaining {
            let directives = self
                .peers
                .get_mut(&peer)
                .unwrap()
                .participant_left(ParticipantId(id));
            self.dispatch(peer, directives);
        }
    }

    fn peer(&self, id: u32) -> &RoundController {
        &self.peers[&id]
    }

    fn authority_id(&self) -> u32 {
        self.peers
            .values()
            .next()
            .unwrap()
            .roster()
            .authority()
            .unwrap()
            .0
    }

    fn start(&mut self, total_rounds: u32) {
        let authority = self.authority_id();
        let directives = self
            .peers
            .get_mut(&authority)
            .unwrap()
            .start_match(total_rounds)
            .unwrap();
        self.dispatch(authority, directives);
    }

    fn current_host(&self) -> u32 {
        self.peer(self.authority_id()).round().unwrap().host.0
    }

    fn current_secret(&self) -> u8 {
        self.peer(self.authority_id()).round().unwrap().secret.unwrap()
    }

    fn confirm_hint(&mut self, text: &str) {
        let host = self.current_host();
        let directives = self
            .peers
            .get_mut(&host)
            .unwrap()
            .submit_hint(text, None)
            .unwrap();
        self.dispatch(host, directives);
    }

    fn guess(&mut self, peer: u32, value: u8) {
        let directives = self
            .peers
            .get_mut(&peer)
            .unwrap()
            .submit_local_guess(value)
            .unwrap();
        self.dispatch(peer, directives);
    }
}

/// A guess two away from the secret, staying inside the legal range.
fn off_by_two(secret: u8) -> u8 {
    if secret >= 2 { secret - 2 } else { secret + 2 }
}

#[test]
fn test_full_single_round_match() {
    let mut hub = Hub::new(&[1, 2, 3]);
    hub.start(1);

    let host = hub.current_host();
    let secret = hub.current_secret();
    let guessers: Vec<u32> = [1, 2, 3].into_iter().filter(|&id| id != host).collect();

    // Every peer agrees on the authoritative host and secret.
    for id in [1, 2, 3] {
        let round = hub.peer(id).round().unwrap();
        assert_eq!(round.host.0, host);
        assert_eq!(round.secret, Some(secret));
        assert_eq!(round.phase, RoundPhase::HintPending);
    }

    hub.confirm_hint("somewhere in the middle");
    for id in [1, 2, 3] {
        assert_eq!(hub.peer(id).phase(), RoundPhase::Voting);
    }

    hub.guess(guessers[0], secret);
    hub.guess(guessers[1], off_by_two(secret));

    // Completion finalized the round and, with a single round, went straight
    // to the leaderboard on every peer.
    for id in [1, 2, 3] {
        assert_eq!(hub.peer(id).phase(), RoundPhase::LeaderboardDisplay);
        assert_eq!(hub.peer(id).totals().get(ParticipantId(guessers[0])), 3);
        assert_eq!(hub.peer(id).totals().get(ParticipantId(guessers[1])), 1);
        assert_eq!(hub.peer(id).totals().get(ParticipantId(host)), 0);
    }

    let rows = hub.peer(1).leaderboard().unwrap();
    assert_eq!(rows[0].participant.0, guessers[0]);
    assert!((rows[0].percentage_share - 75.0).abs() < f64::EPSILON);
    assert_eq!(rows[1].participant.0, guessers[1]);
    assert!((rows[1].percentage_share - 25.0).abs() < f64::EPSILON);
    assert_eq!(rows[2].participant.0, host);
    assert_eq!(rows[2].percentage_share, 0.0);
    assert!(rows[2].hosted);

    // Every peer renders the identical authoritative rows.
    for id in [2, 3] {
        assert_eq!(hub.peer(id).leaderboard().unwrap(), rows);
    }

    // Outcomes recorded once per peer, one pair per guesser.
    for (_, outcomes) in &hub.outcomes {
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.host.0 == host));
    }
}

#[test]
fn test_round_advance_via_timer() {
    let mut hub = Hub::new(&[1, 2, 3]);
    hub.start(2);

    let secret = hub.current_secret();
    let host = hub.current_host();
    hub.confirm_hint("first round");
    for id in [1, 2, 3].into_iter().filter(|&id| id != host) {
        hub.guess(id, off_by_two(secret));
    }

    let authority = hub.authority_id();
    for id in [1, 2, 3] {
        assert_eq!(hub.peer(id).phase(), RoundPhase::RoundComplete);
    }
    assert!(hub.timers.contains_key(&(authority, TimerKind::NextRound)));

    hub.fire(authority, TimerKind::NextRound);
    for id in [1, 2, 3] {
        let round = hub.peer(id).round().unwrap();
        assert_eq!(round.round_index, 2);
        assert_eq!(round.phase, RoundPhase::HintPending);
    }

    let secret = hub.current_secret();
    let host = hub.current_host();
    hub.confirm_hint("second round");
    for id in [1, 2, 3].into_iter().filter(|&id| id != host) {
        hub.guess(id, secret);
    }
    for id in [1, 2, 3] {
        assert_eq!(hub.peer(id).phase(), RoundPhase::LeaderboardDisplay);
    }
}

#[test]
fn test_host_departure_reselects_same_round() {
    let mut hub = Hub::new(&[1, 2, 3]);
    hub.start(3);

    let host = hub.current_host();
    let secret = hub.current_secret();
    hub.confirm_hint("will be abandoned");

    // One pending guess that must be discarded with the round.
    if let Some(&guesser) = [1u32, 2, 3].iter().find(|&&id| id != host) {
        hub.guess(guesser, off_by_two(secret));
    }

    hub.leave(host);

    let remaining: Vec<u32> = hub.peers.keys().copied().collect();
    let new_host = hub.current_host();
    for &id in &remaining {
        let round = hub.peer(id).round().unwrap();
        assert_eq!(round.round_index, 1, "host replacement keeps the index");
        assert_eq!(round.phase, RoundPhase::HintPending);
        assert_eq!(round.host.0, new_host);
        assert!(hub.peer(id).guesses().is_empty(), "pending guesses discarded");
    }
    assert!(remaining.contains(&new_host));
}

#[test]
fn test_authority_takeover_between_rounds() {
    let mut hub = Hub::new(&[1, 2, 3]);
    hub.start(2);

    let host = hub.current_host();
    let secret = hub.current_secret();
    hub.confirm_hint("round one");
    for id in [1, 2, 3].into_iter().filter(|&id| id != host) {
        hub.guess(id, secret);
    }
    assert_eq!(hub.peer(2).phase(), RoundPhase::RoundComplete);

    // The original authority leaves while its advance timer is pending.
    let old_authority = hub.authority_id();
    hub.leave(old_authority);

    let new_authority = hub.authority_id();
    assert_ne!(new_authority, old_authority);
    assert!(
        hub.timers.contains_key(&(new_authority, TimerKind::NextRound)),
        "takeover re-arms the advance timer"
    );

    hub.fire(new_authority, TimerKind::NextRound);
    for id in hub.peers.keys().copied().collect::<Vec<_>>() {
        let round = hub.peer(id).round().unwrap();
        assert_eq!(round.round_index, 2);
        assert_eq!(round.phase, RoundPhase::HintPending);
    }
}

#[test]
fn test_departure_during_voting_completes_with_grace() {
    let mut hub = Hub::new(&[1, 2, 3, 4]);
    hub.start(1);

    let host = hub.current_host();
    let secret = hub.current_secret();
    hub.confirm_hint("hold on");

    let guessers: Vec<u32> = [1, 2, 3, 4].into_iter().filter(|&id| id != host).collect();
    hub.guess(guessers[0], secret);

    // A silent guesser departs; two guesses are still outstanding, so the
    // authority arms the grace timer rather than finalizing immediately.
    hub.leave(guessers[2]);
    let authority = hub.authority_id();
    if hub.peer(authority).phase() == RoundPhase::Voting {
        assert!(hub.timers.contains_key(&(authority, TimerKind::FinalizeGrace)));
        hub.guess(guessers[1], off_by_two(secret));
    }

    // Either the remaining guess completed the set or the grace fired.
    if hub.peer(authority).phase() == RoundPhase::Voting {
        hub.fire(authority, TimerKind::FinalizeGrace);
    }
    for id in hub.peers.keys().copied().collect::<Vec<_>>() {
        assert_eq!(hub.peer(id).phase(), RoundPhase::LeaderboardDisplay);
        assert_eq!(hub.peer(id).totals().get(ParticipantId(guessers[0])), 3);
    }
}

#[test]
fn test_restart_resets_match_state() {
    let mut hub = Hub::new(&[1, 2, 3]);
    hub.start(1);

    let host = hub.current_host();
    let secret = hub.current_secret();
    hub.confirm_hint("only round");
    for id in [1, 2, 3].into_iter().filter(|&id| id != host) {
        hub.guess(id, secret);
    }
    assert_eq!(hub.peer(3).phase(), RoundPhase::LeaderboardDisplay);

    // A non-authority peer asks for a rematch.
    let requester = hub.peers.keys().copied().max().unwrap();
    let directives = hub
        .peers
        .get_mut(&requester)
        .unwrap()
        .request_restart()
        .unwrap();
    hub.dispatch(requester, directives);

    let authority = hub.authority_id();
    assert!(hub.timers.contains_key(&(authority, TimerKind::RestartSettle)));
    hub.fire(authority, TimerKind::RestartSettle);

    for id in [1, 2, 3] {
        let peer = hub.peer(id);
        let round = peer.round().unwrap();
        assert_eq!(round.round_index, 1, "restart goes back to round one");
        assert_eq!(round.phase, RoundPhase::HintPending);
        assert_eq!(peer.totals().sum(), 0, "session totals cleared");
        assert!(peer.leaderboard().is_none());
    }
}

#[test]
fn test_restart_during_voting_resets_followers() {
    let mut hub = Hub::new(&[1, 2, 3]);
    hub.start(2);

    // Round one completes normally.
    let host = hub.current_host();
    let secret = hub.current_secret();
    hub.confirm_hint("round one");
    for id in [1, 2, 3].into_iter().filter(|&id| id != host) {
        hub.guess(id, secret);
    }
    let authority = hub.authority_id();
    hub.fire(authority, TimerKind::NextRound);

    // Round two is mid-voting when a follower asks for a rematch.
    hub.confirm_hint("abandoned mid-vote");
    let requester = hub.peers.keys().copied().max().unwrap();
    let directives = hub
        .peers
        .get_mut(&requester)
        .unwrap()
        .request_restart()
        .unwrap();
    hub.dispatch(requester, directives);
    hub.fire(authority, TimerKind::RestartSettle);

    for id in [1, 2, 3] {
        let peer = hub.peer(id);
        let round = peer.round().unwrap();
        assert_eq!(round.round_index, 1, "rematch starts over at round one");
        assert_eq!(round.phase, RoundPhase::HintPending);
        assert_eq!(peer.totals().sum(), 0, "previous totals discarded");
    }

    // The rematch scores again on every peer, followers included.
    let host = hub.current_host();
    let secret = hub.current_secret();
    hub.confirm_hint("fresh start");
    for id in [1, 2, 3].into_iter().filter(|&id| id != host) {
        hub.guess(id, secret);
    }
    for id in [1, 2, 3] {
        assert_eq!(hub.peer(id).phase(), RoundPhase::RoundComplete);
        assert!(hub.peer(id).totals().sum() > 0, "rematch rounds score");
    }
}

#[test]
fn test_population_collapse_is_terminal() {
    let mut hub = Hub::new(&[1, 2]);
    hub.start(3);
    hub.confirm_hint("short lived");

    hub.leave(hub.current_host());
    let survivor = hub.peers.keys().copied().next().unwrap();
    assert_eq!(hub.peer(survivor).phase(), RoundPhase::Cancelled);
    assert!(hub.cancelled.contains(&survivor));
    assert!(
        !hub.timers.keys().any(|(id, _)| *id == survivor),
        "all timers cancelled on collapse"
    );
}
