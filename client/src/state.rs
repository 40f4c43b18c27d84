//! The info → challenge → player-list state machine
//!
//! Each call to [`PollMachine::advance`] performs at most one non-blocking
//! receive and at most one send, then moves to the next state. Time is passed
//! in by the caller so the machine can be driven deterministically in tests.
//!
//! A successful cycle waits a full poll interval before the next one. Any
//! failure (decode error, socket error, step timeout) publishes an error and
//! retries immediately.

use crate::error::{PollError, Step};
use crate::network::Link;
use log::{debug, error, warn};
use shared::{
    decode_challenge_response, decode_info_response, decode_player_list_response,
    encode_challenge_request, encode_info_query, encode_player_request, ServerInfo, ServerStatus,
};
use std::time::{Duration, Instant};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Stand-in deadline when `now + poll_interval` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timing {
    /// Wait after a successful cycle before the next one starts.
    pub poll_interval: Duration,
    /// Longest wait for the response to any single request.
    pub step_timeout: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }
}

/// Where the current cycle is. The partial `ServerInfo` and the challenge
/// token travel inside the variants, so neither can outlive its cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum PollState {
    Idle {
        next_trigger: Instant,
    },
    AwaitingInfo {
        sent_at: Instant,
    },
    AwaitingChallenge {
        sent_at: Instant,
        info: ServerInfo,
    },
    AwaitingPlayers {
        sent_at: Instant,
        challenge: u32,
        info: ServerInfo,
    },
}

enum Progress {
    Next(PollState),
    Done(ServerInfo),
}

impl PollState {
    pub fn idle(next_trigger: Instant) -> Self {
        PollState::Idle { next_trigger }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, PollState::Idle { .. })
    }

    /// Time the outstanding request was sent, if any.
    pub fn sent_at(&self) -> Option<Instant> {
        match self {
            PollState::Idle { .. } => None,
            PollState::AwaitingInfo { sent_at }
            | PollState::AwaitingChallenge { sent_at, .. }
            | PollState::AwaitingPlayers { sent_at, .. } => Some(*sent_at),
        }
    }

    fn step<L: Link>(
        self,
        now: Instant,
        link: &mut L,
        timing: &Timing,
    ) -> Result<Progress, PollError> {
        match self {
            PollState::Idle { next_trigger } => {
                // Late answers to an abandoned cycle must not be mistaken for
                // answers to the next one.
                loop {
                    match link.try_receive() {
                        Ok(Some(stale)) => {
                            debug!("Discarding {} byte datagram received while idle", stale.len())
                        }
                        Ok(None) => break,
                        Err(e) => {
                            debug!("Discarding receive error while idle: {}", e);
                            break;
                        }
                    }
                }

                if now < next_trigger {
                    return Ok(Progress::Next(PollState::Idle { next_trigger }));
                }

                link.send(&encode_info_query())?;
                debug!("Sent info query");
                Ok(Progress::Next(PollState::AwaitingInfo { sent_at: now }))
            }

            PollState::AwaitingInfo { sent_at } => match link.try_receive()? {
                Some(data) => {
                    let info =
                        decode_info_response(&data).map_err(PollError::decode(Step::Info))?;
                    debug!(
                        "Info from '{}' on {}, requesting challenge",
                        info.name, info.map
                    );

                    link.send(&encode_challenge_request())?;
                    Ok(Progress::Next(PollState::AwaitingChallenge { sent_at: now, info }))
                }
                None => {
                    check_timeout(Step::Info, sent_at, now, timing)?;
                    Ok(Progress::Next(PollState::AwaitingInfo { sent_at }))
                }
            },

            PollState::AwaitingChallenge { sent_at, info } => match link.try_receive()? {
                Some(data) => {
                    let challenge = decode_challenge_response(&data)
                        .map_err(PollError::decode(Step::Challenge))?;
                    debug!("Got challenge {:#010X}, requesting players", challenge);

                    link.send(&encode_player_request(challenge))?;
                    Ok(Progress::Next(PollState::AwaitingPlayers {
                        sent_at: now,
                        challenge,
                        info,
                    }))
                }
                None => {
                    check_timeout(Step::Challenge, sent_at, now, timing)?;
                    Ok(Progress::Next(PollState::AwaitingChallenge { sent_at, info }))
                }
            },

            PollState::AwaitingPlayers {
                sent_at,
                challenge,
                mut info,
            } => match link.try_receive()? {
                Some(data) => {
                    info.player_list = decode_player_list_response(&data)
                        .map_err(PollError::decode(Step::Players))?;
                    Ok(Progress::Done(info))
                }
                None => {
                    check_timeout(Step::Players, sent_at, now, timing)?;
                    Ok(Progress::Next(PollState::AwaitingPlayers {
                        sent_at,
                        challenge,
                        info,
                    }))
                }
            },
        }
    }
}

fn check_timeout(
    step: Step,
    sent_at: Instant,
    now: Instant,
    timing: &Timing,
) -> Result<(), PollError> {
    let waited = now.saturating_duration_since(sent_at);
    if waited > timing.step_timeout {
        return Err(PollError::Timeout { step, waited });
    }
    Ok(())
}

fn next_poll(now: Instant, interval: Duration) -> Instant {
    now.checked_add(interval)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

/// Owns the poll state between loop iterations.
#[derive(Debug)]
pub struct PollMachine {
    state: PollState,
    timing: Timing,
    last_completed: Option<Instant>,
    /// Refresh asked for mid-cycle, honoured once the cycle ends.
    refresh_pending: bool,
}

impl PollMachine {
    /// Starts idle and already due, so the first advance sends an info query.
    pub fn new(now: Instant, timing: Timing) -> Self {
        Self {
            state: PollState::idle(now),
            timing,
            last_completed: None,
            refresh_pending: false,
        }
    }

    pub fn state(&self) -> &PollState {
        &self.state
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    /// When the last cycle that published `Ok` finished.
    pub fn last_completed(&self) -> Option<Instant> {
        self.last_completed
    }

    /// Makes an idle machine due right away. Mid-cycle the request is held
    /// and the next cycle starts as soon as the current one ends.
    pub fn refresh(&mut self, now: Instant) {
        match &mut self.state {
            PollState::Idle { next_trigger } => {
                if *next_trigger > now {
                    debug!("Refresh requested, polling now");
                    *next_trigger = now;
                }
            }
            _ => {
                debug!("Refresh requested mid-cycle, deferring");
                self.refresh_pending = true;
            }
        }
    }

    pub fn refresh_pending(&self) -> bool {
        self.refresh_pending
    }

    /// Runs one transition. `publish` is called at most once, when a cycle
    /// finishes either way.
    pub fn advance<L, F>(&mut self, now: Instant, link: &mut L, publish: F)
    where
        L: Link,
        F: FnOnce(ServerStatus),
    {
        let current = std::mem::replace(&mut self.state, PollState::idle(now));

        self.state = match current.step(now, link, &self.timing) {
            Ok(Progress::Next(next)) => next,
            Ok(Progress::Done(info)) => {
                debug!(
                    "Cycle complete: {} players listed, next poll in {:?}",
                    info.player_list.len(),
                    self.timing.poll_interval
                );
                self.last_completed = Some(now);
                publish(ServerStatus::Ok(info));
                if std::mem::take(&mut self.refresh_pending) {
                    PollState::idle(now)
                } else {
                    PollState::idle(next_poll(now, self.timing.poll_interval))
                }
            }
            Err(e) => {
                match &e {
                    PollError::Io(_) => error!("Poll cycle abandoned: {}", e),
                    _ => warn!("Poll cycle abandoned: {}", e),
                }
                publish(ServerStatus::Error(e.to_string()));
                self.refresh_pending = false;
                PollState::idle(now)
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{
        encode_challenge_response, encode_info_response, encode_player_list_response, PlayerInfo,
    };
    use std::collections::VecDeque;
    use std::io;

    /// Scripted link: hands out queued datagrams one per receive and records sends.
    #[derive(Default)]
    struct FakeLink {
        inbox: VecDeque<io::Result<Vec<u8>>>,
        sent: Vec<Vec<u8>>,
        fail_sends: bool,
    }

    impl FakeLink {
        fn push(&mut self, data: Vec<u8>) {
            self.inbox.push_back(Ok(data));
        }
    }

    impl Link for FakeLink {
        fn send(&mut self, data: &[u8]) -> io::Result<()> {
            if self.fail_sends {
                return Err(io::Error::new(io::ErrorKind::Other, "send failed"));
            }
            self.sent.push(data.to_vec());
            Ok(())
        }

        fn try_receive(&mut self) -> io::Result<Option<Vec<u8>>> {
            match self.inbox.pop_front() {
                Some(Ok(data)) => Ok(Some(data)),
                Some(Err(e)) => Err(e),
                None => Ok(None),
            }
        }
    }

    fn timing() -> Timing {
        Timing {
            poll_interval: Duration::from_secs(60),
            step_timeout: Duration::from_secs(5),
        }
    }

    fn info() -> ServerInfo {
        ServerInfo {
            name: "Test Server".to_string(),
            map: "ctf_2fort".to_string(),
            folder: "tf".to_string(),
            game: "Team Fortress".to_string(),
            id: 440,
            players: 2,
            max_players: 24,
            ..Default::default()
        }
    }

    fn players() -> Vec<PlayerInfo> {
        vec![
            PlayerInfo {
                index: 0,
                name: "second".to_string(),
                score: 3,
                duration: 10.0,
            },
            PlayerInfo {
                index: 0,
                name: "first".to_string(),
                score: 9,
                duration: 20.0,
            },
        ]
    }

    /// Advances once and returns whatever was published.
    fn tick(machine: &mut PollMachine, now: Instant, link: &mut FakeLink) -> Option<ServerStatus> {
        let mut published = None;
        machine.advance(now, link, |status| published = Some(status));
        published
    }

    /// Answers the outstanding info query and runs the cycle to the end.
    fn finish_cycle(
        machine: &mut PollMachine,
        now: Instant,
        link: &mut FakeLink,
    ) -> Option<ServerStatus> {
        link.push(encode_info_response(&info()));
        tick(machine, now, link);
        link.push(encode_challenge_response(42));
        tick(machine, now, link);
        link.push(encode_player_list_response(&players()));
        tick(machine, now, link)
    }

    #[test]
    fn test_first_advance_sends_info_query() {
        let t0 = Instant::now();
        let mut machine = PollMachine::new(t0, timing());
        let mut link = FakeLink::default();

        assert_eq!(tick(&mut machine, t0, &mut link), None);
        assert_eq!(link.sent, vec![encode_info_query()]);
        assert_eq!(machine.state(), &PollState::AwaitingInfo { sent_at: t0 });
    }

    #[test]
    fn test_full_cycle_publishes_ok() {
        let t0 = Instant::now();
        let mut machine = PollMachine::new(t0, timing());
        let mut link = FakeLink::default();

        tick(&mut machine, t0, &mut link);

        link.push(encode_info_response(&info()));
        let t1 = t0 + Duration::from_millis(10);
        assert_eq!(tick(&mut machine, t1, &mut link), None);
        assert_eq!(link.sent[1], encode_challenge_request());
        assert!(matches!(
            machine.state(),
            PollState::AwaitingChallenge { sent_at, .. } if *sent_at == t1
        ));

        link.push(encode_challenge_response(0xCAFE_F00D));
        let t2 = t1 + Duration::from_millis(10);
        assert_eq!(tick(&mut machine, t2, &mut link), None);
        assert_eq!(link.sent[2], encode_player_request(0xCAFE_F00D));
        assert!(matches!(
            machine.state(),
            PollState::AwaitingPlayers { challenge: 0xCAFE_F00D, .. }
        ));

        link.push(encode_player_list_response(&players()));
        let t3 = t2 + Duration::from_millis(10);
        let published = tick(&mut machine, t3, &mut link);

        let mut expected = info();
        expected.player_list = players();
        assert_eq!(published, Some(ServerStatus::Ok(expected)));
        assert_eq!(
            machine.state(),
            &PollState::idle(t3 + Duration::from_secs(60))
        );
        assert_eq!(machine.last_completed(), Some(t3));
        assert_eq!(link.sent.len(), 3);
    }

    #[test]
    fn test_idle_waits_for_trigger() {
        let t0 = Instant::now();
        let mut machine = PollMachine::new(t0, timing());
        machine.state = PollState::idle(t0 + Duration::from_secs(30));
        let mut link = FakeLink::default();

        for secs in [0, 10, 29] {
            assert_eq!(tick(&mut machine, t0 + Duration::from_secs(secs), &mut link), None);
            assert!(machine.state().is_idle());
        }
        assert!(link.sent.is_empty());

        tick(&mut machine, t0 + Duration::from_secs(30), &mut link);
        assert_eq!(link.sent, vec![encode_info_query()]);
    }

    #[test]
    fn test_idle_discards_stale_datagrams() {
        let t0 = Instant::now();
        let mut machine = PollMachine::new(t0, timing());
        machine.state = PollState::idle(t0 + Duration::from_secs(1));
        let mut link = FakeLink::default();
        link.push(encode_challenge_response(7));
        link.push(encode_challenge_response(8));

        assert_eq!(tick(&mut machine, t0, &mut link), None);
        assert!(link.inbox.is_empty());
        assert!(machine.state().is_idle());
    }

    #[test]
    fn test_info_timeout_publishes_error_and_retries_now() {
        let t0 = Instant::now();
        let mut machine = PollMachine::new(t0, timing());
        let mut link = FakeLink::default();
        tick(&mut machine, t0, &mut link);

        // Exactly at the budget is still in time.
        assert_eq!(tick(&mut machine, t0 + Duration::from_secs(5), &mut link), None);

        let late = t0 + Duration::from_millis(5001);
        match tick(&mut machine, late, &mut link) {
            Some(ServerStatus::Error(message)) => assert!(message.contains("no info response")),
            other => panic!("expected timeout error, got {:?}", other),
        }
        assert_eq!(machine.state(), &PollState::idle(late));

        tick(&mut machine, late, &mut link);
        assert_eq!(link.sent, vec![encode_info_query(), encode_info_query()]);
    }

    #[test]
    fn test_bad_info_header_never_requests_challenge() {
        let t0 = Instant::now();
        let mut machine = PollMachine::new(t0, timing());
        let mut link = FakeLink::default();
        tick(&mut machine, t0, &mut link);

        let mut response = encode_info_response(&info());
        response[4] = 0x00;
        link.push(response);

        match tick(&mut machine, t0, &mut link) {
            Some(ServerStatus::Error(message)) => assert!(message.contains("bad header")),
            other => panic!("expected decode error, got {:?}", other),
        }
        assert_eq!(link.sent, vec![encode_info_query()]);
        assert!(machine.state().is_idle());
        assert_eq!(machine.last_completed(), None);
    }

    #[test]
    fn test_challenge_timeout() {
        let t0 = Instant::now();
        let mut machine = PollMachine::new(t0, timing());
        let mut link = FakeLink::default();
        tick(&mut machine, t0, &mut link);
        link.push(encode_info_response(&info()));
        let t1 = t0 + Duration::from_secs(1);
        tick(&mut machine, t1, &mut link);

        // Timed from the challenge request, not from the info query.
        assert_eq!(tick(&mut machine, t0 + Duration::from_millis(5500), &mut link), None);

        let late = t1 + Duration::from_secs(6);
        let published = tick(&mut machine, late, &mut link);
        assert!(matches!(published, Some(ServerStatus::Error(ref m)) if m.contains("challenge")));
        assert_eq!(machine.state(), &PollState::idle(late));
    }

    #[test]
    fn test_bad_player_list_is_error() {
        let t0 = Instant::now();
        let mut machine = PollMachine::new(t0, timing());
        let mut link = FakeLink::default();
        tick(&mut machine, t0, &mut link);
        link.push(encode_info_response(&info()));
        tick(&mut machine, t0, &mut link);
        link.push(encode_challenge_response(1));
        tick(&mut machine, t0, &mut link);

        let mut truncated = encode_player_list_response(&players());
        truncated.truncate(12);
        link.push(truncated);

        let published = tick(&mut machine, t0, &mut link);
        assert!(matches!(published, Some(ServerStatus::Error(ref m)) if m.contains("player list")));
        assert!(machine.state().is_idle());
    }

    #[test]
    fn test_challenge_not_reused_across_cycles() {
        let t0 = Instant::now();
        let mut machine = PollMachine::new(t0, timing());
        let mut link = FakeLink::default();

        tick(&mut machine, t0, &mut link);
        link.push(encode_info_response(&info()));
        tick(&mut machine, t0, &mut link);
        link.push(encode_challenge_response(111));
        tick(&mut machine, t0, &mut link);

        // Player list never arrives; the cycle is abandoned.
        let late = t0 + Duration::from_secs(6);
        tick(&mut machine, late, &mut link);

        tick(&mut machine, late, &mut link);
        link.push(encode_info_response(&info()));
        tick(&mut machine, late, &mut link);

        // The new cycle asks for a fresh token with the placeholder.
        assert_eq!(link.sent.last(), Some(&encode_challenge_request()));
        assert!(matches!(machine.state(), PollState::AwaitingChallenge { .. }));
    }

    #[test]
    fn test_send_failure_takes_error_path() {
        let t0 = Instant::now();
        let mut machine = PollMachine::new(t0, timing());
        let mut link = FakeLink {
            fail_sends: true,
            ..Default::default()
        };

        let published = tick(&mut machine, t0, &mut link);
        assert!(matches!(published, Some(ServerStatus::Error(ref m)) if m.starts_with("network error")));
        assert_eq!(machine.state(), &PollState::idle(t0));
    }

    #[test]
    fn test_receive_failure_takes_error_path() {
        let t0 = Instant::now();
        let mut machine = PollMachine::new(t0, timing());
        let mut link = FakeLink::default();
        tick(&mut machine, t0, &mut link);

        link.inbox.push_back(Err(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "refused",
        )));
        let published = tick(&mut machine, t0, &mut link);
        assert!(matches!(published, Some(ServerStatus::Error(_))));
        assert!(machine.state().is_idle());
    }

    #[test]
    fn test_refresh_makes_idle_due() {
        let t0 = Instant::now();
        let mut machine = PollMachine::new(t0, timing());
        let later = t0 + Duration::from_secs(60);
        machine.state = PollState::idle(later);

        let t1 = t0 + Duration::from_secs(3);
        machine.refresh(t1);
        assert_eq!(machine.state(), &PollState::idle(t1));

        let mut link = FakeLink::default();
        tick(&mut machine, t1, &mut link);
        assert_eq!(link.sent, vec![encode_info_query()]);
    }

    #[test]
    fn test_refresh_when_already_due_is_noop() {
        let t0 = Instant::now();
        let mut machine = PollMachine::new(t0, timing());
        let t1 = t0 + Duration::from_secs(1);

        machine.refresh(t1);
        machine.refresh(t1);
        assert_eq!(machine.state(), &PollState::idle(t0));

        let mut link = FakeLink::default();
        tick(&mut machine, t1, &mut link);
        assert_eq!(link.sent, vec![encode_info_query()]);
    }

    #[test]
    fn test_refresh_mid_cycle_deferred_until_done() {
        let t0 = Instant::now();
        let mut machine = PollMachine::new(t0, timing());
        let mut link = FakeLink::default();
        tick(&mut machine, t0, &mut link);

        machine.refresh(t0 + Duration::from_secs(1));
        machine.refresh(t0 + Duration::from_secs(1));
        assert_eq!(machine.state(), &PollState::AwaitingInfo { sent_at: t0 });
        assert_eq!(machine.state().sent_at(), Some(t0));
        assert!(machine.refresh_pending());

        let done = t0 + Duration::from_secs(2);
        let published = finish_cycle(&mut machine, done, &mut link);
        assert!(matches!(published, Some(ServerStatus::Ok(_))));
        assert_eq!(machine.state(), &PollState::idle(done));
        assert!(!machine.refresh_pending());

        tick(&mut machine, done, &mut link);
        assert_eq!(link.sent.last(), Some(&encode_info_query()));
        assert_eq!(link.sent.len(), 4);
    }

    #[test]
    fn test_failed_cycle_clears_deferred_refresh() {
        let t0 = Instant::now();
        let mut machine = PollMachine::new(t0, timing());
        let mut link = FakeLink::default();
        tick(&mut machine, t0, &mut link);
        machine.refresh(t0);

        let late = t0 + Duration::from_secs(6);
        assert!(matches!(
            tick(&mut machine, late, &mut link),
            Some(ServerStatus::Error(_))
        ));
        assert_eq!(machine.state(), &PollState::idle(late));
        assert!(!machine.refresh_pending());

        // The following success waits the full interval again.
        tick(&mut machine, late, &mut link);
        finish_cycle(&mut machine, late, &mut link);
        assert_eq!(
            machine.state(),
            &PollState::idle(late + Duration::from_secs(60))
        );
    }

    #[test]
    fn test_huge_interval_does_not_overflow() {
        let t0 = Instant::now();
        let mut machine = PollMachine::new(
            t0,
            Timing {
                poll_interval: Duration::from_secs(u64::MAX),
                step_timeout: Duration::from_secs(5),
            },
        );
        let mut link = FakeLink::default();
        tick(&mut machine, t0, &mut link);

        let published = finish_cycle(&mut machine, t0, &mut link);
        assert!(matches!(published, Some(ServerStatus::Ok(_))));
        match machine.state() {
            PollState::Idle { next_trigger } => {
                assert!(*next_trigger > t0 + Duration::from_secs(3600))
            }
            other => panic!("expected idle, got {:?}", other),
        }

        // Still reachable through a refresh.
        let t1 = t0 + Duration::from_secs(1);
        machine.refresh(t1);
        tick(&mut machine, t1, &mut link);
        assert_eq!(link.sent.last(), Some(&encode_info_query()));
    }

    #[test]
    fn test_receive_error_while_idle_is_discarded() {
        let t0 = Instant::now();
        let mut machine = PollMachine::new(t0, timing());
        machine.state = PollState::idle(t0 + Duration::from_secs(1));
        let mut link = FakeLink::default();
        link.inbox.push_back(Err(io::Error::new(
            io::ErrorKind::ConnectionRefused,
            "refused",
        )));

        assert_eq!(tick(&mut machine, t0, &mut link), None);
        assert!(link.inbox.is_empty());
        assert!(machine.state().is_idle());

        // The next cycle starts normally.
        tick(&mut machine, t0 + Duration::from_secs(1), &mut link);
        assert_eq!(link.sent, vec![encode_info_query()]);
    }
}
