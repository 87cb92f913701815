// Round Engine: one timed guessing round per channel, its timers, and guess
// evaluation.
//
// All round state lives in one mutex-guarded table. The lock is never held
// across an await: content fetches run with the channel reserved as
// `Loading`, and ledger writes happen after the round has already been
// resolved under the lock.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::content::{AnswerStyle, ChampionContent, ContentProvider, Difficulty, ImageRequest, Mode};
use crate::error::GameError;
use crate::ledger::{GuessReward, Ledger};

// ---------------------------------------------------------------------------
// Answer normalization
// ---------------------------------------------------------------------------

/// Canonical form for comparing guesses: lowercase, `&` spelled out, and
/// apostrophes, whitespace, periods and hyphens removed.
pub fn normalize_answer(text: &str) -> String {
    text.to_lowercase()
        .replace('&', "and")
        .chars()
        .filter(|c| !matches!(c, '\'' | '’' | '.' | '-') && !c.is_whitespace())
        .collect()
}

// ---------------------------------------------------------------------------
// Settings and public records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundSettings {
    /// How long a guild must wait between round starts.
    pub guild_cooldown: Duration,
    pub hint_delay: Duration,
    /// Wrong guesses with more tokens than this are treated as chatter.
    pub max_guess_tokens: usize,
}

impl Default for RoundSettings {
    fn default() -> Self {
        Self {
            guild_cooldown: Duration::from_secs(5),
            hint_delay: Duration::from_secs(15),
            max_guess_tokens: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRequest {
    pub channel_id: String,
    pub guild_id: Option<String>,
    pub mode: Mode,
    pub difficulty: Difficulty,
    pub pixelate: bool,
    pub elimination: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundStarted {
    pub round_id: u64,
    pub channel_id: String,
    pub mode: Mode,
    pub difficulty: Difficulty,
    pub pixelate: bool,
    pub elimination: bool,
    pub answer_style: AnswerStyle,
    pub points: u32,
    pub time_limit_secs: u64,
    /// Wrong guesses allowed per user, elimination rounds only.
    pub max_chances: Option<u32>,
    pub image_url: String,
    pub image: ImageRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectGuess {
    pub round_id: u64,
    pub user_id: String,
    pub answer: String,
    /// Seconds since the round started, one decimal.
    pub elapsed_secs: f64,
    pub pixelate: bool,
    pub reward: GuessReward,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrongGuess {
    pub round_id: u64,
    pub user_id: String,
    /// Set when this guess used up the user's last chance.
    pub eliminated: bool,
    pub chances_left: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GuessOutcome {
    Correct(CorrectGuess),
    Incorrect(WrongGuess),
    Ignored,
}

/// Timer-driven events, delivered on the engine's notice channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "notice", rename_all = "snake_case")]
pub enum RoundNotice {
    Hint {
        channel_id: String,
        round_id: u64,
        tags: Vec<String>,
        title: String,
    },
    TimedOut {
        channel_id: String,
        round_id: u64,
        answer: String,
    },
}

// ---------------------------------------------------------------------------
// Internal state
// ---------------------------------------------------------------------------

struct Round {
    id: u64,
    guild_id: Option<String>,
    answer: String,
    accepted: HashSet<String>,
    started: Instant,
    points: u32,
    pixelate: bool,
    elimination: bool,
    max_chances: u32,
    participants: HashSet<String>,
    eliminated: HashSet<String>,
    wrong_guesses: HashMap<String, u32>,
    tags: Vec<String>,
    title: String,
    timers: Vec<AbortHandle>,
}

impl Round {
    fn cancel_timers(&mut self) {
        for timer in self.timers.drain(..) {
            timer.abort();
        }
    }
}

enum ChannelSlot {
    /// Reserved while content is fetched.
    Loading,
    Active(Round),
}

#[derive(Default)]
struct EngineState {
    channels: HashMap<String, ChannelSlot>,
    guild_cooldowns: HashMap<String, Instant>,
}

struct Inner {
    ledger: Arc<Ledger>,
    content: Arc<dyn ContentProvider>,
    settings: RoundSettings,
    notices: mpsc::UnboundedSender<RoundNotice>,
    state: Mutex<EngineState>,
    next_id: AtomicU64,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Per-channel round manager. Clones share the same state.
#[derive(Clone)]
pub struct RoundEngine {
    inner: Arc<Inner>,
}

impl RoundEngine {
    pub fn new(
        ledger: Arc<Ledger>,
        content: Arc<dyn ContentProvider>,
        settings: RoundSettings,
        notices: mpsc::UnboundedSender<RoundNotice>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                ledger,
                content,
                settings,
                notices,
                state: Mutex::new(EngineState::default()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, EngineState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_active(&self, channel_id: &str) -> bool {
        matches!(
            self.state().channels.get(channel_id),
            Some(ChannelSlot::Active(_))
        )
    }

    pub async fn start_round(&self, req: StartRequest) -> Result<RoundStarted, GameError> {
        if matches!(req.difficulty, Difficulty::V2 | Difficulty::V3) && req.mode != Mode::Ability {
            return Err(GameError::InvalidArgument(format!(
                "{} is only available for ability rounds",
                req.difficulty
            )));
        }

        {
            let mut state = self.state();
            if state.channels.contains_key(&req.channel_id) {
                return Err(GameError::AlreadyInProgress(
                    "a round is already running in this channel".into(),
                ));
            }
            if let Some(guild) = &req.guild_id {
                if let Some(until) = state.guild_cooldowns.get(guild) {
                    let now = Instant::now();
                    if *until > now {
                        let wait = (*until - now).as_secs_f64();
                        return Err(GameError::AlreadyInProgress(format!(
                            "please wait {wait:.1}s before starting another round"
                        )));
                    }
                }
            }
            state
                .channels
                .insert(req.channel_id.clone(), ChannelSlot::Loading);
        }

        let content = self
            .inner
            .content
            .random_content(req.mode, req.difficulty, req.pixelate)
            .await;

        let built = content
            .ok_or_else(|| GameError::Unavailable("could not load champion data, try again".into()))
            .and_then(|c| build_answers(&c, req.mode, req.difficulty).map(|a| (c, a)));
        let (content, (answer, accepted)) = match built {
            Ok(ok) => ok,
            Err(err) => {
                self.state().channels.remove(&req.channel_id);
                warn!("round start failed in {}: {err}", req.channel_id);
                return Err(err);
            }
        };

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let answer_style = req.difficulty.answer_style(req.mode);
        let points = req.difficulty.round_points(req.pixelate);
        let time_limit = req.difficulty.time_limit();
        let max_chances = if answer_style == AnswerStyle::AbilityName {
            3
        } else if req.pixelate {
            2
        } else {
            1
        };

        let mut round = Round {
            id,
            guild_id: req.guild_id.clone(),
            answer: answer.clone(),
            accepted,
            started: Instant::now(),
            points,
            pixelate: req.pixelate,
            elimination: req.elimination,
            max_chances,
            participants: HashSet::new(),
            eliminated: HashSet::new(),
            wrong_guesses: HashMap::new(),
            tags: content.tags.clone(),
            title: content.title.clone(),
            timers: Vec::new(),
        };

        let weak = Arc::downgrade(&self.inner);
        if req.difficulty.gives_hint() {
            round.timers.push(spawn_timer(
                weak.clone(),
                self.inner.settings.hint_delay,
                req.channel_id.clone(),
                id,
                TimerKind::Hint,
            ));
        }
        round.timers.push(spawn_timer(
            weak,
            time_limit,
            req.channel_id.clone(),
            id,
            TimerKind::Timeout,
        ));

        {
            let mut state = self.state();
            if let Some(guild) = &req.guild_id {
                state
                    .guild_cooldowns
                    .insert(guild.clone(), Instant::now() + self.inner.settings.guild_cooldown);
            }
            state
                .channels
                .insert(req.channel_id.clone(), ChannelSlot::Active(round));
        }

        info!(
            "round {id} started in {}: {} {} px={} elim={} ({answer})",
            req.channel_id, req.mode, req.difficulty, req.pixelate, req.elimination
        );

        Ok(RoundStarted {
            round_id: id,
            channel_id: req.channel_id,
            mode: req.mode,
            difficulty: req.difficulty,
            pixelate: req.pixelate,
            elimination: req.elimination,
            answer_style,
            points,
            time_limit_secs: time_limit.as_secs(),
            max_chances: req.elimination.then_some(max_chances),
            image_url: content.image_url,
            image: content.image,
        })
    }

    pub async fn submit_guess(
        &self,
        channel_id: &str,
        user_id: &str,
        username: &str,
        text: &str,
    ) -> Result<GuessOutcome, GameError> {
        let guess = normalize_answer(text);
        if guess.is_empty() {
            return Ok(GuessOutcome::Ignored);
        }

        enum Verdict {
            Correct {
                round_id: u64,
                answer: String,
                elapsed_secs: f64,
                points: u32,
                pixelate: bool,
            },
            Wrong(WrongGuess),
        }

        let verdict = {
            let mut state = self.state();
            let Some(ChannelSlot::Active(round)) = state.channels.get_mut(channel_id) else {
                return Ok(GuessOutcome::Ignored);
            };
            if round.participants.contains(user_id) || round.eliminated.contains(user_id) {
                return Ok(GuessOutcome::Ignored);
            }

            if round.accepted.contains(&guess) {
                // The round ends here, so no later guess can also score it.
                round.participants.insert(user_id.to_string());
                let elapsed = round.started.elapsed().as_secs_f64();
                let elapsed_secs = (elapsed * 10.0).round() / 10.0;
                let Some(ChannelSlot::Active(mut round)) = state.channels.remove(channel_id) else {
                    return Ok(GuessOutcome::Ignored);
                };
                round.cancel_timers();
                if let Some(guild) = &round.guild_id {
                    state.guild_cooldowns.remove(guild);
                }
                Verdict::Correct {
                    round_id: round.id,
                    answer: round.answer,
                    elapsed_secs,
                    points: round.points,
                    pixelate: round.pixelate,
                }
            } else {
                if !self.is_qualifying_guess(text, &guess) {
                    return Ok(GuessOutcome::Ignored);
                }
                let mut eliminated = false;
                let mut chances_left = None;
                if round.elimination {
                    let count = round.wrong_guesses.entry(user_id.to_string()).or_insert(0);
                    *count += 1;
                    let used = *count;
                    chances_left = Some(round.max_chances.saturating_sub(used));
                    if used >= round.max_chances {
                        round.eliminated.insert(user_id.to_string());
                        eliminated = true;
                    }
                }
                Verdict::Wrong(WrongGuess {
                    round_id: round.id,
                    user_id: user_id.to_string(),
                    eliminated,
                    chances_left,
                })
            }
        };

        match verdict {
            Verdict::Correct {
                round_id,
                answer,
                elapsed_secs,
                points,
                pixelate,
            } => {
                info!("round {round_id} in {channel_id} won by {user_id} in {elapsed_secs}s");
                let reward =
                    self.inner
                        .ledger
                        .record_correct_guess(user_id, username, elapsed_secs, points)?;
                Ok(GuessOutcome::Correct(CorrectGuess {
                    round_id,
                    user_id: user_id.to_string(),
                    answer,
                    elapsed_secs,
                    pixelate,
                    reward,
                }))
            }
            Verdict::Wrong(wrong) => {
                if wrong.eliminated {
                    info!("{user_id} eliminated from round {}", wrong.round_id);
                }
                self.inner.ledger.reset_streak(user_id, username)?;
                Ok(GuessOutcome::Incorrect(wrong))
            }
        }
    }

    /// End a channel's round early without revealing it. Returns whether a
    /// round was running.
    pub fn cancel_round(&self, channel_id: &str) -> bool {
        let mut state = self.state();
        match state.channels.remove(channel_id) {
            Some(ChannelSlot::Active(mut round)) => {
                round.cancel_timers();
                if let Some(guild) = &round.guild_id {
                    state.guild_cooldowns.remove(guild);
                }
                info!("round {} in {channel_id} cancelled", round.id);
                true
            }
            Some(ChannelSlot::Loading) => {
                // Leave the reservation to the start that owns it.
                state
                    .channels
                    .insert(channel_id.to_string(), ChannelSlot::Loading);
                false
            }
            None => false,
        }
    }

    /// A miss counts against the streak only if it names a known champion or
    /// is short enough to plausibly be a guess.
    fn is_qualifying_guess(&self, raw: &str, normalized: &str) -> bool {
        if raw.split_whitespace().count() <= self.inner.settings.max_guess_tokens {
            return true;
        }
        self.inner
            .content
            .champions()
            .iter()
            .any(|c| normalize_answer(&c.name) == normalized)
    }
}

/// Display answer and the set of accepted normalized guesses for `content`.
fn build_answers(
    content: &ChampionContent,
    mode: Mode,
    difficulty: Difficulty,
) -> Result<(String, HashSet<String>), GameError> {
    let answer = match difficulty.answer_style(mode) {
        AnswerStyle::Champion => content.champion.clone(),
        AnswerStyle::AbilityKey => {
            let key = content
                .ability_key
                .as_deref()
                .ok_or_else(|| GameError::Unavailable("ability data missing".into()))?;
            format!("{} {key}", content.champion)
        }
        AnswerStyle::AbilityName => {
            let name = content
                .ability_name
                .as_deref()
                .ok_or_else(|| GameError::Unavailable("ability data missing".into()))?;
            format!("{} {name}", content.champion)
        }
    };
    let accepted = HashSet::from([normalize_answer(&answer)]);
    Ok((answer, accepted))
}

// ---------------------------------------------------------------------------
// Timers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum TimerKind {
    Hint,
    Timeout,
}

fn spawn_timer(
    inner: Weak<Inner>,
    after: Duration,
    channel_id: String,
    round_id: u64,
    kind: TimerKind,
) -> AbortHandle {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        if let Some(inner) = inner.upgrade() {
            fire_timer(&inner, &channel_id, round_id, kind);
        }
    })
    .abort_handle()
}

fn fire_timer(inner: &Inner, channel_id: &str, round_id: u64, kind: TimerKind) {
    let mut state = inner.state.lock().unwrap_or_else(PoisonError::into_inner);
    let live = matches!(
        state.channels.get(channel_id),
        Some(ChannelSlot::Active(round)) if round.id == round_id
    );
    if !live {
        debug!("dropping stale {kind:?} timer for round {round_id} in {channel_id}");
        return;
    }

    let notice = match kind {
        TimerKind::Hint => {
            let Some(ChannelSlot::Active(round)) = state.channels.get(channel_id) else {
                return;
            };
            RoundNotice::Hint {
                channel_id: channel_id.to_string(),
                round_id,
                tags: round.tags.clone(),
                title: round.title.clone(),
            }
        }
        TimerKind::Timeout => {
            let Some(ChannelSlot::Active(mut round)) = state.channels.remove(channel_id) else {
                return;
            };
            // This task is one of the timers; aborting it now is harmless.
            round.cancel_timers();
            if let Some(guild) = &round.guild_id {
                state.guild_cooldowns.remove(guild);
            }
            info!("round {round_id} in {channel_id} timed out ({})", round.answer);
            RoundNotice::TimedOut {
                channel_id: channel_id.to_string(),
                round_id,
                answer: round.answer,
            }
        }
    };
    drop(state);

    if inner.notices.send(notice).is_err() {
        debug!("round notice receiver dropped");
    }
}
