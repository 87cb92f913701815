// Application layer: turns gateway events into core operations and core
// results into outbound replies.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use champguess_core::ledger::{InventoryEntry, InventoryKind};
use champguess_core::round::{GuessOutcome, StartRequest};
use champguess_core::{GameError, Ledger, RoundEngine, RoundNotice, TradeBroker};

use crate::commands::{self, Command, ShardKind};
use crate::protocol::{ButtonPayload, ChannelRef, GatewayEvent, OutboundMessage, Reply, UserRef};

/// Everything a handler needs. Cheap to share across per-event tasks.
pub struct App {
    rounds: RoundEngine,
    ledger: Arc<Ledger>,
    trades: TradeBroker,
    leaderboard_size: usize,
}

impl App {
    pub fn new(
        rounds: RoundEngine,
        ledger: Arc<Ledger>,
        trades: TradeBroker,
        leaderboard_size: usize,
    ) -> Self {
        Self {
            rounds,
            ledger,
            trades,
            leaderboard_size,
        }
    }

    /// Handle one inbound event, returning the replies it produced.
    pub async fn handle_event(&self, event: GatewayEvent) -> Vec<OutboundMessage> {
        let channel_id = event.channel().id.clone();
        let result = match event {
            GatewayEvent::Command {
                command,
                args,
                user,
                channel,
            } => {
                debug!("command `{command}` {args:?} from {} in {}", user.id, channel.id);
                match commands::parse_command(&command, &args) {
                    Ok(cmd) => self.run_command(cmd, &user, &channel).await.map(Some),
                    Err(e) => Err(e),
                }
            }
            GatewayEvent::Message { text, user, channel } => {
                self.handle_guess(&text, &user, &channel).await
            }
            GatewayEvent::Button {
                payload,
                user,
                channel: _,
            } => self.handle_button(payload, &user).await.map(Some),
        };

        match result {
            Ok(Some(reply)) => vec![OutboundMessage::new(channel_id, reply)],
            Ok(None) => Vec::new(),
            Err(e) => {
                debug!("replying with error in {channel_id}: {e}");
                vec![OutboundMessage::new(channel_id, e.into())]
            }
        }
    }

    async fn handle_guess(
        &self,
        text: &str,
        user: &UserRef,
        channel: &ChannelRef,
    ) -> Result<Option<Reply>, GameError> {
        if !self.rounds.is_active(&channel.id) {
            return Ok(None);
        }
        let outcome = self
            .rounds
            .submit_guess(&channel.id, &user.id, &user.name, text)
            .await?;
        Ok(match outcome {
            GuessOutcome::Correct(guess) => Some(Reply::Correct {
                username: user.name.clone(),
                guess,
            }),
            GuessOutcome::Incorrect(guess) => Some(Reply::WrongGuess { guess }),
            GuessOutcome::Ignored => None,
        })
    }

    async fn handle_button(&self, payload: ButtonPayload, user: &UserRef) -> Result<Reply, GameError> {
        match payload {
            ButtonPayload::InventoryCategory { kind, owner_id } => {
                self.inventory(user, &owner_id, kind, 1)
            }
            ButtonPayload::InventoryPage {
                kind,
                page,
                owner_id,
            } => self.inventory(user, &owner_id, kind, page),
            ButtonPayload::TradeAccept { trade_id } => {
                let swap = self.trades.accept(&trade_id, &user.id)?;
                Ok(Reply::TradeCompleted { swap })
            }
            ButtonPayload::TradeDecline { trade_id } => {
                let declined = self.trades.decline(&trade_id, &user.id)?;
                Ok(Reply::TradeDeclined { declined })
            }
        }
    }

    fn inventory(
        &self,
        user: &UserRef,
        owner_id: &str,
        kind: InventoryKind,
        page: usize,
    ) -> Result<Reply, GameError> {
        if user.id != owner_id {
            return Err(GameError::Unauthorized(
                "this is not your inventory, open your own with `inventory`".into(),
            ));
        }
        let page = self.ledger.inventory_page(owner_id, kind, page)?;
        Ok(Reply::Inventory {
            owner_id: owner_id.to_string(),
            page,
        })
    }

    async fn run_command(
        &self,
        cmd: Command,
        user: &UserRef,
        channel: &ChannelRef,
    ) -> Result<Reply, GameError> {
        let ledger = &self.ledger;
        let uid = user.id.as_str();

        match cmd {
            Command::StartRound {
                mode,
                difficulty,
                pixelate,
                elimination,
            } => {
                let round = self
                    .rounds
                    .start_round(StartRequest {
                        channel_id: channel.id.clone(),
                        guild_id: channel.guild_id.clone(),
                        mode,
                        difficulty,
                        pixelate,
                        elimination,
                    })
                    .await?;
                Ok(Reply::RoundStarted { round })
            }
            Command::StopRound => {
                if !self.rounds.cancel_round(&channel.id) {
                    return Err(GameError::NotFound("no round is running in this channel".into()));
                }
                Ok(Reply::RoundCancelled {
                    channel_id: channel.id.clone(),
                })
            }
            Command::Profile(target) => {
                let profile = match target {
                    Some(other) if other != uid => ledger.profile(&other)?,
                    _ => {
                        ledger.touch(uid, &user.name)?;
                        ledger.profile(uid)?
                    }
                };
                Ok(Reply::Profile { profile })
            }
            Command::Inventory => {
                ledger.touch(uid, &user.name)?;
                self.inventory(user, uid, InventoryKind::ChampionShards, 1)
            }
            Command::OpenChest => {
                ledger.touch(uid, &user.name)?;
                let loot = ledger.open_chest(uid).await?;
                Ok(Reply::Loot {
                    user_id: uid.to_string(),
                    loot,
                })
            }
            Command::CraftSkin(index) => {
                let skin = ledger.craft_skin(uid, index)?;
                Ok(Reply::Crafted {
                    user_id: uid.to_string(),
                    item: InventoryEntry::Skin(skin),
                })
            }
            Command::CraftChampion(index) => {
                let champion = ledger.craft_champion(uid, index)?;
                Ok(Reply::Crafted {
                    user_id: uid.to_string(),
                    item: InventoryEntry::Champion(champion),
                })
            }
            Command::Disenchant { kind, index } => {
                let result = match kind {
                    ShardKind::Skin => ledger.disenchant_skin(uid, index)?,
                    ShardKind::Champion => ledger.disenchant_champion(uid, index)?,
                };
                Ok(Reply::Disenchanted {
                    user_id: uid.to_string(),
                    result,
                })
            }
            Command::Reroll(indices) => {
                let skin = ledger.reroll_skins(uid, indices).await?;
                Ok(Reply::Rerolled {
                    user_id: uid.to_string(),
                    skin,
                })
            }
            Command::Daily => {
                let outcome = ledger.claim_daily(uid, &user.name, Utc::now())?;
                Ok(Reply::Daily {
                    user_id: uid.to_string(),
                    outcome,
                })
            }
            Command::Leaderboard => Ok(Reply::Leaderboard {
                entries: ledger.leaderboard(self.leaderboard_size)?,
            }),
            Command::Buy(query) => {
                let purchase = ledger.purchase_champion(uid, &user.name, &query)?;
                Ok(Reply::Purchased {
                    user_id: uid.to_string(),
                    purchase,
                })
            }
            Command::Trade {
                trade_type,
                target_id,
                mine,
                theirs,
            } => {
                // Both sides must already be registered; a trade never
                // creates a player record.
                let offer = self.trades.initiate(
                    uid,
                    &target_id,
                    mine,
                    theirs,
                    trade_type,
                    channel.guild_id.as_deref(),
                )?;
                Ok(Reply::TradeOffered { offer })
            }
            Command::Help => Ok(Reply::Help {
                commands: commands::help(),
            }),
        }
    }
}

fn notice_message(notice: RoundNotice) -> OutboundMessage {
    match notice {
        RoundNotice::Hint {
            channel_id,
            round_id,
            tags,
            title,
        } => OutboundMessage::new(channel_id, Reply::Hint { round_id, tags, title }),
        RoundNotice::TimedOut {
            channel_id,
            round_id,
            answer,
        } => OutboundMessage::new(channel_id, Reply::TimedOut { round_id, answer }),
    }
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

/// Run the application event loop.
///
/// Listens on two channels using `tokio::select!`:
/// 1. Gateway events from the chat bridge, each handled on its own task so a
///    slow content fetch never blocks other channels
/// 2. Timer notices (hints, timeouts) from the round engine
///
/// Replies go out through `outbound`. Returns when the gateway channel closes.
pub async fn run(
    mut events: mpsc::Receiver<GatewayEvent>,
    mut notices: mpsc::UnboundedReceiver<RoundNotice>,
    outbound: mpsc::Sender<OutboundMessage>,
    app: Arc<App>,
) -> anyhow::Result<()> {
    info!("application event loop started");
    let mut notices_open = true;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    info!("gateway channel closed, shutting down");
                    break;
                };
                let app = app.clone();
                let outbound = outbound.clone();
                tokio::spawn(async move {
                    for msg in app.handle_event(event).await {
                        if outbound.send(msg).await.is_err() {
                            warn!("outbound channel closed, dropping reply");
                            return;
                        }
                    }
                });
            }

            notice = notices.recv(), if notices_open => {
                match notice {
                    Some(notice) => {
                        if outbound.send(notice_message(notice)).await.is_err() {
                            warn!("outbound channel closed, dropping notice");
                        }
                    }
                    None => {
                        info!("round notice channel closed");
                        notices_open = false;
                    }
                }
            }
        }
    }

    info!("application event loop exiting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use champguess_core::content::{
        ChampionContent, ChampionSummary, ContentProvider, ImageRequest, SkinInfo,
    };
    use champguess_core::ledger::DailyOutcome;
    use champguess_core::player::{Rarity, SkinRecord};
    use champguess_core::{Database, Difficulty, ErrorKind, Mode, Player, RoundSettings};

    struct AhriOnly;

    #[async_trait]
    impl ContentProvider for AhriOnly {
        async fn random_content(
            &self,
            mode: Mode,
            difficulty: Difficulty,
            pixelate: bool,
        ) -> Option<ChampionContent> {
            Some(ChampionContent {
                champion: "Ahri".into(),
                champion_key: "Ahri".into(),
                image_url: "https://example.invalid/ahri.jpg".into(),
                image: ImageRequest {
                    mode,
                    difficulty,
                    pixelate,
                },
                ability_key: Some("Q".into()),
                ability_name: Some("Orb of Deception".into()),
                tags: vec!["Mage".into()],
                title: "the Nine-Tailed Fox".into(),
            })
        }

        fn champions(&self) -> Vec<ChampionSummary> {
            vec![ChampionSummary {
                key: "Ahri".into(),
                name: "Ahri".into(),
            }]
        }

        async fn champion_skins(&self, _champion_key: &str) -> Option<Vec<SkinInfo>> {
            Some(vec![SkinInfo {
                num: 0,
                name: "default".into(),
            }])
        }
    }

    struct Harness {
        app: Arc<App>,
        db: Arc<Database>,
        notices: mpsc::UnboundedReceiver<RoundNotice>,
    }

    fn harness() -> Harness {
        let db = Arc::new(Database::open(":memory:").unwrap());
        let content: Arc<dyn ContentProvider> = Arc::new(AhriOnly);
        let ledger = Arc::new(Ledger::new(db.clone(), content.clone(), 8));
        let (tx, rx) = mpsc::unbounded_channel();
        let rounds = RoundEngine::new(ledger.clone(), content, RoundSettings::default(), tx);
        let trades = TradeBroker::new(db.clone(), Duration::from_secs(300));
        Harness {
            app: Arc::new(App::new(rounds, ledger, trades, 10)),
            db,
            notices: rx,
        }
    }

    fn user(id: &str) -> UserRef {
        UserRef {
            id: id.into(),
            name: format!("user{id}"),
        }
    }

    fn channel() -> ChannelRef {
        ChannelRef {
            id: "c1".into(),
            guild_id: Some("g1".into()),
        }
    }

    fn command(name: &str, args: &str, from: &str) -> GatewayEvent {
        GatewayEvent::Command {
            command: name.into(),
            args: args.split_whitespace().map(str::to_string).collect(),
            user: user(from),
            channel: channel(),
        }
    }

    fn single(mut replies: Vec<OutboundMessage>) -> Reply {
        assert_eq!(replies.len(), 1, "expected one reply, got {replies:?}");
        replies.remove(0).reply
    }

    #[tokio::test]
    async fn daily_creates_player_once_per_period() {
        let h = harness();
        let first = single(h.app.handle_event(command("daily", "", "1")).await);
        assert!(matches!(
            first,
            Reply::Daily {
                outcome: DailyOutcome::Granted { .. },
                ..
            }
        ));
        let second = single(h.app.handle_event(command("daily", "", "1")).await);
        assert!(matches!(
            second,
            Reply::Daily {
                outcome: DailyOutcome::AlreadyClaimed { .. },
                ..
            }
        ));
        assert_eq!(h.db.load_player("1").unwrap().unwrap().username, "user1");
    }

    #[tokio::test]
    async fn bad_commands_become_error_replies() {
        let h = harness();
        let reply = single(h.app.handle_event(command("dance", "", "1")).await);
        assert!(matches!(
            reply,
            Reply::Error {
                kind: ErrorKind::InvalidArgument,
                ..
            }
        ));

        let reply = single(h.app.handle_event(command("oc", "", "1")).await);
        assert!(matches!(
            reply,
            Reply::Error {
                kind: ErrorKind::InsufficientResource,
                ..
            }
        ));

        let reply = single(h.app.handle_event(command("gsp", "v2", "1")).await);
        assert!(matches!(
            reply,
            Reply::Error {
                kind: ErrorKind::InvalidArgument,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn chat_guesses_only_count_during_a_round() {
        let h = harness();
        let chatter = GatewayEvent::Message {
            text: "ahri".into(),
            user: user("1"),
            channel: channel(),
        };
        assert!(h.app.handle_event(chatter.clone()).await.is_empty());

        let started = single(h.app.handle_event(command("gsp", "hard", "1")).await);
        assert!(matches!(started, Reply::RoundStarted { .. }));

        let wrong = GatewayEvent::Message {
            text: "lux".into(),
            user: user("2"),
            channel: channel(),
        };
        assert!(matches!(
            single(h.app.handle_event(wrong).await),
            Reply::WrongGuess { .. }
        ));

        let reply = single(h.app.handle_event(chatter.clone()).await);
        let Reply::Correct { username, guess } = reply else {
            panic!("expected correct guess, got {reply:?}");
        };
        assert_eq!(username, "user1");
        assert_eq!(guess.reward.reward.points_earned, 8);

        let reply = single(h.app.handle_event(command("stop", "", "1")).await);
        assert!(matches!(
            reply,
            Reply::Error {
                kind: ErrorKind::NotFound,
                ..
            }
        ));
        drop(h.notices);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_ends_the_round_silently() {
        let mut h = harness();
        h.app.handle_event(command("ga", "", "1")).await;
        let reply = single(h.app.handle_event(command("stop", "", "1")).await);
        assert!(matches!(reply, Reply::RoundCancelled { ref channel_id } if channel_id == "c1"));

        let late = GatewayEvent::Message {
            text: "ahri".into(),
            user: user("1"),
            channel: channel(),
        };
        assert!(h.app.handle_event(late).await.is_empty());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(h.notices.try_recv().is_err());
    }

    #[tokio::test]
    async fn inventory_buttons_check_owner() {
        let h = harness();
        h.app.handle_event(command("inv", "", "1")).await;

        let foreign = GatewayEvent::Button {
            payload: ButtonPayload::InventoryCategory {
                kind: InventoryKind::Skins,
                owner_id: "1".into(),
            },
            user: user("2"),
            channel: channel(),
        };
        assert!(matches!(
            single(h.app.handle_event(foreign).await),
            Reply::Error {
                kind: ErrorKind::Unauthorized,
                ..
            }
        ));

        let own = GatewayEvent::Button {
            payload: ButtonPayload::InventoryPage {
                kind: InventoryKind::Skins,
                page: 4,
                owner_id: "1".into(),
            },
            user: user("1"),
            channel: channel(),
        };
        let Reply::Inventory { page, .. } = single(h.app.handle_event(own).await) else {
            panic!("expected inventory page");
        };
        assert_eq!(page.page, 1);
        assert!(page.entry.is_none());
    }

    #[tokio::test]
    async fn trade_buttons_drive_the_broker() {
        let h = harness();
        h.db.save_player(&Player {
            owned_skins: vec![SkinRecord::new("Ahri", "Ahri", "Dynasty Ahri", 1, Rarity::Epic)],
            ..Player::new("1", "user1")
        })
        .unwrap();
        h.db.save_player(&Player {
            owned_skins: vec![SkinRecord::new("Ahri", "Ahri", "Midnight Ahri", 2, Rarity::Common)],
            ..Player::new("2", "user2")
        })
        .unwrap();

        let Reply::TradeOffered { offer } =
            single(h.app.handle_event(command("trade", "<@2> 1 1", "1")).await)
        else {
            panic!("expected trade offer");
        };

        let by_offerer = GatewayEvent::Button {
            payload: ButtonPayload::TradeAccept {
                trade_id: offer.trade_id.clone(),
            },
            user: user("1"),
            channel: channel(),
        };
        assert!(matches!(
            single(h.app.handle_event(by_offerer).await),
            Reply::Error {
                kind: ErrorKind::Unauthorized,
                ..
            }
        ));

        let by_target = GatewayEvent::Button {
            payload: ButtonPayload::TradeAccept {
                trade_id: offer.trade_id,
            },
            user: user("2"),
            channel: channel(),
        };
        assert!(matches!(
            single(h.app.handle_event(by_target).await),
            Reply::TradeCompleted { .. }
        ));
        let p1 = h.db.load_player("1").unwrap().unwrap();
        assert_eq!(p1.owned_skins[0].id, "Ahri_2");
    }

    #[tokio::test]
    async fn unregistered_offerer_cannot_trade() {
        let h = harness();
        h.db.save_player(&Player {
            owned_skins: vec![SkinRecord::new("Ahri", "Ahri", "Midnight Ahri", 2, Rarity::Common)],
            ..Player::new("2", "user2")
        })
        .unwrap();

        let reply = single(h.app.handle_event(command("trade", "<@2> 1 1", "9")).await);
        assert!(matches!(
            reply,
            Reply::Error {
                kind: ErrorKind::NotFound,
                ..
            }
        ));
        assert!(h.db.load_player("9").unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn event_loop_forwards_replies_and_notices() {
        let h = harness();
        let (events_tx, events_rx) = mpsc::channel(16);
        let (out_tx, mut out_rx) = mpsc::channel(16);
        let handle = tokio::spawn(run(events_rx, h.notices, out_tx, h.app.clone()));

        events_tx.send(command("gsp", "", "1")).await.unwrap();
        let started = out_rx.recv().await.unwrap();
        assert_eq!(started.channel_id, "c1");
        assert!(matches!(started.reply, Reply::RoundStarted { .. }));

        // Paused time auto-advances to the hint, then to the timeout.
        let hint = out_rx.recv().await.unwrap();
        assert!(matches!(hint.reply, Reply::Hint { ref title, .. } if title == "the Nine-Tailed Fox"));
        let timeout = out_rx.recv().await.unwrap();
        assert!(matches!(timeout.reply, Reply::TimedOut { ref answer, .. } if answer == "Ahri"));

        drop(events_tx);
        handle.await.unwrap().unwrap();
    }
}
