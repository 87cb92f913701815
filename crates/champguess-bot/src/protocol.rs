// JSON protocol spoken with the chat bridge over the gateway websocket.
//
// Inbound events are what the bridge saw in chat; outbound messages are
// structured results the bridge renders however its platform likes.

use serde::{Deserialize, Serialize};

use champguess_core::ledger::{
    ChestLoot, DailyOutcome, Disenchanted, InventoryEntry, InventoryKind, InventoryPage,
    LeaderboardEntry, Profile, Purchase,
};
use champguess_core::player::SkinRecord;
use champguess_core::round::{CorrectGuess, RoundStarted, WrongGuess};
use champguess_core::trade::{TradeDeclined, TradeOffer, TradeSwap};
use champguess_core::{ErrorKind, GameError};

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRef {
    pub id: String,
    /// Absent for direct messages.
    #[serde(default)]
    pub guild_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// A slash or prefixed command, already split into name and arguments.
    Command {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        user: UserRef,
        channel: ChannelRef,
    },
    /// Plain chat text; a guess candidate if a round is running.
    Message {
        text: String,
        user: UserRef,
        channel: ChannelRef,
    },
    Button {
        payload: ButtonPayload,
        user: UserRef,
        channel: ChannelRef,
    },
}

impl GatewayEvent {
    pub fn channel(&self) -> &ChannelRef {
        match self {
            GatewayEvent::Command { channel, .. }
            | GatewayEvent::Message { channel, .. }
            | GatewayEvent::Button { channel, .. } => channel,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ButtonPayload {
    InventoryCategory {
        kind: InventoryKind,
        owner_id: String,
    },
    InventoryPage {
        kind: InventoryKind,
        page: usize,
        owner_id: String,
    },
    TradeAccept {
        trade_id: String,
    },
    TradeDecline {
        trade_id: String,
    },
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel_id: String,
    pub reply: Reply,
}

impl OutboundMessage {
    pub fn new(channel_id: impl Into<String>, reply: Reply) -> Self {
        Self {
            channel_id: channel_id.into(),
            reply,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandHelp {
    pub usage: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    RoundStarted {
        round: RoundStarted,
    },
    RoundCancelled {
        channel_id: String,
    },
    Hint {
        round_id: u64,
        tags: Vec<String>,
        title: String,
    },
    TimedOut {
        round_id: u64,
        answer: String,
    },
    Correct {
        username: String,
        guess: CorrectGuess,
    },
    /// React to the guess message; elimination rounds also say how many
    /// chances are left.
    WrongGuess {
        guess: WrongGuess,
    },
    Loot {
        user_id: String,
        loot: ChestLoot,
    },
    Crafted {
        user_id: String,
        item: InventoryEntry,
    },
    Disenchanted {
        user_id: String,
        result: Disenchanted,
    },
    Rerolled {
        user_id: String,
        skin: SkinRecord,
    },
    Daily {
        user_id: String,
        outcome: DailyOutcome,
    },
    Purchased {
        user_id: String,
        purchase: Purchase,
    },
    Inventory {
        owner_id: String,
        page: InventoryPage,
    },
    Leaderboard {
        entries: Vec<LeaderboardEntry>,
    },
    Profile {
        profile: Profile,
    },
    TradeOffered {
        offer: TradeOffer,
    },
    TradeCompleted {
        swap: TradeSwap,
    },
    TradeDeclined {
        declined: TradeDeclined,
    },
    Help {
        commands: Vec<CommandHelp>,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl From<GameError> for Reply {
    fn from(err: GameError) -> Self {
        Reply::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
