// Trade Broker: pending two-party trade offers and the atomic swap on accept.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::GameError;
use crate::player::{resolve_index, Item, OwnedChampion, Player, SkinRecord};
use crate::store::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeType {
    Skin,
    Champion,
}

impl TradeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeType::Skin => "skin",
            TradeType::Champion => "champion",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum TradeItem {
    Champion(OwnedChampion),
    Skin(SkinRecord),
}

impl TradeItem {
    pub fn id(&self) -> &str {
        match self {
            TradeItem::Champion(c) => c.item_id(),
            TradeItem::Skin(s) => s.item_id(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            TradeItem::Champion(c) => c.display_name(),
            TradeItem::Skin(s) => s.display_name(),
        }
    }
}

/// A proposed trade as shown to both parties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeOffer {
    pub trade_id: String,
    pub trade_type: TradeType,
    pub offerer_id: String,
    pub target_id: String,
    pub guild_id: Option<String>,
    pub offerer_item: TradeItem,
    pub target_item: TradeItem,
    pub expires_in_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeSwap {
    pub trade_id: String,
    pub trade_type: TradeType,
    pub offerer_id: String,
    pub target_id: String,
    /// What the offerer gave away (now the target's).
    pub offerer_item: TradeItem,
    /// What the target gave away (now the offerer's).
    pub target_item: TradeItem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeDeclined {
    pub trade_id: String,
    pub offerer_id: String,
    pub target_id: String,
}

struct PendingTrade {
    offer: TradeOffer,
    /// 0-based positions at proposal time.
    offerer_pos: usize,
    target_pos: usize,
    deadline: Instant,
    expiry: AbortHandle,
}

impl PendingTrade {
    fn involves_pair(&self, a: &str, b: &str) -> bool {
        let (x, y) = (&self.offer.offerer_id, &self.offer.target_id);
        (x == a && y == b) || (x == b && y == a)
    }
}

struct BrokerInner {
    db: Arc<Database>,
    expiry: Duration,
    pending: Mutex<HashMap<String, PendingTrade>>,
}

impl BrokerInner {
    fn pending(&self) -> MutexGuard<'_, HashMap<String, PendingTrade>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds pending trades in memory. Clones share the same table.
#[derive(Clone)]
pub struct TradeBroker {
    inner: Arc<BrokerInner>,
}

fn items_of(player: &Player, trade_type: TradeType) -> Vec<TradeItem> {
    match trade_type {
        TradeType::Skin => player
            .owned_skins
            .iter()
            .cloned()
            .map(TradeItem::Skin)
            .collect(),
        TradeType::Champion => player
            .owned_champions
            .iter()
            .cloned()
            .map(TradeItem::Champion)
            .collect(),
    }
}

fn id_at(player: &Player, trade_type: TradeType, pos: usize) -> Option<&str> {
    match trade_type {
        TradeType::Skin => player.owned_skins.get(pos).map(|s| s.id.as_str()),
        TradeType::Champion => player.owned_champions.get(pos).map(|c| c.id.as_str()),
    }
}

fn take_at(player: &mut Player, trade_type: TradeType, pos: usize) -> TradeItem {
    match trade_type {
        TradeType::Skin => TradeItem::Skin(player.owned_skins.remove(pos)),
        TradeType::Champion => TradeItem::Champion(player.owned_champions.remove(pos)),
    }
}

fn give(player: &mut Player, item: TradeItem) {
    match item {
        TradeItem::Skin(s) => player.owned_skins.push(s),
        TradeItem::Champion(c) => player.owned_champions.push(c),
    }
}

impl TradeBroker {
    pub fn new(db: Arc<Database>, expiry: Duration) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                db,
                expiry,
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending().len()
    }

    /// Propose swapping the offerer's item at `offerer_index` for the
    /// target's item at `target_index` (both 1-based into the owned list of
    /// `trade_type`).
    pub fn initiate(
        &self,
        offerer_id: &str,
        target_id: &str,
        offerer_index: usize,
        target_index: usize,
        trade_type: TradeType,
        guild_id: Option<&str>,
    ) -> Result<TradeOffer, GameError> {
        if offerer_id == target_id {
            return Err(GameError::InvalidArgument("you cannot trade with yourself".into()));
        }

        let offerer = self
            .inner
            .db
            .load_player(offerer_id)?
            .ok_or_else(|| GameError::NotFound("you have no profile yet".into()))?;
        let target = self
            .inner
            .db
            .load_player(target_id)?
            .ok_or_else(|| GameError::NotFound(format!("{target_id} has no profile yet")))?;

        let offerer_items = items_of(&offerer, trade_type);
        let target_items = items_of(&target, trade_type);
        let offerer_pos = resolve_index(offerer_items.len(), offerer_index).ok_or_else(|| {
            GameError::InvalidArgument(format!(
                "invalid {} index, you own {}",
                trade_type.as_str(),
                offerer_items.len()
            ))
        })?;
        let target_pos = resolve_index(target_items.len(), target_index).ok_or_else(|| {
            GameError::InvalidArgument(format!(
                "invalid target {} index, they own {}",
                trade_type.as_str(),
                target_items.len()
            ))
        })?;

        let mut pending = self.inner.pending();
        if pending.values().any(|t| t.involves_pair(offerer_id, target_id)) {
            return Err(GameError::PreconditionFailed(
                "you already have a pending trade with this player".into(),
            ));
        }

        let trade_id = Uuid::new_v4().to_string();
        let offer = TradeOffer {
            trade_id: trade_id.clone(),
            trade_type,
            offerer_id: offerer_id.to_string(),
            target_id: target_id.to_string(),
            guild_id: guild_id.map(str::to_string),
            offerer_item: offerer_items[offerer_pos].clone(),
            target_item: target_items[target_pos].clone(),
            expires_in_secs: self.inner.expiry.as_secs(),
        };

        let expiry = spawn_expiry(Arc::downgrade(&self.inner), self.inner.expiry, trade_id.clone());
        pending.insert(
            trade_id.clone(),
            PendingTrade {
                offer: offer.clone(),
                offerer_pos,
                target_pos,
                deadline: Instant::now() + self.inner.expiry,
                expiry,
            },
        );

        info!(
            "trade {trade_id} proposed: {offerer_id} {} for {target_id} {}",
            offer.offerer_item.id(),
            offer.target_item.id()
        );
        Ok(offer)
    }

    pub fn accept(&self, trade_id: &str, acting_user: &str) -> Result<TradeSwap, GameError> {
        // Claim the trade so a second accept cannot race this one.
        let trade = self.claim(trade_id, acting_user)?;
        let trade_type = trade.offer.trade_type;
        let (offerer_pos, target_pos) = (trade.offerer_pos, trade.target_pos);
        let offerer_item_id = trade.offer.offerer_item.id().to_string();
        let target_item_id = trade.offer.target_item.id().to_string();

        let result = self.inner.db.update_pair(
            &trade.offer.offerer_id,
            &trade.offer.target_id,
            |offerer, target| {
                let unchanged = id_at(offerer, trade_type, offerer_pos) == Some(offerer_item_id.as_str())
                    && id_at(target, trade_type, target_pos) == Some(target_item_id.as_str());
                if !unchanged {
                    return Err(GameError::PreconditionFailed(
                        "inventory has changed since the trade was proposed".into(),
                    ));
                }
                let from_offerer = take_at(offerer, trade_type, offerer_pos);
                let from_target = take_at(target, trade_type, target_pos);
                give(offerer, from_target.clone());
                give(target, from_offerer.clone());
                Ok((from_offerer, from_target))
            },
        );

        match result {
            Ok((offerer_item, target_item)) => {
                trade.expiry.abort();
                info!(
                    "trade {trade_id} completed: {} <-> {}",
                    offerer_item.id(),
                    target_item.id()
                );
                Ok(TradeSwap {
                    trade_id: trade_id.to_string(),
                    trade_type,
                    offerer_id: trade.offer.offerer_id,
                    target_id: trade.offer.target_id,
                    offerer_item,
                    target_item,
                })
            }
            Err(GameError::Storage(msg)) => {
                warn!("trade {trade_id} failed to save: {msg}");
                if trade.deadline > Instant::now() {
                    self.inner.pending().insert(trade_id.to_string(), trade);
                } else {
                    trade.expiry.abort();
                }
                Err(GameError::Storage(msg))
            }
            Err(err) => {
                trade.expiry.abort();
                info!("trade {trade_id} discarded: {err}");
                Err(err)
            }
        }
    }

    pub fn decline(&self, trade_id: &str, acting_user: &str) -> Result<TradeDeclined, GameError> {
        let trade = self.claim(trade_id, acting_user)?;
        trade.expiry.abort();
        info!("trade {trade_id} declined by {acting_user}");
        Ok(TradeDeclined {
            trade_id: trade_id.to_string(),
            offerer_id: trade.offer.offerer_id,
            target_id: trade.offer.target_id,
        })
    }

    /// Remove a live trade addressed to `acting_user` from the table.
    fn claim(&self, trade_id: &str, acting_user: &str) -> Result<PendingTrade, GameError> {
        let mut pending = self.inner.pending();
        let trade = pending
            .remove(trade_id)
            .ok_or_else(|| GameError::NotFound("this trade has expired".into()))?;

        if trade.deadline <= Instant::now() {
            trade.expiry.abort();
            return Err(GameError::NotFound("this trade has expired".into()));
        }
        if trade.offer.target_id != acting_user {
            pending.insert(trade_id.to_string(), trade);
            return Err(GameError::Unauthorized(
                "only the trade recipient can respond to this trade".into(),
            ));
        }
        Ok(trade)
    }
}

fn spawn_expiry(inner: Weak<BrokerInner>, after: Duration, trade_id: String) -> AbortHandle {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        let Some(inner) = inner.upgrade() else {
            return;
        };
        if inner.pending().remove(&trade_id).is_some() {
            info!("trade {trade_id} expired");
        } else {
            debug!("expiry for settled trade {trade_id}");
        }
    })
    .abort_handle()
}
