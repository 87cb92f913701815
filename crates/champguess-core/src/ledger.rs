// Economy Ledger: every per-user mutation (rewards, loot, crafting, daily
// claims, purchases) and the read-only views the UI layer renders.

use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use rand::seq::IndexedRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::content::{ChampionSummary, ContentProvider, SkinInfo};
use crate::error::{GameError, Resource};
use crate::player::{
    resolve_index, store_price_for, streak_multiplier, ChampionShard, Item,
    OwnedChampion, Player, Rarity, RewardOutcome, SkinRecord, CHAMPION_TIERS,
};
use crate::store::Database;

/// Champions tried when looking for a non-default skin before falling back.
const SKIN_SAMPLE_ATTEMPTS: usize = 5;
/// Chance that a chest yields a champion shard rather than a skin shard.
const CHAMPION_LOOT_CHANCE: f64 = 0.40;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of a correct guess: the streak it landed on and what it paid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GuessReward {
    pub streak: u32,
    pub multiplier: f64,
    pub reward: RewardOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "loot", rename_all = "snake_case")]
pub enum ChestLoot {
    Champion(ChampionShard),
    Skin(SkinRecord),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Disenchanted {
    pub item_name: String,
    pub resource: Resource,
    pub gained: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DailyCategory {
    Chest,
    BlueEssence,
    OrangeEssence,
    Bundle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyReward {
    pub category: DailyCategory,
    pub chests: u64,
    pub blue_essence: u64,
    pub orange_essence: u64,
}

impl DailyReward {
    /// Map three uniform rolls in `[0, 1)` onto the daily table. `category`
    /// picks the row (30 / 30 / 25 / 15 %); `first` and `second` pick the
    /// amounts within the row's range.
    pub fn from_rolls(category: f64, first: f64, second: f64) -> Self {
        let span = |lo: u64, width: u64, roll: f64| lo + ((roll * width as f64) as u64).min(width - 1);

        let (category, chests, blue_essence, orange_essence) = if category < 0.30 {
            (DailyCategory::Chest, 1, 0, 0)
        } else if category < 0.60 {
            (DailyCategory::BlueEssence, 0, span(200, 500, first), 0)
        } else if category < 0.85 {
            (DailyCategory::OrangeEssence, 0, 0, span(100, 300, first))
        } else {
            (
                DailyCategory::Bundle,
                0,
                span(150, 300, first),
                span(50, 200, second),
            )
        };

        DailyReward {
            category,
            chests,
            blue_essence,
            orange_essence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DailyOutcome {
    Granted { reward: DailyReward },
    AlreadyClaimed { seconds_until_reset: i64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Purchase {
    pub champion: OwnedChampion,
    pub price: u64,
    pub blue_essence_left: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub player: Player,
    /// Size of the champion catalog, for "owned X / Y" displays.
    pub catalog_size: usize,
}

/// Which inventory list a page view walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InventoryKind {
    ChampionShards,
    SkinShards,
    Champions,
    Skins,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "item", rename_all = "snake_case")]
pub enum InventoryEntry {
    ChampionShard(ChampionShard),
    Champion(OwnedChampion),
    Skin(SkinRecord),
}

/// One card of an inventory list plus the footer numbers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryPage {
    pub kind: InventoryKind,
    /// 1-based, already clamped.
    pub page: usize,
    pub total_pages: usize,
    pub entry: Option<InventoryEntry>,
    pub blue_essence: u64,
    pub orange_essence: u64,
    pub chests: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub user_id: String,
    pub username: String,
    pub total_points: u64,
    pub wins: u32,
    pub max_streak: u32,
    /// Mean seconds per win, `None` before the first win.
    pub average_time: Option<f64>,
}

// ---------------------------------------------------------------------------
// Daily boundary
// ---------------------------------------------------------------------------

/// Start of the daily period containing `t`: the latest `reset_hour`:00 UTC
/// at or before `t`.
pub fn daily_period_start(t: DateTime<Utc>, reset_hour: u32) -> DateTime<Utc> {
    let reset = NaiveTime::from_hms_opt(reset_hour.min(23), 0, 0).unwrap_or_default();
    let today = t.date_naive().and_time(reset).and_utc();
    if t >= today {
        today
    } else {
        today - ChronoDuration::days(1)
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Owns the persistent economy rules. Cheap to share behind an `Arc`; every
/// mutation is one transactional read-modify-write in the store.
pub struct Ledger {
    db: Arc<Database>,
    content: Arc<dyn ContentProvider>,
    daily_reset_hour: u32,
}

impl Ledger {
    pub fn new(db: Arc<Database>, content: Arc<dyn ContentProvider>, daily_reset_hour: u32) -> Self {
        Self {
            db,
            content,
            daily_reset_hour,
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Create the player if needed and refresh their display name.
    pub fn touch(&self, user_id: &str, username: &str) -> Result<(), GameError> {
        self.db.update_or_create_player(user_id, username, |_| Ok(()))
    }

    // ------------------------------------------------------------------
    // Scoring
    // ------------------------------------------------------------------

    /// Credit a win at an explicit multiplier.
    pub fn apply_reward(
        &self,
        user_id: &str,
        username: &str,
        time_taken: f64,
        base_points: u32,
        multiplier: f64,
    ) -> Result<RewardOutcome, GameError> {
        let reward = self.db.update_or_create_player(user_id, username, |p| {
            Ok(p.apply_reward(time_taken, base_points, multiplier))
        })?;
        info!(
            "reward for {user_id}: +{} points, +{} BE, +{} chests",
            reward.points_earned, reward.be_earned, reward.chests_earned
        );
        Ok(reward)
    }

    /// Extend the streak and credit the win in one update, so the
    /// multiplier always reflects the post-increment streak.
    pub fn record_correct_guess(
        &self,
        user_id: &str,
        username: &str,
        time_taken: f64,
        base_points: u32,
    ) -> Result<GuessReward, GameError> {
        let out = self.db.update_or_create_player(user_id, username, |p| {
            let streak = p.extend_streak();
            let multiplier = streak_multiplier(streak);
            let reward = p.apply_reward(time_taken, base_points, multiplier);
            Ok(GuessReward {
                streak,
                multiplier,
                reward,
            })
        })?;
        info!(
            "{user_id} guessed correctly in {time_taken:.1}s: streak {}, x{}, +{} points",
            out.streak, out.multiplier, out.reward.points_earned
        );
        Ok(out)
    }

    pub fn reset_streak(&self, user_id: &str, username: &str) -> Result<(), GameError> {
        self.db.update_or_create_player(user_id, username, |p| {
            if p.current_streak > 0 {
                debug!("streak reset for {user_id} (was {})", p.current_streak);
            }
            p.reset_streak();
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Loot
    // ------------------------------------------------------------------

    pub async fn open_chest(&self, user_id: &str) -> Result<ChestLoot, GameError> {
        let available = self
            .db
            .load_player(user_id)?
            .map(|p| p.chests)
            .unwrap_or(0);
        if available < 1 {
            return Err(GameError::insufficient(Resource::Chests, 1, available));
        }

        let catalog = self.content.champions();
        if catalog.is_empty() {
            return Err(GameError::Unavailable("champion catalog is empty".into()));
        }

        let champion_roll = rand::rng().random::<f64>() < CHAMPION_LOOT_CHANCE;
        let loot = if champion_roll {
            let (champion, tier) = {
                let mut rng = rand::rng();
                let champion = catalog
                    .choose(&mut rng)
                    .cloned()
                    .ok_or_else(|| GameError::Unavailable("champion catalog is empty".into()))?;
                let tier = CHAMPION_TIERS[rng.random_range(0..CHAMPION_TIERS.len())];
                (champion, tier)
            };
            ChestLoot::Champion(ChampionShard {
                id: champion.key,
                name: champion.name,
                be_cost: tier.unlock_cost,
                store_price: tier.store_price,
            })
        } else {
            let (champion, skin) = self.sample_skin(&catalog).await?;
            let rarity = Rarity::from_roll(rand::rng().random::<f64>());
            ChestLoot::Skin(SkinRecord::new(
                &champion.key,
                &champion.name,
                &skin.name,
                skin.num,
                rarity,
            ))
        };

        // The chest count may have changed while the skin list was fetched.
        let stored = loot.clone();
        self.db.update_player(user_id, move |p| {
            if p.chests < 1 {
                return Err(GameError::insufficient(Resource::Chests, 1, p.chests));
            }
            p.chests -= 1;
            match stored {
                ChestLoot::Champion(shard) => p.champion_shards.push(shard),
                ChestLoot::Skin(shard) => p.skin_shards.push(shard),
            }
            Ok(())
        })?;

        info!("{user_id} opened a chest: {loot:?}");
        Ok(loot)
    }

    /// Pick a random non-default skin, trying up to `SKIN_SAMPLE_ATTEMPTS`
    /// champions. Falls back to the last champion's default skin.
    async fn sample_skin(
        &self,
        catalog: &[ChampionSummary],
    ) -> Result<(ChampionSummary, SkinInfo), GameError> {
        let mut last: Option<(ChampionSummary, Option<SkinInfo>)> = None;

        for _ in 0..SKIN_SAMPLE_ATTEMPTS {
            let champion = catalog
                .choose(&mut rand::rng())
                .cloned()
                .ok_or_else(|| GameError::Unavailable("champion catalog is empty".into()))?;
            let skins = self.content.champion_skins(&champion.key).await.unwrap_or_default();

            let candidates: Vec<&SkinInfo> = skins.iter().filter(|s| s.num != 0).collect();
            let picked = candidates.choose(&mut rand::rng()).map(|s| (*s).clone());
            if let Some(skin) = picked {
                return Ok((champion, skin));
            }
            debug!("{} has no alternate skins, resampling", champion.key);
            let default_skin = skins.into_iter().find(|s| s.num == 0);
            last = Some((champion, default_skin));
        }

        match last {
            Some((champion, default_skin)) => {
                let skin = default_skin.unwrap_or_else(|| SkinInfo {
                    num: 0,
                    name: "default".to_string(),
                });
                Ok((champion, skin))
            }
            None => Err(GameError::Unavailable("no skins available".into())),
        }
    }

    // ------------------------------------------------------------------
    // Crafting
    // ------------------------------------------------------------------

    pub fn craft_champion(&self, user_id: &str, index: usize) -> Result<OwnedChampion, GameError> {
        let champion = self.db.update_player(user_id, |p| {
            let pos = shard_position(p.champion_shards.len(), index)?;
            let shard = &p.champion_shards[pos];
            if p.owns_champion(&shard.id) {
                return Err(GameError::PreconditionFailed(format!(
                    "you already own {}",
                    shard.name
                )));
            }
            if p.blue_essence < shard.be_cost {
                return Err(GameError::insufficient(
                    Resource::BlueEssence,
                    shard.be_cost,
                    p.blue_essence,
                ));
            }
            let shard = p.champion_shards.remove(pos);
            p.blue_essence -= shard.be_cost;
            let owned = OwnedChampion {
                id: shard.id,
                name: shard.name,
            };
            p.owned_champions.push(owned.clone());
            Ok(owned)
        })?;
        info!("{user_id} unlocked champion {}", champion.id);
        Ok(champion)
    }

    pub fn craft_skin(&self, user_id: &str, index: usize) -> Result<SkinRecord, GameError> {
        let skin = self.db.update_player(user_id, |p| {
            let pos = shard_position(p.skin_shards.len(), index)?;
            let shard = &p.skin_shards[pos];
            if !p.owns_champion(&shard.champion_id) {
                return Err(GameError::PreconditionFailed(format!(
                    "you need to own {} to unlock this skin",
                    shard.champion_name
                )));
            }
            let cost = shard.rarity.craft_cost();
            if p.orange_essence < cost {
                return Err(GameError::insufficient(
                    Resource::OrangeEssence,
                    cost,
                    p.orange_essence,
                ));
            }
            let shard = p.skin_shards.remove(pos);
            p.orange_essence -= cost;
            p.owned_skins.push(shard.clone());
            Ok(shard)
        })?;
        info!("{user_id} unlocked skin {}", skin.id);
        Ok(skin)
    }

    pub fn disenchant_skin(&self, user_id: &str, index: usize) -> Result<Disenchanted, GameError> {
        let out = self.db.update_player(user_id, |p| {
            let pos = shard_position(p.skin_shards.len(), index)?;
            let shard = p.skin_shards.remove(pos);
            let gained = shard.rarity.disenchant_value();
            p.orange_essence += gained;
            Ok(Disenchanted {
                item_name: shard.display_name(),
                resource: Resource::OrangeEssence,
                gained,
            })
        })?;
        info!("{user_id} disenchanted {} for {} OE", out.item_name, out.gained);
        Ok(out)
    }

    pub fn disenchant_champion(
        &self,
        user_id: &str,
        index: usize,
    ) -> Result<Disenchanted, GameError> {
        let out = self.db.update_player(user_id, |p| {
            let pos = shard_position(p.champion_shards.len(), index)?;
            let shard = p.champion_shards.remove(pos);
            let gained = shard.disenchant_value();
            p.blue_essence += gained;
            Ok(Disenchanted {
                item_name: shard.display_name(),
                resource: Resource::BlueEssence,
                gained,
            })
        })?;
        info!("{user_id} disenchanted {} for {} BE", out.item_name, out.gained);
        Ok(out)
    }

    /// Trade three skin shards for one Epic skin, unlocked immediately.
    pub async fn reroll_skins(
        &self,
        user_id: &str,
        indices: [usize; 3],
    ) -> Result<SkinRecord, GameError> {
        let [a, b, c] = indices;
        if a == b || b == c || a == c {
            return Err(GameError::InvalidArgument(
                "reroll needs three different shards".into(),
            ));
        }

        let player = self
            .db
            .load_player(user_id)?
            .ok_or_else(|| GameError::NotFound(format!("player {user_id}")))?;
        let mut positions = Vec::with_capacity(3);
        for index in indices {
            positions.push(shard_position(player.skin_shards.len(), index)?);
        }
        let snapshot: Vec<(usize, String)> = positions
            .iter()
            .map(|&pos| (pos, player.skin_shards[pos].id.clone()))
            .collect();

        let catalog = self.content.champions();
        if catalog.is_empty() {
            return Err(GameError::Unavailable("champion catalog is empty".into()));
        }
        let (champion, skin) = self.sample_skin(&catalog).await?;
        let minted = SkinRecord::new(
            &champion.key,
            &champion.name,
            &skin.name,
            skin.num,
            Rarity::Epic,
        );

        let stored = minted.clone();
        self.db.update_player(user_id, move |p| {
            let unchanged = snapshot
                .iter()
                .all(|(pos, id)| p.skin_shards.get(*pos).map(|s| &s.id) == Some(id));
            if !unchanged {
                return Err(GameError::PreconditionFailed(
                    "your skin shards changed, try again".into(),
                ));
            }
            let mut doomed: Vec<usize> = snapshot.iter().map(|(pos, _)| *pos).collect();
            doomed.sort_unstable_by(|x, y| y.cmp(x));
            for pos in doomed {
                p.skin_shards.remove(pos);
            }
            p.owned_skins.push(stored);
            Ok(())
        })?;

        info!("{user_id} rerolled three shards into {}", minted.id);
        Ok(minted)
    }

    // ------------------------------------------------------------------
    // Daily and store
    // ------------------------------------------------------------------

    pub fn claim_daily(
        &self,
        user_id: &str,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<DailyOutcome, GameError> {
        let reset_hour = self.daily_reset_hour;
        let outcome = self.db.update_or_create_player(user_id, username, |p| {
            let current = daily_period_start(now, reset_hour);
            if let Some(last) = p.last_daily_at() {
                if daily_period_start(last, reset_hour) == current {
                    let next = current + ChronoDuration::days(1);
                    return Ok(DailyOutcome::AlreadyClaimed {
                        seconds_until_reset: (next - now).num_seconds().max(1),
                    });
                }
            }

            let reward = {
                let mut rng = rand::rng();
                DailyReward::from_rolls(rng.random(), rng.random(), rng.random())
            };
            p.chests += reward.chests;
            p.blue_essence += reward.blue_essence;
            p.orange_essence += reward.orange_essence;
            p.last_daily = now.timestamp_millis();
            Ok(DailyOutcome::Granted { reward })
        })?;

        if let DailyOutcome::Granted { reward } = &outcome {
            info!("{user_id} claimed daily reward {reward:?}");
        }
        Ok(outcome)
    }

    pub fn purchase_champion(
        &self,
        user_id: &str,
        username: &str,
        query: &str,
    ) -> Result<Purchase, GameError> {
        let champion = self
            .content
            .find_champion(query)
            .ok_or_else(|| GameError::InvalidArgument(format!("no champion named `{query}`")))?;
        let price = store_price_for(&champion.key);

        let purchase = self.db.update_or_create_player(user_id, username, |p| {
            if p.owns_champion(&champion.key) {
                return Err(GameError::PreconditionFailed(format!(
                    "you already own {}",
                    champion.name
                )));
            }
            if p.blue_essence < price {
                return Err(GameError::insufficient(
                    Resource::BlueEssence,
                    price,
                    p.blue_essence,
                ));
            }
            p.blue_essence -= price;
            let owned = OwnedChampion {
                id: champion.key.clone(),
                name: champion.name.clone(),
            };
            p.owned_champions.push(owned.clone());
            Ok(Purchase {
                champion: owned,
                price,
                blue_essence_left: p.blue_essence,
            })
        })?;

        info!("{user_id} bought {} for {price} BE", purchase.champion.id);
        Ok(purchase)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn profile(&self, user_id: &str) -> Result<Profile, GameError> {
        let player = self
            .db
            .load_player(user_id)?
            .ok_or_else(|| GameError::NotFound(format!("no profile for {user_id}")))?;
        Ok(Profile {
            player,
            catalog_size: self.content.champions().len(),
        })
    }

    pub fn inventory_page(
        &self,
        user_id: &str,
        kind: InventoryKind,
        page: usize,
    ) -> Result<InventoryPage, GameError> {
        let player = self
            .db
            .load_player(user_id)?
            .ok_or_else(|| GameError::NotFound(format!("no inventory for {user_id}")))?;

        let len = match kind {
            InventoryKind::ChampionShards => player.champion_shards.len(),
            InventoryKind::SkinShards => player.skin_shards.len(),
            InventoryKind::Champions => player.owned_champions.len(),
            InventoryKind::Skins => player.owned_skins.len(),
        };
        let total_pages = len.max(1);
        let page = page.clamp(1, total_pages);
        let pos = page - 1;

        let entry = match kind {
            InventoryKind::ChampionShards => player
                .champion_shards
                .get(pos)
                .cloned()
                .map(InventoryEntry::ChampionShard),
            InventoryKind::SkinShards => player.skin_shards.get(pos).cloned().map(InventoryEntry::Skin),
            InventoryKind::Champions => player
                .owned_champions
                .get(pos)
                .cloned()
                .map(InventoryEntry::Champion),
            InventoryKind::Skins => player.owned_skins.get(pos).cloned().map(InventoryEntry::Skin),
        };

        Ok(InventoryPage {
            kind,
            page,
            total_pages,
            entry,
            blue_essence: player.blue_essence,
            orange_essence: player.orange_essence,
            chests: player.chests,
        })
    }

    pub fn leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>, GameError> {
        let players = self.db.top_players(limit)?;
        Ok(players
            .into_iter()
            .enumerate()
            .map(|(i, p)| LeaderboardEntry {
                rank: i + 1,
                average_time: (p.wins > 0).then(|| p.total_time / f64::from(p.wins)),
                user_id: p.user_id,
                username: p.username,
                total_points: p.total_points,
                wins: p.wins,
                max_streak: p.max_streak,
            })
            .collect())
    }
}

fn shard_position(len: usize, index: usize) -> Result<usize, GameError> {
    resolve_index(len, index).ok_or_else(|| {
        GameError::InvalidArgument(format!("index {index} is out of range (1-{len})"))
    })
}
