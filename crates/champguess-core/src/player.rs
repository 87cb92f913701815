// Player document: progression, currencies, inventories, and the pure
// reward/streak arithmetic applied to it.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Reward constants
// ---------------------------------------------------------------------------

/// Every multiple of this many total points grants `BE_PER_THRESHOLD`.
pub const BE_THRESHOLD: u64 = 50;
pub const BE_PER_THRESHOLD: u64 = 2500;
/// Every multiple of this many total points grants one chest.
pub const CHEST_THRESHOLD: u64 = 20;

/// Reward multiplier for a correct guess that brings the streak to `streak`.
pub fn streak_multiplier(streak: u32) -> f64 {
    match streak {
        0..=2 => 1.0,
        3..=4 => 1.5,
        5..=9 => 2.0,
        _ => 2.5,
    }
}

/// Number of multiples of `step` crossed going from `before` to `after`.
fn thresholds_crossed(before: u64, after: u64, step: u64) -> u64 {
    (after / step).saturating_sub(before / step)
}

// ---------------------------------------------------------------------------
// Rarity and champion price tiers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Rarity {
    Common,
    Epic,
    Legendary,
    Ultimate,
}

impl Rarity {
    /// Orange essence granted for disenchanting a shard of this rarity.
    pub fn disenchant_value(&self) -> u64 {
        match self {
            Rarity::Common => 195,
            Rarity::Epic => 270,
            Rarity::Legendary => 364,
            Rarity::Ultimate => 650,
        }
    }

    /// Orange essence needed to unlock a shard of this rarity.
    pub fn craft_cost(&self) -> u64 {
        match self {
            Rarity::Common => 520,
            Rarity::Epic => 1050,
            Rarity::Legendary => 1520,
            Rarity::Ultimate => 2950,
        }
    }

    /// Map a uniform roll in `[0, 1)` onto the drop table
    /// (60% / 25% / 12% / 3%).
    pub fn from_roll(roll: f64) -> Self {
        if roll < 0.60 {
            Rarity::Common
        } else if roll < 0.85 {
            Rarity::Epic
        } else if roll < 0.97 {
            Rarity::Legendary
        } else {
            Rarity::Ultimate
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Rarity::Common => "Common",
            Rarity::Epic => "Epic",
            Rarity::Legendary => "Legendary",
            Rarity::Ultimate => "Ultimate",
        }
    }
}

/// A champion store price tier and what a shard of that tier costs to
/// unlock or yields when disenchanted (both in blue essence).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChampionTier {
    pub store_price: u64,
    pub unlock_cost: u64,
    pub disenchant: u64,
}

pub const CHAMPION_TIERS: [ChampionTier; 6] = [
    ChampionTier { store_price: 450, unlock_cost: 270, disenchant: 90 },
    ChampionTier { store_price: 1350, unlock_cost: 810, disenchant: 270 },
    ChampionTier { store_price: 3150, unlock_cost: 1890, disenchant: 630 },
    ChampionTier { store_price: 4800, unlock_cost: 2880, disenchant: 960 },
    ChampionTier { store_price: 6300, unlock_cost: 3780, disenchant: 1260 },
    ChampionTier { store_price: 7800, unlock_cost: 4680, disenchant: 1560 },
];

pub fn tier_for_price(store_price: u64) -> Option<&'static ChampionTier> {
    CHAMPION_TIERS.iter().find(|t| t.store_price == store_price)
}

/// Deterministic store price for a champion, derived from its key so the
/// same champion always costs the same without a lookup table.
pub fn store_price_for(champion_key: &str) -> u64 {
    // 32-bit FNV-1a.
    let mut hash: u32 = 0x811c_9dc5;
    for byte in champion_key.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    CHAMPION_TIERS[(hash as usize) % CHAMPION_TIERS.len()].store_price
}

// ---------------------------------------------------------------------------
// Inventory records
// ---------------------------------------------------------------------------

/// Anything that can sit in an inventory list and be referred to by id.
pub trait Item {
    fn item_id(&self) -> &str;
    fn display_name(&self) -> String;
}

/// Locked champion unlock token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChampionShard {
    pub id: String,
    pub name: String,
    pub be_cost: u64,
    pub store_price: u64,
}

impl ChampionShard {
    pub fn disenchant_value(&self) -> u64 {
        tier_for_price(self.store_price)
            .map(|t| t.disenchant)
            .unwrap_or(CHAMPION_TIERS[0].disenchant)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnedChampion {
    pub id: String,
    pub name: String,
}

/// A skin, either as a locked shard or unlocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkinRecord {
    /// `<championId>_<skinNum>`
    pub id: String,
    pub champion_id: String,
    pub champion_name: String,
    pub skin_name: String,
    pub skin_num: u32,
    pub rarity: Rarity,
}

impl SkinRecord {
    pub fn new(
        champion_id: &str,
        champion_name: &str,
        skin_name: &str,
        skin_num: u32,
        rarity: Rarity,
    ) -> Self {
        SkinRecord {
            id: format!("{champion_id}_{skin_num}"),
            champion_id: champion_id.to_string(),
            champion_name: champion_name.to_string(),
            skin_name: skin_name.to_string(),
            skin_num,
            rarity,
        }
    }
}

impl Item for ChampionShard {
    fn item_id(&self) -> &str {
        &self.id
    }
    fn display_name(&self) -> String {
        self.name.clone()
    }
}

impl Item for OwnedChampion {
    fn item_id(&self) -> &str {
        &self.id
    }
    fn display_name(&self) -> String {
        self.name.clone()
    }
}

impl Item for SkinRecord {
    fn item_id(&self) -> &str {
        &self.id
    }
    fn display_name(&self) -> String {
        format!("{} - {}", self.champion_name, self.skin_name)
    }
}

/// Convert a user-facing 1-based index into a position in a list of `len`.
pub fn resolve_index(len: usize, one_based: usize) -> Option<usize> {
    (one_based >= 1 && one_based <= len).then(|| one_based - 1)
}

// ---------------------------------------------------------------------------
// Player
// ---------------------------------------------------------------------------

/// What a single `apply_reward` granted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardOutcome {
    pub points_earned: u64,
    pub be_earned: u64,
    pub chests_earned: u64,
}

/// Persistent per-user document. Field names serialize in camelCase so
/// legacy exports load unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Player {
    pub user_id: String,
    pub username: String,

    pub total_points: u64,
    pub wins: u32,
    pub games_played: u32,
    /// Sum of seconds-to-answer across wins.
    pub total_time: f64,

    pub current_streak: u32,
    pub max_streak: u32,

    pub blue_essence: u64,
    pub orange_essence: u64,
    pub chests: u64,

    pub champion_shards: Vec<ChampionShard>,
    pub skin_shards: Vec<SkinRecord>,
    pub owned_champions: Vec<OwnedChampion>,
    pub owned_skins: Vec<SkinRecord>,

    /// Milliseconds since the Unix epoch of the last daily claim, 0 if never.
    pub last_daily: i64,
}

impl Player {
    pub fn new(user_id: &str, username: &str) -> Self {
        Player {
            user_id: user_id.to_string(),
            username: username.to_string(),
            ..Player::default()
        }
    }

    /// Count a correct guess against the streak and return the new streak.
    pub fn extend_streak(&mut self) -> u32 {
        self.current_streak += 1;
        self.max_streak = self.max_streak.max(self.current_streak);
        self.current_streak
    }

    pub fn reset_streak(&mut self) {
        self.current_streak = 0;
    }

    /// Credit a win. Blue essence and chests are granted per threshold
    /// multiple crossed, so one large reward can grant several of each.
    pub fn apply_reward(
        &mut self,
        time_taken: f64,
        base_points: u32,
        streak_multiplier: f64,
    ) -> RewardOutcome {
        let points_earned = (f64::from(base_points) * streak_multiplier).floor() as u64;
        let before = self.total_points;
        let after = before + points_earned;

        self.wins += 1;
        self.games_played += 1;
        self.total_time += time_taken;
        self.total_points = after;

        let be_earned = thresholds_crossed(before, after, BE_THRESHOLD) * BE_PER_THRESHOLD;
        let chests_earned = thresholds_crossed(before, after, CHEST_THRESHOLD);
        self.blue_essence += be_earned;
        self.chests += chests_earned;

        RewardOutcome {
            points_earned,
            be_earned,
            chests_earned,
        }
    }

    pub fn owns_champion(&self, champion_id: &str) -> bool {
        self.owned_champions.iter().any(|c| c.id == champion_id)
    }

    pub fn last_daily_at(&self) -> Option<DateTime<Utc>> {
        if self.last_daily <= 0 {
            return None;
        }
        Utc.timestamp_millis_opt(self.last_daily).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player_with_points(points: u64) -> Player {
        Player {
            total_points: points,
            ..Player::new("u1", "tester")
        }
    }

    #[test]
    fn streak_multiplier_table() {
        let got: Vec<f64> = [1, 2, 3, 4, 5, 10].iter().map(|s| streak_multiplier(*s)).collect();
        assert_eq!(got, vec![1.0, 1.0, 1.5, 1.5, 2.0, 2.5]);
        assert_eq!(streak_multiplier(9), 2.0);
        assert_eq!(streak_multiplier(0), 1.0);
    }

    #[test]
    fn be_granted_once_when_crossing_fifty() {
        let mut p = player_with_points(48);
        let out = p.apply_reward(3.0, 4, 1.0);
        assert_eq!(p.total_points, 52);
        assert_eq!(out.be_earned, 2500);
        assert_eq!(p.blue_essence, 2500);
    }

    #[test]
    fn chest_thresholds_crossed_individually() {
        let mut p = player_with_points(18);
        let out = p.apply_reward(1.0, 24, 1.0);
        assert_eq!(p.total_points, 42);
        assert_eq!(out.chests_earned, 2);

        let mut p = player_with_points(18);
        let out = p.apply_reward(1.0, 44, 1.0);
        assert_eq!(p.total_points, 62);
        assert_eq!(out.chests_earned, 3);
        assert_eq!(out.be_earned, 2500);
    }

    #[test]
    fn crossing_only_twenty_grants_one_chest() {
        let mut p = player_with_points(18);
        let out = p.apply_reward(1.0, 21, 1.0);
        assert_eq!(p.total_points, 39);
        assert_eq!(out.chests_earned, 1);
        assert_eq!(out.be_earned, 0);
    }

    #[test]
    fn points_are_floored_after_multiplier() {
        let mut p = player_with_points(0);
        let out = p.apply_reward(4.2, 5, 1.5);
        assert_eq!(out.points_earned, 7);
        assert_eq!(p.wins, 1);
        assert_eq!(p.games_played, 1);
        assert!((p.total_time - 4.2).abs() < 1e-9);
    }

    #[test]
    fn total_points_equals_sum_of_rewards() {
        let mut p = player_with_points(0);
        let mut sum = 0;
        let mut last = 0;
        for (base, mult) in [(5, 1.0), (10, 1.5), (15, 2.5), (2, 2.0), (25, 1.0)] {
            sum += p.apply_reward(1.0, base, mult).points_earned;
            assert!(p.total_points >= last);
            last = p.total_points;
        }
        assert_eq!(p.total_points, sum);
    }

    #[test]
    fn extend_streak_tracks_high_water_mark() {
        let mut p = player_with_points(0);
        p.extend_streak();
        p.extend_streak();
        assert_eq!(p.max_streak, 2);
        p.reset_streak();
        assert_eq!(p.extend_streak(), 1);
        assert_eq!(p.max_streak, 2);
        assert!(p.current_streak <= p.max_streak);
    }

    #[test]
    fn rarity_bands() {
        assert_eq!(Rarity::from_roll(0.0), Rarity::Common);
        assert_eq!(Rarity::from_roll(0.5999), Rarity::Common);
        assert_eq!(Rarity::from_roll(0.60), Rarity::Epic);
        assert_eq!(Rarity::from_roll(0.85), Rarity::Legendary);
        assert_eq!(Rarity::from_roll(0.97), Rarity::Ultimate);
        assert_eq!(Rarity::from_roll(0.999), Rarity::Ultimate);
    }

    #[test]
    fn store_price_is_stable_and_in_tier_list() {
        let a = store_price_for("Ahri");
        assert_eq!(a, store_price_for("Ahri"));
        assert!(tier_for_price(a).is_some());
        assert!(tier_for_price(store_price_for("MonkeyKing")).is_some());
    }

    #[test]
    fn resolve_index_is_one_based() {
        assert_eq!(resolve_index(3, 1), Some(0));
        assert_eq!(resolve_index(3, 3), Some(2));
        assert_eq!(resolve_index(3, 0), None);
        assert_eq!(resolve_index(3, 4), None);
        assert_eq!(resolve_index(0, 1), None);
    }

    #[test]
    fn legacy_document_deserializes() {
        let json = r#"{
            "userId": "42",
            "username": "momo",
            "totalPoints": 130,
            "wins": 12,
            "blueEssence": 5000,
            "skinShards": [{
                "id": "Ahri_1", "championId": "Ahri", "championName": "Ahri",
                "skinName": "Dynasty Ahri", "skinNum": 1, "rarity": "EPIC"
            }],
            "ownedChampions": [{"id": "Ahri", "name": "Ahri", "beCost": 810, "storePrice": 1350}],
            "lastDaily": 0
        }"#;
        let p: Player = serde_json::from_str(json).unwrap();
        assert_eq!(p.user_id, "42");
        assert_eq!(p.total_points, 130);
        assert_eq!(p.current_streak, 0);
        assert_eq!(p.skin_shards[0].rarity, Rarity::Epic);
        assert!(p.owns_champion("Ahri"));
        assert!(p.last_daily_at().is_none());
    }
}
