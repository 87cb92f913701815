// Content provider seam: game modes, difficulty table, and the trait the
// round engine and ledger use to draw champions, abilities and skins.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Modes and difficulties
// ---------------------------------------------------------------------------

/// What the players are shown during a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// A passive or spell icon.
    Ability,
    /// A crop of the champion's default splash art.
    Splash,
    /// A crop of one of the champion's non-default skins.
    Skin,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Ability => "ability",
            Mode::Splash => "splash",
            Mode::Skin => "skin",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ability" | "ga" => Ok(Mode::Ability),
            "splash" | "gsp" => Ok(Mode::Splash),
            "skin" | "gsk" => Ok(Mode::Skin),
            other => Err(format!("unknown mode `{other}`")),
        }
    }
}

/// Which phrasing a round accepts as the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStyle {
    /// Champion name only.
    Champion,
    /// "Champion Q", "Champion Passive", ...
    AbilityKey,
    /// "Champion <ability name>".
    AbilityName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Normal,
    Hard,
    /// Ability mode only: answer with the champion and ability key.
    V2,
    /// Ability mode only: answer with the champion and ability name.
    V3,
}

impl Difficulty {
    pub fn time_limit(&self) -> Duration {
        let secs = match self {
            Difficulty::Easy => 45,
            Difficulty::Normal | Difficulty::V2 | Difficulty::V3 => 30,
            Difficulty::Hard => 20,
        };
        Duration::from_secs(secs)
    }

    pub fn base_points(&self) -> u32 {
        match self {
            Difficulty::Easy => 2,
            Difficulty::Normal => 5,
            Difficulty::Hard => 8,
            Difficulty::V2 => 12,
            Difficulty::V3 => 15,
        }
    }

    pub fn pixelate_bonus(&self) -> u32 {
        match self {
            Difficulty::Easy => 3,
            Difficulty::Normal => 5,
            Difficulty::Hard => 7,
            Difficulty::V2 => 8,
            Difficulty::V3 => 10,
        }
    }

    /// Round reward before any streak multiplier.
    pub fn round_points(&self, pixelate: bool) -> u32 {
        if pixelate {
            self.base_points() + self.pixelate_bonus()
        } else {
            self.base_points()
        }
    }

    /// Answer phrasing for a round of `mode` at this difficulty. Only ability
    /// rounds ever ask for more than the champion name.
    pub fn answer_style(&self, mode: Mode) -> AnswerStyle {
        match (mode, self) {
            (Mode::Ability, Difficulty::V2) => AnswerStyle::AbilityKey,
            (Mode::Ability, Difficulty::V3) => AnswerStyle::AbilityName,
            _ => AnswerStyle::Champion,
        }
    }

    /// Key and name difficulties skip the tag/title hint.
    pub fn gives_hint(&self) -> bool {
        !matches!(self, Difficulty::V2 | Difficulty::V3)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Normal => "normal",
            Difficulty::Hard => "hard",
            Difficulty::V2 => "v2",
            Difficulty::V3 => "v3",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" | "ez" => Ok(Difficulty::Easy),
            "normal" | "mid" => Ok(Difficulty::Normal),
            "hard" => Ok(Difficulty::Hard),
            "v2" => Ok(Difficulty::V2),
            "v3" => Ok(Difficulty::V3),
            other => Err(format!("unknown difficulty `{other}`")),
        }
    }
}

// ---------------------------------------------------------------------------
// Content records
// ---------------------------------------------------------------------------

/// A champion as listed in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChampionSummary {
    /// Stable key, e.g. "MonkeyKing".
    pub key: String,
    /// Display name, e.g. "Wukong".
    pub name: String,
}

/// One skin of a champion. `num == 0` is the default skin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkinInfo {
    pub num: u32,
    pub name: String,
}

/// What the external image transformer should do with `image_url`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRequest {
    pub mode: Mode,
    pub difficulty: Difficulty,
    pub pixelate: bool,
}

/// One random draw from the content provider for a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChampionContent {
    /// Champion display name.
    pub champion: String,
    pub champion_key: String,
    pub image_url: String,
    pub image: ImageRequest,
    /// "Passive", "Q", "W", "E" or "R" for ability rounds.
    pub ability_key: Option<String>,
    pub ability_name: Option<String>,
    pub tags: Vec<String>,
    pub title: String,
}

// ---------------------------------------------------------------------------
// Provider trait
// ---------------------------------------------------------------------------

/// Read-only source of champion data. Implementations may hit the network;
/// returning `None` means the draw failed and the caller reports
/// `Unavailable`.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Draw one random piece of round content.
    async fn random_content(
        &self,
        mode: Mode,
        difficulty: Difficulty,
        pixelate: bool,
    ) -> Option<ChampionContent>;

    /// Every known champion. Empty if the catalog failed to load.
    fn champions(&self) -> Vec<ChampionSummary>;

    /// All skins of one champion, default skin included.
    async fn champion_skins(&self, champion_key: &str) -> Option<Vec<SkinInfo>>;

    /// Look a champion up by key or by display name, ignoring case and
    /// punctuation.
    fn find_champion(&self, query: &str) -> Option<ChampionSummary> {
        let wanted = crate::round::normalize_answer(query);
        self.champions().into_iter().find(|c| {
            c.key.eq_ignore_ascii_case(query) || crate::round::normalize_answer(&c.name) == wanted
        })
    }
}
