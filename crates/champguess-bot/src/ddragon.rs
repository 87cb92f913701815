// Riot Data Dragon content provider.
//
// Resolves the patch version, loads the champion catalog once at startup,
// and fetches per-champion details (abilities, skins) on demand. Skin lists
// are cached per champion; everything else is fetched per round.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::seq::IndexedRandom;
use rand::Rng;
use serde_json::Value;
use tracing::{debug, info, warn};

use champguess_core::content::{
    ChampionContent, ChampionSummary, ContentProvider, Difficulty, ImageRequest, Mode, SkinInfo,
};

use crate::config::ContentConfig;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Used when the configured version is "latest" and the versions endpoint
/// cannot be reached.
const FALLBACK_VERSION: &str = "14.1.1";

const ABILITY_KEYS: [&str; 5] = ["Passive", "Q", "W", "E", "R"];

// ---------------------------------------------------------------------------
// Parsed champion details
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Ability {
    /// "Passive", "Q", "W", "E" or "R".
    pub key: &'static str,
    pub name: String,
    /// Image file name, e.g. "AhriQ.png".
    pub image: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChampionDetails {
    pub key: String,
    pub name: String,
    pub title: String,
    pub tags: Vec<String>,
    /// Passive first, then Q/W/E/R.
    pub abilities: Vec<Ability>,
    pub skins: Vec<SkinInfo>,
}

// ---------------------------------------------------------------------------
// DataDragon
// ---------------------------------------------------------------------------

pub struct DataDragon {
    http: reqwest::Client,
    base_url: String,
    locale: String,
    configured_version: String,
    version: RwLock<String>,
    catalog: RwLock<Vec<ChampionSummary>>,
    skins: Mutex<HashMap<String, Vec<SkinInfo>>>,
}

impl DataDragon {
    pub fn new(config: &ContentConfig) -> Self {
        let initial = if config.version == "latest" {
            FALLBACK_VERSION.to_string()
        } else {
            config.version.clone()
        };
        Self {
            http: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            locale: config.locale.clone(),
            configured_version: config.version.clone(),
            version: RwLock::new(initial),
            catalog: RwLock::new(Vec::new()),
            skins: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the version and load the champion catalog. Returns the number
    /// of champions loaded.
    pub async fn load(&self) -> Result<usize> {
        let version = self.resolve_version().await;
        *self.version.write().unwrap_or_else(PoisonError::into_inner) = version.clone();
        info!("using Data Dragon version {version}");

        let url = format!(
            "{}/cdn/{version}/data/{}/champion.json",
            self.base_url, self.locale
        );
        let body = self.fetch_json(&url).await.context("failed to load champion list")?;
        let champions = parse_champion_list(&body);
        let count = champions.len();
        *self.catalog.write().unwrap_or_else(PoisonError::into_inner) = champions;
        info!("loaded {count} champions");
        Ok(count)
    }

    async fn resolve_version(&self) -> String {
        if self.configured_version != "latest" {
            return self.configured_version.clone();
        }
        let url = format!("{}/api/versions.json", self.base_url);
        match self.fetch_json(&url).await {
            Ok(body) => parse_latest_version(&body).unwrap_or_else(|| {
                warn!("versions.json had no entries, using {FALLBACK_VERSION}");
                FALLBACK_VERSION.to_string()
            }),
            Err(e) => {
                warn!("failed to resolve latest version ({e:#}), using {FALLBACK_VERSION}");
                FALLBACK_VERSION.to_string()
            }
        }
    }

    pub fn version(&self) -> String {
        self.version
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn fetch_json(&self, url: &str) -> Result<Value> {
        debug!("GET {url}");
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("{url} returned an error status"))?;
        response
            .json::<Value>()
            .await
            .with_context(|| format!("{url} returned invalid JSON"))
    }

    pub async fn champion_details(&self, key: &str) -> Option<ChampionDetails> {
        let url = format!(
            "{}/cdn/{}/data/{}/champion/{key}.json",
            self.base_url,
            self.version(),
            self.locale
        );
        let body = match self.fetch_json(&url).await {
            Ok(body) => body,
            Err(e) => {
                warn!("failed to load details for {key}: {e:#}");
                return None;
            }
        };
        let details = parse_champion_details(&body, key)?;
        self.skins
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.to_string())
            .or_insert_with(|| details.skins.clone());
        Some(details)
    }

    // ------------------------------------------------------------------
    // URL helpers
    // ------------------------------------------------------------------

    fn cdn(&self) -> String {
        format!("{}/cdn/{}", self.base_url, self.version())
    }

    fn passive_icon_url(&self, image: &str) -> String {
        format!("{}/img/passive/{image}", self.cdn())
    }

    fn spell_icon_url(&self, image: &str) -> String {
        format!("{}/img/spell/{image}", self.cdn())
    }

    fn splash_url(&self, key: &str, skin_num: u32) -> String {
        format!("{}/cdn/img/champion/splash/{key}_{skin_num}.jpg", self.base_url)
    }

    /// Turn fetched details into round content. `ability_roll` picks the
    /// ability (ability mode) and `skin_roll` the non-default skin (skin
    /// mode); both are reduced modulo the available choices.
    pub fn build_content(
        &self,
        details: &ChampionDetails,
        mode: Mode,
        difficulty: Difficulty,
        pixelate: bool,
        ability_roll: usize,
        skin_roll: usize,
    ) -> Option<ChampionContent> {
        let (image_url, ability) = match mode {
            Mode::Ability => {
                if details.abilities.is_empty() {
                    return None;
                }
                let ability = &details.abilities[ability_roll % details.abilities.len()];
                let url = if ability.key == "Passive" {
                    self.passive_icon_url(&ability.image)
                } else {
                    self.spell_icon_url(&ability.image)
                };
                (url, Some(ability))
            }
            Mode::Splash => (self.splash_url(&details.key, 0), None),
            Mode::Skin => {
                let alternates: Vec<&SkinInfo> =
                    details.skins.iter().filter(|s| s.num != 0).collect();
                let num = if alternates.is_empty() {
                    0
                } else {
                    alternates[skin_roll % alternates.len()].num
                };
                (self.splash_url(&details.key, num), None)
            }
        };

        Some(ChampionContent {
            champion: details.name.clone(),
            champion_key: details.key.clone(),
            image_url,
            image: ImageRequest {
                mode,
                difficulty,
                pixelate,
            },
            ability_key: ability.map(|a| a.key.to_string()),
            ability_name: ability.map(|a| a.name.clone()),
            tags: details.tags.clone(),
            title: details.title.clone(),
        })
    }
}

#[async_trait]
impl ContentProvider for DataDragon {
    async fn random_content(
        &self,
        mode: Mode,
        difficulty: Difficulty,
        pixelate: bool,
    ) -> Option<ChampionContent> {
        let key = {
            let catalog = self.catalog.read().unwrap_or_else(PoisonError::into_inner);
            catalog.choose(&mut rand::rng())?.key.clone()
        };
        let details = self.champion_details(&key).await?;
        let (ability_roll, skin_roll) = {
            let mut rng = rand::rng();
            (
                rng.random_range(0..ABILITY_KEYS.len()),
                rng.random_range(0..usize::from(u16::MAX)),
            )
        };
        self.build_content(&details, mode, difficulty, pixelate, ability_roll, skin_roll)
    }

    fn champions(&self) -> Vec<ChampionSummary> {
        self.catalog
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn champion_skins(&self, champion_key: &str) -> Option<Vec<SkinInfo>> {
        let cached = self
            .skins
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(champion_key)
            .cloned();
        if cached.is_some() {
            return cached;
        }
        self.champion_details(champion_key).await.map(|d| d.skins)
    }
}

// ---------------------------------------------------------------------------
// JSON parsing helpers
// ---------------------------------------------------------------------------

/// First entry of `api/versions.json`.
pub(crate) fn parse_latest_version(body: &Value) -> Option<String> {
    body.as_array()?.first()?.as_str().map(|s| s.to_string())
}

/// `data/<locale>/champion.json` → `{key, name}` pairs, sorted by key.
///
/// Expected shape: `{ "data": { "Ahri": { "id": "Ahri", "name": "Ahri", ... } } }`
pub(crate) fn parse_champion_list(body: &Value) -> Vec<ChampionSummary> {
    let Some(data) = body.get("data").and_then(Value::as_object) else {
        return Vec::new();
    };
    let mut champions: Vec<ChampionSummary> = data
        .iter()
        .filter_map(|(key, entry)| {
            Some(ChampionSummary {
                key: key.clone(),
                name: entry.get("name")?.as_str()?.to_string(),
            })
        })
        .collect();
    champions.sort_by(|a, b| a.key.cmp(&b.key));
    champions
}

/// `data/<locale>/champion/<key>.json` → details for `key`.
pub(crate) fn parse_champion_details(body: &Value, key: &str) -> Option<ChampionDetails> {
    let champ = body.get("data")?.get(key)?;
    let name = champ.get("name")?.as_str()?.to_string();
    let title = champ
        .get("title")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let tags = champ
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| {
            tags.iter()
                .filter_map(|t| t.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();

    let ability = |key: &'static str, v: &Value| -> Option<Ability> {
        Some(Ability {
            key,
            name: v.get("name")?.as_str()?.to_string(),
            image: v.get("image")?.get("full")?.as_str()?.to_string(),
        })
    };
    let mut abilities = Vec::with_capacity(ABILITY_KEYS.len());
    if let Some(passive) = champ.get("passive").and_then(|p| ability(ABILITY_KEYS[0], p)) {
        abilities.push(passive);
    }
    if let Some(spells) = champ.get("spells").and_then(Value::as_array) {
        for (spell, key) in spells.iter().zip(&ABILITY_KEYS[1..]) {
            if let Some(a) = ability(*key, spell) {
                abilities.push(a);
            }
        }
    }

    let skins = champ
        .get("skins")
        .and_then(Value::as_array)
        .map(|skins| {
            skins
                .iter()
                .filter_map(|s| {
                    Some(SkinInfo {
                        num: s.get("num")?.as_u64()? as u32,
                        name: s.get("name")?.as_str()?.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Some(ChampionDetails {
        key: key.to_string(),
        name,
        title,
        tags,
        abilities,
        skins,
    })
}
