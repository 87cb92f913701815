// In-memory content provider and fixtures for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::content::{
    ChampionContent, ChampionSummary, ContentProvider, Difficulty, ImageRequest, Mode, SkinInfo,
};
use crate::store::Database;

#[derive(Default)]
pub(crate) struct StubContent {
    pub champions: Vec<ChampionSummary>,
    pub skins: HashMap<String, Vec<SkinInfo>>,
    pub next: Mutex<Option<ChampionContent>>,
    pub delay: Option<Duration>,
}

impl StubContent {
    pub fn with_champions(list: &[(&str, &str)]) -> Self {
        StubContent {
            champions: list
                .iter()
                .map(|(key, name)| ChampionSummary {
                    key: key.to_string(),
                    name: name.to_string(),
                })
                .collect(),
            ..StubContent::default()
        }
    }

    pub fn skins(mut self, key: &str, list: &[(u32, &str)]) -> Self {
        self.skins.insert(
            key.to_string(),
            list.iter()
                .map(|(num, name)| SkinInfo {
                    num: *num,
                    name: name.to_string(),
                })
                .collect(),
        );
        self
    }

    pub fn serving(self, content: ChampionContent) -> Self {
        *self.next.lock().unwrap() = Some(content);
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ContentProvider for StubContent {
    async fn random_content(
        &self,
        _mode: Mode,
        _difficulty: Difficulty,
        _pixelate: bool,
    ) -> Option<ChampionContent> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next.lock().unwrap().clone()
    }

    fn champions(&self) -> Vec<ChampionSummary> {
        self.champions.clone()
    }

    async fn champion_skins(&self, champion_key: &str) -> Option<Vec<SkinInfo>> {
        self.skins.get(champion_key).cloned()
    }
}

pub(crate) fn content_for(
    name: &str,
    mode: Mode,
    difficulty: Difficulty,
    pixelate: bool,
) -> ChampionContent {
    ChampionContent {
        champion: name.to_string(),
        champion_key: name.replace([' ', '\'', '.'], ""),
        image_url: format!("https://example.invalid/{name}.png"),
        image: ImageRequest {
            mode,
            difficulty,
            pixelate,
        },
        ability_key: Some("Q".to_string()),
        ability_name: Some("Orb of Deception".to_string()),
        tags: vec!["Mage".to_string()],
        title: "the Nine-Tailed Fox".to_string(),
    }
}

pub(crate) fn memory_db() -> Arc<Database> {
    Arc::new(Database::open(":memory:").expect("in-memory database should open"))
}
