// Reading legacy player exports for `--import`.
//
// Two shapes are accepted: a JSON array of player documents, or an object
// keyed by user id. Unknown fields (database ids, version counters) are
// ignored.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::Value;

use champguess_core::{Database, Player};

pub fn parse_export(text: &str) -> Result<Vec<Player>> {
    let value: Value = serde_json::from_str(text).context("export is not valid JSON")?;
    let players = match value {
        Value::Array(_) => serde_json::from_value::<Vec<Player>>(value)
            .context("export array holds an invalid player")?,
        Value::Object(_) => {
            let keyed = serde_json::from_value::<BTreeMap<String, Player>>(value)
                .context("export object holds an invalid player")?;
            keyed
                .into_iter()
                .map(|(user_id, mut player)| {
                    if player.user_id.is_empty() {
                        player.user_id = user_id;
                    }
                    player
                })
                .collect()
        }
        _ => bail!("export must be a JSON array or object"),
    };

    if let Some(bad) = players.iter().position(|p| p.user_id.is_empty()) {
        bail!("player #{} in export has no userId", bad + 1);
    }
    Ok(players)
}

pub fn import_file(db: &Database, path: &Path) -> Result<usize> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let players = parse_export(&text)?;
    db.import_players(&players)
        .with_context(|| format!("failed to import {}", path.display()))
}
