// Chat command parsing.
//
// The bridge hands over a command name and its whitespace-split arguments;
// this turns them into a typed `Command` or an `InvalidArgument` error the
// user sees verbatim.

use champguess_core::{Difficulty, GameError, Mode, TradeType};

use crate::protocol::CommandHelp;

/// Which shard list a disenchant draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardKind {
    Skin,
    Champion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartRound {
        mode: Mode,
        difficulty: Difficulty,
        pixelate: bool,
        elimination: bool,
    },
    StopRound,
    /// `None` means the caller's own profile.
    Profile(Option<String>),
    Inventory,
    OpenChest,
    CraftSkin(usize),
    CraftChampion(usize),
    Disenchant {
        kind: ShardKind,
        index: usize,
    },
    Reroll([usize; 3]),
    Daily,
    Leaderboard,
    Buy(String),
    Trade {
        trade_type: TradeType,
        target_id: String,
        mine: usize,
        theirs: usize,
    },
    Help,
}

pub fn parse_command(name: &str, args: &[String]) -> Result<Command, GameError> {
    let name = name.trim().trim_start_matches('/').to_ascii_lowercase();
    // `guess-splash`, `gsp` and plain `splash` all start a splash round.
    if let Ok(mode) = name.strip_prefix("guess-").unwrap_or(name.as_str()).parse::<Mode>() {
        return parse_round(mode, args);
    }
    match name.as_str() {
        "stop" | "end" => no_args(Command::StopRound, args, "stop"),
        "profile" => match args {
            [] => Ok(Command::Profile(None)),
            [user] => Ok(Command::Profile(Some(strip_mention(user)))),
            _ => Err(usage("profile [user]")),
        },
        "inventory" | "inv" => no_args(Command::Inventory, args, "inventory"),
        "open-chest" | "oc" => no_args(Command::OpenChest, args, "open-chest"),
        "craft-skin" => Ok(Command::CraftSkin(single_index(args, "craft-skin <n>")?)),
        "craft-champion" => Ok(Command::CraftChampion(single_index(
            args,
            "craft-champion <n>",
        )?)),
        "disenchant" | "de" => parse_disenchant(args),
        "reroll" => parse_reroll(args),
        "daily" => no_args(Command::Daily, args, "daily"),
        "leaderboard" | "lb" => no_args(Command::Leaderboard, args, "leaderboard"),
        "buy" => {
            let query = args.join(" ");
            if query.trim().is_empty() {
                return Err(usage("buy <champion name>"));
            }
            Ok(Command::Buy(query.trim().to_string()))
        }
        "trade" => parse_trade(args),
        "help" => Ok(Command::Help),
        other => Err(GameError::InvalidArgument(format!(
            "unknown command `{other}`, try `help`"
        ))),
    }
}

fn parse_round(mode: Mode, args: &[String]) -> Result<Command, GameError> {
    let mut difficulty = None;
    let mut pixelate = false;
    let mut elimination = false;

    for arg in args {
        match arg.to_ascii_lowercase().as_str() {
            "px" | "pixelate" | "pixelated" => pixelate = true,
            "elim" | "elimination" => elimination = true,
            other => {
                if difficulty.is_some() {
                    return Err(GameError::InvalidArgument(format!(
                        "unexpected argument `{other}`"
                    )));
                }
                difficulty = Some(other.parse::<Difficulty>().map_err(GameError::InvalidArgument)?);
            }
        }
    }

    Ok(Command::StartRound {
        mode,
        difficulty: difficulty.unwrap_or(Difficulty::Normal),
        pixelate,
        elimination,
    })
}

fn parse_disenchant(args: &[String]) -> Result<Command, GameError> {
    const USAGE: &str = "disenchant [skin|champ] <n>";
    let (kind, index) = match args {
        [n] => (ShardKind::Skin, n),
        [kind, n] => {
            let kind = match kind.to_ascii_lowercase().as_str() {
                "skin" => ShardKind::Skin,
                "champ" | "champion" => ShardKind::Champion,
                _ => return Err(usage(USAGE)),
            };
            (kind, n)
        }
        _ => return Err(usage(USAGE)),
    };
    Ok(Command::Disenchant {
        kind,
        index: parse_index(index)?,
    })
}

fn parse_reroll(args: &[String]) -> Result<Command, GameError> {
    match args {
        [a, b, c] => Ok(Command::Reroll([
            parse_index(a)?,
            parse_index(b)?,
            parse_index(c)?,
        ])),
        _ => Err(usage("reroll <a> <b> <c>")),
    }
}

fn parse_trade(args: &[String]) -> Result<Command, GameError> {
    const USAGE: &str = "trade [skin|champ] <user> <your #> <their #>";
    let (trade_type, rest) = match args.first().map(|a| a.to_ascii_lowercase()) {
        Some(t) if t == "skin" => (TradeType::Skin, &args[1..]),
        Some(t) if t == "champ" || t == "champion" => (TradeType::Champion, &args[1..]),
        _ => (TradeType::Skin, args),
    };
    match rest {
        [user, mine, theirs] => Ok(Command::Trade {
            trade_type,
            target_id: strip_mention(user),
            mine: parse_index(mine)?,
            theirs: parse_index(theirs)?,
        }),
        _ => Err(usage(USAGE)),
    }
}

fn no_args(cmd: Command, args: &[String], name: &str) -> Result<Command, GameError> {
    if args.is_empty() {
        Ok(cmd)
    } else {
        Err(usage(name))
    }
}

fn single_index(args: &[String], usage_line: &str) -> Result<usize, GameError> {
    match args {
        [n] => parse_index(n),
        _ => Err(usage(usage_line)),
    }
}

/// 1-based list positions as typed by users. Range checks against the actual
/// list happen in the ledger.
fn parse_index(raw: &str) -> Result<usize, GameError> {
    raw.trim()
        .trim_start_matches('#')
        .parse::<usize>()
        .map_err(|_| GameError::InvalidArgument(format!("`{raw}` is not a number")))
}

/// `<@123>` and `<@!123>` mentions become plain ids.
fn strip_mention(raw: &str) -> String {
    raw.trim()
        .trim_start_matches("<@")
        .trim_start_matches('!')
        .trim_end_matches('>')
        .to_string()
}

fn usage(line: &str) -> GameError {
    GameError::InvalidArgument(format!("usage: {line}"))
}

pub fn help() -> Vec<CommandHelp> {
    [
        ("guess-ability | ga [difficulty] [px] [elim]", "Guess the champion from an ability icon (easy, normal, hard, v2, v3)"),
        ("guess-splash | gsp [difficulty] [px] [elim]", "Guess the champion from splash art"),
        ("guess-skin | gsk [difficulty] [px] [elim]", "Guess the champion from skin art"),
        ("stop", "End the round in this channel without revealing the answer"),
        ("profile [user]", "Points, streaks, currency and collection"),
        ("inventory | inv", "Browse shards, champions and skins"),
        ("open-chest | oc", "Open a chest for a champion or skin shard"),
        ("craft-skin <n>", "Unlock skin shard #n with orange essence"),
        ("craft-champion <n>", "Unlock champion shard #n with blue essence"),
        ("disenchant | de [skin|champ] <n>", "Turn shard #n into essence"),
        ("reroll <a> <b> <c>", "Trade three skin shards for a random epic skin"),
        ("daily", "Claim the daily reward"),
        ("leaderboard | lb", "Top players by points"),
        ("buy <champion>", "Buy a champion with blue essence"),
        ("trade [skin|champ] <user> <your #> <their #>", "Offer a swap of owned items"),
    ]
    .into_iter()
    .map(|(usage, description)| CommandHelp {
        usage: usage.to_string(),
        description: description.to_string(),
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &str) -> Vec<String> {
        raw.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn round_commands_default_to_normal() {
        assert_eq!(
            parse_command("gsp", &[]).unwrap(),
            Command::StartRound {
                mode: Mode::Splash,
                difficulty: Difficulty::Normal,
                pixelate: false,
                elimination: false,
            }
        );
    }

    #[test]
    fn round_flags_in_any_order() {
        assert_eq!(
            parse_command("ga", &args("px v3 elim")).unwrap(),
            Command::StartRound {
                mode: Mode::Ability,
                difficulty: Difficulty::V3,
                pixelate: true,
                elimination: true,
            }
        );
        assert_eq!(
            parse_command("/guess-skin", &args("ez")).unwrap(),
            Command::StartRound {
                mode: Mode::Skin,
                difficulty: Difficulty::Easy,
                pixelate: false,
                elimination: false,
            }
        );
    }

    #[test]
    fn round_rejects_junk() {
        assert!(parse_command("ga", &args("impossible")).is_err());
        assert!(parse_command("ga", &args("hard easy")).is_err());
    }

    #[test]
    fn aliases_resolve() {
        assert_eq!(parse_command("inv", &[]).unwrap(), Command::Inventory);
        assert_eq!(parse_command("OC", &[]).unwrap(), Command::OpenChest);
        assert_eq!(parse_command("lb", &[]).unwrap(), Command::Leaderboard);
        assert_eq!(parse_command("end", &[]).unwrap(), Command::StopRound);
        for name in ["guess-ability", "ga", "GA", "ability"] {
            assert!(matches!(
                parse_command(name, &[]).unwrap(),
                Command::StartRound { mode: Mode::Ability, .. }
            ));
        }
        assert!(matches!(
            parse_command("/gsk", &args("hard")).unwrap(),
            Command::StartRound { mode: Mode::Skin, difficulty: Difficulty::Hard, .. }
        ));
        assert!(parse_command("guess-lore", &[]).is_err());
        assert_eq!(
            parse_command("de", &args("2")).unwrap(),
            Command::Disenchant {
                kind: ShardKind::Skin,
                index: 2
            }
        );
        assert_eq!(
            parse_command("disenchant", &args("champ #4")).unwrap(),
            Command::Disenchant {
                kind: ShardKind::Champion,
                index: 4
            }
        );
    }

    #[test]
    fn trade_defaults_to_skins() {
        assert_eq!(
            parse_command("trade", &args("<@!77> 1 2")).unwrap(),
            Command::Trade {
                trade_type: TradeType::Skin,
                target_id: "77".into(),
                mine: 1,
                theirs: 2,
            }
        );
        assert_eq!(
            parse_command("trade", &args("champ 77 3 1")).unwrap(),
            Command::Trade {
                trade_type: TradeType::Champion,
                target_id: "77".into(),
                mine: 3,
                theirs: 1,
            }
        );
        assert!(parse_command("trade", &args("77 1")).is_err());
    }

    #[test]
    fn index_arguments_must_be_numbers() {
        let err = parse_command("craft-skin", &args("first")).unwrap_err();
        assert!(matches!(err, GameError::InvalidArgument(_)));
        assert_eq!(parse_command("craft-champion", &args("3")).unwrap(), Command::CraftChampion(3));
        assert_eq!(
            parse_command("reroll", &args("1 2 3")).unwrap(),
            Command::Reroll([1, 2, 3])
        );
        assert!(parse_command("reroll", &args("1 2")).is_err());
    }

    #[test]
    fn buy_joins_multiword_names() {
        assert_eq!(
            parse_command("buy", &args("Nunu & Willump")).unwrap(),
            Command::Buy("Nunu & Willump".into())
        );
        assert!(parse_command("buy", &[]).is_err());
    }

    #[test]
    fn unknown_command_is_invalid_argument() {
        let err = parse_command("dance", &[]).unwrap_err();
        assert!(matches!(err, GameError::InvalidArgument(_)));
        assert!(parse_command("daily", &args("now")).is_err());
        assert_eq!(parse_command("profile", &args("<@5>")).unwrap(), Command::Profile(Some("5".into())));
    }

    #[test]
    fn help_lists_every_command() {
        let help = help();
        assert_eq!(help.len(), 15);
        assert!(help.iter().any(|h| h.usage.starts_with("trade")));
    }
}
