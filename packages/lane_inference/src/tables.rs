//! Fixed lookup tables used by the classifier.
//!
//! These are heuristics. Update the allow-lists when the game's unit pool
//! changes; the order of `DEFAULT_LANE_PRIORITY` is kept as observed rather
//! than derived.

use std::collections::HashMap;

use crate::types::Lane;

/// Order in which lanes are resolved during each phase.
///
/// Jungle, carry and support units are far less ambiguous than mid and top,
/// so they get first pick.
pub const DEFAULT_LANE_PRIORITY: [Lane; 5] = [
    Lane::Jungle,
    Lane::Carry,
    Lane::Support,
    Lane::Mid,
    Lane::Top,
];

const JUNGLE_ALLOW: &[&str] = &[
    "Amumu", "Belveth", "Briar", "Elise", "Evelynn", "Fiddlesticks", "Graves", "Hecarim",
    "Ivern", "JarvanIV", "Karthus", "Kayn", "Khazix", "Kindred", "LeeSin", "Lillia",
    "MasterYi", "Nidalee", "Nocturne", "Nunu", "Rammus", "RekSai", "Sejuani", "Shaco",
    "Shyvana", "Skarner", "Udyr", "Viego", "Vi", "Warwick", "XinZhao", "Zac",
];

const CARRY_ALLOW: &[&str] = &[
    "Aphelios", "Ashe", "Caitlyn", "Draven", "Ezreal", "Jhin", "Jinx", "Kaisa", "Kalista",
    "KogMaw", "Lucian", "MissFortune", "Nilah", "Samira", "Sivir", "Smolder", "Tristana",
    "Twitch", "Varus", "Vayne", "Xayah", "Zeri",
];

const SUPPORT_ALLOW: &[&str] = &[
    "Alistar", "Bard", "Blitzcrank", "Braum", "Janna", "Karma", "Leona", "Lulu", "Milio",
    "Nami", "Nautilus", "Rakan", "Rell", "Renata", "Senna", "Seraphine", "Sona", "Soraka",
    "TahmKench", "Taric", "Thresh", "Yuumi", "Zilean", "Zyra",
];

const MID_ALLOW: &[&str] = &[
    "Ahri", "Akali", "Anivia", "AurelionSol", "Azir", "Cassiopeia", "Corki", "Fizz",
    "Hwei", "Kassadin", "Katarina", "LeBlanc", "Lissandra", "Malzahar", "Orianna",
    "Qiyana", "Ryze", "Syndra", "Talon", "TwistedFate", "Veigar", "Vex", "Viktor",
    "Xerath", "Yasuo", "Zed", "Zoe",
];

const TOP_ALLOW: &[&str] = &[
    "Aatrox", "Camille", "ChoGath", "Darius", "DrMundo", "Fiora", "Gangplank", "Garen",
    "Gnar", "Gwen", "Illaoi", "Irelia", "Jax", "Jayce", "Kennen", "Kled", "Malphite",
    "Mordekaiser", "Nasus", "Ornn", "Poppy", "Renekton", "Riven", "Rumble", "Sett",
    "Shen", "Singed", "Sion", "Teemo", "Trundle", "Tryndamere", "Urgot", "Volibear",
    "Yorick",
];

/// The hard-coded allow-lists, keyed by lane. Entries are unit `id`s.
pub fn default_allow_list() -> HashMap<Lane, Vec<String>> {
    [
        (Lane::Jungle, JUNGLE_ALLOW),
        (Lane::Carry, CARRY_ALLOW),
        (Lane::Support, SUPPORT_ALLOW),
        (Lane::Mid, MID_ALLOW),
        (Lane::Top, TOP_ALLOW),
    ]
    .into_iter()
    .map(|(lane, ids)| (lane, ids.iter().map(|s| s.to_string()).collect()))
    .collect()
}

/// Role tag that marks a unit as a natural fit for `lane`.
pub fn lane_tag(lane: Lane) -> &'static str {
    match lane {
        Lane::Jungle => "Jungle",
        Lane::Carry => "Marksman",
        Lane::Support => "Support",
        Lane::Mid => "Mage",
        Lane::Top => "Fighter",
    }
}
