// Copyright Catenary Transit Initiatives
// Maneuver label classification for the haptic wire command

use ahash::AHashMap;
use lazy_static::lazy_static;
use serde::Serialize;

/// Applied wherever a step carries no maneuver label, mid-route and on the
/// final step alike.
pub const DEFAULT_MANEUVER: &str = "straight";

/// Terminal sentinel, sent exactly once when a session completes or is
/// stopped. Never appears as a step maneuver.
pub const COMPLETE_MANEUVER: &str = "complete";

const LEFT_MANEUVERS: [&str; 11] = [
    "turn-slight-left",
    "turn-sharp-left",
    "uturn-left",
    "turn-left",
    "ramp-left",
    "fork-left",
    "roundabout-left",
    "end-of-road-left",
    "take-exit-left",
    "take-fork-left",
    "keep-left",
];

const NEUTRAL_MANEUVERS: [&str; 6] = [
    "straight",
    "merge",
    "ferry",
    "ferry-train",
    "head",
    "continue",
];

const RIGHT_MANEUVERS: [&str; 11] = [
    "turn-slight-right",
    "turn-sharp-right",
    "uturn-right",
    "turn-right",
    "ramp-right",
    "fork-right",
    "roundabout-right",
    "end-of-road-right",
    "take-exit-right",
    "take-fork-right",
    "keep-right",
];

/// 3-way direction class. Turn sharpness is collapsed on purpose, the device
/// only renders left/neutral/right.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Left,
    Neutral,
    Right,
}

impl Direction {
    pub fn as_i8(self) -> i8 {
        match self {
            Direction::Left => -1,
            Direction::Neutral => 0,
            Direction::Right => 1,
        }
    }
}

lazy_static! {
    /// label -> (direction class, stable id). Built once at process start,
    /// never mutated. Ids follow table order and are for logs only.
    static ref MANEUVER_TABLE: AHashMap<&'static str, (Direction, u16)> = {
        let groups: [(Direction, &[&'static str]); 3] = [
            (Direction::Left, &LEFT_MANEUVERS),
            (Direction::Neutral, &NEUTRAL_MANEUVERS),
            (Direction::Right, &RIGHT_MANEUVERS),
        ];

        let mut table = AHashMap::new();
        let mut next_id: u16 = 1;
        for (direction, labels) in groups {
            for label in labels {
                table.insert(*label, (direction, next_id));
                next_id += 1;
            }
        }
        table
    };
}

/// Unknown labels classify as neutral.
pub fn classify(label: &str) -> Direction {
    MANEUVER_TABLE
        .get(label)
        .map(|(direction, _)| *direction)
        .unwrap_or(Direction::Neutral)
}

/// Stable per-label integer id, 0 for labels outside the table. Logging and
/// debugging only, never part of the wire payload.
pub fn maneuver_id(label: &str) -> u16 {
    MANEUVER_TABLE.get(label).map(|(_, id)| *id).unwrap_or(0)
}

/// Compact command for the haptic device.
///
/// Only `maneuver` and `distance` go over the wire; the direction class and
/// table id ride along for the session log.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ManeuverCommand {
    pub maneuver: String,
    pub distance: f64,
    #[serde(skip)]
    pub direction: Direction,
    #[serde(skip)]
    pub maneuver_id: u16,
}

/// Builds the command for a step's maneuver label. An absent label falls back
/// to [`DEFAULT_MANEUVER`]; the caller-supplied distance is carried through
/// unchanged apart from clamping at zero.
pub fn encode_command(label: Option<&str>, distance_remaining_m: f64) -> ManeuverCommand {
    let label = label.unwrap_or(DEFAULT_MANEUVER);
    ManeuverCommand {
        maneuver: label.to_string(),
        distance: distance_remaining_m.max(0.0),
        direction: classify(label),
        maneuver_id: maneuver_id(label),
    }
}
