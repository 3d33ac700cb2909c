//! Lane Inference - pure lane classifier for draft rosters
//!
//! Given the five units a side has locked in, work out which lane each one
//! is going to play. The input is noisy: the game client only sometimes
//! reports positions, and many units are flexible across several lanes.
//! The classifier is deterministic and performs no I/O.
//!
//! # Example
//!
//! ```
//! use lane_inference::{Lane, LaneClassifier, Roster, Unit};
//!
//! let mut roster = Roster::default();
//! roster.slots[0] = Some(Unit::new(1, "Ashe", "Ashe").with_tags(["Marksman"]));
//! roster.slots[1] = Some(Unit::new(2, "Braum", "Braum").with_tags(["Support"]));
//!
//! let lanes = LaneClassifier::default().infer_lanes(&roster);
//! assert_eq!(lanes.get(Lane::Carry), Some("Ashe"));
//! assert_eq!(lanes.get(Lane::Support), Some("Braum"));
//! ```

mod classifier;
mod tables;
mod types;

pub use classifier::{HashMapRoleDatabase, LaneClassifier, NoRoleDatabase, RoleLookup};
pub use tables::{DEFAULT_LANE_PRIORITY, default_allow_list, lane_tag};
pub use types::{Lane, LaneAssignment, ParseLaneError, ROSTER_SIZE, Roster, Unit};
