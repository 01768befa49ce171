//! Rules filter control - selection state synchronized across three sources
//!
//! One filter control keeps a single selection of detection rules consistent
//! across the shared bus (sibling controls), the page's query state (the
//! seed), and the remotely-fetched rule registry. The control is the only
//! mutation point for its state; every change, inbound or user-driven, passes
//! through the same order-independent equality check so redundant broadcasts
//! and re-renders are suppressed.

mod control;
mod seed;
mod state;
mod widget;


pub use control::{
    MatchedRulesPayload, NotificationPayload, RulesFilter, DEFAULT_LOAD_TIMEOUT, EVENT_RULES_EDIT,
    EVENT_RULES_NEW,
};
pub use seed::{seed_from_query, SEED_PARAM};
pub use state::{same_id_set, FilterState, LoadPhase};
pub use widget::{SelectionView, FIELD_NAME, PLACEHOLDER};
