//! Rendering adapter for the tag-input selection widget
//!
//! The widget itself is an external collaborator; this module only defines
//! the snapshot it renders from. Tags are the active rules, suggestions the
//! selectable remainder.

use super::state::FilterState;
use crate::registry::RuleRef;

/// Form field name the widget reports its value under
pub const FIELD_NAME: &str = "matched_rules";

/// Placeholder shown in an empty tag input
pub const PLACEHOLDER: &str = "rule_name";

/// Immutable snapshot of what the selection widget should render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionView {
    /// Currently selected rules, in insertion order
    pub tags: Vec<RuleRef>,
    /// Remaining selectable rules
    pub suggestions: Vec<RuleRef>,
    pub name: &'static str,
    pub placeholder: &'static str,
}

impl SelectionView {
    pub(crate) fn from_state(state: &FilterState) -> Self {
        Self {
            tags: state.active().to_vec(),
            suggestions: state.suggestions(),
            name: FIELD_NAME,
            placeholder: PLACEHOLDER,
        }
    }
}
