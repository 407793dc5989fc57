//! Per-user preferences learned from behavioural signals.

pub mod keys;
pub mod store;

pub use keys::{key_spec, signal_rule, KeySpec, SignalRule, PREFERENCE_KEYS};
pub use store::{PreferenceRecord, PreferenceStore, PreferenceValue, MAX_CONFIDENCE};
