//! Multi-modal emotion signal fusion
//!
//! - **TextEmotionAnalyzer**: keyword lexicon with negation handling
//! - **AcousticFeatures**: pitch/pace/volume/tremor → signals
//! - **SignalFusionEngine**: confidence-weighted fusion into one estimate
//!
//! No source is mandatory. With no signals at all the engine answers
//! NEUTRAL at 0.5 confidence, which means "no information".

pub mod engine;
pub mod lexicon;
pub mod signal;

pub use engine::{FusedEmotionResult, SignalFusionEngine, NO_INFORMATION_CONFIDENCE};
pub use lexicon::TextEmotionAnalyzer;
pub use signal::{AcousticFeatures, Signal, SignalSource};
