//! The climate assistant's query pipeline.
//!
//! A query flows through the stages in order:
//!
//! 1. **Context**: fetch or create the session's message log
//! 2. **Detect**: map the query to hazard layers by keyword
//! 3. **Retrieve**: rank evidence for those layers, filtered by confidence
//! 4. **Synthesize**: generate a plain-language answer from the evidence
//! 5. **Act**: if layers were detected, generate and validate map actions
//! 6. **Record**: append the user and bot messages to the session
//!
//! Retrieval and action selection degrade to empty results on failure.
//! Only synthesis failures reach the caller.

pub mod climate;
pub mod detector;
pub mod parser;
pub mod prompt;
pub mod retriever;

#[cfg(test)]
mod test_helpers;

pub use climate::{AgentSettings, ClimateAgent, QueryOutcome};
pub use detector::{LAYER_KEYWORDS, LayerDetector};
pub use parser::ResponseParser;
pub use prompt::{KNOWN_LOCATIONS, KnownLocation, PromptComposer};
pub use retriever::{ProviderEmbedder, Retriever};
