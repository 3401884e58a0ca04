pub mod client;
pub mod itinerary_ai;
pub mod plan_parser;
pub mod prompt_builder;

pub use client::{ChatCompletion, ChatMessage, ChatRequest, GroqClient, LlmClient, LlmError};
pub use itinerary_ai::{GeneratedPlan, ItineraryAi};
pub use plan_parser::{extract_json, parse_plan, PlanExpectations};
pub use prompt_builder::{build_prompt, BuiltPrompt, PlanContext, StayDetails};

use serde::{Deserialize, Serialize};

/// Generation depth. Pro plans use the reasoning model, a larger prompt
/// budget and the full route context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMode {
    #[default]
    Standard,
    Pro,
}

impl GenerationMode {
    pub fn from_pro_flag(pro: bool) -> Self {
        if pro {
            GenerationMode::Pro
        } else {
            GenerationMode::Standard
        }
    }

    pub fn is_pro(&self) -> bool {
        matches!(self, GenerationMode::Pro)
    }
}

impl std::fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerationMode::Standard => write!(f, "standard"),
            GenerationMode::Pro => write!(f, "pro"),
        }
    }
}
