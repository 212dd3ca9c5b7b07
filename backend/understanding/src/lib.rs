pub mod vision;

pub use vision::{
    DEFAULT_PROMPT, DEFAULT_VISION_MODEL, OpenAiVision, VisionAnalysis, VisionProvider,
};
