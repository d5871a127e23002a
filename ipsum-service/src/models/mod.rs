//! Domain models for the ipsum service.

pub mod generation;

pub use generation::{
    GenerateLoremRequest, GenerateLoremResponse, GenerationRequest, ParagraphLength,
};
