pub mod media;
pub mod openrouter;

pub use openrouter::{chat_completion, generate_image, ImageGenerationError, ImageRequest};
