mod referer_extractor;
mod validation_extractor;

pub use referer_extractor::*;
pub use validation_extractor::*;
