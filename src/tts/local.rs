pub mod engine;
pub mod local_tts;

pub use engine::{EspeakEngine, LocalEngine};
pub use local_tts::LocalProvider;
