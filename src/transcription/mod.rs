pub mod engine;
pub mod result;
pub mod srt;
pub mod whisper;

pub use engine::{ModelLoader, SpeechModel, TranscriptionEngine};
pub use result::{Device, ModelTier, RawTranscript, Segment, TranscriptResult};
pub use srt::{SrtDocument, SrtEntry};
pub use whisper::{WhisperCliLoader, WhisperCliModel};
