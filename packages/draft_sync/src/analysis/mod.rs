//! Streamed tactical analysis: one cancellable session per mode.

mod manager;
mod source;

pub use manager::{SessionManager, SessionState};
pub use source::{
    AnalysisRequest, AnalysisSource, ChunkStream, HttpAnalysisSource, Utf8Decoder,
    decode_text_stream,
};
