//! Decoding of the vision service's event stream into answer text.
//!
//! Bytes arrive in arbitrary chunks; [`LineBuffer`] restores lines, the
//! [`FragmentStream`] keeps `data:` frames whose event carries text, and
//! [`accumulate`] joins the fragments into the final answer.

mod accumulator;
mod decoder;
mod frame;
mod lines;

pub use accumulator::{accumulate, Answer};
pub use decoder::FragmentStream;
pub use frame::{
    decode_line, AnalysisFrame, DecoderConfig, FrameDecodeError, LineOutcome, DATA_MARKER,
    MESSAGE_EVENT,
};
pub use lines::{ChunkedLines, LineBuffer, MAX_LINE_BYTES};
