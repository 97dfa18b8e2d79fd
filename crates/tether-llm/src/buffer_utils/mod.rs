mod line_buffer;
mod reassembler;

pub use line_buffer::{decode_lines, LineBuffer};
pub use reassembler::{FrameReassembler, DONE_SENTINEL, MAX_PARTIAL_BYTES};
