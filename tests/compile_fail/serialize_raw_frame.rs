// Rationale: raw frames must never be serialized or exported outside the kernel boundary.
use serde::Serialize;
use proctor_kernel::frame::RawFrame;

#[derive(Serialize)]
struct Wrapper {
    frame: RawFrame,
}

fn main() {}
