// Rationale: inference views must stay non-serializable to prevent raw export paths.
use serde::Serialize;
use proctor_kernel::frame::InferenceView;

#[derive(Serialize)]
struct Wrapper<'a> {
    view: InferenceView<'a>,
}

fn main() {}
