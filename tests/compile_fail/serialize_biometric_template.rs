// Rationale: enrolled biometric templates must never be logged or persisted
// as plain data; they stay out of both Debug and Serialize.
use serde::Serialize;
use proctor_kernel::verifier::BiometricTemplate;

#[derive(Serialize)]
struct Wrapper {
    template: BiometricTemplate,
}

fn main() {}
