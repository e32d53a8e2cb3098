//! Compile-fail tests asserting the raw-media and biometric-template
//! boundaries (frame.rs, verifier.rs) cannot be bypassed from outside their
//! modules: no private-field access, no accidental Serialize/Debug impls,
//! no detector backend that leaks the pixel buffer it was given.

#[test]
fn ui() {
    let t = trybuild::TestCases::new();
    t.compile_fail("tests/compile_fail/*.rs");
}
