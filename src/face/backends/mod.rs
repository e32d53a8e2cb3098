pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::StubFaceBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractFaceBackend;
