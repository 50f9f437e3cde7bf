pub mod allocator;
pub mod encoding;

#[cfg(feature = "qaoa")]
pub mod qaoa;
