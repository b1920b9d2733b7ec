use thiserror::Error;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("hand landmark set must have 21 points, got {0}")]
    LandmarkCount(usize),
    #[error("malformed {detector} detector output: {detail}")]
    MalformedOutput {
        detector: &'static str,
        detail: String,
    },
    #[error("frame source has not been acquired")]
    SourceNotAcquired,
    #[error("frame capture failed: {0}")]
    Capture(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("product name must not be empty (id {0})")]
    EmptyName(u32),
    #[error("duplicate product name: {0}")]
    DuplicateName(String),
    #[error("invalid price for {name}: {price}")]
    InvalidPrice { name: String, price: f64 },
}
