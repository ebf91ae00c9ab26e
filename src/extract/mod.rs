//! Extraction phase: external extractors, archive naming and the pipeline
//! that ties them together.

pub mod archive;
pub mod extractor;
pub mod pipeline;

pub use extractor::{CommandExtractor, Extractor, SelfExtractor};
pub use pipeline::{ExtractedPayload, ExtractionPipeline, ExtractionReport};
