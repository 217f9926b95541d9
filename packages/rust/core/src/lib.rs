//! Content fragment resolution pipeline for ctaflow.
//!
//! This crate ties together request building, fetching, dynamic list
//! expansion and CTA href resolution into [`ResolutionPipeline`].

pub mod expander;
pub mod fragment;
pub mod pipeline;

#[cfg(test)]
mod testing;

pub use expander::{DynamicListExpander, ExpansionState, TagSource, split_tags};
pub use fragment::{extract_list_tag, extract_single, extract_tagged_items, parse_fragment, render_record};
pub use pipeline::{PipelineConfig, ResolutionPipeline, normalize_variation};
