//! Shared types, error model, and configuration for ctaflow.
//!
//! This crate is the foundation depended on by all other ctaflow crates.
//! It provides:
//! - [`CtaFlowError`]: the unified error type
//! - Domain types ([`CtaReference`], [`ContentFragment`], [`RenderRecord`], [`DynamicListSeed`])
//! - The per-call [`Environment`] and its [`EnvironmentProvider`] seam
//! - Configuration ([`AppConfig`], config loading)

pub mod config;
pub mod environment;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DynamicListConfig, EndpointsConfig, EnvironmentConfig, PathMappingConfig,
    QueriesConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    validate_config,
};
pub use environment::{Environment, EnvironmentProvider, derive_publish_url};
pub use error::{CtaFlowError, Result};
pub use types::{
    BannerImage, ContentFragment, CtaReference, DEFAULT_VARIATION, DYNAMIC_CTA_LIST_MODEL,
    DynamicListSeed, PathRef, RenderRecord, UNRESOLVED_HREF,
};
