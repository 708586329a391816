//! Reconciles declarative `Pipeline` and `Knowledge` resources into the
//! runtime filter-weigher and detector pipelines `novasched-api` and
//! `novasched-deschedule` drive.

pub mod controller;
pub mod install;

pub use controller::PipelineController;
pub use install::{install_detector, install_filter_weigher};
