//! `ResourceStore` implementations: a live one backed by xline/etcd-client,
//! and an in-memory one for tests. Also the HTTP `ComputeApi` adapter that
//! gives the binary a concrete compute-service collaborator to run against.

pub mod compute_http;
pub mod memory;
pub mod xline;

pub use compute_http::HttpComputeApi;
pub use memory::InMemoryResourceStore;
pub use xline::XlineResourceStore;
