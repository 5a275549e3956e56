//! Material models feeding the time-step policy.

pub mod material;

pub use material::ElasticMaterial;
