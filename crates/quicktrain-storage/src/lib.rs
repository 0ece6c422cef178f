//! Object store implementations for QuickTrain.
//!
//! This crate provides concrete implementations of the `ObjectStore` trait.
//!
//! # Supported Stores
//!
//! - **Local**: a directory on disk acting as the bucket (development, tests)
//! - **Supabase**: Supabase Storage over its REST API (service-role key required)

pub mod factory;
pub mod local;
pub mod supabase;

pub use factory::{StoreConfig, StoreFactory, StoreKind};
pub use local::LocalObjectStore;
pub use supabase::SupabaseObjectStore;
