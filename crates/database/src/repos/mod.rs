//! Repository traits over the application schema.
//!
//! The schema itself belongs to the application installer; these traits
//! only cover the handful of statements a cold start needs.

pub mod clients;
pub mod keys;
pub mod schema;
pub mod settings;

pub use clients::ClientRepo;
pub use keys::KeyRepo;
pub use schema::SchemaRepo;
pub use settings::SettingsRepo;
