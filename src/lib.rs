//! PV id slimmer library.
//!
//! Fetches the DIVA mod archive's PV id listing and exports two slim lookup
//! tables: reserved-but-unused ids with the reserving user, and ids already
//! used by uploads with their title and authors.

pub mod config;
pub mod constants;
pub mod document;
pub mod fetch;
pub mod normalize;
pub mod pipeline;
pub mod slim;
pub mod writer;
