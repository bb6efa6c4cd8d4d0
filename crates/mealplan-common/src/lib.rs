pub mod api;
pub mod error;
pub mod mcp_api;
pub mod model;
pub mod plan;
pub mod preferences;
pub mod recipe_cache;
pub mod redis;
pub mod resolver;
pub mod store;
