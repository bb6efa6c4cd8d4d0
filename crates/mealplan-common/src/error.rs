/// Error types shared by the meal planner crates.
///
/// These cover the infrastructure underneath the screens: the key/value stores that
/// back the recipe cache and the Redis connection. HTTP failures live in
/// [`crate::api::ApiError`]; binary-level errors wrap `CommonError` via `#[from]`.

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("redis not configured")]
    RedisUnavailable,

    #[error("store io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}
