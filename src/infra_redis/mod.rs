mod freshness_cache_redis;

pub use freshness_cache_redis::*;
