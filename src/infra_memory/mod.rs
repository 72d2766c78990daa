mod freshness_cache_memory;
mod session_ledger_memory;

pub use freshness_cache_memory::*;
pub use session_ledger_memory::*;
