// store

mod freshness_cache;

pub use freshness_cache::*;

// repo

mod session_ledger;

pub use session_ledger::*;
