mod session_ledger_mysql;

pub use session_ledger_mysql::*;

mod util;
