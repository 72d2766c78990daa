//! Settings are read from a TOML file; secrets come from the environment
//! (see `server::Server::try_new`).

mod cli;
pub use clap::Parser;
pub use cli::*;

mod settings;
pub use settings::*;
