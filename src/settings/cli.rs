use super::Parser;

#[derive(Parser, Debug)]
#[command(about = "Refresh-token rotation service")]
pub struct Cli {
    /// Path to a TOML settings file.
    #[arg(long)]
    pub settings: Option<String>,
}
