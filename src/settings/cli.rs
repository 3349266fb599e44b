use super::Parser;

#[derive(Parser, Debug)]
pub struct Cli {
    #[arg(long)]
    pub settings: Option<String>,

    /// Listing to open a conversation about.
    #[arg(long)]
    pub listing: Option<i64>,
}
