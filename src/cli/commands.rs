use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "colloquy")]
#[command(author, version, about = "Corporate chat assistant with a persistent conversation store", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Chat with the bot from the terminal (development channel)
    Console {
        #[arg(long, default_value = "console")]
        conversation_id: String,

        #[arg(long, default_value = "local-user")]
        user_id: String,

        #[arg(long, default_value = "Local User")]
        display_name: String,
    },

    /// Print a conversation's reconstructed history
    History {
        conversation_id: String,

        #[arg(long, default_value = "local-user")]
        user_id: String,

        #[arg(short, long, default_value = "50")]
        limit: usize,
    },

    /// List conversations that are still active
    Conversations,

    /// Mark a conversation archived
    Archive { conversation_id: String },

    /// Delete message records past their retention horizon
    Purge,
}
