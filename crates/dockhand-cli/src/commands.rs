//! CLI command definitions.

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Provision the dependency, run the test command against it, tear it down
    Run {
        /// Test command, overriding `suite.command` from the configuration
        #[arg(last = true)]
        command: Vec<String>,
    },
    /// Print the connection descriptor derived from the configuration
    Descriptor {
        /// Print the credential instead of masking it
        #[arg(long)]
        show_secret: bool,
    },
    /// Check that the container engine is reachable
    Ping,
}
