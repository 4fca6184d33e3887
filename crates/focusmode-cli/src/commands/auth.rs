use clap::Subcommand;
use focusmode_core::integrations::api::TOKEN_KEY;
use focusmode_core::integrations::keyring_store;
use focusmode_core::{ApiClient, Config};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Store the focus API bearer token in the OS keyring
    Login {
        /// API token
        #[arg(long)]
        token: String,
    },
    /// Remove the stored token
    Logout,
    /// Check authentication status
    Status,
}

pub fn run(action: AuthAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        AuthAction::Login { token } => {
            let token = token.trim();
            if token.is_empty() {
                return Err("--token must not be empty".into());
            }
            keyring_store::set(TOKEN_KEY, token)?;
            println!("Focus API token stored");
        }
        AuthAction::Logout => {
            keyring_store::delete(TOKEN_KEY)?;
            println!("Focus API token removed");
        }
        AuthAction::Status => {
            let config = Config::load()?;
            let client = ApiClient::from_config(&config.api)?;
            println!(
                "{} ({})",
                if client.is_authenticated() {
                    "authenticated"
                } else {
                    "not authenticated"
                },
                client.base_url()
            );
        }
    }
    Ok(())
}
