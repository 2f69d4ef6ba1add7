use anyhow::{Context, Result, bail};
use rpassword::prompt_password;

use super::App;

pub fn login(app: &App, token: Option<String>) -> Result<()> {
    let token = match token {
        Some(token) => token,
        None => prompt_password("Bearer token: ").context("failed to read token")?,
    };
    let token = token.trim();
    if token.is_empty() {
        bail!("token must not be empty");
    }

    let mut session = app.session_store();
    session
        .set_auth_token(token)
        .context("failed to store token")?;
    println!(
        "Token saved to {}",
        app.config.session.state_path.display()
    );
    Ok(())
}

pub fn logout(app: &App) -> Result<()> {
    let mut session = app.session_store();
    let had_token = session
        .auth_token()
        .context("failed to read session state")?
        .is_some();
    session
        .clear_auth_token()
        .context("failed to remove token")?;

    if had_token {
        println!(
            "Removed token from {}",
            app.config.session.state_path.display()
        );
    } else {
        println!("No stored token found");
    }
    Ok(())
}
