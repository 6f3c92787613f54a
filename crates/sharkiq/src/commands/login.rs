//! `sharkiq login`: password, interactive, and device-code sign-in.

use std::time::Duration;

use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

use sharkiq_core::{AuthSession, CoreError, InteractionPrompt, SignInOutcome, SignedIn};

use crate::cli::{GlobalOpts, LoginArgs};
use crate::config::{self, Context};
use crate::error::CliError;
use crate::output;

use super::util;

pub async fn handle(args: LoginArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if args.fresh {
        forget_refresh_token(global)?;
    }

    let mut ctx = Context::open(global, !args.device_code)?;
    let session = ctx.session.clone();

    let result = if args.device_code {
        device_code(&session, global).await
    } else {
        password(&session).await
    };
    let signed_in = result.map_err(|e| CliError::from_core(e, &ctx.profile))?;
    ctx.save_refresh_token().await;

    if !global.quiet {
        let until = signed_in
            .tokens
            .expires_at
            .map_or_else(String::new, |at| format!(", access valid until {}", at.to_rfc3339()));
        let check = if output::should_color(&global.color) {
            "✓".green().to_string()
        } else {
            "✓".into()
        };
        eprintln!("{check} Signed in to profile '{}'{until}", ctx.profile);
    }
    Ok(())
}

fn forget_refresh_token(global: &GlobalOpts) -> Result<(), CliError> {
    let mut cfg = sharkiq_config::load_config()?;
    let name = cfg.active_profile_name(global.profile.as_deref());
    config::lookup_profile(&cfg, &name)?;
    if sharkiq_config::clear_refresh_token(&mut cfg, &name)? {
        sharkiq_config::save_config(&cfg)?;
    }
    tracing::info!(profile = %name, "stored refresh token cleared");
    Ok(())
}

// ── Password / interactive ──────────────────────────────────────────

async fn password(session: &AuthSession) -> Result<SignedIn, CoreError> {
    match session.sign_in().await? {
        SignInOutcome::Authenticated(signed_in) => Ok(signed_in),
        SignInOutcome::InteractionRequired(prompt) => interactive(session, &prompt).await,
    }
}

/// Show the authorization link and redeem one pasted redirect.
async fn interactive(
    session: &AuthSession,
    prompt: &InteractionPrompt,
) -> Result<SignedIn, CoreError> {
    let url = prompt.authorization_url.clone();
    if !util::is_interactive() {
        session.abandon_interaction().await;
        return Err(CoreError::InteractionRequired { url });
    }

    eprintln!("Additional verification is required. Open this link in a browser:\n");
    eprintln!("  {url}\n");
    eprintln!("After signing in, copy the full address of the page you land on.");

    let pasted: Result<String, _> = Input::new()
        .with_prompt("Redirected URL")
        .interact_text();
    match pasted {
        Ok(input) => session.complete_interaction_redirect(&input).await,
        Err(e) => {
            tracing::debug!(error = %e, "redirect prompt aborted");
            session.abandon_interaction().await;
            Err(CoreError::Cancelled)
        }
    }
}

// ── Device code ─────────────────────────────────────────────────────

async fn device_code(session: &AuthSession, global: &GlobalOpts) -> Result<SignedIn, CoreError> {
    let device = session.start_device_code().await?;

    eprintln!("To sign in, open:\n\n  {}\n", device.display_uri());
    eprintln!("and enter the code: {}\n", device.user_code);

    let spinner = if global.quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg} ({elapsed})") {
            bar.set_style(style);
        }
        bar.set_message("Waiting for approval");
        bar.enable_steady_tick(Duration::from_millis(120));
        bar
    };

    let cancel = util::cancel_on_interrupt();
    let result = session.finish_device_code(&device, &cancel).await;
    spinner.finish_and_clear();
    result
}
