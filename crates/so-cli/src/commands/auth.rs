use std::time::Duration;

use so_bridge::modal::{AuthTab, Redirect, SubmitOutcome};
use so_bridge::nav::NavState;
use so_bridge::{Secret, Topic};

use super::{prompt_line, Ui};

async fn secret_or_prompt(password: Option<String>) -> anyhow::Result<Secret> {
    let raw = match password {
        Some(p) => p,
        None => prompt_line("Password: ").await?,
    };
    Ok(Secret::new(raw))
}

/// Turn a modal outcome into terminal output.
fn report(ui: &Ui, outcome: SubmitOutcome<()>) -> anyhow::Result<()> {
    match outcome {
        SubmitOutcome::Succeeded { redirect, .. } => {
            if let NavState::SignedIn { display_name, .. } = ui.nav() {
                println!("Signed in as {display_name}");
            }
            match redirect {
                Redirect::Chat => println!("Run `so chat` to join the conversation."),
                Redirect::Profile => {
                    println!("Finish your profile with `so profile set --name <name> --avatar <image>`.")
                }
            }
            Ok(())
        }
        SubmitOutcome::Failed => {
            let message = ui
                .snapshot()
                .modal_error
                .unwrap_or_else(|| "Sign-in failed".to_string());
            anyhow::bail!(message)
        }
    }
}

pub async fn login(ui: &Ui, email: &str, password: Option<String>) -> anyhow::Result<()> {
    let secret = secret_or_prompt(password).await?;
    ui.open_modal(AuthTab::SignIn, None);
    let outcome = ui.sign_in(email, secret.expose()).await;
    report(ui, outcome)
}

pub async fn signup(
    ui: &Ui,
    name: &str,
    email: &str,
    password: Option<String>,
) -> anyhow::Result<()> {
    let secret = secret_or_prompt(password).await?;
    ui.open_modal(AuthTab::SignUp, None);
    let outcome = ui.sign_up(name, email, secret.expose()).await;
    report(ui, outcome)
}

pub async fn google(ui: &Ui) -> anyhow::Result<()> {
    ui.open_modal(AuthTab::SignIn, None);
    let outcome = ui.sign_in_with_google().await;
    report(ui, outcome)
}

pub async fn forgot(ui: &Ui, email: &str) -> anyhow::Result<()> {
    ui.open_modal(AuthTab::SignIn, None);
    ui.forgot_password(email).await?;
    if let Some(notice) = ui.snapshot().modal_notice {
        println!("{notice}");
    }
    Ok(())
}

/// Publish `logout` and wait for the auth bridge to confirm.
pub async fn logout(ui: &Ui) -> anyhow::Result<()> {
    let ctx = ui.context();
    let confirmed = ctx.bus.subscribe_channel(Topic::LoggedOut);
    let was_signed_in = ctx.auth.is_signed_in();
    ui.log_out();

    tokio::time::timeout(Duration::from_secs(10), confirmed.recv_async())
        .await
        .map_err(|_| anyhow::anyhow!("Timed out waiting for sign-out"))??;

    if let Some(toast) = ctx.toasts.latest() {
        if toast.level == so_bridge::notifications::ToastLevel::Error {
            eprintln!("warning: {}", toast.message);
        }
    }
    if was_signed_in {
        println!("Signed out. Your profile is kept on this device.");
    } else {
        println!("Not signed in.");
    }
    Ok(())
}

pub fn whoami(ui: &Ui, json_output: bool) -> anyhow::Result<()> {
    if json_output {
        println!("{}", serde_json::to_string_pretty(&ui.record())?);
        return Ok(());
    }

    let backend = ui.context().backend.kind();
    match ui.nav() {
        NavState::Guest => println!("Not signed in (backend: {backend:?})"),
        NavState::SignedIn {
            display_name,
            avatar,
            ..
        } => {
            println!("Signed in as {display_name} (backend: {backend:?})");
            if let Some(session) = ui.context().auth.current_session() {
                println!("  id:     {}", session.id);
                if let Some(email) = session.email {
                    println!("  email:  {email}");
                }
            }
            println!("  avatar: {}", if avatar.is_some() { "set" } else { "none" });
        }
    }
    Ok(())
}
