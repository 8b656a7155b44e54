use chrono::Utc;
use std::fs::OpenOptions;
use std::io::Write;

/// Transactional email transport is out of scope; the dev transport appends
/// the rendered template to `data/emails.log` so flows stay observable.
pub fn send_password_reset_email(
    to: &str,
    username: &str,
    token: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let logdir = "data";
    std::fs::create_dir_all(logdir)?;
    let path = format!("{}/emails.log", logdir);
    let mut f = OpenOptions::new().create(true).append(true).open(&path)?;
    let now = Utc::now().to_rfc3339();
    writeln!(
        f,
        "[{}] template=password_reset to={} username={} token={}",
        now, to, username, token
    )?;
    tracing::info!(to, "password reset email queued");
    Ok(())
}
