//! GitHub Actions workflow commands.

pub fn is_github_actions() -> bool {
    std::env::var("GITHUB_ACTIONS").is_ok_and(|v| v == "true")
}

fn escape_data(value: &str) -> String {
    value.replace('%', "%25").replace('\r', "%0D").replace('\n', "%0A")
}

pub fn add_mask_command(value: &str) -> String { format!("::add-mask::{}", escape_data(value)) }

pub fn error_command(message: &str) -> String { format!("::error::{}", escape_data(message)) }

/// Hide a secret from the job log.
pub fn add_mask(value: &str) {
    if is_github_actions() && !value.is_empty() {
        println!("{}", add_mask_command(value));
    }
}

/// Surface an error annotation on the job.
pub fn set_failed(message: &str) {
    if is_github_actions() {
        println!("{}", error_command(message));
    }
}
