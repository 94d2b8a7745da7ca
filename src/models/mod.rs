pub mod audit;
pub mod notification;
pub mod settings;
pub mod task;
pub mod team_member;
pub mod user;

use std::sync::OnceLock;

use regex::Regex;

/// Lowercases, strips Portuguese/Spanish accents and turns spaces and
/// underscores into dashes, so "Em Andamento" and "em_andamento" compare
/// equal to "em-andamento".
pub fn fold_label(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'Á' | 'À' | 'Â' | 'Ã' => 'a',
            'é' | 'ê' | 'É' | 'Ê' => 'e',
            'í' | 'Í' => 'i',
            'ó' | 'ô' | 'õ' | 'Ó' | 'Ô' | 'Õ' => 'o',
            'ú' | 'ü' | 'Ú' | 'Ü' => 'u',
            'ç' | 'Ç' => 'c',
            'ñ' | 'Ñ' => 'n',
            ' ' | '_' => '-',
            other => other.to_ascii_lowercase(),
        })
        .collect()
}

pub fn is_valid_email(email: &str) -> bool {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL
        .get_or_init(|| {
            Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern is valid")
        })
        .is_match(email.trim())
}

/// Trims `value` and fails with `field` in the message when nothing is left.
pub fn require_text(field: &str, value: &str) -> Result<String, crate::error::ApiError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(crate::error::ApiError::BadRequest(format!(
            "{} must not be empty",
            field
        )));
    }
    Ok(trimmed.to_string())
}
