//! Client-side form validation.
//!
//! These checks run before any remote call; a rejection here means the
//! remote layer is never touched. Messages are user-facing and surfaced
//! inline per field.

use crate::error::ValidationError;

/// Disposable-email providers rejected at registration.
const DISPOSABLE_DOMAINS: &[&str] = &[
    "10minutemail.com",
    "tempmail.org",
    "guerrillamail.com",
    "mailinator.com",
    "yopmail.com",
    "temp-mail.org",
    "throwaway.email",
    "getnada.com",
    "maildrop.cc",
    "sharklasers.com",
    "guerrillamailblock.com",
    "pokemail.net",
    "spam4.me",
    "bccto.me",
    "chacuo.net",
    "dispostable.com",
    "emailondeck.com",
    "fakeinbox.com",
    "hide.biz.st",
    "mytrashmail.com",
    "nobulk.com",
    "sogetthis.com",
    "spamherelots.com",
    "superrito.com",
    "zoemail.org",
];

/// Common misspellings of popular mail domains, with suggestions.
const DOMAIN_TYPOS: &[(&str, &str)] = &[
    ("gmial.com", "gmail.com"),
    ("gmai.com", "gmail.com"),
    ("yahooo.com", "yahoo.com"),
    ("hotmial.com", "hotmail.com"),
    ("outlok.com", "outlook.com"),
    ("icloud.co", "icloud.com"),
];

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 6;

fn email_error(message: impl Into<String>) -> ValidationError {
    ValidationError::new("email", message)
}

/// Validate an email address for registration.
///
/// Beyond the basic shape check this rejects disposable providers,
/// `+`-alias addresses, and obvious domain typos, matching the
/// registration form's rules.
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(email_error("Email is required"));
    }

    // local@domain.tld, no whitespace anywhere
    let mut parts = email.split('@');
    let local = parts.next().unwrap_or_default();
    let domain = parts.next().unwrap_or_default();
    let well_formed = parts.next().is_none()
        && !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !email.chars().any(char::is_whitespace);
    if !well_formed {
        return Err(email_error("Invalid email format"));
    }

    let domain = domain.to_ascii_lowercase();
    if DISPOSABLE_DOMAINS.contains(&domain.as_str()) {
        return Err(email_error("Disposable email addresses are not allowed"));
    }

    if email.contains('+') {
        return Err(email_error("Email aliases with + are not allowed"));
    }

    if let Some((_, suggestion)) = DOMAIN_TYPOS.iter().find(|(typo, _)| *typo == domain) {
        return Err(email_error(format!("Did you mean {suggestion}?")));
    }

    if domain.split('.').any(str::is_empty) {
        return Err(email_error("Invalid domain format"));
    }

    let tld = domain.rsplit('.').next().unwrap_or_default();
    if tld.len() < 2 {
        return Err(email_error("Invalid top-level domain"));
    }

    Ok(())
}

pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.is_empty() {
        return Err(ValidationError::new("username", "Username is required"));
    }
    if username.len() < MIN_USERNAME_LEN {
        return Err(ValidationError::new(
            "username",
            format!("Username must be at least {MIN_USERNAME_LEN} characters"),
        ));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ValidationError::new(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}
