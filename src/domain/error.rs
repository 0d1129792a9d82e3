use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    #[error("invalid collection key `{key}`: {reason}")]
    InvalidKey { key: String, reason: &'static str },
    #[error("invalid locale `{locale}`: {reason}")]
    InvalidLocale { locale: String, reason: &'static str },
    #[error("domain validation failed: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn invalid_key(key: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason,
        }
    }

    pub fn invalid_locale(locale: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidLocale {
            locale: locale.into(),
            reason,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
