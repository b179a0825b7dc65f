use thiserror::Error;

use super::models::Config;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("open mark and lock mark must differ, both are '{0}'")]
    MarksCollide(String),

    #[error("state time format must not be empty")]
    EmptyTimeFormat,

    #[error("client timeout must be greater than zero")]
    ZeroTimeout,
}

pub fn validate(config: &Config) -> Result<(), ValidationError> {
    if config.ledger.mark_open == config.ledger.mark_lock {
        return Err(ValidationError::MarksCollide(config.ledger.mark_open.clone()));
    }
    if config.ledger.time_format.trim().is_empty() {
        return Err(ValidationError::EmptyTimeFormat);
    }
    if config.client.timeout_secs == 0 {
        return Err(ValidationError::ZeroTimeout);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_colliding_marks_rejected() {
        let mut config = Config::default();
        config.ledger.mark_lock = config.ledger.mark_open.clone();
        assert!(matches!(
            validate(&config),
            Err(ValidationError::MarksCollide(_))
        ));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = Config::default();
        config.client.timeout_secs = 0;
        assert!(matches!(validate(&config), Err(ValidationError::ZeroTimeout)));
    }
}
