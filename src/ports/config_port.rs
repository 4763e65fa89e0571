//! Configuration access port trait.
//!
//! Implementors only supply raw string lookup. The typed accessors parse on
//! top of it and report unparsable values instead of falling back to the
//! default.

use crate::domain::error::SwingError;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;

    fn get_int(&self, section: &str, key: &str, default: i64) -> Result<i64, SwingError> {
        parse_value(self.get_string(section, key), section, key, default, "an integer")
    }

    fn get_double(&self, section: &str, key: &str, default: f64) -> Result<f64, SwingError> {
        parse_value(self.get_string(section, key), section, key, default, "a number")
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> Result<bool, SwingError> {
        match self.get_string(section, key) {
            None => Ok(default),
            Some(raw) => match raw.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(true),
                "false" | "no" | "0" => Ok(false),
                _ => Err(SwingError::config_invalid(
                    section,
                    key,
                    format!("expected a boolean, got '{}'", raw),
                )),
            },
        }
    }
}

fn parse_value<T: std::str::FromStr>(
    raw: Option<String>,
    section: &str,
    key: &str,
    default: T,
    expected: &str,
) -> Result<T, SwingError> {
    match raw {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            SwingError::config_invalid(section, key, format!("expected {}, got '{}'", expected, raw))
        }),
    }
}
