use std::env;
use std::io::Read;
use std::path::PathBuf;

/// Directory name used under the platform config/data roots
pub const APP_DIR: &str = "perplexity-budget";

pub fn parse_bool_env(var: &str) -> bool {
    if let Ok(val) = env::var(var) {
        let trimmed = val.trim();
        matches!(
            trimmed.to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    } else {
        false
    }
}

pub fn parse_u64_env(var: &str) -> Option<u64> {
    env::var(var)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
}

pub fn parse_f64_env(var: &str) -> Option<f64> {
    env::var(var)
        .ok()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

pub fn non_empty_env(var: &str) -> Option<String> {
    env::var(var).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Default location for the config file: `$XDG_CONFIG_HOME/perplexity-budget`
pub fn default_config_dir() -> PathBuf {
    let basedirs = directories::BaseDirs::new();
    basedirs
        .as_ref()
        .map(|b| b.config_dir().join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".").join(APP_DIR))
}

/// Default location for the ledger and cache: `$XDG_DATA_HOME/perplexity-budget`
pub fn default_data_dir() -> PathBuf {
    let basedirs = directories::BaseDirs::new();
    basedirs
        .as_ref()
        .map(|b| b.data_dir().join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from(".").join(APP_DIR))
}

pub fn read_stdin() -> anyhow::Result<String> {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

pub fn format_currency(v: f64) -> String {
    if v != 0.0 && v.abs() < 0.01 {
        format!("{v:.4}")
    } else {
        format!("{v:.2}")
    }
}

pub fn format_tokens(n: u64) -> String {
    if n >= 1_000_000_000 {
        format!("{:.1}B", n as f64 / 1e9)
    } else if n >= 1_000_000 {
        format!("{:.1}M", n as f64 / 1e6)
    } else if n >= 1_000 {
        format!("{:.1}K", n as f64 / 1e3)
    } else {
        n.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_format_tokens() {
        assert_eq!(format_tokens(999), "999");
        assert_eq!(format_tokens(1_500), "1.5K");
        assert_eq!(format_tokens(2_000_000), "2.0M");
    }

    #[test]
    fn test_format_currency_small_values() {
        assert_eq!(format_currency(1.234), "1.23");
        assert_eq!(format_currency(0.0042), "0.0042");
        assert_eq!(format_currency(0.0), "0.00");
    }

    #[test]
    #[serial]
    fn test_env_parsers() {
        // SAFETY: Test runs serially, no concurrent env access
        unsafe {
            env::set_var("PPLX_TEST_BOOL", "Yes");
            env::set_var("PPLX_TEST_F64", " 2.5 ");
            env::set_var("PPLX_TEST_BLANK", "   ");
        }
        assert!(parse_bool_env("PPLX_TEST_BOOL"));
        assert_eq!(parse_f64_env("PPLX_TEST_F64"), Some(2.5));
        assert_eq!(non_empty_env("PPLX_TEST_BLANK"), None);
        assert!(!parse_bool_env("PPLX_TEST_MISSING"));
        unsafe {
            env::remove_var("PPLX_TEST_BOOL");
            env::remove_var("PPLX_TEST_F64");
            env::remove_var("PPLX_TEST_BLANK");
        }
    }
}
