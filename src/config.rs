use crate::error::HelmsmanError;
use url::Url;

/// Application configuration built from the command line
#[derive(Clone, Debug)]
pub struct Config {
    /// Upstream gateway every request is forwarded to
    pub upstream: Url,
    /// Address the proxy listens on, e.g. "0.0.0.0:8080"
    pub listen: String,
}

impl Config {
    /// Build configuration from `<upstream_url> <listen_address>`.
    ///
    /// Any other argument count prints usage to stdout and is rejected.
    pub fn from_args<I>(mut args: I) -> Result<Self, HelmsmanError>
    where
        I: Iterator<Item = String>,
    {
        let program = args.next().unwrap_or_else(|| "helmsman".to_string());

        let (Some(upstream), Some(listen), None) = (args.next(), args.next(), args.next()) else {
            println!("{program} <upstream_url> <listen_address>");
            return Err(HelmsmanError::Config(
                "expected exactly two arguments".to_string(),
            ));
        };

        let upstream = Url::parse(&upstream)
            .map_err(|e| HelmsmanError::Config(format!("invalid upstream url: {e}")))?;

        Ok(Config { upstream, listen })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn test_two_positional_arguments() {
        let config =
            Config::from_args(args(&["helmsman", "http://127.0.0.1:8080", "0.0.0.0:3000"]))
                .expect("valid arguments");

        assert_eq!(config.upstream.as_str(), "http://127.0.0.1:8080/");
        assert_eq!(config.listen, "0.0.0.0:3000");
    }

    #[test]
    fn test_wrong_argument_count_rejected() {
        assert!(Config::from_args(args(&["helmsman"])).is_err());
        assert!(Config::from_args(args(&["helmsman", "http://127.0.0.1:8080"])).is_err());
        assert!(
            Config::from_args(args(&[
                "helmsman",
                "http://127.0.0.1:8080",
                "0.0.0.0:3000",
                "extra"
            ]))
            .is_err()
        );
    }

    #[test]
    fn test_invalid_upstream_url_rejected() {
        assert!(Config::from_args(args(&["helmsman", "not a url", "0.0.0.0:3000"])).is_err());
    }
}
