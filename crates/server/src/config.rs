use crate::ingest::ColumnInference;

/// Process configuration, read once at startup.
///
/// `DATABASE_URL` and `JWT_SECRET` are mandatory: the server refuses to
/// start without them rather than falling back to an insecure default.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub ai_service_url: String,
    pub port: u16,
    pub column_inference: ColumnInference,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET must be set (no default is provided)"))?;

        let ai_service_url = lookup("AI_SERVICE_URL")
            .unwrap_or_else(|| "http://localhost:8000".to_string())
            .trim_end_matches('/')
            .to_string();

        let port = match lookup("PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| anyhow::anyhow!("PORT must be a number, got {:?}", raw))?,
            None => 5000,
        };

        let column_inference = match lookup("COLUMN_INFERENCE").as_deref() {
            None | Some("first-row") => ColumnInference::FirstRow,
            Some("union") => ColumnInference::Union,
            Some(other) => anyhow::bail!(
                "COLUMN_INFERENCE must be \"first-row\" or \"union\", got {:?}",
                other
            ),
        };

        Ok(Self {
            database_url,
            jwt_secret,
            ai_service_url,
            port,
            column_inference,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |key| {
            pairs
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }
    }

    #[test]
    fn missing_jwt_secret_is_fatal() {
        let result = Config::from_lookup(env(&[("DATABASE_URL", "postgres://localhost/datalens")]));
        assert!(result.is_err(), "config must not fall back to a default secret");
    }

    #[test]
    fn blank_jwt_secret_is_fatal() {
        let result = Config::from_lookup(env(&[
            ("DATABASE_URL", "postgres://localhost/datalens"),
            ("JWT_SECRET", "   "),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn defaults_apply() {
        let cfg = Config::from_lookup(env(&[
            ("DATABASE_URL", "postgres://localhost/datalens"),
            ("JWT_SECRET", "s3cret"),
        ]))
        .unwrap();
        assert_eq!(cfg.port, 5000);
        assert_eq!(cfg.ai_service_url, "http://localhost:8000");
        assert_eq!(cfg.column_inference, ColumnInference::FirstRow);
    }

    #[test]
    fn ai_service_url_trailing_slash_is_stripped() {
        let cfg = Config::from_lookup(env(&[
            ("DATABASE_URL", "postgres://localhost/datalens"),
            ("JWT_SECRET", "s3cret"),
            ("AI_SERVICE_URL", "http://insights:8000/"),
        ]))
        .unwrap();
        assert_eq!(cfg.ai_service_url, "http://insights:8000");
    }

    #[test]
    fn union_inference_is_selectable() {
        let cfg = Config::from_lookup(env(&[
            ("DATABASE_URL", "postgres://localhost/datalens"),
            ("JWT_SECRET", "s3cret"),
            ("COLUMN_INFERENCE", "union"),
        ]))
        .unwrap();
        assert_eq!(cfg.column_inference, ColumnInference::Union);
    }

    #[test]
    fn unknown_inference_mode_is_rejected() {
        let result = Config::from_lookup(env(&[
            ("DATABASE_URL", "postgres://localhost/datalens"),
            ("JWT_SECRET", "s3cret"),
            ("COLUMN_INFERENCE", "all-rows"),
        ]));
        assert!(result.is_err());
    }
}
