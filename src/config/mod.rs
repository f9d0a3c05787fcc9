//! Configuration management for the mailer
//!
//! All settings are resolved at the boundary into a single typed [`Config`]
//! before any network activity: explicit values (CLI options or event
//! payload fields) take precedence over environment variables, which take
//! precedence over built-in defaults. Validation runs once and reports
//! every missing or invalid field in a single error rather than failing on
//! the first.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

pub const DEFAULT_SUBJECT: &str = "Query results CSV";
pub const DEFAULT_BODY: &str = "See attached CSV.";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Fully resolved, validated configuration for one run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Label for this invocation, used only in logs
    pub event_name: String,
    /// Base URL of the Redash instance, e.g. `https://redash.example.com`
    pub domain: String,
    /// Redash query ID
    pub query_id: String,
    /// API key authorizing reads of the query's results
    pub query_key: String,
    /// Literal recipient address(es), comma separated, or the name of a
    /// column whose values select the recipient for each row
    pub to_address: String,
    /// Sender address
    pub from_address: String,
    pub subject: String,
    pub body: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_login: String,
    pub smtp_password: String,
    /// Send an (attachment-less) email even when the query returned no rows
    pub send_on_empty: bool,
    /// Send only when the query returned no rows (alert-style jobs)
    pub send_only_on_empty: bool,
    /// Append a "no data" note to the body when there is no attachment
    pub append_empty_note: bool,
    /// Timeout applied to both the fetch and the SMTP session
    pub timeout_secs: u64,
}

impl Config {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Structured payload accepted by the `event` subcommand.
///
/// The fields mirror the CLI options; `{"kwargs": {...}}` wrapping is
/// accepted for compatibility with event-bridge invocations that nest
/// arguments, and a bare object works too.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPayload {
    pub kwargs: Option<Box<EventFields>>,
    #[serde(flatten)]
    pub fields: EventFields,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventFields {
    pub event_name: Option<String>,
    pub domain: Option<String>,
    /// Accepted as a string or a bare number; treated as opaque either way
    #[serde(default, deserialize_with = "string_or_number")]
    pub query_id: Option<String>,
    pub query_key: Option<String>,
    pub to_address: Option<String>,
    pub from_address: Option<String>,
    pub subject: Option<String>,
    pub body: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<u16>,
    pub smtp_login: Option<String>,
    pub smtp_password: Option<String>,
    pub send_on_empty: Option<bool>,
    pub send_only_on_empty: Option<bool>,
    pub append_empty_note: Option<bool>,
    pub timeout_secs: Option<u64>,
}

impl EventPayload {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Flatten the optional `kwargs` wrapper; explicit top-level fields win
    /// over wrapped ones.
    pub fn into_fields(self) -> EventFields {
        match self.kwargs {
            Some(inner) => self.fields.merged_over(*inner),
            None => self.fields,
        }
    }
}

impl EventFields {
    fn merged_over(self, base: EventFields) -> EventFields {
        EventFields {
            event_name: self.event_name.or(base.event_name),
            domain: self.domain.or(base.domain),
            query_id: self.query_id.or(base.query_id),
            query_key: self.query_key.or(base.query_key),
            to_address: self.to_address.or(base.to_address),
            from_address: self.from_address.or(base.from_address),
            subject: self.subject.or(base.subject),
            body: self.body.or(base.body),
            smtp_host: self.smtp_host.or(base.smtp_host),
            smtp_port: self.smtp_port.or(base.smtp_port),
            smtp_login: self.smtp_login.or(base.smtp_login),
            smtp_password: self.smtp_password.or(base.smtp_password),
            send_on_empty: self.send_on_empty.or(base.send_on_empty),
            send_only_on_empty: self.send_only_on_empty.or(base.send_only_on_empty),
            append_empty_note: self.append_empty_note.or(base.append_empty_note),
            timeout_secs: self.timeout_secs.or(base.timeout_secs),
        }
    }
}

/// Builder collecting configuration from the environment and from explicit
/// overrides, then validating the full set at once.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    fields: EventFields,
    problems: Vec<String>,
    smtp_port_invalid: bool,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the builder from environment variables.
    pub fn from_env() -> Self {
        let mut builder = Self::new();
        let f = &mut builder.fields;
        f.event_name = env_var("EVENT_NAME");
        f.domain = env_var("REDASH_DOMAIN");
        f.query_id = env_var("REDASH_QUERY_ID");
        f.query_key = env_var("REDASH_QUERY_KEY");
        f.to_address = env_var("TO_ADDRESS");
        f.from_address = env_var("FROM_ADDRESS");
        f.subject = env_var("EMAIL_SUBJECT");
        f.body = env_var("EMAIL_BODY");
        f.smtp_host = env_var("SMTP_HOST");
        f.smtp_login = env_var("SMTP_LOGIN");
        f.smtp_password = env_var("SMTP_PASSWORD");
        if let Some(raw) = env_var("SMTP_PORT") {
            match raw.parse::<u16>() {
                Ok(port) => f.smtp_port = Some(port),
                Err(_) => {
                    builder
                        .problems
                        .push(format!("SMTP_PORT is not a valid port number: '{raw}'"));
                    builder.smtp_port_invalid = true;
                }
            }
        }
        builder
    }

    /// Layer explicit values over whatever the builder already holds.
    pub fn merge(mut self, overrides: EventFields) -> Self {
        self.fields = overrides.merged_over(self.fields);
        self
    }

    /// Validate and produce the final [`Config`].
    ///
    /// Every missing required field and every invalid value is reported in
    /// one [`Error::Config`] so a misconfigured job surfaces its whole
    /// problem set in a single run.
    pub fn build(self) -> Result<Config> {
        let mut problems = self.problems;
        let f = self.fields;

        let mut require = |value: Option<String>, what: &str, hint: &str| -> String {
            match value {
                Some(v) if !v.trim().is_empty() => v,
                _ => {
                    problems.push(format!("{what} is required ({hint})"));
                    String::new()
                }
            }
        };

        let domain = require(f.domain, "Redash domain", "--domain or REDASH_DOMAIN");
        let query_id = require(f.query_id, "Redash query ID", "--query-id or REDASH_QUERY_ID");
        let query_key = require(
            f.query_key,
            "Redash query key",
            "--query-key or REDASH_QUERY_KEY",
        );
        let to_address = require(
            f.to_address,
            "Recipient address or column name",
            "--to or TO_ADDRESS",
        );
        let from_address = require(f.from_address, "Sender address", "--from or FROM_ADDRESS");
        let smtp_host = require(f.smtp_host, "SMTP host", "--smtp-host or SMTP_HOST");
        let smtp_login = require(f.smtp_login, "SMTP login", "--smtp-login or SMTP_LOGIN");
        let smtp_password = require(
            f.smtp_password,
            "SMTP password",
            "--smtp-password or SMTP_PASSWORD",
        );

        let smtp_port = match f.smtp_port {
            Some(port) => port,
            None => {
                if !self.smtp_port_invalid {
                    problems.push("SMTP port is required (--smtp-port or SMTP_PORT)".to_string());
                }
                0
            }
        };

        if !domain.is_empty() {
            match Url::parse(&domain) {
                Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
                Ok(url) => problems.push(format!(
                    "Redash domain must be an http(s) URL, got scheme '{}'",
                    url.scheme()
                )),
                Err(e) => problems.push(format!("Redash domain is not a valid URL: {e}")),
            }
        }

        if !problems.is_empty() {
            return Err(Error::Config(problems.join("; ")));
        }

        Ok(Config {
            event_name: f.event_name.unwrap_or_else(|| "CLI event".to_string()),
            domain: domain.trim_end_matches('/').to_string(),
            query_id,
            query_key,
            to_address,
            from_address,
            subject: f.subject.unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
            body: f.body.unwrap_or_else(|| DEFAULT_BODY.to_string()),
            smtp_host,
            smtp_port,
            smtp_login,
            smtp_password,
            send_on_empty: f.send_on_empty.unwrap_or(true),
            send_only_on_empty: f.send_only_on_empty.unwrap_or(false),
            append_empty_note: f.append_empty_note.unwrap_or(true),
            timeout_secs: f.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
        })
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::de::Error as _;
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    match value {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "query_id must be a string or number, got {other}"
        ))),
    }
}
