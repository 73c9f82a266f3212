//! Connection-string normalization and TLS policy.
//!
//! User-supplied connection strings are frequently "almost" URIs: passwords
//! containing `@`, `/`, `#` or `%` pasted verbatim. The password segment is
//! therefore decoded (tolerantly) and re-encoded unconditionally before the
//! string is parsed, which makes the operation idempotent on already-encoded
//! input.

use sqlx::postgres::{PgConnectOptions, PgSslMode};

use crate::error::{AgentError, AgentResult};

/// How TLS is negotiated for a target connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsPolicy {
    /// `sslmode=disable`.
    Disabled,
    /// Strict verification (certificate chain and host name) against a caller-supplied CA.
    Verified { ca_certificate: String },
    /// TLS attempted, certificate not verified. `required` mirrors `sslmode=require`.
    Unverified { required: bool },
    /// Unknown or missing `sslmode`: TLS if the server offers it.
    BestEffort,
}

impl TlsPolicy {
    pub fn ssl_mode(&self) -> PgSslMode {
        match self {
            TlsPolicy::Disabled => PgSslMode::Disable,
            TlsPolicy::Verified { .. } => PgSslMode::VerifyFull,
            TlsPolicy::Unverified { required: true } => PgSslMode::Require,
            TlsPolicy::Unverified { required: false } => PgSslMode::Prefer,
            TlsPolicy::BestEffort => PgSslMode::Prefer,
        }
    }
}

/// Pick the TLS policy from the `sslmode` parameter and an optional CA.
pub fn select_tls_policy(sslmode: Option<&str>, ca_certificate: Option<&str>) -> TlsPolicy {
    let ca = ca_certificate.map(str::trim).filter(|c| !c.is_empty());
    match sslmode.map(|m| m.trim().to_ascii_lowercase()).as_deref() {
        Some("disable") => TlsPolicy::Disabled,
        Some(mode @ ("prefer" | "require")) => match ca {
            Some(ca) => TlsPolicy::Verified {
                ca_certificate: ca.to_string(),
            },
            None => TlsPolicy::Unverified {
                required: mode == "require",
            },
        },
        _ => TlsPolicy::BestEffort,
    }
}

/// Re-encode the password segment and default the database path.
pub fn normalize_connection_string(raw: &str, fallback_database: &str) -> AgentResult<String> {
    let raw = raw.trim();
    let (scheme, rest) = raw
        .split_once("://")
        .ok_or_else(|| AgentError::validation("Connection string must be a postgres:// URI"))?;
    if scheme != "postgres" && scheme != "postgresql" {
        return Err(AgentError::validation(format!(
            "Unsupported connection scheme '{}'",
            scheme
        )));
    }

    // The last '@' ends the userinfo: passwords may legitimately contain '@'.
    let (userinfo, host_and_rest) = match rest.rfind('@') {
        Some(at) => (Some(&rest[..at]), &rest[at + 1..]),
        None => (None, rest),
    };

    let userinfo = userinfo.map(|ui| match ui.split_once(':') {
        Some((user, password)) => format!("{}:{}", user, encode_password(password)),
        None => ui.to_string(),
    });

    let split_at = host_and_rest.find(|c| c == '/' || c == '?').unwrap_or(host_and_rest.len());
    let (authority, tail) = host_and_rest.split_at(split_at);
    if authority.is_empty() {
        return Err(AgentError::validation("Connection string has no host"));
    }
    let (path, query) = match tail.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (tail, None),
    };
    let path = if path.trim_matches('/').is_empty() {
        format!("/{}", fallback_database)
    } else {
        path.to_string()
    };

    let mut out = format!("{}://", scheme);
    if let Some(ui) = userinfo {
        out.push_str(&ui);
        out.push('@');
    }
    out.push_str(authority);
    out.push_str(&path);
    if let Some(q) = query {
        out.push('?');
        out.push_str(q);
    }
    Ok(out)
}

fn encode_password(password: &str) -> String {
    let decoded = urlencoding::decode(password)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| password.to_string());
    urlencoding::encode(&decoded).into_owned()
}

/// Read `sslmode` from a (normalized) connection string.
pub fn sslmode_of(connection_string: &str) -> Option<String> {
    let url = url::Url::parse(connection_string).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == "sslmode")
        .map(|(_, v)| v.into_owned())
}

/// Build sqlx connect options from a normalized string and TLS policy.
///
/// Parsed by hand rather than with `PgConnectOptions::from_str` so pooler
/// user names such as `postgres.project-ref` survive intact.
pub fn connect_options(connection_string: &str, tls: &TlsPolicy) -> AgentResult<PgConnectOptions> {
    let url = url::Url::parse(connection_string)
        .map_err(|e| AgentError::validation(format!("Invalid connection string: {}", e)))?;
    let username = urlencoding::decode(url.username())
        .map_err(|_| AgentError::validation("Connection user name is not valid UTF-8"))?
        .into_owned();
    let password = url
        .password()
        .map(|p| urlencoding::decode(p).map(|s| s.into_owned()))
        .transpose()
        .map_err(|_| AgentError::validation("Connection password is not valid UTF-8"))?;
    let database = urlencoding::decode(url.path().trim_start_matches('/'))
        .map_err(|_| AgentError::validation("Database name is not valid UTF-8"))?
        .into_owned();

    let mut opts = PgConnectOptions::new()
        .host(url.host_str().unwrap_or("localhost"))
        .port(url.port().unwrap_or(5432))
        .database(&database)
        .username(&username)
        .statement_cache_capacity(0)
        .ssl_mode(tls.ssl_mode());
    if let Some(ref pw) = password {
        opts = opts.password(pw);
    }
    if let Some((_, app)) = url.query_pairs().find(|(k, _)| k == "application_name") {
        opts = opts.application_name(&app);
    } else {
        opts = opts.application_name("pgpilot");
    }
    if let TlsPolicy::Verified { ca_certificate } = tls {
        opts = opts.ssl_root_cert_from_pem(ca_certificate.as_bytes().to_vec());
    }
    Ok(opts)
}

/// Replace the password with `***` for logging.
pub fn redact(connection_string: &str) -> String {
    match url::Url::parse(connection_string) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => "<unparseable connection string>".to_string(),
    }
}
