//! Caller roles and the role lookup seam.
//!
//! Authorization policy itself lives outside this crate: all the core needs
//! is "what role does this token have on this project". The default
//! implementation decodes a Supabase-issued JWT and reads the membership
//! table; tests substitute a fixed lookup.
//!
//! Roles are resolved on every request and never cached, since destructive
//! statement gating depends on them.

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Database;
use crate::error::{AgentError, AgentResult};

/// Effective role of the caller on a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Editor,
    Owner,
}

impl Role {
    pub fn parse(s: &str) -> Option<Role> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owner" => Some(Role::Owner),
            "editor" => Some(Role::Editor),
            "viewer" => Some(Role::Viewer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Viewer => "viewer",
            Role::Editor => "editor",
            Role::Owner => "owner",
        }
    }

    /// Editors and owners may execute arbitrary SQL.
    pub fn can_execute(&self) -> bool {
        *self >= Role::Editor
    }

    /// Only owners may run destructive statements.
    pub fn can_run_destructive(&self) -> bool {
        *self == Role::Owner
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `role-for(project, token)`.
#[async_trait]
pub trait RoleLookup: Send + Sync {
    async fn role_for(&self, project_id: Uuid, access_token: &str) -> AgentResult<Role>;
}

/// JWT claims from a Supabase-issued token.
#[derive(Debug, Deserialize)]
struct SupabaseClaims {
    /// Subject: the auth user ID.
    sub: String,
}

/// Decode and optionally verify a Supabase JWT, returning the user id.
///
/// If a secret is configured, performs full HS256 verification. Otherwise,
/// decodes without signature validation (development mode).
pub fn decode_user_id(token: &str, jwt_secret: Option<&str>) -> Result<String, String> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&["authenticated"]);
    let data = match jwt_secret {
        Some(secret) => {
            let key = DecodingKey::from_secret(secret.as_bytes());
            decode::<SupabaseClaims>(token, &key, &validation)
                .map_err(|e| format!("JWT verification failed: {}", e))?
        }
        None => {
            validation.insecure_disable_signature_validation();
            validation.validate_exp = false;
            decode::<SupabaseClaims>(token, &DecodingKey::from_secret(b""), &validation)
                .map_err(|e| format!("JWT decode failed: {}", e))?
        }
    };
    Ok(data.claims.sub)
}

/// Token → user id (JWT) → project membership row.
pub struct JwtRoleLookup {
    db: Database,
    jwt_secret: Option<String>,
}

impl JwtRoleLookup {
    pub fn new(db: Database, jwt_secret: Option<String>) -> Self {
        Self { db, jwt_secret }
    }
}

#[async_trait]
impl RoleLookup for JwtRoleLookup {
    async fn role_for(&self, project_id: Uuid, access_token: &str) -> AgentResult<Role> {
        if access_token.trim().is_empty() {
            return Err(AgentError::access_denied("Access token is required"));
        }
        let user_id = decode_user_id(access_token, self.jwt_secret.as_deref())
            .map_err(AgentError::AccessDenied)?;
        let role = self.db.get_project_role(project_id, &user_id).await?;
        match role.as_deref().and_then(Role::parse) {
            Some(role) => Ok(role),
            None => Err(AgentError::access_denied(format!(
                "User has no access to project {}",
                project_id
            ))),
        }
    }
}
