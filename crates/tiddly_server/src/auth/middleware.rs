use axum::{
    extract::FromRequestParts,
    http::{HeaderName, StatusCode, request::Parts},
};

/// Checks the identity forwarded by the authenticating proxy in front of
/// the server. The proxy is trusted; requests reaching the server without
/// the header are anonymous.
#[derive(Debug, Clone)]
pub struct AdminGate {
    header: HeaderName,
    admins: Vec<String>,
}

/// Extractor for the caller's identity, if any
///
/// Use this for endpoints that answer anonymous callers too (e.g. status)
#[derive(Debug, Clone)]
pub struct Identity(pub Option<String>);

/// Extractor for required admin access
///
/// Use this for every tiddler endpoint - returns 403 otherwise
#[derive(Debug, Clone)]
pub struct RequireAdmin(pub String);

impl AdminGate {
    pub fn new(header: HeaderName, admins: Vec<String>) -> Self {
        Self { header, admins }
    }

    /// Identity from the proxy header.
    ///
    /// Identity-aware proxies prefix the address with the issuer
    /// (`accounts.google.com:alice@example.com`); only the address is kept.
    pub fn identity(&self, parts: &Parts) -> Option<String> {
        let value = parts.headers.get(&self.header)?.to_str().ok()?.trim();
        let email = value.rsplit(':').next().unwrap_or(value).trim();
        (!email.is_empty()).then(|| email.to_string())
    }

    /// An empty admin list admits every identity.
    pub fn is_admin(&self, identity: &str) -> bool {
        self.admins.is_empty()
            || self
                .admins
                .iter()
                .any(|admin| admin.eq_ignore_ascii_case(identity))
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let gate = parts
            .extensions
            .get::<AdminGate>()
            .cloned()
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "Auth not configured"))?;

        Ok(Identity(gate.identity(parts)))
    }
}

impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Identity(identity) = Identity::from_request_parts(parts, state).await?;
        let gate = parts
            .extensions
            .get::<AdminGate>()
            .ok_or((StatusCode::INTERNAL_SERVER_ERROR, "Auth not configured"))?;

        match identity {
            Some(user) if gate.is_admin(&user) => Ok(RequireAdmin(user)),
            _ => Err((StatusCode::FORBIDDEN, "permission denied")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(header: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(value) = header {
            builder = builder.header("x-user", value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_identity_strips_issuer_prefix() {
        let gate = AdminGate::new(HeaderName::from_static("x-user"), vec![]);
        assert_eq!(
            gate.identity(&parts(Some("accounts.google.com:alice@example.com"))),
            Some("alice@example.com".to_string())
        );
        assert_eq!(
            gate.identity(&parts(Some("bob@example.com"))),
            Some("bob@example.com".to_string())
        );
        assert_eq!(gate.identity(&parts(Some("  "))), None);
        assert_eq!(gate.identity(&parts(None)), None);
    }

    #[test]
    fn test_admin_list() {
        let open = AdminGate::new(HeaderName::from_static("x-user"), vec![]);
        assert!(open.is_admin("anyone@example.com"));

        let closed = AdminGate::new(
            HeaderName::from_static("x-user"),
            vec!["Alice@Example.com".to_string()],
        );
        assert!(closed.is_admin("alice@example.com"));
        assert!(!closed.is_admin("mallory@example.com"));
    }
}
