use axum::http::{self};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde_json::Value;
use tracing::info;

// Get the auth token from a request
pub fn get_auth_token<B>(req: &http::Request<B>) -> Result<String, String> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
        let auth_str = auth_header.to_str().map_err(|_| "Invalid Authorization header".to_string())?;
        Ok(auth_str
            .strip_prefix("Bearer ")
            .unwrap_or(auth_str)
            .to_string())
    }
    // 2. Try to get token from cookies
    else {
        let cookie_header = req.headers().get(http::header::COOKIE)
            .ok_or_else(|| "Missing Authorization header or Cookie".to_string())?
            .to_str()
            .map_err(|_| "Invalid Cookie header".to_string())?;

        for c in cookie::Cookie::split_parse(cookie_header).flatten() {
            if c.name() == "auth_token" {
                return Ok(c.value().to_string());
            }
        }
        Err("auth_token cookie not found".to_string())
    }
}

// Map the claims of a token to principals.
// User tokens carry their roles as "r/<role>", service tokens become "s/<name>".
pub fn principals_from_claims(claims: &Value) -> Result<Vec<String>, String> {
    let token_type = claims
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "JWT token does not contain 'type' claim".to_string())?;
    let sub = claims
        .get("sub")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "JWT token does not contain 'sub' claim".to_string())?;

    match token_type {
        "user" => {
            info!("User token validated successfully for: {}", sub);
            let mut prpls: Vec<String> = Vec::new();
            if let Some(roles) = claims.get("roles").and_then(|v| v.as_array()) {
                for role in roles.iter().filter_map(|r| r.as_str()) {
                    let role_prpl = format!("r/{}", role);
                    if !prpls.contains(&role_prpl) {
                        prpls.push(role_prpl);
                    }
                }
            }
            Ok(prpls)
        }
        "service" => {
            info!("Service token validated successfully for: {}", sub);
            Ok(vec![format!("s/{}", sub)])
        }
        other => Err(format!("Invalid token type: {}", other)),
    }
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<Value>(token, &decoding_key, &validation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde_json::json;

    #[test]
    fn token_from_bearer_header() {
        let req = http::Request::builder()
            .header(http::header::AUTHORIZATION, "Bearer abc.def")
            .body(Body::empty())
            .unwrap();
        assert_eq!(get_auth_token(&req).unwrap(), "abc.def");
    }

    #[test]
    fn token_from_cookie() {
        let req = http::Request::builder()
            .header(http::header::COOKIE, "theme=dark; auth_token=xyz")
            .body(Body::empty())
            .unwrap();
        assert_eq!(get_auth_token(&req).unwrap(), "xyz");

        let req = http::Request::builder().body(Body::empty()).unwrap();
        assert!(get_auth_token(&req).is_err());
    }

    #[test]
    fn user_roles_become_role_principals() {
        let claims = json!({"type": "user", "sub": "u1", "roles": ["Colabri-CloudAdmin", "Colabri-CloudAdmin"]});
        let principals = principals_from_claims(&claims).unwrap();
        assert_eq!(principals, vec!["r/Colabri-CloudAdmin".to_string()]);
    }

    #[test]
    fn service_token_becomes_service_principal() {
        let claims = json!({"type": "service", "sub": "colabri-app"});
        let principals = principals_from_claims(&claims).unwrap();
        assert_eq!(principals, vec!["s/colabri-app".to_string()]);

        assert!(principals_from_claims(&json!({"type": "robot", "sub": "x"})).is_err());
        assert!(principals_from_claims(&json!({"sub": "x"})).is_err());
    }
}
