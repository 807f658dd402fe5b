use axum::{http::StatusCode, Json};
use crate::models::ErrorResponse;

pub const CLOUD_ADMIN_PRPL: &str = "r/Colabri-CloudAdmin";

pub fn is_cloud_admin(prpls: &[String]) -> bool {
    prpls.iter().any(|p| p == CLOUD_ADMIN_PRPL)
}

pub fn ensure_cloud_admin(prpls: &[String]) -> Result<String, (StatusCode, Json<ErrorResponse>)> {
    if is_cloud_admin(prpls) {
        return Ok(CLOUD_ADMIN_PRPL.to_string());
    }
    Err(ErrorResponse::reply(StatusCode::FORBIDDEN, "Cloud Admin access required"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloud_admin_is_allowed() {
        let prpls = vec![CLOUD_ADMIN_PRPL.to_string()];
        assert_eq!(ensure_cloud_admin(&prpls).unwrap(), CLOUD_ADMIN_PRPL);
    }

    #[test]
    fn plain_user_is_forbidden() {
        let prpls = vec!["r/Member".to_string()];
        let (status, body) = ensure_cloud_admin(&prpls).unwrap_err();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body.code, 403);
        assert!(ensure_cloud_admin(&["s/colabri-room".to_string()]).is_err());
    }
}
