use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::jwt::validate_token;

/// Bearer-token middleware: validates the JWT and stores the [`User`] in
/// the request extensions for handlers to pick up with `Extension<User>`.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_value = request
        .headers()
        .get("Authorization")
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    let token = auth_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))?;

    let user = validate_token(token, &config.supabase_jwt_secret).map_err(AppError::Auth)?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Reject the request unless the caller holds one of `roles`.
pub fn require_any_role(user: &User, roles: &[&str]) -> Result<(), AppError> {
    if roles.iter().any(|role| user.has_role(role)) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "This action requires one of the roles: {}",
            roles.join(", ")
        )))
    }
}

pub fn require_role(user: &User, role: &str) -> Result<(), AppError> {
    require_any_role(user, &[role])
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use shared_models::auth::{ROLE_ADMIN, ROLE_DOCTOR};

    use crate::test_utils::TestUser;

    #[test]
    fn role_guard_accepts_matching_role() {
        let user = TestUser::admin("admin@example.com").to_user();
        assert!(require_role(&user, ROLE_ADMIN).is_ok());
        assert!(require_any_role(&user, &[ROLE_DOCTOR, ROLE_ADMIN]).is_ok());
    }

    #[test]
    fn role_guard_rejects_other_roles() {
        let user = TestUser::patient("p@example.com").to_user();
        assert_matches!(require_role(&user, ROLE_DOCTOR), Err(AppError::Forbidden(_)));
    }
}
