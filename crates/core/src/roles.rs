//! Role names carried in access tokens and stored on `users.role`.

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_ADVISOR: &str = "advisor";
pub const ROLE_STUDENT: &str = "student";
