pub mod auth;
pub mod response;

pub use auth::{jwt_auth_middleware, AuthKeys, AuthUser, Claims};
pub use response::{ApiResponse, ApiResult};
