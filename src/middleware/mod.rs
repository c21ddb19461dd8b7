pub mod csrf;

pub use csrf::{
    csrf_validation_middleware, generate_csrf_token, get_or_create_csrf_token,
    validate_csrf_form_field, CsrfToken, CSRF_FORM_FIELD, CSRF_HEADER, CSRF_TOKEN_KEY,
};
