pub mod url_validation;
pub use url_validation::{UrlValidationError, validate_realtime_url, validate_token_endpoint};
