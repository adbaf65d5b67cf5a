//! Authentication module.
//!
//! Password hashing, account registration and the credential lookup used
//! by the front-end before it hands a session identity to the mail core.

mod password;
mod registration;
pub mod validation;

pub use password::{hash_password, validate_password, verify_password, PasswordError};
pub use registration::{authenticate, register, RegistrationError, RegistrationRequest};
pub use validation::ValidationError;
