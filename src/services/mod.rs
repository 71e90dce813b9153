pub mod accounts;
pub mod accounts_impl;
pub mod reset_token;

pub use accounts::{AccountError, AccountService, ActivationOutcome, ResetStage, SessionUser};
pub use accounts_impl::SeaOrmAccountService;
pub use reset_token::ResetTokenService;
