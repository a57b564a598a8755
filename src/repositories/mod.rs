//! # Repository Layer
//!
//! SeaORM data access for credentials, OAuth state, grants and the audit ledger. Approval
//! rows are written by [`crate::workflow`] inside its own transactions.
//! Repositories hold no state beyond the pool; every conditional write is a single
//! statement so concurrent replicas are arbitrated by the database.

pub mod credential;
pub mod grant;
pub mod history;
pub mod oauth_state;

pub use credential::CredentialRepository;
pub use grant::GrantStore;
pub use history::HistoryRepository;
pub use oauth_state::OAuthStateRepository;
