//! Credentials stored in `users.password_hash`.
//!
//! Hashes are Argon2id PHC strings with the crate's default cost parameters.
//! Login checks run the same amount of Argon2 work whether or not the
//! username exists, so response timing does not reveal registered accounts.

use std::sync::LazyLock;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::entity::user;

/// Verified against when the username is unknown.
static DECOY_HASH: LazyLock<String> =
    LazyLock::new(|| hash_password("decoy-password").unwrap_or_default());

/// Produce the PHC string stored for a new account.
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|phc| phc.to_string())
}

/// `false` for a wrong password and for a column that is not a PHC string.
pub fn verify_password(password: &str, stored: &str) -> bool {
    PasswordHash::new(stored).is_ok_and(|phc| {
        Argon2::default()
            .verify_password(password.as_bytes(), &phc)
            .is_ok()
    })
}

/// Resolve a login attempt against the looked-up account.
pub fn authenticate_user(account: Option<user::Model>, password: &str) -> Option<user::Model> {
    match account {
        Some(account) if verify_password(password, &account.password_hash) => Some(account),
        Some(_) => None,
        None => {
            verify_password(password, &DECOY_HASH);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    fn account(password: &str) -> user::Model {
        user::Model {
            id: "u1".into(),
            username: "alice".into(),
            email: "alice@example.com".into(),
            email_verified: false,
            password_hash: hash_password(password).unwrap(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn stored_hash_is_argon2id_phc() {
        let phc = hash_password("correct horse battery staple").unwrap();
        assert!(phc.starts_with("$argon2id$"));
        assert!(verify_password("correct horse battery staple", &phc));
        assert!(!verify_password("Correct horse battery staple", &phc));
    }

    #[test]
    fn each_account_gets_its_own_salt() {
        assert_ne!(hash_password("pw").unwrap(), hash_password("pw").unwrap());
    }

    #[test]
    fn non_phc_column_never_matches() {
        for stored in ["", "plain-text", "$argon2id$broken"] {
            assert!(!verify_password("pw", stored));
        }
    }

    #[test]
    fn login_attempts_resolve_to_the_account_only_on_match() {
        let found = authenticate_user(Some(account("wonderland")), "wonderland");
        assert_eq!(found.map(|u| u.id), Some("u1".to_string()));
        assert!(authenticate_user(Some(account("wonderland")), "looking-glass").is_none());
        assert!(authenticate_user(None, "wonderland").is_none());
        assert!(DECOY_HASH.starts_with("$argon2id$"));
    }
}
