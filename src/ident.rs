//! Stable ids for scraped records.
//!
//! Re-scraping the same record must produce the same id so the merge
//! overwrites instead of duplicating. A natural key wins when one exists;
//! otherwise the distinguishing fields are joined, hashed with SHA-256,
//! base64-encoded with the URL-safe alphabet and cut to [`ID_LEN`]
//! characters. Every byte of the key feeds the id.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use sha2::{Digest, Sha256};

pub const ID_LEN: usize = 16;

/// Hash `key` and keep the first [`ID_LEN`] characters of the encoded digest.
pub fn derive(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let mut id = URL_SAFE_NO_PAD.encode(hasher.finalize());
    id.truncate(ID_LEN);
    id
}

/// First email if there is one, else lead and contact name.
pub fn contact_id(emails: &[String], lead: &str, name: &str) -> String {
    match emails.first() {
        Some(email) => email.clone(),
        None => derive(&format!("{}-{}", lead, name)),
    }
}

pub fn opportunity_id(name: &str, value: &str, close_date: &str) -> String {
    derive(&format!("{}-{}-{}", name, value, close_date))
}

pub fn task_id(description: &str, due_date: &str) -> String {
    derive(&format!("{}{}", description, due_date))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        assert_eq!(derive("Acme-Jane Doe"), derive("Acme-Jane Doe"));
    }

    #[test]
    fn derive_is_bounded_and_url_safe() {
        let id = derive("A very long lead name that goes on - Someone With A Long Name");
        assert_eq!(id.len(), ID_LEN);
        assert!(id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn short_keys_get_full_length_ids() {
        for key in ["", "ab"] {
            let id = derive(key);
            assert_eq!(id.len(), ID_LEN);
            assert!(!id.contains('='));
        }
    }

    #[test]
    fn email_is_the_natural_key() {
        let emails = vec!["jane@acme.io".to_string(), "j@acme.io".to_string()];
        assert_eq!(contact_id(&emails, "Acme", "Jane"), "jane@acme.io");
    }

    #[test]
    fn ids_differ_when_one_field_differs() {
        let base = opportunity_id("Acme", "$1,000", "Jan 5");
        assert_ne!(base, opportunity_id("Acmf", "$1,000", "Jan 5"));
        assert_ne!(base, opportunity_id("Acme", "$2,000", "Jan 5"));

        assert_ne!(contact_id(&[], "Acme", "Jane"), contact_id(&[], "Acme", "John"));
        assert_ne!(task_id("Call", "2024-01-01"), task_id("Mail", "2024-01-01"));
    }

    #[test]
    fn long_shared_prefix_still_distinguishes() {
        assert_ne!(
            opportunity_id("Acme Corporation", "$5,000", "Mar 1, 2025"),
            opportunity_id("Acme Corporation", "$5,000", "Dec 9, 2026")
        );
        assert_ne!(
            task_id("Follow up with Jane (Acme)", "2025-03-14"),
            task_id("Follow up with Bob (Globex)", "2025-04-01")
        );
        assert_ne!(
            contact_id(&[], "Acme Corporation International", "Jane"),
            contact_id(&[], "Acme Corporation International", "John")
        );
    }

    #[test]
    fn non_ascii_fields_encode() {
        let id = contact_id(&[], "Société", "Zoë");
        assert!(!id.is_empty());
        assert_eq!(id, contact_id(&[], "Société", "Zoë"));
    }
}
