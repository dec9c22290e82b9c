//! User directory search.

use chatify_types::UserSummary;

/// Keep users whose username contains `term`, ignoring case.
///
/// An empty term keeps everyone. Order is preserved.
pub fn filter_users(users: Vec<UserSummary>, term: &str) -> Vec<UserSummary> {
    let needle = term.trim().to_lowercase();
    if needle.is_empty() {
        return users;
    }
    users
        .into_iter()
        .filter(|u| u.username.to_lowercase().contains(&needle))
        .collect()
}
