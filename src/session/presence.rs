//! Presence list derivation.

use crate::identity::Identity;
use crate::web::ws::PresenceEntry;

/// Build presence rows: present users first, then away users, each group
/// ordered by name ignoring case, then one lurker row.
pub fn presence_rows<'a, I>(identities: I, lurkers: usize) -> Vec<PresenceEntry>
where
    I: IntoIterator<Item = &'a Identity>,
{
    let mut users: Vec<&Identity> = identities.into_iter().collect();
    users.sort_by(|a, b| {
        a.is_afk
            .cmp(&b.is_afk)
            .then_with(|| a.name().to_lowercase().cmp(&b.name().to_lowercase()))
    });

    let mut rows: Vec<PresenceEntry> = users
        .into_iter()
        .map(|identity| PresenceEntry::User {
            display_name: identity.nick.to_string(),
            status: identity.status.clone(),
            is_afk: identity.is_afk,
        })
        .collect();
    rows.push(PresenceEntry::Lurkers { lurkers });
    rows
}
