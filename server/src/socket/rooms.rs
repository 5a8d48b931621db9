// In-process presence and room registry.
//
// All socket-visible presence lives here: which users currently hold a live
// connection, and which capsule rooms each of them has joined. Persistence
// never sees any of this; a restart simply empties the registry.

use std::collections::HashSet;

use dashmap::DashMap;

use crate::types::SessionUser;

pub fn capsule_room_name(capsule_id: &str) -> String {
    format!("capsule:{capsule_id}")
}

/// Private per-user room, joined at connect time. Lets the dispatcher
/// target or exclude a single user without tracking socket ids.
pub fn user_room_name(user_id: &str) -> String {
    format!("user:{user_id}")
}

/// A user with a live socket connection. One identity per user id; a second
/// connection for the same user replaces the first (last-connect-wins).
#[derive(Clone)]
pub struct ActiveIdentity {
    pub user: SessionUser,
    pub socket_id: String,
    pub connected_at: i64,
    pub last_activity: i64,
}

/// A room the user was removed from, with whether anyone is still in it.
/// Callers only broadcast a departure into rooms that still have members.
pub struct RoomDeparture {
    pub capsule_id: String,
    pub has_remaining_members: bool,
}

#[derive(Default)]
pub struct PresenceRegistry {
    identities: DashMap<String, ActiveIdentity>,
    rooms: DashMap<String, HashSet<String>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the identity for `user.id`. Returns the socket id
    /// of the connection being replaced, if there was one, so the caller
    /// can force it to disconnect.
    pub fn register(&self, user: SessionUser, socket_id: &str, now: i64) -> Option<String> {
        let user_id = user.id.clone();
        let identity = ActiveIdentity {
            user,
            socket_id: socket_id.to_owned(),
            connected_at: now,
            last_activity: now,
        };
        self.identities
            .insert(user_id, identity)
            .map(|previous| previous.socket_id)
    }

    /// Drop the identity and pull the user out of every room. Empty rooms
    /// are deleted. Idempotent: unregistering an unknown user returns an
    /// empty departure list.
    pub fn unregister(&self, user_id: &str) -> Vec<RoomDeparture> {
        let was_registered = self.identities.remove(user_id).is_some();

        let mut departures = Vec::new();
        let mut emptied = Vec::new();
        for mut entry in self.rooms.iter_mut() {
            if entry.value_mut().remove(user_id) {
                let has_remaining_members = !entry.value().is_empty();
                departures.push(RoomDeparture {
                    capsule_id: entry.key().clone(),
                    has_remaining_members,
                });
                if !has_remaining_members {
                    emptied.push(entry.key().clone());
                }
            }
        }
        for capsule_id in emptied {
            self.rooms
                .remove_if(&capsule_id, |_, members| members.is_empty());
        }

        if was_registered { departures } else { Vec::new() }
    }

    /// Add the user to a room and return the resulting member snapshot.
    /// Authorization happens in the caller; an unregistered user is a no-op
    /// that yields the current snapshot untouched.
    pub fn join_room(&self, user_id: &str, capsule_id: &str) -> Vec<SessionUser> {
        if self.identities.contains_key(user_id) {
            self.rooms
                .entry(capsule_id.to_owned())
                .or_default()
                .insert(user_id.to_owned());
        }
        self.active_members_of(capsule_id)
    }

    /// Bulk rejoin on reconnect. Returns how many rooms were entered; no
    /// per-room snapshot and no broadcast from here.
    pub fn join_all(&self, user_id: &str, capsule_ids: &[String]) -> usize {
        if !self.identities.contains_key(user_id) {
            return 0;
        }
        let mut joined = 0;
        for capsule_id in capsule_ids {
            self.rooms
                .entry(capsule_id.clone())
                .or_default()
                .insert(user_id.to_owned());
            joined += 1;
        }
        joined
    }

    /// Remove the user from a room. Always permitted. Returns true when the
    /// user actually was a member.
    pub fn leave_room(&self, user_id: &str, capsule_id: &str) -> bool {
        let mut removed = false;
        if let Some(mut members) = self.rooms.get_mut(capsule_id) {
            removed = members.remove(user_id);
        }
        if removed {
            self.rooms
                .remove_if(capsule_id, |_, members| members.is_empty());
        }
        removed
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.identities.contains_key(user_id)
    }

    pub fn socket_of(&self, user_id: &str) -> Option<String> {
        self.identities
            .get(user_id)
            .map(|identity| identity.socket_id.clone())
    }

    pub fn is_member(&self, user_id: &str, capsule_id: &str) -> bool {
        self.rooms
            .get(capsule_id)
            .map(|members| members.contains(user_id))
            .unwrap_or(false)
    }

    /// Registered users currently in the room. Members whose identity has
    /// already been dropped are skipped.
    pub fn active_members_of(&self, capsule_id: &str) -> Vec<SessionUser> {
        let Some(members) = self.rooms.get(capsule_id) else {
            return Vec::new();
        };
        members
            .iter()
            .filter_map(|user_id| {
                self.identities
                    .get(user_id)
                    .map(|identity| identity.user.clone())
            })
            .collect()
    }

    pub fn member_socket_ids(&self, capsule_id: &str) -> Vec<String> {
        let Some(members) = self.rooms.get(capsule_id) else {
            return Vec::new();
        };
        members
            .iter()
            .filter_map(|user_id| {
                self.identities
                    .get(user_id)
                    .map(|identity| identity.socket_id.clone())
            })
            .collect()
    }

    pub fn all_active(&self) -> Vec<SessionUser> {
        self.identities
            .iter()
            .map(|entry| entry.value().user.clone())
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.identities.len()
    }

    /// Refresh the last-activity timestamp. Every inbound socket event
    /// calls this, so the staleness sweep measures idleness rather than
    /// connection age.
    pub fn touch(&self, user_id: &str, now: i64) {
        if let Some(mut identity) = self.identities.get_mut(user_id) {
            identity.last_activity = now;
        }
    }

    /// Evict identities idle for longer than `max_idle_seconds` and tear
    /// down their room memberships. Returns the evicted identities with
    /// their room departures so the caller can broadcast offline events.
    pub fn sweep_stale(
        &self,
        now: i64,
        max_idle_seconds: i64,
    ) -> Vec<(ActiveIdentity, Vec<RoomDeparture>)> {
        let stale: Vec<String> = self
            .identities
            .iter()
            .filter(|entry| now - entry.value().last_activity > max_idle_seconds)
            .map(|entry| entry.key().clone())
            .collect();

        let mut evicted = Vec::with_capacity(stale.len());
        for user_id in stale {
            let Some((_, identity)) = self.identities.remove(&user_id) else {
                continue;
            };
            let mut departures = Vec::new();
            let mut emptied = Vec::new();
            for mut entry in self.rooms.iter_mut() {
                if entry.value_mut().remove(&user_id) {
                    let has_remaining_members = !entry.value().is_empty();
                    departures.push(RoomDeparture {
                        capsule_id: entry.key().clone(),
                        has_remaining_members,
                    });
                    if !has_remaining_members {
                        emptied.push(entry.key().clone());
                    }
                }
            }
            for capsule_id in emptied {
                self.rooms
                    .remove_if(&capsule_id, |_, members| members.is_empty());
            }
            evicted.push((identity, departures));
        }
        evicted
    }

    #[cfg(test)]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user(id: &str) -> SessionUser {
        SessionUser {
            id: id.to_owned(),
            email: format!("{id}@example.com"),
            name: Some(id.to_owned()),
            avatar_url: None,
            disabled: false,
            has_password: true,
        }
    }

    #[test]
    fn register_and_unregister_drive_is_online() {
        let registry = PresenceRegistry::new();
        assert!(!registry.is_online("u1"));

        registry.register(test_user("u1"), "sock-1", 100);
        assert!(registry.is_online("u1"));
        assert_eq!(registry.socket_of("u1").as_deref(), Some("sock-1"));

        registry.unregister("u1");
        assert!(!registry.is_online("u1"));
        assert!(registry.socket_of("u1").is_none());
    }

    #[test]
    fn second_connection_replaces_the_first() {
        let registry = PresenceRegistry::new();
        assert!(registry.register(test_user("u1"), "sock-1", 100).is_none());

        let replaced = registry.register(test_user("u1"), "sock-2", 200);
        assert_eq!(replaced.as_deref(), Some("sock-1"));
        assert_eq!(registry.socket_of("u1").as_deref(), Some("sock-2"));
        assert_eq!(registry.connection_count(), 1);
    }

    #[test]
    fn join_returns_member_snapshot() {
        let registry = PresenceRegistry::new();
        registry.register(test_user("u1"), "sock-1", 100);
        registry.register(test_user("u2"), "sock-2", 100);

        let members = registry.join_room("u1", "cap-1");
        assert_eq!(members.len(), 1);

        let members = registry.join_room("u2", "cap-1");
        let mut ids: Vec<&str> = members.iter().map(|user| user.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, ["u1", "u2"]);
    }

    #[test]
    fn join_is_set_semantics() {
        let registry = PresenceRegistry::new();
        registry.register(test_user("u1"), "sock-1", 100);

        registry.join_room("u1", "cap-1");
        let members = registry.join_room("u1", "cap-1");
        assert_eq!(members.len(), 1);
    }

    #[test]
    fn unregistered_user_cannot_join() {
        let registry = PresenceRegistry::new();
        let members = registry.join_room("ghost", "cap-1");
        assert!(members.is_empty());
        assert_eq!(registry.room_count(), 0);
    }

    #[test]
    fn leave_deletes_empty_rooms() {
        let registry = PresenceRegistry::new();
        registry.register(test_user("u1"), "sock-1", 100);
        registry.join_room("u1", "cap-1");
        assert_eq!(registry.room_count(), 1);

        assert!(registry.leave_room("u1", "cap-1"));
        assert_eq!(registry.room_count(), 0);
        assert!(!registry.leave_room("u1", "cap-1"));
    }

    #[test]
    fn unregister_reports_departed_rooms_and_leaves_no_residue() {
        let registry = PresenceRegistry::new();
        registry.register(test_user("u1"), "sock-1", 100);
        registry.register(test_user("u2"), "sock-2", 100);
        registry.join_room("u1", "cap-shared");
        registry.join_room("u2", "cap-shared");
        registry.join_room("u1", "cap-solo");

        let departures = registry.unregister("u1");
        assert_eq!(departures.len(), 2);
        let shared = departures
            .iter()
            .find(|dep| dep.capsule_id == "cap-shared")
            .expect("shared room departure");
        assert!(shared.has_remaining_members);
        let solo = departures
            .iter()
            .find(|dep| dep.capsule_id == "cap-solo")
            .expect("solo room departure");
        assert!(!solo.has_remaining_members);

        // The solo room is gone, the shared one still holds u2.
        assert_eq!(registry.room_count(), 1);
        assert!(!registry.is_member("u1", "cap-shared"));
        assert!(registry.is_member("u2", "cap-shared"));
    }

    #[test]
    fn unregister_is_idempotent() {
        let registry = PresenceRegistry::new();
        registry.register(test_user("u1"), "sock-1", 100);
        registry.join_room("u1", "cap-1");

        assert_eq!(registry.unregister("u1").len(), 1);
        assert!(registry.unregister("u1").is_empty());
        assert!(registry.unregister("never-seen").is_empty());
    }

    #[test]
    fn join_all_counts_rooms_without_snapshots() {
        let registry = PresenceRegistry::new();
        registry.register(test_user("u1"), "sock-1", 100);

        let joined = registry.join_all(
            "u1",
            &["cap-1".to_owned(), "cap-2".to_owned(), "cap-3".to_owned()],
        );
        assert_eq!(joined, 3);
        assert!(registry.is_member("u1", "cap-2"));

        assert_eq!(registry.join_all("ghost", &["cap-1".to_owned()]), 0);
    }

    #[test]
    fn sweep_evicts_on_inactivity_not_connection_age() {
        let registry = PresenceRegistry::new();
        // Both connected at t=0; only u1 keeps sending events.
        registry.register(test_user("u1"), "sock-1", 0);
        registry.register(test_user("u2"), "sock-2", 0);
        registry.join_room("u1", "cap-1");
        registry.join_room("u2", "cap-1");

        registry.touch("u1", 3_500);

        let evicted = registry.sweep_stale(3_700, 3_600);
        assert_eq!(evicted.len(), 1);
        let (identity, departures) = &evicted[0];
        assert_eq!(identity.user.id, "u2");
        assert_eq!(departures.len(), 1);
        assert!(departures[0].has_remaining_members);

        // An old but active connection survives the sweep.
        assert!(registry.is_online("u1"));
        assert!(!registry.is_online("u2"));
        assert!(registry.is_member("u1", "cap-1"));
    }

    #[test]
    fn sweep_reports_the_socket_to_close() {
        let registry = PresenceRegistry::new();
        registry.register(test_user("u1"), "sock-stale", 0);
        registry.join_room("u1", "cap-1");

        let evicted = registry.sweep_stale(4_000, 3_600);
        assert_eq!(evicted.len(), 1);
        // The caller disconnects this socket; a user who reconnected since
        // gets a fresh id, so the old connection is never torn down twice.
        assert_eq!(evicted[0].0.socket_id, "sock-stale");
    }

    #[test]
    fn sweep_below_threshold_is_a_no_op() {
        let registry = PresenceRegistry::new();
        registry.register(test_user("u1"), "sock-1", 0);

        assert!(registry.sweep_stale(3_600, 3_600).is_empty());
        assert!(registry.is_online("u1"));
    }

    #[test]
    fn active_members_skip_dropped_identities() {
        let registry = PresenceRegistry::new();
        registry.register(test_user("u1"), "sock-1", 100);
        registry.register(test_user("u2"), "sock-2", 100);
        registry.join_room("u1", "cap-1");
        registry.join_room("u2", "cap-1");

        // Simulate a racing eviction that left the room entry behind.
        registry.identities.remove("u2");

        let members = registry.active_members_of("cap-1");
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, "u1");
    }

    #[test]
    fn exclusion_audience_is_member_sockets_minus_sender() {
        let registry = PresenceRegistry::new();
        registry.register(test_user("u1"), "sock-1", 100);
        registry.register(test_user("u2"), "sock-2", 100);
        registry.register(test_user("u3"), "sock-3", 100);
        registry.join_room("u1", "cap-1");
        registry.join_room("u2", "cap-1");
        registry.join_room("u3", "cap-2");

        let excluded = registry.socket_of("u1").expect("u1 online");
        let mut audience: Vec<String> = registry
            .member_socket_ids("cap-1")
            .into_iter()
            .filter(|socket_id| *socket_id != excluded)
            .collect();
        audience.sort();
        assert_eq!(audience, ["sock-2"]);
    }

    #[test]
    fn all_active_lists_every_identity() {
        let registry = PresenceRegistry::new();
        registry.register(test_user("u1"), "sock-1", 100);
        registry.register(test_user("u2"), "sock-2", 100);

        let mut ids: Vec<String> = registry
            .all_active()
            .into_iter()
            .map(|user| user.id)
            .collect();
        ids.sort();
        assert_eq!(ids, ["u1", "u2"]);
    }
}
