use crate::models::Participant;
use crate::ws::session::SessionState;

/// Add a participant keyed by connection id and return the roster.
///
/// A repeated join of the same connection updates its entry in place.
pub fn join(state: &mut SessionState, participant: Participant) -> Vec<Participant> {
    match state
        .participants
        .iter_mut()
        .find(|p| p.connection_id == participant.connection_id)
    {
        Some(existing) => {
            existing.username = participant.username;
            existing.is_admin = participant.is_admin;
        }
        None => state.participants.push(participant),
    }
    state.participants.clone()
}

/// Remove the participant of a connection. Missing entries are not an error.
pub fn leave(state: &mut SessionState, connection_id: &str) -> Option<Participant> {
    let index = state
        .participants
        .iter()
        .position(|p| p.connection_id == connection_id)?;
    Some(state.participants.remove(index))
}

pub fn find<'a>(state: &'a SessionState, connection_id: &str) -> Option<&'a Participant> {
    state.participants.iter().find(|p| p.connection_id == connection_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(state: &SessionState) -> Vec<&str> {
        state.participants.iter().map(|p| p.connection_id.as_str()).collect()
    }

    #[test]
    fn join_preserves_order() {
        let mut state = SessionState::new("r1");
        join(&mut state, Participant::new("a", "ada", true));
        join(&mut state, Participant::new("b", "bob", false));
        let snapshot = join(&mut state, Participant::new("c", "cy", false));
        assert_eq!(roster(&state), vec!["a", "b", "c"]);
        assert_eq!(snapshot.len(), 3);
    }

    #[test]
    fn join_then_leave_restores_roster() {
        let mut state = SessionState::new("r1");
        join(&mut state, Participant::new("a", "ada", true));
        let before = state.participants.clone();

        join(&mut state, Participant::new("b", "bob", false));
        let left = leave(&mut state, "b").unwrap();

        assert_eq!(left.username, "bob");
        assert_eq!(state.participants, before);
    }

    #[test]
    fn duplicate_leave_is_a_no_op() {
        let mut state = SessionState::new("r1");
        join(&mut state, Participant::new("a", "ada", false));
        assert!(leave(&mut state, "a").is_some());
        assert!(leave(&mut state, "a").is_none());
        assert!(state.participants.is_empty());
    }

    #[test]
    fn rejoin_of_same_connection_does_not_duplicate() {
        let mut state = SessionState::new("r1");
        join(&mut state, Participant::new("a", "ada", false));
        join(&mut state, Participant::new("b", "bob", false));
        join(&mut state, Participant::new("a", "ada lovelace", true));
        assert_eq!(roster(&state), vec!["a", "b"]);
        assert_eq!(find(&state, "a").unwrap().username, "ada lovelace");
        assert!(find(&state, "a").unwrap().is_admin);
    }

    #[test]
    fn same_display_name_on_two_connections_is_two_participants() {
        let mut state = SessionState::new("r1");
        join(&mut state, Participant::new("a1", "ada", false));
        join(&mut state, Participant::new("a2", "ada", false));
        assert_eq!(state.participants.len(), 2);
        leave(&mut state, "a1");
        assert_eq!(roster(&state), vec!["a2"]);
    }
}
