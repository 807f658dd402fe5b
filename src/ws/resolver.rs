use crate::config::RevisionMode;
use crate::error::SessionError;
use crate::models::Language;
use crate::ws::session::SessionState;

/// A proposed replacement of the buffer
#[derive(Debug, Clone, PartialEq)]
pub struct EditProposal {
    pub payload: String,
    pub proposer: String,
    pub revision: i64,
}

/// A proposed language switch. Without a stamp the next marker value is used.
#[derive(Debug, Clone, PartialEq)]
pub struct LanguageProposal {
    pub language: Language,
    pub proposer: String,
    pub revision: Option<i64>,
}

/// Outcome of an accepted proposal, carrying attribution
#[derive(Debug, Clone, PartialEq)]
pub struct Accepted {
    pub revision: i64,
    pub proposer: String,
}

/// Last-writer-wins gate on revision stamps.
///
/// A proposal is accepted when its stamp is strictly greater than the last
/// accepted one, or when nothing was accepted yet. Equal stamps lose.
#[derive(Debug, Clone, Copy)]
pub struct RevisionResolver {
    mode: RevisionMode,
}

impl RevisionResolver {
    pub fn new(mode: RevisionMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> RevisionMode {
        self.mode
    }

    pub fn apply(&self, state: &mut SessionState, proposal: EditProposal) -> Result<Accepted, SessionError> {
        let revision = self.stamp(state.revision, Some(proposal.revision));
        gate(state.revision, revision)?;

        state.buffer = proposal.payload;
        state.revision = Some(revision);
        state.mark_dirty();

        Ok(Accepted {
            revision,
            proposer: proposal.proposer,
        })
    }

    pub fn apply_language(
        &self,
        state: &mut SessionState,
        proposal: LanguageProposal,
    ) -> Result<Accepted, SessionError> {
        let revision = self.stamp(state.language_revision, proposal.revision);
        gate(state.language_revision, revision)?;

        state.language = proposal.language;
        state.language_revision = Some(revision);
        state.mark_dirty();

        Ok(Accepted {
            revision,
            proposer: proposal.proposer,
        })
    }

    fn stamp(&self, current: Option<i64>, supplied: Option<i64>) -> i64 {
        let next = current.map_or(1, |c| c.saturating_add(1));
        match self.mode {
            // Unstamped clients send 0
            RevisionMode::Client => supplied.filter(|s| *s > 0).unwrap_or(next),
            RevisionMode::Server => next,
        }
    }
}

fn gate(current: Option<i64>, proposed: i64) -> Result<(), SessionError> {
    match current {
        Some(current) if proposed <= current => Err(SessionError::StaleProposal { proposed, current }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edit(payload: &str, revision: i64) -> EditProposal {
        EditProposal {
            payload: payload.to_string(),
            proposer: "ada".to_string(),
            revision,
        }
    }

    fn client() -> RevisionResolver {
        RevisionResolver::new(RevisionMode::Client)
    }

    #[test]
    fn increasing_stamps_end_on_last_payload() {
        let resolver = client();
        let mut state = SessionState::new("r1");
        for (i, stamp) in [3, 10, 11, 500, 501].into_iter().enumerate() {
            resolver.apply(&mut state, edit(&format!("v{}", i), stamp)).unwrap();
        }
        assert_eq!(state.buffer, "v4");
        assert_eq!(state.revision_stamp(), 501);
    }

    #[test]
    fn higher_stamp_wins_in_either_order() {
        let resolver = client();

        let mut forward = SessionState::new("r1");
        resolver.apply(&mut forward, edit("low", 5)).unwrap();
        resolver.apply(&mut forward, edit("high", 9)).unwrap();

        let mut backward = SessionState::new("r1");
        resolver.apply(&mut backward, edit("high", 9)).unwrap();
        assert!(resolver.apply(&mut backward, edit("low", 5)).is_err());

        assert_eq!(forward.buffer, "high");
        assert_eq!(backward.buffer, "high");
        assert_eq!(forward.revision, backward.revision);
    }

    #[test]
    fn equal_stamp_is_stale() {
        let resolver = client();
        let mut state = SessionState::new("r1");
        resolver.apply(&mut state, edit("first", 1000)).unwrap();
        let epoch = state.epoch;

        let err = resolver.apply(&mut state, edit("second", 1000)).unwrap_err();
        assert!(matches!(err, SessionError::StaleProposal { proposed: 1000, current: 1000 }));
        assert_eq!(state.buffer, "first");
        assert_eq!(state.epoch, epoch);
    }

    #[test]
    fn first_proposal_is_accepted_whatever_its_stamp() {
        let resolver = client();
        let mut state = SessionState::new("r1");
        let accepted = resolver.apply(&mut state, edit("boot", 1)).unwrap();
        assert_eq!(accepted.revision, 1);
        assert_eq!(accepted.proposer, "ada");
        assert!(state.dirty);
    }

    #[test]
    fn unstamped_edits_take_the_next_revision() {
        let resolver = client();
        let mut state = SessionState::new("r1");
        assert_eq!(resolver.apply(&mut state, edit("a", 0)).unwrap().revision, 1);
        assert_eq!(resolver.apply(&mut state, edit("b", 0)).unwrap().revision, 2);
        assert_eq!(resolver.apply(&mut state, edit("c", 1000)).unwrap().revision, 1000);
        assert_eq!(resolver.apply(&mut state, edit("d", 0)).unwrap().revision, 1001);
        assert_eq!(state.buffer, "d");
    }

    #[test]
    fn stamps_never_decrease() {
        let resolver = client();
        let mut state = SessionState::new("r1");
        let mut last = i64::MIN;
        for stamp in [50, 20, 70, 70, 60, 90, 10] {
            let _ = resolver.apply(&mut state, edit("x", stamp));
            assert!(state.revision_stamp() >= last);
            last = state.revision_stamp();
        }
        assert_eq!(last, 90);
    }

    #[test]
    fn server_mode_ignores_caller_stamps() {
        let resolver = RevisionResolver::new(RevisionMode::Server);
        let mut state = SessionState::new("r1");
        let first = resolver.apply(&mut state, edit("a", 9_999_999)).unwrap();
        let second = resolver.apply(&mut state, edit("b", 1)).unwrap();
        assert_eq!(first.revision, 1);
        assert_eq!(second.revision, 2);
        assert_eq!(state.buffer, "b");
    }

    #[test]
    fn language_stream_is_independent_of_edits() {
        let resolver = client();
        let mut state = SessionState::new("r1");
        resolver.apply(&mut state, edit("x", 5000)).unwrap();

        let proposal = LanguageProposal {
            language: Language::Python,
            proposer: "bob".to_string(),
            revision: Some(10),
        };
        resolver.apply_language(&mut state, proposal).unwrap();
        assert_eq!(state.language, Language::Python);
        assert_eq!(state.revision_stamp(), 5000);

        let stale = LanguageProposal {
            language: Language::Cpp,
            proposer: "cy".to_string(),
            revision: Some(10),
        };
        assert!(resolver.apply_language(&mut state, stale).is_err());
        assert_eq!(state.language, Language::Python);
    }

    #[test]
    fn unstamped_language_changes_always_advance() {
        let resolver = client();
        let mut state = SessionState::new("r1");
        for language in [Language::Python, Language::Cpp, Language::Javascript] {
            let proposal = LanguageProposal {
                language,
                proposer: "ada".to_string(),
                revision: None,
            };
            resolver.apply_language(&mut state, proposal).unwrap();
        }
        assert_eq!(state.language, Language::Javascript);
        assert_eq!(state.language_revision, Some(3));
    }
}
