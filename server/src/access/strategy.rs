//! Pure decision functions over an [`AccessAttempt`] snapshot.
//!
//! Ordering is the contract: explicit proof of identity (the access code)
//! and an explicit prior grant outweigh heuristic inference, and the
//! heuristics never produce a write-capable verdict. Each strategy returns
//! `Some(granted)` to stop the chain or `None` to hand over to the next.

use crate::models::{AccessLevel, AccessMethod};

/// Everything the decision needs to know, loaded up front so the strategies
/// themselves stay free of I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessAttempt {
    /// A code was supplied with the attempt.
    pub code_supplied: bool,
    /// The supplied code matches the patient's current or legacy code.
    pub code_matches: bool,
    /// Level of an active, unexpired grant for the pair, if one exists.
    pub active_grant_level: Option<AccessLevel>,
    /// The doctor has authored a record for this patient tagged with the
    /// doctor's current hospital.
    pub treated_at_current_hospital: bool,
    /// Any record for this patient carries the doctor's current department.
    pub department_record_exists: bool,
}

/// A positive verdict: how access was obtained and at what level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GrantedAccess {
    pub method: AccessMethod,
    pub level: AccessLevel,
}

/// The chain's overall outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Granted(GrantedAccess),
    /// No access and no code supplied: the caller should be offered the
    /// request/approval cycle (soft outcome, not an error).
    RequestAccess,
    /// No access and a code was supplied but did not match: hard denial.
    Denied,
}

type Strategy = fn(&AccessAttempt) -> Option<GrantedAccess>;

fn access_code(attempt: &AccessAttempt) -> Option<GrantedAccess> {
    (attempt.code_supplied && attempt.code_matches).then_some(GrantedAccess {
        method: AccessMethod::AccessCode,
        level: AccessLevel::ReadWrite,
    })
}

fn existing_grant(attempt: &AccessAttempt) -> Option<GrantedAccess> {
    attempt.active_grant_level.map(|level| GrantedAccess {
        method: AccessMethod::ExistingGrant,
        level,
    })
}

fn same_hospital(attempt: &AccessAttempt) -> Option<GrantedAccess> {
    attempt.treated_at_current_hospital.then_some(GrantedAccess {
        method: AccessMethod::SameHospital,
        level: AccessLevel::Read,
    })
}

fn same_department(attempt: &AccessAttempt) -> Option<GrantedAccess> {
    attempt.department_record_exists.then_some(GrantedAccess {
        method: AccessMethod::SameDepartment,
        level: AccessLevel::Read,
    })
}

/// First match wins; each strategy runs only when every earlier one passed.
const STRATEGIES: &[Strategy] = &[access_code, existing_grant, same_hospital, same_department];

pub fn evaluate(attempt: &AccessAttempt) -> Verdict {
    for strategy in STRATEGIES {
        if let Some(granted) = strategy(attempt) {
            return Verdict::Granted(granted);
        }
    }
    if attempt.code_supplied {
        Verdict::Denied
    } else {
        Verdict::RequestAccess
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_code_wins_and_carries_read_write() {
        let verdict = evaluate(&AccessAttempt {
            code_supplied: true,
            code_matches: true,
            active_grant_level: Some(AccessLevel::Read),
            ..Default::default()
        });
        assert_eq!(
            verdict,
            Verdict::Granted(GrantedAccess {
                method: AccessMethod::AccessCode,
                level: AccessLevel::ReadWrite,
            })
        );
    }

    #[test]
    fn grant_outranks_heuristics_and_keeps_its_level() {
        let verdict = evaluate(&AccessAttempt {
            active_grant_level: Some(AccessLevel::Read),
            treated_at_current_hospital: true,
            department_record_exists: true,
            ..Default::default()
        });
        assert_eq!(
            verdict,
            Verdict::Granted(GrantedAccess {
                method: AccessMethod::ExistingGrant,
                level: AccessLevel::Read,
            })
        );
    }

    #[test]
    fn mismatched_code_still_falls_through_to_a_grant() {
        // A wrong code does not poison the chain; an explicit grant is
        // consulted next.
        let verdict = evaluate(&AccessAttempt {
            code_supplied: true,
            code_matches: false,
            active_grant_level: Some(AccessLevel::ReadWrite),
            ..Default::default()
        });
        assert_eq!(
            verdict,
            Verdict::Granted(GrantedAccess {
                method: AccessMethod::ExistingGrant,
                level: AccessLevel::ReadWrite,
            })
        );
    }

    #[test]
    fn hospital_heuristic_outranks_department_and_is_read_only() {
        let verdict = evaluate(&AccessAttempt {
            treated_at_current_hospital: true,
            department_record_exists: true,
            ..Default::default()
        });
        assert_eq!(
            verdict,
            Verdict::Granted(GrantedAccess {
                method: AccessMethod::SameHospital,
                level: AccessLevel::Read,
            })
        );
    }

    #[test]
    fn department_heuristic_never_grants_write() {
        let verdict = evaluate(&AccessAttempt {
            department_record_exists: true,
            ..Default::default()
        });
        match verdict {
            Verdict::Granted(granted) => {
                assert_eq!(granted.method, AccessMethod::SameDepartment);
                assert_eq!(granted.level, AccessLevel::Read);
            }
            other => panic!("expected a grant, got {other:?}"),
        }
    }

    #[test]
    fn no_access_without_code_asks_for_a_request() {
        assert_eq!(evaluate(&AccessAttempt::default()), Verdict::RequestAccess);
    }

    #[test]
    fn no_access_with_mismatched_code_is_a_hard_denial() {
        let verdict = evaluate(&AccessAttempt {
            code_supplied: true,
            code_matches: false,
            ..Default::default()
        });
        assert_eq!(verdict, Verdict::Denied);
    }
}
