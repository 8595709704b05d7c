//! The access control decision path: a pure, ordered strategy chain over a
//! snapshot of the doctor/patient situation, and the resolver that loads the
//! snapshot, picks the verdict, and applies its side effects exactly once.

pub mod resolver;
pub mod strategy;

pub use resolver::{AccessResolver, Resolution};
pub use strategy::{AccessAttempt, GrantedAccess, Verdict};
