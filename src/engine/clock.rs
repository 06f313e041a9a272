// src/engine/clock.rs

//! Time and id sources injected into the engine.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::types::ExecutionId;

pub trait Clock: Send {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Produces execution ids. The engine retries on collision, so an
/// implementation only needs to be unlikely to repeat itself.
pub trait IdGenerator: Send {
    fn next_id(&mut self) -> ExecutionId;
}

/// Random v4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&mut self) -> ExecutionId {
        ExecutionId::new(Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn uuid_ids_do_not_repeat() {
        let mut ids = UuidGenerator;
        let seen: HashSet<_> = (0..1000).map(|_| ids.next_id()).collect();
        assert_eq!(seen.len(), 1000);
    }
}
