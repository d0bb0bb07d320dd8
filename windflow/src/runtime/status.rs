//! Engine lifecycle status. `#[atomic_enum]` expands to the two-argument std `Result`, the
//! crate alias must not be in scope here.

#[atomic_enum]
#[derive(PartialEq)]
pub enum EngineStatus {
    Created = 0,
    Running = 1,
    Draining = 2,
    Stopped = 3,
}

impl std::fmt::Display for EngineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineStatus::Created => write!(f, "Created"),
            EngineStatus::Running => write!(f, "Running"),
            EngineStatus::Draining => write!(f, "Draining"),
            EngineStatus::Stopped => write!(f, "Stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use crate::runtime::status::{AtomicEngineStatus, EngineStatus};

    #[test]
    pub fn status_transition_test() {
        let status = AtomicEngineStatus::new(EngineStatus::Created);
        assert!(status
            .compare_exchange(
                EngineStatus::Created,
                EngineStatus::Running,
                Ordering::SeqCst,
                Ordering::SeqCst
            )
            .is_ok());

        match status.compare_exchange(
            EngineStatus::Created,
            EngineStatus::Running,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Err(actual) => assert!(actual == EngineStatus::Running),
            Ok(_) => panic!("a running engine can not be started twice"),
        }
        assert_eq!(format!("{}", status.load(Ordering::SeqCst)), "Running");
    }
}
