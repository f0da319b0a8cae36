//! Group fan-out result aggregation.
//!
//! A group command is dispatched to every member independently and all
//! branches are allowed to settle; the aggregate succeeds when at least one
//! member accepted the command. When every member failed, the first observed
//! failure becomes the cause of the [`ControlError::GroupCommand`] so a
//! caller always sees a concrete reason, never a bare "all failed".

use std::collections::HashMap;

use tracing::warn;

use crate::errors::{ControlError, Result};

pub(crate) fn settle_group_results(
    action: &str,
    results: Vec<Result<HashMap<String, String>>>,
) -> Result<()> {
    let total = results.len();
    let mut first_failure = None;
    let mut succeeded = 0usize;

    for result in results {
        match result {
            Ok(_) => succeeded += 1,
            Err(err) => {
                if first_failure.is_none() {
                    first_failure = Some(err);
                }
            }
        }
    }

    if succeeded > 0 {
        if succeeded < total {
            warn!(
                action,
                succeeded, total, "Group command partially failed, treating as success"
            );
        }
        return Ok(());
    }

    match first_failure {
        Some(source) => Err(ControlError::group_command(action, source)),
        None => Err(ControlError::Protocol(format!(
            "{action} was dispatched to an empty member set"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok() -> Result<HashMap<String, String>> {
        Ok(HashMap::new())
    }

    fn refused() -> Result<HashMap<String, String>> {
        Err(ControlError::transport("Play", 500, "fault"))
    }

    #[test]
    fn one_success_out_of_three_is_success() {
        assert!(settle_group_results("Play", vec![refused(), ok(), refused()]).is_ok());
    }

    #[test]
    fn all_successes_is_success() {
        assert!(settle_group_results("Play", vec![ok(), ok(), ok()]).is_ok());
    }

    #[test]
    fn all_failures_wrap_first_observed_cause() {
        let err = settle_group_results("Pause", vec![refused(), refused(), refused()]).unwrap_err();
        match err {
            ControlError::GroupCommand { action, source } => {
                assert_eq!(action, "Pause");
                assert!(matches!(*source, ControlError::Transport { status: 500, .. }));
            }
            other => panic!("expected GroupCommand, got {other:?}"),
        }
    }

    #[test]
    fn empty_member_set_still_surfaces_a_reason() {
        let err = settle_group_results("Stop", Vec::new()).unwrap_err();
        assert!(!err.to_string().is_empty());
    }
}
