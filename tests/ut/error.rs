use super::*;

#[test]
fn display_messages_are_client_facing() {
    assert_eq!(TaskError::Cancelled.to_string(), "task cancelled");
    assert_eq!(TaskError::Died.to_string(), "unable to complete command");
    assert_eq!(TaskError::ActionBeginFailed.to_string(), "action failed to begin");
}

#[test]
fn variants_are_distinguishable() {
    assert_ne!(TaskError::Cancelled, TaskError::Died);
    assert_ne!(TaskError::Died, TaskError::ActionBeginFailed);
}

#[test]
fn is_copy_and_eq() {
    let e = TaskError::Cancelled;
    let copied = e;
    assert_eq!(e, copied);
}
