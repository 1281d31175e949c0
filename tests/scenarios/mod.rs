//! Scenario-based tests for xcpipe

mod failure_handling;
mod merge_plist;
mod release_chain;
mod test_actions;
